use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use super::HttpMethod;
use crate::auth::{Session, TokenService};
use crate::config::AppConfig;
use crate::database::{EmployeeDirectory, StoreTransaction};
use crate::error::ApiError;
use crate::files::{AttachmentService, StagedFile, UploadedFile};
use crate::workflow::WorkflowEngine;

/// Long-lived collaborators shared by every handler.
pub struct Services {
    pub config: Arc<AppConfig>,
    pub tokens: TokenService,
    pub workflow: WorkflowEngine,
    pub attachments: AttachmentService,
    pub employees: EmployeeDirectory,
}

impl Services {
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self {
            tokens: TokenService::new(&config.security),
            workflow: WorkflowEngine::new(),
            attachments: AttachmentService::new(&config.files),
            employees: EmployeeDirectory::new(Duration::from_secs(config.api.employee_cache_secs)),
            config,
        }
    }
}

/// Successful handler result.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub message: String,
    pub data: Option<Value>,
}

impl Reply {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: None,
        }
    }

    pub fn data(message: impl Into<String>, data: impl Into<Value>) -> Self {
        Self {
            message: message.into(),
            data: Some(data.into()),
        }
    }
}

/// Per-request state handed to a handler: who is calling, the open store
/// transaction and any uploaded file.
pub struct RequestContext {
    session: Session,
    method: HttpMethod,
    tx: Option<Box<dyn StoreTransaction>>,
    services: Arc<Services>,
    upload: Option<UploadedFile>,
    staged_files: Vec<StagedFile>,
}

impl RequestContext {
    pub fn new(
        session: Session,
        method: HttpMethod,
        tx: Box<dyn StoreTransaction>,
        services: Arc<Services>,
        upload: Option<UploadedFile>,
    ) -> Self {
        Self {
            session,
            method,
            tx: Some(tx),
            services,
            upload,
            staged_files: Vec::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn user(&self) -> &str {
        self.session.user_id()
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn services(&self) -> Arc<Services> {
        self.services.clone()
    }

    /// The request's open transaction.
    pub fn tx(&mut self) -> Result<&mut (dyn StoreTransaction + 'static), ApiError> {
        self.tx
            .as_deref_mut()
            .ok_or_else(|| ApiError::unhandled("Transaction already closed"))
    }

    pub fn take_upload(&mut self) -> Option<UploadedFile> {
        self.upload.take()
    }

    /// Hold `file` until the transaction settles: published on commit,
    /// removed otherwise.
    pub fn stage_file(&mut self, file: StagedFile) {
        self.staged_files.push(file);
    }

    /// Roll back now. Later store access through this context fails.
    pub async fn rollback(&mut self) -> Result<(), ApiError> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        Ok(())
    }

    pub(crate) fn take_transaction(&mut self) -> Option<Box<dyn StoreTransaction>> {
        self.tx.take()
    }

    pub(crate) fn take_staged_files(&mut self) -> Vec<StagedFile> {
        std::mem::take(&mut self.staged_files)
    }
}

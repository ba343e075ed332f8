use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use super::context::{Reply, RequestContext, Services};
use super::table::{DispatchTable, EndpointDescriptor};
use super::HttpMethod;
use crate::api::{normalize, ResponseEnvelope};
use crate::auth::Session;
use crate::database::DocumentStore;
use crate::error::ApiError;
use crate::files::{StagedFile, UploadedFile};

const GUEST_NOT_ALLOWED: &str = "Guest access not allowed for this endpoint.";

/// One inbound call after transport decoding.
#[derive(Debug, Clone)]
pub struct RequestEnvelope {
    pub endpoint: String,
    pub method: HttpMethod,
    pub payload: Map<String, Value>,
}

impl RequestEnvelope {
    pub fn new(endpoint: impl Into<String>, method: HttpMethod, payload: Map<String, Value>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method,
            payload,
        }
    }
}

/// Single entry point for every mobile endpoint.
///
/// Resolves the endpoint, checks method and guest access, validates the
/// payload, runs the handler inside a store transaction and shapes the outcome
/// into a [`ResponseEnvelope`]. Only POST requests commit; every other
/// transaction is rolled back once the handler returns.
pub struct Dispatcher {
    table: Arc<DispatchTable>,
    store: Arc<dyn DocumentStore>,
    services: Arc<Services>,
    auth_failure_status: u16,
}

impl Dispatcher {
    pub fn new(table: Arc<DispatchTable>, store: Arc<dyn DocumentStore>, services: Arc<Services>) -> Self {
        let auth_failure_status = services.config.security.auth_failure_status;
        Self {
            table,
            store,
            services,
            auth_failure_status,
        }
    }

    pub fn table(&self) -> &DispatchTable {
        &self.table
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    pub async fn handle(
        &self,
        request: RequestEnvelope,
        session: Session,
        upload: Option<UploadedFile>,
    ) -> ResponseEnvelope {
        let started = Instant::now();
        let endpoint = request.endpoint.clone();
        let method = request.method;
        let user = session.user_id().to_string();

        let envelope = match self.dispatch(request, session, upload).await {
            Ok(reply) => normalize(200, reply.message, reply.data),
            Err(err) => self.render_error(&endpoint, err),
        };

        info!(
            "{} {} by {} -> {} in {}ms",
            method,
            endpoint,
            user,
            envelope.http_status_code,
            started.elapsed().as_millis()
        );
        envelope
    }

    async fn dispatch(
        &self,
        request: RequestEnvelope,
        session: Session,
        upload: Option<UploadedFile>,
    ) -> Result<Reply, ApiError> {
        let descriptor = self.resolve(&request.endpoint, request.method, &session)?;

        let input = match &descriptor.schema {
            Some(schema) => schema.validate(&request.payload).map_err(ApiError::ValidationFailed)?,
            None => Value::Object(request.payload),
        };

        let tx = self.store.begin().await?;
        let mut ctx = RequestContext::new(session, request.method, tx, self.services.clone(), upload);
        let mut result = descriptor.handler.handle(&mut ctx, input).await;

        let mut committed = false;
        if let Some(tx) = ctx.take_transaction() {
            if result.is_ok() && request.method.is_mutating() {
                match tx.commit().await {
                    Ok(()) => committed = true,
                    Err(err) => result = Err(err.into()),
                }
            } else if let Err(err) = tx.rollback().await {
                warn!("Rollback for {} failed: {}", descriptor.name, err);
            }
        }
        settle_files(&descriptor.name, ctx.take_staged_files(), committed).await;

        result
    }

    /// Report a request whose payload could not be decoded. Lookup, method and
    /// guest checks still run first so their errors win.
    pub fn reject(&self, endpoint: &str, method: HttpMethod, session: &Session, err: ApiError) -> ResponseEnvelope {
        let err = match self.resolve(endpoint, method, session) {
            Ok(_) => err,
            Err(earlier) => earlier,
        };
        let envelope = self.render_error(endpoint, err);
        info!(
            "{} {} by {} -> {} (payload rejected)",
            method,
            endpoint,
            session.user_id(),
            envelope.http_status_code
        );
        envelope
    }

    fn resolve(&self, endpoint: &str, method: HttpMethod, session: &Session) -> Result<&EndpointDescriptor, ApiError> {
        let descriptor = self.table.get(endpoint).ok_or(ApiError::NotFound)?;

        if !descriptor.allows(method) {
            return Err(ApiError::MethodNotAllowed);
        }

        if session.is_guest() && !descriptor.allow_guest {
            return Err(ApiError::forbidden(GUEST_NOT_ALLOWED));
        }

        Ok(descriptor)
    }

    fn render_error(&self, endpoint: &str, err: ApiError) -> ResponseEnvelope {
        let status = match &err {
            ApiError::AuthenticationFailed(_) => self.auth_failure_status,
            other => other.status_code(),
        };
        match &err {
            ApiError::Unhandled(message) => error!("{} failed: {}", endpoint, message),
            ApiError::AuthenticationFailed(message) => warn!("{} authentication failed: {}", endpoint, message),
            _ => {}
        }
        normalize(status, err.to_string(), None)
    }
}

async fn settle_files(endpoint: &str, files: Vec<StagedFile>, committed: bool) {
    for file in files {
        if !committed {
            file.discard().await;
            continue;
        }
        let target = file.target().display().to_string();
        if let Err(err) = file.publish().await {
            error!("{}: committed upload {} could not be published: {}", endpoint, target, err);
        }
    }
}

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use super::document::Document;
use crate::filter::{FilterData, FilterError};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{doctype} {name} not found")]
    NotFound { doctype: String, name: String },

    #[error("{doctype} {name} already exists")]
    Duplicate { doctype: String, name: String },

    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid query: {0}")]
    Filter(#[from] FilterError),

    #[error("Corrupt document {doctype} {name}: data is not an object")]
    Corrupt { doctype: String, name: String },

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl StoreError {
    pub fn not_found(doctype: &str, name: &str) -> Self {
        StoreError::NotFound {
            doctype: doctype.to_string(),
            name: name.to_string(),
        }
    }
}

/// Persistence for typed documents. Every read and write happens inside a
/// [`StoreTransaction`]; nothing is visible to other transactions until commit.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;

    /// Short backend label for logs and the service info endpoint.
    fn backend(&self) -> &'static str;
}

/// A unit of work against the store. Dropping it without `commit` discards its
/// writes.
#[async_trait]
pub trait StoreTransaction: Send {
    async fn get(&mut self, doctype: &str, name: &str) -> Result<Option<Document>, StoreError>;

    async fn find(&mut self, doctype: &str, filter: &FilterData) -> Result<Vec<Document>, StoreError>;

    async fn exists(&mut self, doctype: &str, filter: &FilterData) -> Result<bool, StoreError> {
        let probe = filter.clone().limit(1);
        Ok(!self.find(doctype, &probe).await?.is_empty())
    }

    /// Insert a new document. An empty name is replaced by an autoname; `creation`
    /// and `modified` are stamped. Returns the stored document.
    async fn insert(&mut self, doc: Document) -> Result<Document, StoreError>;

    /// Replace the fields of an existing document and stamp `modified`.
    async fn update(&mut self, doc: Document) -> Result<Document, StoreError>;

    async fn delete(&mut self, doctype: &str, name: &str) -> Result<(), StoreError>;

    /// Single field of a single document.
    async fn get_value(&mut self, doctype: &str, name: &str, field: &str) -> Result<Option<Value>, StoreError> {
        Ok(self
            .get(doctype, name)
            .await?
            .and_then(|doc| doc.get(field).cloned())
            .filter(|v| !v.is_null()))
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

pub(crate) fn timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

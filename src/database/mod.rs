pub mod directory;
pub mod document;
pub mod memory;
pub mod postgres;
pub mod store;

use std::sync::Arc;
use tracing::info;

pub use directory::EmployeeDirectory;
pub use document::{remove_default_fields, Document};
pub use memory::MemoryStore;
pub use postgres::PgDocumentStore;
pub use store::{DocumentStore, StoreError, StoreTransaction};

use crate::config::{DatabaseConfig, StoreBackend};

/// Open the store selected by configuration.
pub async fn connect(config: &DatabaseConfig) -> Result<Arc<dyn DocumentStore>, StoreError> {
    match config.backend {
        StoreBackend::Memory => {
            info!("Using in-memory document store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Postgres => {
            let store = PgDocumentStore::connect(config).await?;
            store.migrate().await?;
            Ok(Arc::new(store))
        }
    }
}

use anyhow::Context;

use crate::cli::utils::output_success;
use crate::cli::OutputFormat;
use crate::config::{self, StoreBackend};
use crate::database::PgDocumentStore;

pub async fn handle(output_format: OutputFormat) -> anyhow::Result<()> {
    let config = config::config();
    if config.database.backend != StoreBackend::Postgres {
        anyhow::bail!("migrate needs the Postgres backend; set DATABASE_URL");
    }

    let store = PgDocumentStore::connect(&config.database)
        .await
        .context("failed to connect to Postgres")?;
    store.migrate().await.context("migration failed")?;

    output_success(&output_format, "Document table is up to date", None)
}

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, Row};
use std::time::Duration;
use tracing::info;

use super::document::{autoname, Document};
use super::store::{timestamp, DocumentStore, StoreError, StoreTransaction};
use crate::config::DatabaseConfig;
use crate::filter::FilterData;

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS ess_documents (
    doctype   TEXT        NOT NULL,
    name      TEXT        NOT NULL,
    data      JSONB       NOT NULL DEFAULT '{}'::jsonb,
    creation  TIMESTAMPTZ NOT NULL DEFAULT now(),
    modified  TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (doctype, name)
)"#;

const CREATE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS ess_documents_data_idx ON ess_documents USING GIN (data jsonb_path_ops)";

/// Documents as JSONB rows in a single `ess_documents` table.
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let url = config.url.as_deref().ok_or(StoreError::ConfigMissing("DATABASE_URL"))?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout))
            .connect(url)
            .await?;
        info!("Connected document store pool (max {} connections)", config.max_connections);
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_INDEX).execute(&self.pool).await?;
        info!("Document store schema is up to date");
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTransaction { tx }))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}

struct PgTransaction {
    // rolled back by sqlx when dropped uncommitted
    tx: sqlx::Transaction<'static, Postgres>,
}

/// SELECT for a filter. Binds: $1 doctype, $2 containment object, $3 optional
/// name, then one per non-name sort field. Only sort directions and the limit are
/// spliced into the text.
fn select_sql(filter: &FilterData) -> String {
    let mut sql = String::from(
        "SELECT name, data FROM ess_documents WHERE doctype = $1 AND data @> $2 AND ($3::text IS NULL OR name = $3)",
    );
    if filter.order.is_empty() {
        sql.push_str(" ORDER BY name ASC");
    } else {
        let mut param = 3;
        let clauses: Vec<String> = filter
            .order
            .iter()
            .map(|info| {
                if info.field == "name" {
                    format!("name {}", info.sort.to_sql())
                } else {
                    param += 1;
                    format!("NULLIF(data -> ${}, 'null'::jsonb) {} NULLS LAST", param, info.sort.to_sql())
                }
            })
            .collect();
        sql.push_str(" ORDER BY ");
        sql.push_str(&clauses.join(", "));
    }
    if let Some(limit) = filter.limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }
    sql
}

/// `name` lives in its own column, so it is split out of the containment
/// condition.
fn split_name_condition(filter: &FilterData) -> (Option<String>, Value) {
    let mut conditions = filter.where_clause.clone();
    let name = conditions.remove("name").map(|v| match v {
        Value::String(s) => s,
        other => other.to_string(),
    });
    (name, Value::Object(conditions))
}

fn row_to_document(doctype: &str, name: String, data: Value) -> Result<Document, StoreError> {
    match data {
        Value::Object(fields) => Ok(Document {
            doctype: doctype.to_string(),
            name,
            fields,
        }),
        _ => Err(StoreError::Corrupt {
            doctype: doctype.to_string(),
            name,
        }),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|e| e.code())
        .is_some_and(|code| code == "23505")
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn get(&mut self, doctype: &str, name: &str) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query("SELECT name, data FROM ess_documents WHERE doctype = $1 AND name = $2")
            .bind(doctype)
            .bind(name)
            .fetch_optional(&mut *self.tx)
            .await?;

        match row {
            Some(row) => {
                let name: String = row.try_get("name")?;
                let data: Value = row.try_get("data")?;
                Ok(Some(row_to_document(doctype, name, data)?))
            }
            None => Ok(None),
        }
    }

    async fn find(&mut self, doctype: &str, filter: &FilterData) -> Result<Vec<Document>, StoreError> {
        filter.validate()?;
        let (name_condition, containment) = split_name_condition(filter);

        let sql = select_sql(filter);
        let mut query = sqlx::query(&sql).bind(doctype).bind(containment).bind(name_condition);
        for info in &filter.order {
            if info.field != "name" {
                query = query.bind(info.field.clone());
            }
        }

        let rows = query.fetch_all(&mut *self.tx).await?;
        let mut docs = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("name")?;
            let data: Value = row.try_get("data")?;
            docs.push(row_to_document(doctype, name, data)?);
        }
        Ok(docs)
    }

    async fn insert(&mut self, mut doc: Document) -> Result<Document, StoreError> {
        if doc.name.is_empty() {
            doc.name = autoname(&doc.doctype);
        }
        let now = timestamp();
        doc.set("creation", now.clone());
        doc.set("modified", now);

        let result = sqlx::query("INSERT INTO ess_documents (doctype, name, data) VALUES ($1, $2, $3)")
            .bind(&doc.doctype)
            .bind(&doc.name)
            .bind(Value::Object(doc.fields.clone()))
            .execute(&mut *self.tx)
            .await;

        match result {
            Ok(_) => Ok(doc),
            Err(err) if is_unique_violation(&err) => Err(StoreError::Duplicate {
                doctype: doc.doctype,
                name: doc.name,
            }),
            Err(err) => Err(err.into()),
        }
    }

    async fn update(&mut self, mut doc: Document) -> Result<Document, StoreError> {
        doc.set("modified", timestamp());
        let result = sqlx::query(
            "UPDATE ess_documents SET data = $3, modified = now() WHERE doctype = $1 AND name = $2",
        )
        .bind(&doc.doctype)
        .bind(&doc.name)
        .bind(Value::Object(doc.fields.clone()))
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(&doc.doctype, &doc.name));
        }
        Ok(doc)
    }

    async fn delete(&mut self, doctype: &str, name: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM ess_documents WHERE doctype = $1 AND name = $2")
            .bind(doctype)
            .bind(name)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(doctype, name));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

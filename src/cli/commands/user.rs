use anyhow::Context;
use clap::Args;
use serde_json::{json, Map};

use crate::auth::hash_password;
use crate::cli::utils::output_success;
use crate::cli::OutputFormat;
use crate::config::{self, StoreBackend};
use crate::database::{self, Document};

#[derive(Args, Debug, Clone)]
pub struct CreateUserArgs {
    #[arg(help = "Login name (usually the email address)")]
    pub email: String,

    #[arg(long, help = "Password")]
    pub password: String,

    #[arg(long, help = "Display name")]
    pub full_name: Option<String>,

    #[arg(long = "role", help = "Role to grant; repeat for several")]
    pub roles: Vec<String>,

    #[arg(long, help = "Also create an Employee in this company")]
    pub company: Option<String>,

    #[arg(long, help = "Expense approver for the new Employee")]
    pub expense_approver: Option<String>,
}

/// The `User` document, plus an `Employee` when a company is given.
pub fn build_documents(args: &CreateUserArgs) -> anyhow::Result<Vec<Document>> {
    let password_hash =
        hash_password(&args.password).map_err(|e| anyhow::anyhow!("failed to hash password: {}", e))?;
    let full_name = args.full_name.clone().unwrap_or_else(|| args.email.clone());
    let mut roles = args.roles.clone();
    if roles.is_empty() {
        roles.push("Employee".to_string());
    }

    let mut docs = vec![Document::named("User", args.email.clone())
        .with("full_name", full_name.clone())
        .with("user_type", "System User")
        .with("enabled", 1)
        .with("roles", roles)
        .with("password_hash", password_hash)];

    if let Some(company) = &args.company {
        docs.push(
            Document::new("Employee")
                .with("user_id", args.email.clone())
                .with("employee_name", full_name)
                .with("company", company.clone())
                .with("expense_approver", args.expense_approver.clone())
                .with("status", "Active"),
        );
    }
    Ok(docs)
}

pub async fn handle(args: CreateUserArgs, output_format: OutputFormat) -> anyhow::Result<()> {
    let config = config::config();
    if config.database.backend == StoreBackend::Memory {
        tracing::warn!("In-memory store selected; the new user disappears when this command exits");
    }

    let store = database::connect(&config.database)
        .await
        .context("failed to open document store")?;
    let mut tx = store.begin().await?;
    let mut created = Vec::new();
    for doc in build_documents(&args)? {
        let doc = tx.insert(doc).await.with_context(|| format!("failed to create {}", args.email))?;
        created.push(json!({ "doctype": doc.doctype, "name": doc.name }));
    }
    tx.commit().await?;

    let mut data = Map::new();
    data.insert("created".into(), json!(created));
    output_success(&output_format, &format!("Created user {}", args.email), Some(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::verify_password;

    #[test]
    fn user_gets_hashed_password_and_optional_employee() {
        let args = CreateUserArgs {
            email: "a@example.com".into(),
            password: "s3cret".into(),
            full_name: None,
            roles: vec![],
            company: Some("Acme".into()),
            expense_approver: None,
        };
        let docs = build_documents(&args).unwrap();
        assert_eq!(docs.len(), 2);

        let user = &docs[0];
        assert_eq!(user.name, "a@example.com");
        assert!(verify_password("s3cret", user.get_str("password_hash").unwrap()));
        assert!(user.get("password_salt").is_none());
        assert_eq!(user.get("roles"), Some(&json!(["Employee"])));
        assert_eq!(docs[1].get_str("user_id"), Some("a@example.com"));
        assert_eq!(docs[1].get_str("company"), Some("Acme"));
    }
}

#![allow(dead_code)]

use anyhow::{Context, Result};
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceExt;

use ess_mobile_api::auth::hash_password;
use ess_mobile_api::config::AppConfig;
use ess_mobile_api::database::{Document, MemoryStore};
use ess_mobile_api::handlers;
use ess_mobile_api::server::{app, AppState};

pub const PASSWORD: &str = "s3cret-pass";
pub const EMPLOYEE_USER: &str = "jane@example.com";
pub const APPROVER_USER: &str = "boss@example.com";
pub const UNLINKED_USER: &str = "nobody@example.com";
pub const DISABLED_USER: &str = "gone@example.com";

pub struct TestApp {
    pub router: Router,
    pub store: MemoryStore,
    pub upload_dir: PathBuf,
}

fn user(name: &str, full_name: &str, roles: &[&str]) -> Document {
    Document::named("User", name)
        .with("full_name", full_name)
        .with("user_type", "System User")
        .with("enabled", 1)
        .with("roles", json!(roles))
        .with("password_hash", hash_password(PASSWORD).unwrap())
}

fn claim(name: &str, posting_date: &str, state: &str, expenses: Value, total: f64) -> Document {
    Document::named("Expense Claim", name)
        .with("employee", "EMP-0001")
        .with("employee_name", "Jane Doe")
        .with("expense_approver", APPROVER_USER)
        .with("company", "Acme")
        .with("posting_date", posting_date)
        .with("status", if state == "Approved" { "Unpaid" } else { "Draft" })
        .with("approval_status", if state == "Approved" { "Approved" } else { "Draft" })
        .with("workflow_state", state)
        .with("docstatus", 0)
        .with("expenses", expenses)
        .with("total_claimed_amount", total)
}

pub fn fixtures() -> Vec<Document> {
    vec![
        user(EMPLOYEE_USER, "Jane Doe", &["Employee"]),
        user(APPROVER_USER, "Bo Boss", &["Employee", "Expense Approver"]),
        user(UNLINKED_USER, "No Body", &["Employee"]),
        user(DISABLED_USER, "Gone Away", &["Employee"]).with("enabled", 0),
        Document::named("Employee", "EMP-0001")
            .with("user_id", EMPLOYEE_USER)
            .with("employee_name", "Jane Doe")
            .with("company", "Acme")
            .with("expense_approver", APPROVER_USER),
        Document::named("Employee", "EMP-0002")
            .with("user_id", APPROVER_USER)
            .with("employee_name", "Bo Boss")
            .with("company", "Acme"),
        Document::named("Employee", "EMP-0003")
            .with("user_id", DISABLED_USER)
            .with("company", "Acme"),
        Document::named("Company", "Acme").with("default_payable_account", "Creditors - AC"),
        Document::named("Global Defaults", "Global Defaults").with("default_currency", "INR"),
        Document::named("Currency", "INR").with("symbol", "₹"),
        Document::named("Expense Claim Type", "Travel"),
        Document::named("Expense Claim Type", "Food"),
        Document::named("Workflow", "Expense Approval")
            .with("document_type", "Expense Claim")
            .with("is_active", 1)
            .with("workflow_state_field", "workflow_state")
            .with(
                "transitions",
                json!([
                    {"state": "Draft", "action": "Submit", "next_state": "Pending", "allowed": "Employee"},
                    {"state": "Pending", "action": "Approve", "next_state": "Approved", "allowed": "Expense Approver"},
                    {"state": "Pending", "action": "Reject", "next_state": "Rejected", "allowed": "Expense Approver"}
                ]),
            ),
        claim(
            "EC-0001",
            "2024-03-15",
            "Approved",
            json!([
                {"expense_type": "Travel", "amount": 1000.0, "expense_date": "2024-03-14"},
                {"expense_type": "Food", "amount": 200.0, "expense_date": "2024-03-14"}
            ]),
            1200.0,
        ),
        claim(
            "EC-0002",
            "2024-03-02",
            "Draft",
            json!([{"expense_type": "Travel", "amount": 50.0, "expense_date": "2024-03-01"}]),
            50.0,
        ),
        claim(
            "EC-0003",
            "2024-01-20",
            "Approved",
            json!([{"expense_type": "Travel", "amount": 300.0, "expense_date": "2024-01-19"}]),
            300.0,
        ),
    ]
}

pub async fn spawn() -> TestApp {
    let mut config = AppConfig::development();
    config.api.employee_cache_secs = 0;
    spawn_with(config).await
}

pub async fn spawn_with(mut config: AppConfig) -> TestApp {
    let upload_dir = std::env::temp_dir().join(format!("ess-test-{}", uuid::Uuid::new_v4().simple()));
    config.files.upload_dir = upload_dir.clone();
    config.api.enable_request_logging = false;

    let store = MemoryStore::new();
    store.seed(fixtures()).await;

    let table = handlers::endpoints().expect("endpoint table");
    let state = AppState::new(Arc::new(config), Arc::new(store.clone()), table);
    TestApp {
        router: app(state),
        store,
        upload_dir,
    }
}

impl TestApp {
    pub async fn request(&self, request: Request<Body>) -> Result<(StatusCode, Value)> {
        let response = self.router.clone().oneshot(request).await.context("router failed")?;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).with_context(|| format!("non-JSON body: {:?}", bytes))?
        };
        Ok((status, body))
    }

    /// JSON request against `uri`. `auth` is the full Authorization header value.
    pub async fn send(&self, method: Method, uri: &str, auth: Option<&str>, body: Option<Value>) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body)?))?,
            None => builder.body(Body::empty())?,
        };
        self.request(request).await
    }

    /// POST `{"data": data}` to an endpoint.
    pub async fn post(&self, endpoint: &str, auth: Option<&str>, data: Value) -> Result<(StatusCode, Value)> {
        self.send(
            Method::POST,
            &format!("/api/mobile/v2?type={}", endpoint),
            auth,
            Some(json!({ "data": data })),
        )
        .await
    }

    pub async fn get(&self, endpoint: &str, auth: Option<&str>) -> Result<(StatusCode, Value)> {
        self.send(Method::GET, &format!("/api/mobile/v2/{}", endpoint), auth, None).await
    }

    /// Log in and return the reply data.
    pub async fn login(&self, usr: &str) -> Result<Value> {
        let (status, body) = self.post("login", None, json!({"usr": usr, "pwd": PASSWORD})).await?;
        anyhow::ensure!(status == StatusCode::OK, "login failed: {}", body);
        Ok(body["data"].clone())
    }

    /// `Bearer <access token>` for `usr`.
    pub async fn bearer(&self, usr: &str) -> Result<String> {
        let data = self.login(usr).await?;
        let token = data["access_token"].as_str().context("no access token")?;
        Ok(format!("Bearer {}", token))
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.upload_dir);
    }
}

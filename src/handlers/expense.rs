use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::{json, Map, Value};

use super::utils::{
    currency_symbol, current_employee, decimal_to_json, default_currency, fmt_money, month_year, parse_decimal,
    payable_account,
};
use crate::database::{remove_default_fields, Document, StoreError};
use crate::dispatch::{Handler, HandlerResult, Reply, RequestContext};
use crate::error::ApiError;
use crate::filter::FilterData;
use crate::workflow::DEFAULT_STATE_FIELD;

pub const EXPENSE_CLAIM: &str = "Expense Claim";
pub const EXPENSE_CLAIM_TYPE: &str = "Expense Claim Type";
const APPROVED: &str = "Approved";
const DRAFT: &str = "Draft";

/// Keys a client may not set through the payload.
const PROTECTED_FIELDS: &[&str] = &[
    "doctype",
    "name",
    "employee",
    "owner",
    "docstatus",
    "creation",
    "modified",
    "modified_by",
    "total_claimed_amount",
    "employee_name",
    "company",
    "payable_account",
    "expense_approver",
    "status",
    "approval_status",
    DEFAULT_STATE_FIELD,
];

fn today() -> String {
    Utc::now().date_naive().format("%Y-%m-%d").to_string()
}

fn detail_rows(claim: &Document) -> &[Value] {
    claim
        .get("expenses")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Pull the expense detail rows out of the payload. `expenses` is the current
/// key, `items` the one older clients send. Either may arrive JSON encoded.
fn take_expense_rows(payload: &mut Map<String, Value>) -> Result<Option<Vec<Value>>, ApiError> {
    let (key, raw) = match payload.remove("expenses") {
        Some(raw) => ("expenses", raw),
        None => match payload.remove("items") {
            Some(raw) => ("items", raw),
            None => return Ok(None),
        },
    };

    let raw = match raw {
        Value::String(text) => serde_json::from_str(&text)
            .map_err(|_| ApiError::invalid_field(key, "Input should be a valid list"))?,
        other => other,
    };
    let Value::Array(rows) = raw else {
        return Err(ApiError::invalid_field(key, "Input should be a valid list"));
    };

    let mut out = Vec::with_capacity(rows.len());
    for (idx, row) in rows.into_iter().enumerate() {
        let Value::Object(mut row) = row else {
            return Err(ApiError::invalid_field(format!("{}.{}", key, idx), "Input should be a valid dictionary"));
        };
        let amount = row
            .get("amount")
            .and_then(parse_decimal)
            .ok_or_else(|| ApiError::invalid_field(format!("{}.{}.amount", key, idx), "Input should be a valid number"))?;
        if !row.get("expense_type").map_or(false, |v| v.as_str().map_or(false, |s| !s.is_empty())) {
            return Err(ApiError::invalid_field(format!("{}.{}.expense_type", key, idx), "Field required"));
        }

        row.insert("amount".into(), decimal_to_json(amount));
        row.entry("sanctioned_amount").or_insert_with(|| decimal_to_json(amount));
        row.entry("expense_date").or_insert_with(|| Value::String(today()));
        row.insert("idx".into(), Value::from(idx + 1));
        out.push(Value::Object(row));
    }
    Ok(Some(out))
}

fn claimed_total(rows: &[Value]) -> Decimal {
    rows.iter()
        .filter_map(|row| row.get("amount").and_then(parse_decimal))
        .sum()
}

/// Merge client fields into `doc`. State only moves through workflow actions,
/// so the workflow's state field is dropped along with the protected keys.
fn merge_payload(doc: &mut Document, mut payload: Map<String, Value>, state_field: &str) {
    for key in PROTECTED_FIELDS {
        payload.remove(*key);
    }
    payload.remove(state_field);
    doc.update(&payload);
}

fn presented(doc: &Document) -> Value {
    Value::Object(remove_default_fields(doc.to_map()))
}

/// `get_expense_claims`: the caller's claims grouped by posting month.
pub struct GetExpenseClaims;

#[async_trait]
impl Handler for GetExpenseClaims {
    async fn handle(&self, ctx: &mut RequestContext, _input: Value) -> HandlerResult {
        let employee = current_employee(ctx).await?;
        let tx = ctx.tx()?;

        let symbol = match default_currency(tx).await? {
            Some(currency) => Some(currency_symbol(tx, &currency).await?),
            None => None,
        };

        let filter = FilterData::new()
            .where_eq("employee", employee.name.as_str())
            .order_by("posting_date desc")
            .map_err(StoreError::from)?;
        let claims = tx.find(EXPENSE_CLAIM, &filter).await?;

        let mut grouped = Map::new();
        for claim in &claims {
            let details = detail_rows(claim);
            let total = claim
                .get("total_claimed_amount")
                .and_then(parse_decimal)
                .unwrap_or(Decimal::ZERO);
            let posting_date = claim.get_str("posting_date").unwrap_or_default();

            let row = json!({
                "name": claim.name,
                "employee": claim.get("employee"),
                "employee_name": claim.get("employee_name"),
                "approval_status": claim.get("approval_status"),
                "status": claim.get("status"),
                "expense_approver": claim.get("expense_approver"),
                "total_claimed_amount": fmt_money(total, symbol.as_deref()),
                "posting_date": posting_date,
                "company": claim.get("company"),
                "expense_type": details.first().and_then(|d| d.get("expense_type")),
                "total_expenses": details.len(),
            });

            let label = month_year(posting_date).unwrap_or_default();
            if let Value::Array(rows) = grouped.entry(label).or_insert_with(|| Value::Array(Vec::new())) {
                rows.push(row);
            }
        }

        Ok(Reply::data("Expense date get successfully", Value::Object(grouped)))
    }
}

/// `get_expense_claim_type_totals`: approved amounts summed per expense type.
pub struct GetExpenseClaimTypeTotals;

#[async_trait]
impl Handler for GetExpenseClaimTypeTotals {
    async fn handle(&self, ctx: &mut RequestContext, _input: Value) -> HandlerResult {
        let employee = current_employee(ctx).await?;
        let filter = FilterData::new()
            .where_eq("employee", employee.name.as_str())
            .where_eq("workflow_state", APPROVED)
            .order_by("posting_date desc")
            .map_err(StoreError::from)?;
        let claims = ctx.tx()?.find(EXPENSE_CLAIM, &filter).await?;

        // expense type -> (first claim seen, running total)
        let mut totals: Vec<(String, &Document, Decimal)> = Vec::new();
        for claim in &claims {
            for detail in detail_rows(claim) {
                let Some(expense_type) = detail.get("expense_type").and_then(Value::as_str) else {
                    continue;
                };
                let amount = detail.get("amount").and_then(parse_decimal).unwrap_or(Decimal::ZERO);
                match totals.iter_mut().find(|(t, _, _)| t == expense_type) {
                    Some((_, _, total)) => *total += amount,
                    None => totals.push((expense_type.to_string(), claim, amount)),
                }
            }
        }

        let rows: Vec<Value> = totals
            .into_iter()
            .map(|(expense_type, claim, total)| {
                json!({
                    "name": claim.name,
                    "employee": claim.get("employee"),
                    "employee_name": claim.get("employee_name"),
                    "expense_type": expense_type,
                    "total_amount": decimal_to_json(total),
                })
            })
            .collect();

        Ok(Reply::data("Expense date get successfully", rows))
    }
}

/// `get_expense_type`
pub struct GetExpenseType;

#[async_trait]
impl Handler for GetExpenseType {
    async fn handle(&self, ctx: &mut RequestContext, _input: Value) -> HandlerResult {
        let filter = FilterData::new().order_by("name asc").map_err(StoreError::from)?;
        let types: Vec<Value> = ctx
            .tx()?
            .find(EXPENSE_CLAIM_TYPE, &filter)
            .await?
            .into_iter()
            .map(|doc| json!({ "name": doc.name }))
            .collect();
        Ok(Reply::data("Expense type get successfully", types))
    }
}

/// `apply_expense`: create a draft claim for the caller, with an optional receipt.
pub struct ApplyExpense;

#[async_trait]
impl Handler for ApplyExpense {
    async fn handle(&self, ctx: &mut RequestContext, input: Value) -> HandlerResult {
        let employee = current_employee(ctx).await?;
        let services = ctx.services();
        let user = ctx.user().to_string();
        let mut payload = match input {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let rows = take_expense_rows(&mut payload)?.unwrap_or_default();
        let company = employee.get_str("company").unwrap_or_default().to_string();

        let tx = ctx.tx()?;
        let payable = payable_account(tx, &company).await?;
        let workflow = services.workflow.active_workflow(tx, EXPENSE_CLAIM).await?;
        let state_field = workflow
            .as_ref()
            .map_or(DEFAULT_STATE_FIELD, |w| w.state_field.as_str())
            .to_string();

        let mut claim = Document::new(EXPENSE_CLAIM)
            .with("employee", employee.name.clone())
            .with("employee_name", employee.get("employee_name").cloned().unwrap_or(Value::Null))
            .with("expense_approver", employee.get("expense_approver").cloned().unwrap_or(Value::Null))
            .with("posting_date", today())
            .with("company", company)
            .with("payable_account", payable)
            .with("status", DRAFT)
            .with("approval_status", DRAFT);
        merge_payload(&mut claim, payload, &state_field);

        claim.set("total_claimed_amount", decimal_to_json(claimed_total(&rows)));
        claim.set("expenses", rows);
        claim.set("docstatus", 0);
        claim.set("owner", user.clone());

        if let Some(initial) = workflow.as_ref().and_then(|w| w.transitions.first()) {
            claim.set(state_field, initial.state.clone());
        }

        let claim = tx.insert(claim).await?;
        tracing::info!("{} created {} for {}", user, claim.name, employee.name);

        if let Some(file) = ctx.take_upload() {
            let (_, staged) = services
                .attachments
                .attach(ctx.tx()?, &file, EXPENSE_CLAIM, &claim.name, &user)
                .await?;
            ctx.stage_file(staged);
        }

        Ok(Reply::data("Expense applied Successfully", presented(&claim)))
    }
}

/// `update_expense`: edit one of the caller's unsubmitted claims.
pub struct UpdateExpense;

#[async_trait]
impl Handler for UpdateExpense {
    async fn handle(&self, ctx: &mut RequestContext, input: Value) -> HandlerResult {
        let employee = current_employee(ctx).await?;
        let services = ctx.services();
        let user = ctx.user().to_string();
        let mut payload = match input {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let id = match payload.remove("id") {
            Some(Value::String(id)) => id,
            _ => return Err(ApiError::unhandled("Invalid ID")),
        };
        let rows = take_expense_rows(&mut payload)?;

        let tx = ctx.tx()?;
        let mut claim = tx
            .get(EXPENSE_CLAIM, &id)
            .await?
            .filter(|claim| claim.get_str("employee") == Some(employee.name.as_str()))
            .ok_or_else(|| ApiError::unhandled("Invalid ID"))?;

        if claim.get("docstatus").and_then(Value::as_i64).unwrap_or(0) == 1 {
            return Err(ApiError::unhandled("Submitted Expense Claim cannot be updated"));
        }

        let state_field = services
            .workflow
            .state_field(tx, EXPENSE_CLAIM)
            .await?
            .unwrap_or_else(|| DEFAULT_STATE_FIELD.to_string());
        merge_payload(&mut claim, payload, &state_field);
        if let Some(rows) = rows {
            claim.set("total_claimed_amount", decimal_to_json(claimed_total(&rows)));
            claim.set("expenses", rows);
        }
        claim.set("modified_by", user.clone());

        let claim = tx.update(claim).await?;
        tracing::info!("{} updated {}", user, claim.name);

        if let Some(file) = ctx.take_upload() {
            let (_, staged) = services
                .attachments
                .attach(ctx.tx()?, &file, EXPENSE_CLAIM, &claim.name, &user)
                .await?;
            ctx.stage_file(staged);
        }

        Ok(Reply::data("Expense updated Successfully", presented(&claim)))
    }
}

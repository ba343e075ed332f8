// Shared lookups for the ESS handlers
use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::Value;
use std::str::FromStr;

use crate::database::{Document, StoreTransaction};
use crate::dispatch::RequestContext;
use crate::error::ApiError;

pub const ESS_SETTINGS: &str = "Employee Self Service Settings";
pub const GLOBAL_DEFAULTS: &str = "Global Defaults";

/// Employee linked to the session user, with a company set.
pub async fn current_employee(ctx: &mut RequestContext) -> Result<Document, ApiError> {
    let services = ctx.services();
    let user = ctx.user().to_string();
    let employee = services
        .employees
        .employee_for_user(ctx.tx()?, &user)
        .await?
        .ok_or_else(|| ApiError::unhandled("Employee does not exists"))?;
    validate_employee(&employee)?;
    Ok(employee)
}

pub fn validate_employee(employee: &Document) -> Result<(), ApiError> {
    if employee.get_str("company").is_none() {
        return Err(ApiError::unhandled(
            "Company not set in employee doctype. Contact HR manager to set the company.",
        ));
    }
    Ok(())
}

/// Single-instance settings documents are stored under their own doctype name.
pub async fn single(tx: &mut dyn StoreTransaction, doctype: &str) -> Result<Option<Document>, ApiError> {
    Ok(tx.get(doctype, doctype).await?)
}

pub async fn default_currency(tx: &mut dyn StoreTransaction) -> Result<Option<String>, ApiError> {
    Ok(single(tx, GLOBAL_DEFAULTS)
        .await?
        .and_then(|doc| doc.get_str("default_currency").map(str::to_string)))
}

/// Display symbol for `currency`, falling back to the code itself.
pub async fn currency_symbol(tx: &mut dyn StoreTransaction, currency: &str) -> Result<String, ApiError> {
    let symbol = tx.get_value("Currency", currency, "symbol").await?;
    Ok(symbol
        .as_ref()
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(currency)
        .to_string())
}

/// ESS settings first, then the company default.
pub async fn payable_account(tx: &mut dyn StoreTransaction, company: &str) -> Result<String, ApiError> {
    if let Some(account) = single(tx, ESS_SETTINGS)
        .await?
        .and_then(|doc| doc.get_str("default_payable_account").map(str::to_string))
    {
        return Ok(account);
    }

    match tx.get_value("Company", company, "default_payable_account").await? {
        Some(Value::String(account)) if !account.is_empty() => Ok(account),
        _ => Err(ApiError::unhandled(
            "Set Default Payable Account Either In ESS Settings or Company Settings",
        )),
    }
}

/// Role names stored on the `User` document.
pub async fn user_roles(tx: &mut dyn StoreTransaction, user: &str) -> Result<Vec<String>, ApiError> {
    let roles = tx.get_value("User", user, "roles").await?;
    Ok(match roles {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(role) => Some(role.clone()),
                Value::Object(row) => row.get("role").and_then(Value::as_str).map(str::to_string),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    })
}

/// Numbers and numeric strings; anything else is `None`.
pub fn parse_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .ok()
            .or_else(|| n.as_f64().and_then(Decimal::from_f64_retain)),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

pub fn decimal_to_json(value: Decimal) -> Value {
    value
        .round_dp(2)
        .to_f64()
        .map(Value::from)
        .unwrap_or(Value::Null)
}

/// `1234.5` -> `"₹ 1,234.50"` with two decimals and thousands separators.
pub fn fmt_money(amount: Decimal, symbol: Option<&str>) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let text = format!("{:.2}", rounded.abs());
    let (whole, fraction) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let number = format!("{}{}.{}", if negative { "-" } else { "" }, grouped, fraction);
    match symbol {
        Some(symbol) if !symbol.is_empty() => format!("{} {}", symbol, number),
        _ => number,
    }
}

/// `"2024-03-05"` -> `"March 2024"`.
pub fn month_year(date: &str) -> Option<String> {
    let date = date.get(..10).unwrap_or(date);
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .ok()
        .map(|d| d.format("%B %Y").to_string())
}

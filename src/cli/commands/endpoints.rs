use serde_json::{json, Value};

use crate::cli::utils::output_table;
use crate::cli::OutputFormat;
use crate::handlers;

pub fn handle(output_format: OutputFormat) -> anyhow::Result<()> {
    let table = handlers::endpoints()?;
    let rows: Vec<Value> = table
        .iter()
        .map(|d| {
            json!({
                "name": d.name,
                "methods": d.methods,
                "schema": d.schema.as_ref().map(|s| s.name()),
                "allow_guest": d.allow_guest,
            })
        })
        .collect();

    output_table(&output_format, "endpoints", rows, |row| {
        let methods = row["methods"]
            .as_array()
            .map(|m| m.iter().filter_map(Value::as_str).collect::<Vec<_>>().join(","))
            .unwrap_or_default();
        format!(
            "{:<32} {:<10} {:<22} {}",
            row["name"].as_str().unwrap_or_default(),
            methods,
            row["schema"].as_str().unwrap_or("-"),
            if row["allow_guest"].as_bool().unwrap_or(false) { "guest" } else { "" },
        )
    })
}

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::FilterError;
use super::filter_order::FilterOrder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterOrderInfo {
    pub field: String,
    pub sort: SortDirection,
}

/// Query over one doctype: equality conditions, ordering and an optional limit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterData {
    pub where_clause: Map<String, Value>,
    pub order: Vec<FilterOrderInfo>,
    pub limit: Option<usize>,
}

impl FilterData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.where_clause.insert(field.into(), value.into());
        self
    }

    /// Parse an order string such as `"posting_date desc, name asc"`.
    pub fn order_by(mut self, spec: &str) -> Result<Self, FilterError> {
        self.order = FilterOrder::parse(spec)?;
        Ok(self)
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Field names are interpolated into store queries, so only identifiers pass.
    pub fn validate(&self) -> Result<(), FilterError> {
        for field in self.where_clause.keys() {
            validate_field_name(field)?;
        }
        for info in &self.order {
            validate_field_name(&info.field)?;
        }
        Ok(())
    }
}

pub fn validate_field_name(name: &str) -> Result<(), FilterError> {
    let valid = !name.is_empty()
        && name.len() <= 64
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if valid {
        Ok(())
    } else {
        Err(FilterError::InvalidField(name.to_string()))
    }
}

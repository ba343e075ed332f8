//! Input models for dispatch table entries.
//!
//! A [`Schema`] checks a raw payload field by field, coerces lax inputs (numeric
//! strings, `"true"`, ...) into their declared kind and collects every failure
//! instead of stopping at the first one.

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// `"field: reason, field: reason"`
pub fn join_field_errors(errors: &[FieldError]) -> String {
    errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join(", ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Integer,
    Number,
    Boolean,
    Date,
    Object,
    Array,
    Any,
}

#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

#[derive(Debug, Clone)]
pub struct Schema {
    name: &'static str,
    fields: Vec<FieldSpec>,
    allow_extra: bool,
}

impl Schema {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            fields: Vec::new(),
            allow_extra: false,
        }
    }

    pub fn required(mut self, name: &'static str, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec { name, kind, required: true });
        self
    }

    pub fn optional(mut self, name: &'static str, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec { name, kind, required: false });
        self
    }

    /// Keep undeclared keys in the validated output instead of dropping them.
    pub fn allow_extra(mut self) -> Self {
        self.allow_extra = true;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Validate `payload`, returning the coerced object or every field failure in
    /// declaration order.
    pub fn validate(&self, payload: &Map<String, Value>) -> Result<Value, Vec<FieldError>> {
        let mut out = Map::new();
        let mut errors = Vec::new();

        for spec in &self.fields {
            match payload.get(spec.name) {
                None if spec.required => errors.push(FieldError::new(spec.name, "Field required")),
                None => {}
                Some(Value::Null) if !spec.required => {
                    out.insert(spec.name.to_string(), Value::Null);
                }
                Some(value) => match coerce(spec.kind, value) {
                    Ok(v) => {
                        out.insert(spec.name.to_string(), v);
                    }
                    Err(message) => errors.push(FieldError::new(spec.name, message)),
                },
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        if self.allow_extra {
            for (key, value) in payload {
                if !out.contains_key(key) && !self.fields.iter().any(|f| f.name == key) {
                    out.insert(key.clone(), value.clone());
                }
            }
        }

        Ok(Value::Object(out))
    }
}

fn coerce(kind: FieldKind, value: &Value) -> Result<Value, &'static str> {
    match kind {
        FieldKind::Any => Ok(value.clone()),
        FieldKind::String => match value {
            Value::String(_) => Ok(value.clone()),
            _ => Err("Input should be a valid string"),
        },
        FieldKind::Integer => match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value.clone()),
            Value::Number(n) => match n.as_f64() {
                Some(f) if f.fract() == 0.0 => Ok(Value::from(f as i64)),
                _ => Err("Input should be a valid integer, got a number with a fractional part"),
            },
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| "Input should be a valid integer, unable to parse string as an integer"),
            _ => Err("Input should be a valid integer"),
        },
        FieldKind::Number => match value {
            Value::Number(_) => Ok(value.clone()),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or("Input should be a valid number, unable to parse string as a number"),
            _ => Err("Input should be a valid number"),
        },
        FieldKind::Boolean => match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::Number(n) => match n.as_i64() {
                Some(0) => Ok(Value::Bool(false)),
                Some(1) => Ok(Value::Bool(true)),
                _ => Err("Input should be a valid boolean"),
            },
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "y" | "on" | "t" => Ok(Value::Bool(true)),
                "false" | "0" | "no" | "n" | "off" | "f" => Ok(Value::Bool(false)),
                _ => Err("Input should be a valid boolean, unable to interpret input"),
            },
            _ => Err("Input should be a valid boolean"),
        },
        FieldKind::Date => match value {
            Value::String(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
                .map_err(|_| "Input should be a valid date in the format YYYY-MM-DD"),
            _ => Err("Input should be a valid date"),
        },
        FieldKind::Object => match value {
            Value::Object(_) => Ok(value.clone()),
            _ => Err("Input should be a valid dictionary"),
        },
        FieldKind::Array => match value {
            Value::Array(_) => Ok(value.clone()),
            _ => Err("Input should be a valid list"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn login() -> Schema {
        Schema::new("LoginModel")
            .required("usr", FieldKind::String)
            .required("pwd", FieldKind::String)
    }

    #[test]
    fn reports_every_failing_field_in_order() {
        let errors = login().validate(&obj(json!({"pwd": 12}))).unwrap_err();
        assert_eq!(
            errors,
            vec![
                FieldError::new("usr", "Field required"),
                FieldError::new("pwd", "Input should be a valid string"),
            ]
        );
    }

    #[test]
    fn drops_undeclared_keys_by_default() {
        let value = login()
            .validate(&obj(json!({"usr": "a", "pwd": "b", "device": "x"})))
            .unwrap();
        assert_eq!(value, json!({"usr": "a", "pwd": "b"}));
    }

    #[test]
    fn keeps_extra_keys_when_allowed() {
        let schema = Schema::new("Update").required("id", FieldKind::String).allow_extra();
        let value = schema.validate(&obj(json!({"id": "X", "remark": "r"}))).unwrap();
        assert_eq!(value, json!({"id": "X", "remark": "r"}));
    }

    #[test]
    fn coerces_lax_inputs() {
        let schema = Schema::new("Lax")
            .required("count", FieldKind::Integer)
            .required("flag", FieldKind::Boolean)
            .required("amount", FieldKind::Number)
            .optional("on", FieldKind::Date);
        let value = schema
            .validate(&obj(json!({"count": "7", "flag": "yes", "amount": "12.5", "on": "2024-02-01"})))
            .unwrap();
        assert_eq!(value, json!({"count": 7, "flag": true, "amount": 12.5, "on": "2024-02-01"}));
    }

    #[test]
    fn optional_null_is_accepted_but_bad_date_is_not() {
        let schema = Schema::new("Dates").optional("from", FieldKind::Date).optional("to", FieldKind::Date);
        assert!(schema.validate(&obj(json!({"from": null}))).is_ok());
        let errors = schema.validate(&obj(json!({"to": "31/01/2024"}))).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "to");
    }
}

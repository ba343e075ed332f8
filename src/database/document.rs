use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Bookkeeping keys stripped from documents before they are returned to clients.
pub const DEFAULT_FIELDS: &[&str] = &[
    "owner",
    "creation",
    "modified",
    "modified_by",
    "docstatus",
    "idx",
    "doctype",
    "links",
];

/// A typed record in the document store.
///
/// Serialized flat: `{ "doctype": ..., "name": ..., <fields> }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub doctype: String,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn new(doctype: impl Into<String>) -> Self {
        Self {
            doctype: doctype.into(),
            name: String::new(),
            fields: Map::new(),
        }
    }

    pub fn named(doctype: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            doctype: doctype.into(),
            name: name.into(),
            fields: Map::new(),
        }
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        if field == "name" {
            return Some(&self.name);
        }
        self.fields.get(field).and_then(Value::as_str).filter(|s| !s.is_empty())
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Merge `data` into the document. `doctype` and `name` are identity and
    /// never overwritten this way.
    pub fn update(&mut self, data: &Map<String, Value>) {
        for (key, value) in data {
            if key == "doctype" || key == "name" {
                continue;
            }
            self.fields.insert(key.clone(), value.clone());
        }
    }

    /// Flat JSON object including `doctype` and `name`.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut out = Map::new();
        out.insert("doctype".into(), Value::String(self.doctype.clone()));
        out.insert("name".into(), Value::String(self.name.clone()));
        for (k, v) in &self.fields {
            out.insert(k.clone(), v.clone());
        }
        out
    }

    /// Inverse of [`Document::to_map`].
    pub fn from_map(mut map: Map<String, Value>) -> Self {
        let doctype = match map.remove("doctype") {
            Some(Value::String(s)) => s,
            _ => String::new(),
        };
        let name = match map.remove("name") {
            Some(Value::String(s)) => s,
            _ => String::new(),
        };
        Self { doctype, name, fields: map }
    }

    /// Only the requested keys (`name` included when asked for).
    pub fn project(&self, fields: &[&str]) -> Map<String, Value> {
        let mut out = Map::new();
        for field in fields {
            if *field == "name" {
                out.insert("name".into(), Value::String(self.name.clone()));
            } else if let Some(v) = self.fields.get(*field) {
                out.insert((*field).to_string(), v.clone());
            }
        }
        out
    }
}

/// Client-facing view of a document with bookkeeping keys removed.
pub fn remove_default_fields(mut data: Map<String, Value>) -> Map<String, Value> {
    for key in DEFAULT_FIELDS {
        data.remove(*key);
    }
    data
}

/// Name for a document inserted without one: initials of the doctype plus a
/// random suffix, e.g. `EC-3f9a1c0b2d` for "Expense Claim".
pub fn autoname(doctype: &str) -> String {
    let prefix: String = doctype
        .split_whitespace()
        .filter_map(|word| word.chars().next())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", if prefix.is_empty() { "DOC" } else { &prefix }, &suffix[..10])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_flat() {
        let doc = Document::named("Expense Claim Type", "Travel").with("description", "Trips");
        assert_eq!(
            serde_json::to_value(&doc).unwrap(),
            json!({"doctype": "Expense Claim Type", "name": "Travel", "description": "Trips"})
        );
    }

    #[test]
    fn update_keeps_identity() {
        let mut doc = Document::named("Expense Claim", "EC-1");
        doc.update(json!({"name": "other", "remark": "x"}).as_object().unwrap());
        assert_eq!(doc.name, "EC-1");
        assert_eq!(doc.get_str("remark"), Some("x"));
    }

    #[test]
    fn strips_bookkeeping_fields() {
        let doc = Document::named("Expense Claim", "EC-1")
            .with("owner", "a@example.com")
            .with("docstatus", 0)
            .with("company", "Acme");
        let view = remove_default_fields(doc.to_map());
        assert!(view.get("owner").is_none());
        assert!(view.get("doctype").is_none());
        assert_eq!(view.get("company"), Some(&json!("Acme")));
        assert_eq!(view.get("name"), Some(&json!("EC-1")));
    }

    #[test]
    fn autoname_uses_initials() {
        let name = autoname("Expense Claim");
        assert!(name.starts_with("EC-"));
        assert_eq!(name.len(), 13);
    }
}

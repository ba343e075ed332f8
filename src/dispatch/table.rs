use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;

use super::context::{Reply, RequestContext};
use super::schema::Schema;
use super::HttpMethod;
use crate::error::ApiError;

pub type HandlerResult = Result<Reply, ApiError>;

/// Endpoint implementation. Receives the validated input object (or the raw
/// payload object when the endpoint has no schema).
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, ctx: &mut RequestContext, input: Value) -> HandlerResult;
}

pub struct EndpointDescriptor {
    pub name: &'static str,
    pub methods: BTreeSet<HttpMethod>,
    pub handler: Arc<dyn Handler>,
    pub schema: Option<Schema>,
    pub allow_guest: bool,
}

impl EndpointDescriptor {
    pub fn new(name: &'static str, handler: impl Handler + 'static) -> Self {
        Self {
            name,
            methods: BTreeSet::new(),
            handler: Arc::new(handler),
            schema: None,
            allow_guest: false,
        }
    }

    pub fn methods(mut self, methods: impl IntoIterator<Item = HttpMethod>) -> Self {
        self.methods.extend(methods);
        self
    }

    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn allow_guest(mut self) -> Self {
        self.allow_guest = true;
        self
    }

    pub fn allows(&self, method: HttpMethod) -> bool {
        self.methods.contains(&method)
    }
}

impl std::fmt::Debug for EndpointDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointDescriptor")
            .field("name", &self.name)
            .field("methods", &self.methods)
            .field("schema", &self.schema.as_ref().map(Schema::name))
            .field("allow_guest", &self.allow_guest)
            .finish()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TableError {
    #[error("Endpoint '{0}' registered twice")]
    Duplicate(&'static str),

    #[error("Endpoint '{0}' allows no HTTP methods")]
    NoMethods(&'static str),
}

/// Endpoint name → descriptor. Built once at startup, read-only afterwards.
#[derive(Debug, Default)]
pub struct DispatchTable {
    endpoints: HashMap<&'static str, EndpointDescriptor>,
}

impl DispatchTable {
    pub fn builder() -> DispatchTableBuilder {
        DispatchTableBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<&EndpointDescriptor> {
        self.endpoints.get(name)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Descriptors sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = &EndpointDescriptor> {
        let mut all: Vec<_> = self.endpoints.values().collect();
        all.sort_by_key(|d| d.name);
        all.into_iter()
    }
}

#[derive(Default)]
pub struct DispatchTableBuilder {
    entries: Vec<EndpointDescriptor>,
}

impl DispatchTableBuilder {
    pub fn register(mut self, descriptor: EndpointDescriptor) -> Self {
        self.entries.push(descriptor);
        self
    }

    pub fn build(self) -> Result<DispatchTable, TableError> {
        let mut endpoints = HashMap::with_capacity(self.entries.len());
        for descriptor in self.entries {
            if descriptor.methods.is_empty() {
                return Err(TableError::NoMethods(descriptor.name));
            }
            let name = descriptor.name;
            if endpoints.insert(name, descriptor).is_some() {
                return Err(TableError::Duplicate(name));
            }
        }
        Ok(DispatchTable { endpoints })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl Handler for Noop {
        async fn handle(&self, _ctx: &mut RequestContext, _input: Value) -> HandlerResult {
            Ok(Reply::message("ok"))
        }
    }

    #[test]
    fn lookup_of_unknown_name_is_none() {
        let table = DispatchTable::builder()
            .register(EndpointDescriptor::new("ping", Noop).methods([HttpMethod::Get]))
            .build()
            .unwrap();
        assert!(table.get("ping").is_some());
        assert!(table.get("pong").is_none());
        assert!(table.get("ping").unwrap().allows(HttpMethod::Get));
        assert!(!table.get("ping").unwrap().allows(HttpMethod::Post));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = DispatchTable::builder()
            .register(EndpointDescriptor::new("ping", Noop).methods([HttpMethod::Get]))
            .register(EndpointDescriptor::new("ping", Noop).methods([HttpMethod::Post]))
            .build()
            .unwrap_err();
        assert_eq!(err, TableError::Duplicate("ping"));
    }

    #[test]
    fn endpoints_need_a_method() {
        let err = DispatchTable::builder()
            .register(EndpointDescriptor::new("ping", Noop))
            .build()
            .unwrap_err();
        assert_eq!(err, TableError::NoMethods("ping"));
    }
}

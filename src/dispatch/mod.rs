//! Generic request dispatch: endpoint table, input validation, transaction
//! boundary and response normalization.

pub mod context;
pub mod dispatcher;
pub mod schema;
pub mod table;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use context::{Reply, RequestContext, Services};
pub use dispatcher::{Dispatcher, RequestEnvelope};
pub use schema::{FieldError, FieldKind, Schema};
pub use table::{DispatchTable, EndpointDescriptor, Handler, HandlerResult, TableError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    /// Requests with this method run inside a committed transaction.
    pub fn is_mutating(self) -> bool {
        matches!(self, HttpMethod::Post)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&axum::http::Method> for HttpMethod {
    type Error = ();

    fn try_from(method: &axum::http::Method) -> Result<Self, Self::Error> {
        match *method {
            axum::http::Method::GET => Ok(HttpMethod::Get),
            axum::http::Method::POST => Ok(HttpMethod::Post),
            axum::http::Method::PUT => Ok(HttpMethod::Put),
            axum::http::Method::DELETE => Ok(HttpMethod::Delete),
            _ => Err(()),
        }
    }
}

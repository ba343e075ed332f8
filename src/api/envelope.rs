use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::html::strip_html;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Fail,
}

/// Uniform body returned by every mobile endpoint:
/// `{ http_status_code, status, message, data? }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub http_status_code: u16,
    pub status: Status,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ResponseEnvelope {
    pub fn success(message: impl Into<String>, data: Option<Value>) -> Self {
        normalize(200, message, data)
    }

    pub fn fail(status_code: u16, message: impl Into<String>) -> Self {
        normalize(status_code, message, None)
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}

/// Shape a status code, message and optional payload into the envelope.
///
/// Codes in `400..600` are failures and get their message reduced to plain text;
/// everything else is a success and the message passes through untouched.
pub fn normalize(status_code: u16, message: impl Into<String>, data: Option<Value>) -> ResponseEnvelope {
    let message = message.into();
    if (400..600).contains(&status_code) {
        ResponseEnvelope {
            http_status_code: status_code,
            status: Status::Fail,
            message: strip_html(&message),
            data,
        }
    } else {
        ResponseEnvelope {
            http_status_code: status_code,
            status: Status::Success,
            message,
            data,
        }
    }
}

impl IntoResponse for ResponseEnvelope {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

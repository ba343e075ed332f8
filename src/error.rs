// Dispatch-level error taxonomy
use thiserror::Error;

use crate::auth::TokenError;
use crate::database::StoreError;
use crate::dispatch::schema::{join_field_errors, FieldError};
use crate::files::AttachmentError;
use crate::workflow::WorkflowError;

/// Every failure a request can end in. The dispatcher renders each variant into a
/// fail envelope; nothing escapes to the transport raw.
#[derive(Debug, Error)]
pub enum ApiError {
    // 404
    #[error("Endpoint not found.")]
    NotFound,

    // 405
    #[error("Method not allowed.")]
    MethodNotAllowed,

    // 403
    #[error("{0}")]
    Forbidden(String),

    // 400
    #[error("Validation error: {}", join_field_errors(.0))]
    ValidationFailed(Vec<FieldError>),

    // Reported with the configured auth failure status (500 by default)
    #[error("{0}")]
    AuthenticationFailed(String),

    // 500
    #[error("{0}")]
    Unhandled(String),
}

impl ApiError {
    /// HTTP status code. Authentication failures report 500 here; the dispatcher
    /// substitutes the configured status when it renders them.
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::NotFound => 404,
            ApiError::MethodNotAllowed => 405,
            ApiError::Forbidden(_) => 403,
            ApiError::ValidationFailed(_) => 400,
            ApiError::AuthenticationFailed(_) => 500,
            ApiError::Unhandled(_) => 500,
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn authentication_failed(message: impl Into<String>) -> Self {
        ApiError::AuthenticationFailed(message.into())
    }

    pub fn unhandled(message: impl Into<String>) -> Self {
        ApiError::Unhandled(message.into())
    }

    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::ValidationFailed(vec![FieldError::new(field, message)])
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match &err {
            StoreError::Sqlx(inner) => {
                tracing::error!("Document store error: {}", inner);
                ApiError::unhandled("Database error occurred")
            }
            _ => ApiError::unhandled(err.to_string()),
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::MissingSecret => {
                tracing::error!("Token signing secret is not configured");
                ApiError::unhandled(err.to_string())
            }
            other => ApiError::authentication_failed(other.to_string()),
        }
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::Store(inner) => inner.into(),
            other => ApiError::unhandled(other.to_string()),
        }
    }
}

impl From<AttachmentError> for ApiError {
    fn from(err: AttachmentError) -> Self {
        match err {
            AttachmentError::Store(inner) => inner.into(),
            AttachmentError::Io(inner) => {
                tracing::error!("Attachment write failed: {}", inner);
                ApiError::unhandled("Could not save uploaded file")
            }
            other => ApiError::unhandled(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_lists_every_field() {
        let err = ApiError::ValidationFailed(vec![
            FieldError::new("usr", "Field required"),
            FieldError::new("pwd", "Input should be a valid string"),
        ]);
        assert_eq!(
            err.to_string(),
            "Validation error: usr: Field required, pwd: Input should be a valid string"
        );
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn taxonomy_status_codes() {
        assert_eq!(ApiError::NotFound.status_code(), 404);
        assert_eq!(ApiError::MethodNotAllowed.status_code(), 405);
        assert_eq!(ApiError::forbidden("no").status_code(), 403);
        assert_eq!(ApiError::authentication_failed("no").status_code(), 500);
        assert_eq!(ApiError::unhandled("boom").status_code(), 500);
    }
}

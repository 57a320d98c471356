//! HTTP-facing error taxonomy for the webhook endpoint.
//!
//! Only authentication problems reject the request (400/401). Everything past
//! authentication is acknowledged with 200 — the provider redelivers on
//! non-2xx, and redelivery cannot fix a malformed payload or a downstream
//! outage, so fulfillment problems are surfaced through logs instead. The 500
//! path is reserved for internal faults such as a panicked fulfillment task,
//! where redelivery is the right reaction.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Request carried no signature header although a secret is configured
    #[error("Webhook signature not found in headers")]
    MissingSignature,

    /// Signature header present but verification failed
    #[error("Webhook signature verification failed")]
    InvalidSignature,

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::MissingSignature => StatusCode::BAD_REQUEST,
            Error::InvalidSignature => StatusCode::UNAUTHORIZED,
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable label for the response body.
    pub fn label(&self) -> &'static str {
        match self {
            Error::MissingSignature => "Missing signature",
            Error::InvalidSignature => "Invalid signature",
            Error::Internal { .. } => "Internal server error",
        }
    }

    /// User-safe message, without leaking internal implementation details.
    pub fn user_message(&self) -> String {
        match self {
            Error::MissingSignature | Error::InvalidSignature => self.to_string(),
            Error::Internal { .. } => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::Internal { .. } => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::MissingSignature | Error::InvalidSignature => {
                tracing::info!("Webhook authentication error: {}", self);
            }
        }

        let body = json!({
            "error": self.label(),
            "message": self.user_message(),
        });

        (self.status_code(), axum::response::Json(body)).into_response()
    }
}

/// Type alias for handler results
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::MissingSignature.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(Error::InvalidSignature.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            Error::Internal {
                operation: "x".to_string()
            }
            .status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_errors_do_not_leak() {
        let err = Error::Internal {
            operation: "connect to smtp relay at 10.0.0.3".to_string(),
        };
        assert_eq!(err.user_message(), "Internal server error");
    }
}

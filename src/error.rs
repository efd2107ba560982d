//! # Error Handling
//!
//! Two families of errors live here:
//!
//! - **AppError**: HTTP-facing failures, converted to JSON responses through
//!   actix-web's `ResponseError` trait.
//! - **RelayError**: per-chunk, per-frame and per-recipient failures inside the
//!   relay. None of them are fatal; they are logged and counted, and the
//!   connection or broadcast that produced them carries on.
//!
//! ## Key Rust Concepts for Error Handling:
//! - **Enums for error types**: each variant is one failure category
//! - **From trait**: lets `?` convert foreign errors automatically
//! - **Display trait**: defines the human-readable message

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Errors returned from HTTP handlers.
///
/// Handlers only fail when the relay hub cannot be reached; everything the
/// relay itself rejects is a [`RelayError`] and never leaves the hub.
#[derive(Debug)]
pub enum AppError {
    /// The relay hub actor is gone or its mailbox is closed (503)
    Unavailable(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Unavailable(msg) => write!(f, "Service unavailable: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

/// Converts errors into HTTP responses with a consistent JSON body:
///
/// ```json
/// {
///   "error": {
///     "type": "unavailable",
///     "message": "...",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let (error_type, message) = match self {
            AppError::Unavailable(msg) => ("unavailable", msg.clone()),
        };

        HttpResponse::build(self.status_code()).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

impl From<actix::MailboxError> for AppError {
    fn from(err: actix::MailboxError) -> Self {
        AppError::Unavailable(err.to_string())
    }
}

/// Shorthand for `Result<T, AppError>`.
pub type AppResult<T> = Result<T, AppError>;

/// Failures inside the relay core.
///
/// All variants are local: a decode failure drops one chunk, a send failure
/// drops one recipient, a protocol failure drops one inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayError {
    /// Audio payload could not be decoded
    Decode(String),

    /// A recipient could not be reached during a broadcast
    Send(String),

    /// An inbound frame was not a valid protocol message
    Protocol(String),
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::Decode(msg) => write!(f, "Decode error: {}", msg),
            RelayError::Send(msg) => write!(f, "Send failure: {}", msg),
            RelayError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
        }
    }
}

impl std::error::Error for RelayError {}

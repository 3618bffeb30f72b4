//! Board API communication.
//!
//! - [`client`] - HTTP client with the feedback middleware (`ApiClient`)
//! - [`types`] - request/response wire types and their mapping to domain types
//!
//! # Feedback
//!
//! Every request sent through [`client::ApiClient::execute`] reports its
//! lifecycle on the [`crate::feedback::FeedbackBus`]: loading before, then a
//! cleared banner plus an optional success or error message after. The
//! outcome is always handed back to the caller unchanged.

// Rust guideline compliant 2026-02

pub mod client;
pub mod types;

pub use client::ApiClient;

use async_trait::async_trait;

use crate::notifications::NotificationRecord;

/// A failed HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// No response was received (DNS, connect, timeout, TLS).
    Network(String),
    /// The server answered with a non-success status.
    Status {
        /// HTTP status code.
        status: u16,
        /// `message` field of the JSON error body, if any.
        message: Option<String>,
        /// `error` field of the JSON error body, if any.
        error: Option<String>,
    },
    /// The response body did not have the expected shape.
    Decode(String),
}

impl RequestError {
    /// Text to show the user: server `message`, else server `error`, else `fallback`.
    pub fn user_message<'a>(&'a self, fallback: &'a str) -> &'a str {
        match self {
            Self::Status {
                message: Some(message),
                ..
            } => message,
            Self::Status {
                error: Some(error), ..
            } => error,
            _ => fallback,
        }
    }

    /// HTTP status, when the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl std::fmt::Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network(msg) => write!(f, "Request failed: {msg}"),
            Self::Status {
                status,
                message,
                error,
            } => {
                write!(f, "Server returned {status}")?;
                if let Some(detail) = message.as_deref().or(error.as_deref()) {
                    write!(f, ": {detail}")?;
                }
                Ok(())
            }
            Self::Decode(msg) => write!(f, "Unexpected response: {msg}"),
        }
    }
}

impl std::error::Error for RequestError {}

/// Server operations the notification store depends on.
///
/// Implemented by [`ApiClient`]; tests substitute fakes.
#[async_trait]
pub trait NotificationApi: Send + Sync {
    /// `GET /notifications`, mapped to records.
    async fn fetch_notifications(&self) -> Result<Vec<NotificationRecord>, RequestError>;

    /// `POST /notifications/{id}/read`.
    async fn mark_read(&self, id: &str) -> Result<(), RequestError>;

    /// `POST /notifications/read-all`.
    async fn mark_all_read(&self) -> Result<(), RequestError>;

    /// `DELETE /notifications/{id}`.
    async fn delete_notification(&self, id: &str) -> Result<(), RequestError>;
}

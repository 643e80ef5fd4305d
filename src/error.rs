//! Error types for the memory bridge
//!
//! This module provides structured error definitions using thiserror. Errors
//! that reach an HTTP handler are rendered through [`IntoResponse`]; errors
//! raised inside a tool call are folded into tool result text by the
//! dispatcher instead.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Main error type for bridge operations
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Database operation failed
    #[error("Database error: {0}")]
    Database(String),

    /// Missing or unknown API key
    #[error("{0}")]
    InvalidCredential(String),

    /// Session id not present in the registry
    #[error("Invalid session: {0}")]
    InvalidSession(String),

    /// Search backend unavailable or returned a bad response
    #[error("Search backend error: {0}")]
    Search(String),

    /// Input validation failed
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

impl From<libsql::Error> for BridgeError {
    fn from(err: libsql::Error) -> Self {
        BridgeError::Database(err.to_string())
    }
}

impl From<toml::de::Error> for BridgeError {
    fn from(err: toml::de::Error) -> Self {
        BridgeError::Config(err.to_string())
    }
}

/// Convert anyhow::Error to BridgeError
impl From<anyhow::Error> for BridgeError {
    fn from(err: anyhow::Error) -> Self {
        BridgeError::Other(err.to_string())
    }
}

impl BridgeError {
    /// HTTP status used when this error terminates an HTTP exchange
    pub fn status_code(&self) -> StatusCode {
        match self {
            BridgeError::InvalidCredential(_) => StatusCode::UNAUTHORIZED,
            BridgeError::InvalidSession(_) => StatusCode::NOT_FOUND,
            BridgeError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(serde_json::json!({ "detail": self.to_string() }));
        (status, body).into_response()
    }
}

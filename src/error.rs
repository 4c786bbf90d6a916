// src/error.rs

//! Unified error handling for the collector application.

use thiserror::Error;

/// Result type alias for collector operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Endpoint lookup or template resolution failed
    #[error("Endpoint error for '{name}': {message}")]
    Endpoint { name: String, message: String },

    /// The identifier source has no more input
    #[error("No more input")]
    InputExhausted,
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create an endpoint error with the endpoint name as context.
    pub fn endpoint(name: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Endpoint {
            name: name.into(),
            message: message.to_string(),
        }
    }
}

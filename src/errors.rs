// src/errors.rs

//! Crate-wide error type and helpers.

use std::time::Duration;

use thiserror::Error;

/// Error code the identity provider uses for a retryable outage.
pub const TEMPORARILY_UNAVAILABLE: &str = "temporarily_unavailable";

#[derive(Error, Debug)]
pub enum NiftiBatchError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Credential format error: {0}")]
    CredentialFormat(String),

    /// A task identifier or task shape the executor does not understand.
    #[error("Invalid task: {0}")]
    InvalidTask(String),

    #[error("Identity provider error '{code}': {description}")]
    IdentityProvider { code: String, description: String },

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Service returned status {status} for {url}: {message}")]
    Service {
        status: u16,
        url: String,
        message: String,
    },

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Monitoring job {job_id} timed out after {elapsed:?}")]
    MonitorTimedOut { job_id: String, elapsed: Duration },

    #[error("Monitoring job {0} was cancelled")]
    MonitorCancelled(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl NiftiBatchError {
    /// Whether the identity provider signalled a temporary outage.
    pub fn is_transient_identity_error(&self) -> bool {
        matches!(
            self,
            NiftiBatchError::IdentityProvider { code, .. } if code == TEMPORARILY_UNAVAILABLE
        )
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, NiftiBatchError>;

//! Error kinds shared by every provisioning step

use std::net::Ipv4Addr;
use thiserror::Error;

/// Result alias used across the workspace
pub type Result<T> = std::result::Result<T, ProvisionError>;

#[derive(Error, Debug)]
pub enum ProvisionError {
    /// Malformed identity, resource, or configuration value
    #[error("Validation error: {0}")]
    Validation(String),
    /// A discovery scan completed without a match
    #[error("Not found: {0}")]
    NotFound(String),
    /// A polled discovery never produced the expected address
    #[error("Unresolved: {0}")]
    Unresolved(String),
    /// Administrative access could not be established
    #[error("Authentication error: {0}")]
    Auth(String),
    /// Device stopped answering after a network or firmware change
    #[error("Device at {ip} unreachable: {message}")]
    Unreachable { ip: Ipv4Addr, message: String },
    /// The device answered with an explicit protocol-level error
    #[error("Device API error{}: {message}", code.map(|c| format!(" {}", c)).unwrap_or_default())]
    DeviceApi { code: Option<i64>, message: String },
    /// No response at all (connection refused, timeout, ...)
    #[error("Transport error: {0}")]
    Transport(String),
    /// The configuration checklist failed on every attempt. Displays as the
    /// last attempt's error, unchanged.
    #[error("{last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<ProvisionError>,
    },
    /// The persisted workflow state document is missing or unreadable
    #[error("Workflow state error: {0}")]
    State(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Fieldless classification of a [`ProvisionError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Unresolved,
    Auth,
    Unreachable,
    DeviceApi,
    Transport,
    RetriesExhausted,
    State,
    Io,
}

impl ErrorKind {
    /// Whether an orchestrator may retry after this kind of failure.
    ///
    /// Auth failures, exhausted retries and malformed input are terminal.
    pub fn is_retryable(self) -> bool {
        !matches!(
            self,
            ErrorKind::Validation | ErrorKind::Auth | ErrorKind::RetriesExhausted | ErrorKind::State
        )
    }
}

impl ProvisionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProvisionError::Validation(_) => ErrorKind::Validation,
            ProvisionError::NotFound(_) => ErrorKind::NotFound,
            ProvisionError::Unresolved(_) => ErrorKind::Unresolved,
            ProvisionError::Auth(_) => ErrorKind::Auth,
            ProvisionError::Unreachable { .. } => ErrorKind::Unreachable,
            ProvisionError::DeviceApi { .. } => ErrorKind::DeviceApi,
            ProvisionError::Transport(_) => ErrorKind::Transport,
            ProvisionError::RetriesExhausted { .. } => ErrorKind::RetriesExhausted,
            ProvisionError::State(_) => ErrorKind::State,
            ProvisionError::Io(_) | ProvisionError::Json(_) => ErrorKind::Io,
        }
    }

    /// Shorthand for a device-reported error without a numeric code
    pub fn device_api(message: impl Into<String>) -> Self {
        ProvisionError::DeviceApi {
            code: None,
            message: message.into(),
        }
    }

    /// Render the error together with its full `source()` chain
    pub fn chain(&self) -> String {
        let mut rendered = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            rendered.push_str(&format!("\ncaused by: {}", cause));
            source = cause.source();
        }
        rendered
    }
}

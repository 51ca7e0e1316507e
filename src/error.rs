//! Error types for the IoT Hub adapter
//!
//! Non-fatal errors are returned to the caller and logged once. `WatchdogExpired`
//! is the only fatal one: it is raised after the restart capability has fired.

use crate::adapter::ConnectionStatus;
use crate::config::ConfigError;
use crate::device::StorageError;
use crate::protocol::codec::NumericDecodeError;
use crate::transport::TransportError;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Main error type for adapter operations
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("Invalid credentials: {message}")]
    InvalidCredentials { message: String },

    #[error("Not connected - current status: {status}")]
    NotConnected { status: ConnectionStatus },

    #[error("Transport rejected message: {0}")]
    TransportRejected(#[source] TransportError),

    #[error("Failed to open transport session: {0}")]
    SessionOpen(#[source] TransportError),

    #[error("Malformed numeric payload: {0}")]
    MalformedNumericPayload(#[from] NumericDecodeError),

    #[error("Publish watchdog expired: no successful publish within {period_ms}ms")]
    WatchdogExpired { period_ms: u32 },

    #[error("Credential storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Adapter runtime is not running")]
    RuntimeStopped,
}

impl AdapterError {
    /// Create invalid credentials error
    pub fn invalid_credentials<S: Into<String>>(message: S) -> Self {
        Self::InvalidCredentials {
            message: message.into(),
        }
    }

    /// Integer return code reported to the device bus
    pub fn code(&self) -> i32 {
        match self {
            AdapterError::NotConnected { .. } => -1,
            AdapterError::TransportRejected(_) => -2,
            AdapterError::InvalidCredentials { .. } => -3,
            AdapterError::MalformedNumericPayload(_) => -4,
            AdapterError::WatchdogExpired { .. } => -5,
            AdapterError::SessionOpen(_) => -6,
            AdapterError::Storage(_) => -7,
            AdapterError::Config(_) => -8,
            AdapterError::RuntimeStopped => -9,
        }
    }

    /// Whether the error ends the adapter's life
    pub fn is_fatal(&self) -> bool {
        matches!(self, AdapterError::WatchdogExpired { .. })
    }
}

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(SharedAccessKey|SharedAccessSignature|password|token|secret)\s*[=:]\s*[^;&\s]+")
        .expect("secret pattern is a valid regex")
});

/// Redact secrets from text that may embed a connection string
///
/// Output is capped at 500 bytes.
pub fn sanitize_secrets(message: &str) -> String {
    let mut sanitized = SECRET_PATTERN
        .replace_all(message, "${1}=***")
        .to_string();

    if sanitized.len() > 500 {
        let truncate_suffix = "...[truncated]";
        let mut cut = 500 - truncate_suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized.truncate(cut);
        sanitized.push_str(truncate_suffix);
    }

    sanitized
}

/// Result type for adapter operations
pub type AdapterResult<T> = Result<T, AdapterError>;

use thiserror::Error;

/// Main error type for device log operations
#[derive(Debug, Error)]
pub enum LogsError {
    // Provider-related errors
    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider rejected request ({status}): {message}")]
    Provider { status: u16, message: String },

    #[error("Unexpected provider response: {0}")]
    ProtocolError(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid configuration file: {0}")]
    InvalidConfig(String),

    #[error("Missing required configuration field: {0}")]
    MissingConfigField(String),

    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // IO errors (automatically converted from std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

impl From<reqwest::Error> for LogsError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => LogsError::Provider {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None if err.is_decode() => LogsError::DeserializationError(err.to_string()),
            None => LogsError::Network(err.to_string()),
        }
    }
}

/// Result type alias for device log operations
pub type Result<T> = std::result::Result<T, LogsError>;

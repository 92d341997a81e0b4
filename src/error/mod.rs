//! Error types for authflow.

pub mod code;

pub use code::{ErrorCategory, ErrorCode};

use thiserror::Error;

/// Primary error type for every authentication operation.
///
/// `Validation` and `InvalidCredentials` are recoverable: the manager
/// re-prompts instead of ending the attempt. Everything else reaches the
/// application as a terminal failure.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid challenge response: {code}")]
    Validation { code: ErrorCode },

    #[error("Malformed token: {0}")]
    MalformedToken(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Authentication failed ({code}): {message}")]
    Failed { code: ErrorCode, message: String },

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AuthError {
    /// Terminal failure of the whole attempt.
    pub fn failed(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Failed {
            code,
            message: message.into(),
        }
    }

    pub fn validation(code: ErrorCode) -> Self {
        Self::Validation { code }
    }

    /// Machine-readable code carried to the application boundary.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Configuration(_) => ErrorCode::InvalidAuthenticationScheme,
            Self::Protocol(_) => ErrorCode::ProtocolError,
            Self::Validation { code } => *code,
            Self::MalformedToken(_) => ErrorCode::MalformedToken,
            Self::InvalidCredentials => ErrorCode::AuthenticationFailed,
            Self::Failed { code, .. } => *code,
            Self::IllegalState(_) => ErrorCode::ChallengeAlreadyPending,
            Self::Network(_) => ErrorCode::NetworkError,
            Self::Io(_) | Self::Serialization(_) => ErrorCode::InternalError,
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Protocol(_) => ErrorCategory::Protocol,
            Self::Validation { .. } => ErrorCategory::Validation,
            Self::MalformedToken(_) => ErrorCategory::Token,
            Self::InvalidCredentials | Self::Failed { .. } => ErrorCategory::Authentication,
            Self::Network(_) => ErrorCategory::Network,
            Self::Io(_) | Self::Serialization(_) => ErrorCategory::Storage,
            Self::IllegalState(_) => ErrorCategory::Internal,
        }
    }

    /// Whether the attempt may continue by prompting the user again.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::InvalidCredentials)
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for AuthError {
    fn from(error: reqwest::Error) -> Self {
        Self::Network(error.to_string())
    }
}

impl From<std::io::Error> for AuthError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<toml::de::Error> for AuthError {
    fn from(error: toml::de::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<toml::ser::Error> for AuthError {
    fn from(error: toml::ser::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, AuthError>;

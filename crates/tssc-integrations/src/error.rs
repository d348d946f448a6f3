//! Error types for integrations

use thiserror::Error;

/// Integration errors
#[derive(Debug, Error)]
pub enum IntegrationError {
    // ============ Validation Errors ============
    #[error("invalid {provider} integration: {message}")]
    Validation { provider: String, message: String },

    #[error("secret already exists: {namespace}/{name}\nHint: Use --force to recreate it")]
    SecretAlreadyExists { namespace: String, name: String },

    #[error("the {provider} integration is not ready: {message}")]
    Incomplete { provider: String, message: String },

    // ============ GitHub App Errors ============
    #[error("HTTP error: {status} - {message}")]
    HttpError { status: u16, message: String },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("GitHub App callback server failed: {message}")]
    CallbackServer { message: String },

    #[error("invalid URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    // ============ Wrapped Errors ============
    #[error(transparent)]
    Kube(#[from] tssc_kube::KubeError),

    #[error(transparent)]
    Core(#[from] tssc_core::CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for integrations
pub type Result<T> = std::result::Result<T, IntegrationError>;

impl IntegrationError {
    pub fn validation(provider: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            provider: provider.to_string(),
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for IntegrationError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            IntegrationError::HttpError {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else if e.is_connect() {
            IntegrationError::NetworkError {
                message: format!("Connection failed: {e}"),
            }
        } else {
            IntegrationError::NetworkError {
                message: e.to_string(),
            }
        }
    }
}

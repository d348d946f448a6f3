//! CLI error type
//!
//! Library errors are folded into a single diagnostic carrying a category
//! code and, when known, a remediation hint. Any error ends the process with
//! exit code 1.

use miette::Diagnostic;
use thiserror::Error;
use tssc_core::CoreError;
use tssc_engine::EngineError;
use tssc_integrations::IntegrationError;
use tssc_kube::KubeError;

#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// Invalid flags or arguments
    #[error("{message}")]
    #[diagnostic(code(tssc::cli::usage))]
    Usage {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Installer configuration or charts
    #[error("{message}")]
    #[diagnostic(code(tssc::cli::config))]
    Config {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Values template rendering
    #[error("{message}")]
    #[diagnostic(code(tssc::cli::template))]
    Template { message: String },

    /// Cluster interaction
    #[error("[{category}] {message}")]
    #[diagnostic(code(tssc::cli::cluster))]
    Cluster {
        category: &'static str,
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Integration secrets and the GitHub App flow
    #[error("{message}")]
    #[diagnostic(code(tssc::cli::integration))]
    Integration {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("IO error: {message}")]
    #[diagnostic(code(tssc::cli::io))]
    Io { message: String },

    /// Wrapped error for passthrough (stores the formatted message)
    #[error("{message}")]
    #[diagnostic(code(tssc::cli::error))]
    Other { message: String },
}

impl CliError {
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
            help: None,
        }
    }

    pub fn usage_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    pub fn config_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: Some(help.into()),
        }
    }
}

/// Messages embed hints as a trailing `Hint: ...` line, surfaced as help.
fn split_hint(message: String) -> (String, Option<String>) {
    match message.split_once("\nHint: ") {
        Some((message, hint)) => (message.trim_end().to_string(), Some(hint.trim().to_string())),
        None => (message, None),
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        let (message, help) = split_hint(err.to_string());
        CliError::Config { message, help }
    }
}

impl From<EngineError> for CliError {
    fn from(err: EngineError) -> Self {
        CliError::Template {
            message: err.to_string(),
        }
    }
}

impl From<KubeError> for CliError {
    fn from(err: KubeError) -> Self {
        match err {
            KubeError::Core(err) => err.into(),
            KubeError::Engine(err) => err.into(),
            err => {
                let category = err.category();
                let (message, help) = split_hint(err.to_string());
                CliError::Cluster {
                    category,
                    message,
                    help,
                }
            }
        }
    }
}

impl From<IntegrationError> for CliError {
    fn from(err: IntegrationError) -> Self {
        match err {
            IntegrationError::Kube(err) => err.into(),
            IntegrationError::Core(err) => err.into(),
            err => {
                let (message, help) = split_hint(err.to_string());
                CliError::Integration { message, help }
            }
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::Other {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for CliError {
    fn from(err: serde_yaml::Error) -> Self {
        CliError::Other {
            message: err.to_string(),
        }
    }
}

impl From<miette::Report> for CliError {
    fn from(err: miette::Report) -> Self {
        CliError::Other {
            message: format!("{:?}", err),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hint_becomes_help() {
        let err: CliError = KubeError::ConfigNotFound.into();
        match err {
            CliError::Cluster {
                category,
                message,
                help,
            } => {
                assert_eq!(category, "config");
                assert_eq!(message, "cluster configuration not found");
                assert_eq!(help.as_deref(), Some("Create it with `tssc config --create`"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_nested_errors_unwrap() {
        let err: CliError = IntegrationError::Kube(KubeError::Core(CoreError::ProductNotFound {
            name: "Developer Hub".into(),
        }))
        .into();
        assert!(matches!(err, CliError::Config { .. }));

        let err: CliError = IntegrationError::validation("quay", "token is required").into();
        assert!(matches!(err, CliError::Integration { help: None, .. }));
    }
}

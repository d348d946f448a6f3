//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid version: {0}")]
    InvalidVersion(#[from] semver::Error),

    #[error("Failed to read embedded files: {message}")]
    EmbeddedFiles { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid chart {path}: {message}")]
    InvalidChart { path: String, message: String },

    #[error("Empty configuration: {source_name}")]
    EmptyConfig { source_name: String },

    #[error("Failed to unmarshal configuration {source_name}: {message}")]
    UnmarshalConfig { source_name: String, message: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Invalid collection: {message}")]
    InvalidCollection { message: String },

    #[error("Chart not found: {name}")]
    ChartNotFound { name: String },

    #[error("Product not found: {name}\n\nHint: add the product to the 'products' list of the configuration")]
    ProductNotFound { name: String },

    #[error("Circular dependency detected: a {chart:?} dependency requires {chart:?}")]
    CircularDependency { chart: String },
}

impl CoreError {
    pub(crate) fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

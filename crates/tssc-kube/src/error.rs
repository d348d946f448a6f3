//! Error types for tssc-kube

use std::time::Duration;
use thiserror::Error;

/// Result type for tssc-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors that can occur during cluster operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    #[error("kubernetes client is not connected: {message}\nHint: Check the kube-config and the cluster availability")]
    ClientNotConnected { message: String },

    #[error("unable to load the kube-config: {0}")]
    Kubeconfig(String),

    #[error("resource type {api_version}/{kind} is not served by the cluster")]
    UnknownResource { api_version: String, kind: String },

    #[error("{kind} '{name}' not found")]
    NotFound { kind: String, name: String },

    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: String, name: String },

    #[error("{kind} does not support {verb}")]
    MethodNotAllowed { kind: String, verb: String },

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("compression error: {0}")]
    Compression(String),

    #[error("cluster configuration not found\nHint: Create it with `tssc config --create`")]
    ConfigNotFound,

    #[error("multiple cluster configurations found: {}", names.join(", "))]
    MultipleConfigFound { names: Vec<String> },

    #[error("cluster configuration '{name}' is incomplete: {message}")]
    IncompleteConfig { name: String, message: String },

    #[error("cluster configuration already exists in namespace '{namespace}'\nHint: Use --force to update it")]
    ConfigAlreadyExists { namespace: String },

    #[error("ingress domain not found")]
    IngressDomainNotFound,

    #[error("cluster fact not found: {0}")]
    ClusterFactNotFound(String),

    #[error("release '{name}' not found in namespace '{namespace}'")]
    ReleaseNotFound { name: String, namespace: String },

    #[error("install failed: {message}")]
    InstallFailed { chart: String, message: String },

    #[error("upgrade failed: {message}")]
    UpgradeFailed { chart: String, message: String },

    #[error("verification of release '{chart}' failed: {message}")]
    VerifyFailed { chart: String, message: String },

    #[error("hook '{hook}' of chart '{chart}' failed: {message}")]
    HookFailed {
        chart: String,
        hook: String,
        message: String,
    },

    #[error("resource is empty, it can't be monitored")]
    NilResource,

    #[error("timeout reached after {}, still waiting for: {}", humantime::format_duration(*timeout), pending.join(", "))]
    MonitorTimeout {
        timeout: Duration,
        pending: Vec<String>,
    },

    #[error("multiple installer jobs found: {}", jobs.join(", "))]
    MultipleJobs { jobs: Vec<String> },

    #[error("unknown state of installer job '{name}'")]
    UnknownJobState { name: String },

    #[error("Only a single deployment job is allowed per cluster\nHint: To inspect the existing job use: {hint}")]
    JobAlreadyExists { hint: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] tssc_core::CoreError),

    #[error(transparent)]
    Engine(#[from] tssc_engine::EngineError),
}

impl From<serde_json::Error> for KubeError {
    fn from(e: serde_json::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for KubeError {
    fn from(e: serde_yaml::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl KubeError {
    /// Check if this is a not found error (404)
    pub fn is_not_found(&self) -> bool {
        match self {
            KubeError::NotFound { .. } => true,
            KubeError::Api(kube::Error::Api(resp)) => resp.code == 404,
            _ => false,
        }
    }

    /// Check if this is a conflict error (409)
    pub fn is_conflict(&self) -> bool {
        match self {
            KubeError::AlreadyExists { .. } => true,
            KubeError::Api(kube::Error::Api(resp)) => resp.code == 409,
            _ => false,
        }
    }

    /// Short category used by the CLI diagnostics
    pub fn category(&self) -> &'static str {
        match self {
            KubeError::ConfigNotFound
            | KubeError::MultipleConfigFound { .. }
            | KubeError::IncompleteConfig { .. }
            | KubeError::ConfigAlreadyExists { .. } => "config",
            KubeError::InstallFailed { .. }
            | KubeError::UpgradeFailed { .. }
            | KubeError::VerifyFailed { .. }
            | KubeError::HookFailed { .. }
            | KubeError::ReleaseNotFound { .. } => "deploy",
            KubeError::NilResource | KubeError::MonitorTimeout { .. } => "monitor",
            KubeError::MultipleJobs { .. }
            | KubeError::UnknownJobState { .. }
            | KubeError::JobAlreadyExists { .. } => "job",
            KubeError::Core(_) => "core",
            KubeError::Engine(_) => "template",
            _ => "cluster",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helpers() {
        let not_found = KubeError::NotFound {
            kind: "Secret".into(),
            name: "x".into(),
        };
        assert!(not_found.is_not_found());
        assert!(!not_found.is_conflict());

        let exists = KubeError::AlreadyExists {
            kind: "Secret".into(),
            name: "x".into(),
        };
        assert!(exists.is_conflict());
        assert_eq!(KubeError::ConfigNotFound.category(), "config");
    }

    #[test]
    fn test_monitor_timeout_message() {
        let err = KubeError::MonitorTimeout {
            timeout: Duration::from_secs(90),
            pending: vec!["Namespace/tssc-dh".into()],
        };
        assert_eq!(
            err.to_string(),
            "timeout reached after 1m 30s, still waiting for: Namespace/tssc-dh"
        );
    }
}

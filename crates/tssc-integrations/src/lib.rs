//! Integrations for the TSSC installer
//!
//! Integrations are third party services the installed products talk to. Their
//! credentials are validated and stored as cluster secrets named
//! `tssc-<provider>-integration`, consumed later by the charts through cluster
//! lookups. The GitHub integration additionally bootstraps a GitHub App.

pub mod error;
pub mod github;
pub mod githubapp;
pub mod providers;
pub mod secret;

pub use error::{IntegrationError, Result};
pub use github::GitHubIntegration;
pub use githubapp::{AppConfig, AppManifest, GitHubApp, open_in_browser};
pub use providers::{Acs, Artifactory, Azure, Bitbucket, GitLab, Jenkins, Nexus, Quay, Tas, Trustification};
pub use secret::{Integration, SecretType, SecretWriter};

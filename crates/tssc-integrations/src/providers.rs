//! Credential based integrations
//!
//! Each provider is a set of command line flags, validated before being
//! stored as secret data under the keys consumed by the charts.

use clap::Args;
use std::collections::BTreeMap;
use tssc_core::Config;
use tssc_core::config::DEVELOPER_HUB;

use crate::error::{IntegrationError, Result};
use crate::secret::{Integration, SecretType, require, require_http_url, require_scheme, secret_data};

pub const DEFAULT_AZURE_HOST: &str = "dev.azure.com";
pub const DEFAULT_BITBUCKET_HOST: &str = "bitbucket.org";
pub const DEFAULT_GITLAB_HOST: &str = "gitlab.com";
pub const DEFAULT_QUAY_URL: &str = "https://quay.io";

fn default_if_empty(value: &mut String, default: &str) {
    if value.is_empty() {
        *value = default.to_string();
    }
}

/// Advanced Cluster Security
#[derive(Debug, Clone, Default, Args)]
pub struct Acs {
    /// ACS service endpoint, formatted as 'hostname:port'
    #[arg(long)]
    pub endpoint: String,

    /// ACS API token
    #[arg(long)]
    pub token: String,
}

impl Integration for Acs {
    fn provider(&self) -> &'static str {
        "acs"
    }

    fn validate(&mut self) -> Result<()> {
        require("acs", "endpoint", &self.endpoint)?;
        if self.endpoint.contains("://") {
            return Err(IntegrationError::validation(
                "acs",
                "invalid endpoint, the protocol should not be specified",
            ));
        }
        if !self.endpoint.contains(':') {
            return Err(IntegrationError::validation(
                "acs",
                "invalid endpoint, the port should be specified",
            ));
        }
        require("acs", "token", &self.token)
    }

    fn data(&self) -> Result<BTreeMap<String, String>> {
        Ok(secret_data([("endpoint", &self.endpoint), ("token", &self.token)]))
    }

    /// Consumed by Developer Hub, stored next to it
    fn namespace(&self, cfg: &Config) -> Result<String> {
        let namespace = cfg.get_product(DEVELOPER_HUB)?.namespace();
        if namespace.is_empty() {
            return Err(IntegrationError::Incomplete {
                provider: "acs".into(),
                message: format!("product '{DEVELOPER_HUB}' has no namespace"),
            });
        }
        Ok(namespace.to_string())
    }
}

/// JFrog Artifactory registry
#[derive(Debug, Clone, Default, Args)]
pub struct Artifactory {
    /// Artifactory dockerconfigjson, e.g. '{ "auths": { "****": { "auth": "****", "email": "" }}}'
    #[arg(long)]
    pub dockerconfigjson: String,

    /// Artifactory API token
    #[arg(long)]
    pub token: String,

    /// Artifactory URL
    #[arg(long)]
    pub url: String,
}

impl Integration for Artifactory {
    fn provider(&self) -> &'static str {
        "artifactory"
    }

    fn validate(&mut self) -> Result<()> {
        require("artifactory", "dockerconfigjson", &self.dockerconfigjson)?;
        require("artifactory", "token", &self.token)?;
        require_http_url("artifactory", "url", &self.url)
    }

    fn data(&self) -> Result<BTreeMap<String, String>> {
        Ok(secret_data([
            (".dockerconfigjson", &self.dockerconfigjson),
            ("token", &self.token),
            ("url", &self.url),
        ]))
    }

    fn secret_type(&self) -> SecretType {
        SecretType::DockerConfigJson
    }
}

/// Azure DevOps
#[derive(Debug, Clone, Default, Args)]
pub struct Azure {
    /// Azure host
    #[arg(long, default_value = DEFAULT_AZURE_HOST)]
    pub host: String,

    /// Azure personal access token
    #[arg(long)]
    pub token: String,

    /// Azure organization name
    #[arg(long)]
    pub organization: String,

    /// Azure client ID
    #[arg(long)]
    pub client_id: Option<String>,

    /// Azure client secret
    #[arg(long)]
    pub client_secret: Option<String>,

    /// Azure tenant ID
    #[arg(long)]
    pub tenant_id: Option<String>,
}

impl Integration for Azure {
    fn provider(&self) -> &'static str {
        "azure"
    }

    fn validate(&mut self) -> Result<()> {
        default_if_empty(&mut self.host, DEFAULT_AZURE_HOST);
        require("azure", "token", &self.token)?;
        let client_id = self.client_id.as_deref().unwrap_or_default();
        let client_secret = self.client_secret.as_deref().unwrap_or_default();
        let tenant_id = self.tenant_id.as_deref().unwrap_or_default();
        if client_id.is_empty() && (!client_secret.is_empty() || !tenant_id.is_empty()) {
            return Err(IntegrationError::validation(
                "azure",
                "client-id is required when client-secret or tenant-id is specified",
            ));
        }
        if client_secret.is_empty() != tenant_id.is_empty() {
            return Err(IntegrationError::validation(
                "azure",
                "client-secret and tenant-id must be specified together",
            ));
        }
        require("azure", "organization", &self.organization)
    }

    fn data(&self) -> Result<BTreeMap<String, String>> {
        Ok(secret_data([
            ("host", &self.host),
            ("token", &self.token),
            ("organization", &self.organization),
            ("clientId", self.client_id.as_deref().unwrap_or_default()),
            ("clientSecret", self.client_secret.as_deref().unwrap_or_default()),
            ("tenantId", self.tenant_id.as_deref().unwrap_or_default()),
        ]))
    }
}

/// Bitbucket
#[derive(Debug, Clone, Default, Args)]
pub struct Bitbucket {
    /// Bitbucket application password
    #[arg(long)]
    pub app_password: String,

    /// Bitbucket host
    #[arg(long, default_value = DEFAULT_BITBUCKET_HOST)]
    pub host: String,

    /// Bitbucket username
    #[arg(long)]
    pub username: String,
}

impl Integration for Bitbucket {
    fn provider(&self) -> &'static str {
        "bitbucket"
    }

    fn validate(&mut self) -> Result<()> {
        require("bitbucket", "app-password", &self.app_password)?;
        default_if_empty(&mut self.host, DEFAULT_BITBUCKET_HOST);
        require("bitbucket", "username", &self.username)
    }

    fn data(&self) -> Result<BTreeMap<String, String>> {
        Ok(secret_data([
            ("appPassword", &self.app_password),
            ("host", &self.host),
            ("username", &self.username),
        ]))
    }
}

/// GitLab
#[derive(Debug, Clone, Default, Args)]
pub struct GitLab {
    /// GitLab host
    #[arg(long, default_value = DEFAULT_GITLAB_HOST)]
    pub host: String,

    /// GitLab API token
    #[arg(long)]
    pub token: String,

    /// GitLab group name
    #[arg(long)]
    pub group: String,

    /// GitLab OAuth application ID
    #[arg(long)]
    pub client_id: Option<String>,

    /// GitLab OAuth application secret
    #[arg(long)]
    pub client_secret: Option<String>,
}

impl Integration for GitLab {
    fn provider(&self) -> &'static str {
        "gitlab"
    }

    fn validate(&mut self) -> Result<()> {
        default_if_empty(&mut self.host, DEFAULT_GITLAB_HOST);
        require("gitlab", "token", &self.token)?;
        require("gitlab", "group", &self.group)?;
        let client_id = self.client_id.as_deref().unwrap_or_default();
        let client_secret = self.client_secret.as_deref().unwrap_or_default();
        if client_id.is_empty() != client_secret.is_empty() {
            return Err(IntegrationError::validation(
                "gitlab",
                "client-id and client-secret must be specified together",
            ));
        }
        Ok(())
    }

    fn data(&self) -> Result<BTreeMap<String, String>> {
        Ok(secret_data([
            ("host", &self.host),
            ("token", &self.token),
            ("group", &self.group),
            ("clientId", self.client_id.as_deref().unwrap_or_default()),
            ("clientSecret", self.client_secret.as_deref().unwrap_or_default()),
        ]))
    }
}

/// Jenkins
#[derive(Debug, Clone, Default, Args)]
pub struct Jenkins {
    /// Jenkins API token
    #[arg(long)]
    pub token: String,

    /// Jenkins URL to the service
    #[arg(long)]
    pub url: String,

    /// Jenkins user to connect to the service
    #[arg(long)]
    pub username: String,
}

impl Integration for Jenkins {
    fn provider(&self) -> &'static str {
        "jenkins"
    }

    fn validate(&mut self) -> Result<()> {
        require("jenkins", "token", &self.token)?;
        require_http_url("jenkins", "url", &self.url)?;
        require("jenkins", "username", &self.username)
    }

    fn data(&self) -> Result<BTreeMap<String, String>> {
        Ok(secret_data([
            ("baseUrl", &self.url),
            ("token", &self.token),
            ("username", &self.username),
        ]))
    }
}

/// Sonatype Nexus registry
#[derive(Debug, Clone, Default, Args)]
pub struct Nexus {
    /// Nexus dockerconfigjson, e.g. '{ "auths": { "****": { "auth": "****", "email": "" }}}'
    #[arg(long)]
    pub dockerconfigjson: String,

    /// Nexus URL
    #[arg(long)]
    pub url: String,
}

impl Integration for Nexus {
    fn provider(&self) -> &'static str {
        "nexus"
    }

    fn validate(&mut self) -> Result<()> {
        require("nexus", "dockerconfigjson", &self.dockerconfigjson)?;
        require_http_url("nexus", "url", &self.url)
    }

    fn data(&self) -> Result<BTreeMap<String, String>> {
        Ok(secret_data([
            (".dockerconfigjson", &self.dockerconfigjson),
            ("url", &self.url),
        ]))
    }

    fn secret_type(&self) -> SecretType {
        SecretType::DockerConfigJson
    }
}

/// Quay registry
#[derive(Debug, Clone, Default, Args)]
pub struct Quay {
    /// Quay dockerconfigjson, e.g. '{ "auths": { "quay.io": { "auth": "****", "email": "" }}}'
    #[arg(long)]
    pub dockerconfigjson: String,

    /// Read-only Quay dockerconfigjson
    #[arg(long)]
    pub dockerconfigjsonreadonly: Option<String>,

    /// Quay API token
    #[arg(long)]
    pub token: String,

    /// Quay URL
    #[arg(long, default_value = DEFAULT_QUAY_URL)]
    pub url: String,
}

impl Integration for Quay {
    fn provider(&self) -> &'static str {
        "quay"
    }

    fn validate(&mut self) -> Result<()> {
        require("quay", "dockerconfigjson", &self.dockerconfigjson)?;
        require("quay", "token", &self.token)?;
        default_if_empty(&mut self.url, DEFAULT_QUAY_URL);
        require_http_url("quay", "url", &self.url)
    }

    fn data(&self) -> Result<BTreeMap<String, String>> {
        let mut data = secret_data([
            (".dockerconfigjson", &self.dockerconfigjson),
            ("token", &self.token),
            ("url", &self.url),
        ]);
        if let Some(readonly) = self.dockerconfigjsonreadonly.as_deref().filter(|s| !s.is_empty()) {
            data.insert(".dockerconfigjsonreadonly".into(), readonly.into());
        }
        Ok(data)
    }

    fn secret_type(&self) -> SecretType {
        SecretType::DockerConfigJson
    }
}

/// Trusted Artifact Signer
#[derive(Debug, Clone, Default, Args)]
pub struct Tas {
    /// TAS Rekor URL
    #[arg(long)]
    pub rekor_url: String,

    /// TAS TUF URL
    #[arg(long)]
    pub tuf_url: String,
}

impl Integration for Tas {
    fn provider(&self) -> &'static str {
        "tas"
    }

    fn validate(&mut self) -> Result<()> {
        require_scheme("tas", "rekor-url", &self.rekor_url)?;
        require_scheme("tas", "tuf-url", &self.tuf_url)
    }

    fn data(&self) -> Result<BTreeMap<String, String>> {
        Ok(secret_data([
            ("rekor_url", &self.rekor_url),
            ("tuf_url", &self.tuf_url),
        ]))
    }
}

/// Trustification
#[derive(Debug, Clone, Default, Args)]
pub struct Trustification {
    /// URL of the BOMbastic API host (e.g. https://sbom.trustification.dev)
    #[arg(long)]
    pub bombastic_api_url: String,

    /// URL of the OIDC token issuer (e.g. https://sso.trustification.dev/realms/chicken)
    #[arg(long)]
    pub oidc_issuer_url: String,

    /// OIDC client ID
    #[arg(long)]
    pub oidc_client_id: String,

    /// OIDC client secret
    #[arg(long)]
    pub oidc_client_secret: String,

    /// SBOMs using a newer CycloneDX version are converted to this one before uploading
    #[arg(long)]
    pub supported_cyclonedx_version: Option<String>,
}

impl Integration for Trustification {
    fn provider(&self) -> &'static str {
        "trustification"
    }

    fn validate(&mut self) -> Result<()> {
        require_scheme("trustification", "bombastic-api-url", &self.bombastic_api_url)?;
        require_scheme("trustification", "oidc-issuer-url", &self.oidc_issuer_url)?;
        require("trustification", "oidc-client-id", &self.oidc_client_id)?;
        require("trustification", "oidc-client-secret", &self.oidc_client_secret)
    }

    fn data(&self) -> Result<BTreeMap<String, String>> {
        Ok(secret_data([
            ("bombastic_api_url", &self.bombastic_api_url),
            ("oidc_issuer_url", &self.oidc_issuer_url),
            ("oidc_client_id", &self.oidc_client_id),
            ("oidc_client_secret", &self.oidc_client_secret),
            (
                "supported_cyclonedx_version",
                self.supported_cyclonedx_version.as_deref().unwrap_or_default(),
            ),
        ]))
    }
}

//! GitHub integration
//!
//! Creates a GitHub App for Developer Hub and Pipelines as Code, then stores
//! the application configuration together with a personal access token.

use clap::Args;
use std::collections::BTreeMap;
use tssc_core::Config;
use tssc_core::config::{DEVELOPER_HUB, OPENSHIFT_PIPELINES};
use tssc_kube::KubeClient;
use tssc_kube::openshift::ingress_domain;
use url::Url;

use crate::error::{IntegrationError, Result};
use crate::githubapp::{AppConfig, AppManifest, GitHubApp};
use crate::secret::{Integration, require, secret_data};

pub const DEFAULT_DESCRIPTION: &str = "Trusted Software Supply Chain (TSSC)";

/// Events the GitHub App subscribes to
pub const DEFAULT_EVENTS: &[&str] = &[
    "check_run",
    "check_suite",
    "commit_comment",
    "issue_comment",
    "pull_request",
    "push",
];

/// Permissions requested by the GitHub App
pub const DEFAULT_PERMISSIONS: &[(&str, &str)] = &[
    // Pipelines as Code
    ("checks", "write"),
    ("contents", "write"),
    ("issues", "write"),
    ("members", "read"),
    ("metadata", "read"),
    ("organization_plan", "read"),
    ("pull_requests", "write"),
    // Developer Hub
    ("administration", "write"),
    ("workflows", "write"),
];

/// GitHub App based integration
#[derive(Debug, Clone, Args)]
pub struct GitHubIntegration {
    #[command(flatten)]
    pub app: GitHubApp,

    /// GitHub App description
    #[arg(long, default_value = DEFAULT_DESCRIPTION)]
    pub description: String,

    /// GitHub App callback URL
    #[arg(long)]
    pub callback_url: Option<String>,

    /// GitHub App homepage URL
    #[arg(long)]
    pub homepage_url: Option<String>,

    /// GitHub App webhook URL
    #[arg(long)]
    pub webhook_url: Option<String>,

    /// GitHub personal access token
    #[arg(long)]
    pub token: String,

    /// Configuration of the created application
    #[arg(skip)]
    pub app_config: Option<AppConfig>,
}

impl GitHubIntegration {
    pub fn new(app: GitHubApp, token: impl Into<String>) -> Self {
        Self {
            app,
            description: DEFAULT_DESCRIPTION.to_string(),
            callback_url: None,
            homepage_url: None,
            webhook_url: None,
            token: token.into(),
            app_config: None,
        }
    }

    /// Fill the missing application URLs from the cluster ingress domain and
    /// the product namespaces
    pub async fn set_openshift_urls(&mut self, kube: &dyn KubeClient, cfg: &Config) -> Result<()> {
        if self.callback_url.is_some() && self.homepage_url.is_some() && self.webhook_url.is_some() {
            return Ok(());
        }
        let domain = ingress_domain(kube).await?;
        tracing::debug!(%domain, "OpenShift ingress domain");

        let developer_hub = cfg.get_product(DEVELOPER_HUB)?.namespace();
        let developer_hub_url = format!("https://backstage-developer-hub-{developer_hub}.{domain}");
        if self.callback_url.is_none() {
            self.callback_url = Some(format!("{developer_hub_url}/api/auth/github/handler/frame"));
        }
        if self.homepage_url.is_none() {
            self.homepage_url = Some(developer_hub_url);
        }
        if self.webhook_url.is_none() {
            let pipelines = cfg.get_product(OPENSHIFT_PIPELINES)?.namespace();
            self.webhook_url = Some(format!("https://pipelines-as-code-controller-{pipelines}.{domain}"));
        }
        Ok(())
    }

    /// Application manifest submitted to GitHub
    pub fn manifest(&self, name: &str) -> AppManifest {
        let webhook_url = self.webhook_url.clone().unwrap_or_default();
        AppManifest {
            name: name.to_string(),
            url: self.homepage_url.clone().unwrap_or_default(),
            description: self.description.clone(),
            hook_attributes: BTreeMap::from([("url".to_string(), webhook_url)]),
            redirect_url: None,
            callback_urls: self.callback_url.iter().cloned().collect(),
            public: true,
            default_events: DEFAULT_EVENTS.iter().map(|e| e.to_string()).collect(),
            default_permissions: DEFAULT_PERMISSIONS
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

impl Integration for GitHubIntegration {
    fn provider(&self) -> &'static str {
        "github"
    }

    fn validate(&mut self) -> Result<()> {
        require("github", "token", &self.token)?;
        self.app.validate()
    }

    fn data(&self) -> Result<BTreeMap<String, String>> {
        let config = self.app_config.as_ref().ok_or_else(|| IntegrationError::Incomplete {
            provider: "github".into(),
            message: "the GitHub App was not created".into(),
        })?;
        let html_url = Url::parse(&config.html_url).map_err(|e| IntegrationError::InvalidUrl {
            url: config.html_url.clone(),
            message: e.to_string(),
        })?;
        let host = html_url.host_str().unwrap_or_default();
        let id = config.id.to_string();
        let owner_id = config.owner.id.to_string();

        Ok(secret_data([
            ("clientId", config.client_id.as_str()),
            ("clientSecret", &config.client_secret),
            ("createdAt", &config.created_at),
            ("externalUrl", &config.external_url),
            ("htmlUrl", &config.html_url),
            ("host", host),
            ("id", &id),
            ("name", &config.name),
            ("nodeId", &config.node_id),
            ("ownerId", &owner_id),
            ("ownerLogin", &config.owner.login),
            ("pem", &config.pem),
            ("slug", &config.slug),
            ("token", &self.token),
            ("updatedAt", &config.updated_at),
            ("username", &config.owner.login),
            ("webhookSecret", config.webhook_secret.as_deref().unwrap_or_default()),
        ]))
    }
}

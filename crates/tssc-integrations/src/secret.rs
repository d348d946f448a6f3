//! Integration secret writer
//!
//! Every provider follows the same flow: validate the credentials, ensure the
//! target project exists, refuse (or with `force` delete) an existing secret,
//! then create `tssc-<provider>-integration` holding the provider fields.

use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tssc_core::Config;
use tssc_core::constants::APP_NAME;
use tssc_kube::openshift::PROJECT_GRACE_PERIOD;
use tssc_kube::{KubeClient, ensure_openshift_project, typed};
use url::Url;

use crate::error::{IntegrationError, Result};

/// Kind of secret a provider is stored as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretType {
    Opaque,
    DockerConfigJson,
}

impl SecretType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecretType::Opaque => "Opaque",
            SecretType::DockerConfigJson => "kubernetes.io/dockerconfigjson",
        }
    }
}

/// A provider whose credentials are materialized as a cluster secret
pub trait Integration: Send + Sync {
    /// Provider name, part of the secret name
    fn provider(&self) -> &'static str;

    /// Check the credentials, filling in defaults
    fn validate(&mut self) -> Result<()>;

    /// Secret payload
    fn data(&self) -> Result<BTreeMap<String, String>>;

    fn secret_type(&self) -> SecretType {
        SecretType::Opaque
    }

    /// Namespace of the secret, the installer's unless overridden
    fn namespace(&self, cfg: &Config) -> Result<String> {
        Ok(cfg.namespace().to_string())
    }

    fn secret_name(&self) -> String {
        format!("{APP_NAME}-{}-integration", self.provider())
    }
}

/// Writes integration secrets to the cluster
pub struct SecretWriter {
    kube: Arc<dyn KubeClient>,
    force: bool,
    grace_period: Duration,
}

impl SecretWriter {
    pub fn new(kube: Arc<dyn KubeClient>) -> Self {
        Self {
            kube,
            force: false,
            grace_period: PROJECT_GRACE_PERIOD,
        }
    }

    /// Recreate existing secrets instead of failing
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Pause after requesting a new project
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Validate, then store the integration secret
    pub async fn write(&self, cfg: &Config, integration: &mut dyn Integration) -> Result<Secret> {
        integration.validate()?;
        let namespace = self.prepare(cfg, integration).await?;
        self.store(&namespace, integration).await
    }

    /// Ensure the target project exists and no secret is in the way,
    /// returning the secret namespace
    pub async fn prepare(&self, cfg: &Config, integration: &dyn Integration) -> Result<String> {
        let namespace = integration.namespace(cfg)?;
        let name = integration.secret_name();
        ensure_openshift_project(self.kube.as_ref(), &namespace, self.grace_period).await?;

        tracing::debug!(%namespace, %name, "checking if integration secret exists");
        let existing: Option<Secret> = typed::get(self.kube.as_ref(), Some(&namespace), &name).await?;
        if existing.is_none() {
            tracing::debug!(%namespace, %name, "integration secret does not exist");
            return Ok(namespace);
        }
        if !self.force {
            return Err(IntegrationError::SecretAlreadyExists { namespace, name });
        }
        tracing::debug!(%namespace, %name, "integration secret already exists, recreating it");
        typed::delete::<Secret>(self.kube.as_ref(), Some(&namespace), &name).await?;
        Ok(namespace)
    }

    /// Create the integration secret
    pub async fn store(&self, namespace: &str, integration: &dyn Integration) -> Result<Secret> {
        let name = integration.secret_name();
        let data = integration
            .data()?
            .into_iter()
            .map(|(key, value)| (key, ByteString(value.into_bytes())))
            .collect();
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            type_: Some(integration.secret_type().as_str().to_string()),
            data: Some(data),
            ..Default::default()
        };

        tracing::debug!(%namespace, %name, "creating integration secret");
        let created = typed::create(self.kube.as_ref(), &secret).await?;
        tracing::info!(%namespace, %name, "integration secret created successfully");
        Ok(created)
    }
}

/// Fails when the value is empty
pub(crate) fn require(provider: &str, flag: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(IntegrationError::validation(provider, format!("{flag} is required")));
    }
    Ok(())
}

/// An absolute URL with an `http` or `https` scheme
pub(crate) fn require_http_url(provider: &str, flag: &str, value: &str) -> Result<()> {
    require(provider, flag, value)?;
    let url = Url::parse(value)
        .map_err(|e| IntegrationError::validation(provider, format!("invalid {flag}: {e}")))?;
    if !url.scheme().starts_with("http") {
        return Err(IntegrationError::validation(
            provider,
            format!("invalid {flag} scheme, expected one of 'http', 'https'"),
        ));
    }
    Ok(())
}

/// A URL carrying its protocol
pub(crate) fn require_scheme(provider: &str, flag: &str, value: &str) -> Result<()> {
    require(provider, flag, value)?;
    if !value.contains("://") {
        return Err(IntegrationError::validation(
            provider,
            format!("invalid {flag}, the protocol should be specified"),
        ));
    }
    Ok(())
}

/// Build secret data from key/value pairs
pub(crate) fn secret_data<const N: usize>(pairs: [(&str, &str); N]) -> BTreeMap<String, String> {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

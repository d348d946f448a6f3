//! OpenShift cluster facts and project bootstrap

use base64::Engine as _;
use k8s_openapi::api::core::v1::Secret;
use serde_json::{Value, json};
use std::time::Duration;
use tssc_engine::OpenShiftInfo;

use crate::client::{KubeClient, ObjectRef};
use crate::error::{KubeError, Result};
use crate::typed;

const INGRESS_OPERATOR_NAMESPACE: &str = "openshift-ingress-operator";
const INGRESS_NAMESPACE: &str = "openshift-ingress";
const ROUTER_CA_SECRET: &str = "router-ca";

/// Grace period after a project request, for the namespace to settle
pub const PROJECT_GRACE_PERIOD: Duration = Duration::from_secs(5);

fn ingress_controller_ref() -> ObjectRef {
    ObjectRef::new(
        "operator.openshift.io/v1",
        "IngressController",
        Some(INGRESS_OPERATOR_NAMESPACE),
        "default",
    )
}

async fn ingress_controller(kube: &dyn KubeClient) -> Result<Value> {
    kube.get(&ingress_controller_ref())
        .await?
        .ok_or(KubeError::IngressDomainNotFound)
}

/// Domain served by the default ingress controller
pub async fn ingress_domain(kube: &dyn KubeClient) -> Result<String> {
    let controller = ingress_controller(kube).await?;
    controller
        .pointer("/status/domain")
        .and_then(Value::as_str)
        .filter(|domain| !domain.is_empty())
        .map(String::from)
        .ok_or(KubeError::IngressDomainNotFound)
}

/// Base64 encoded certificate of the ingress router. The default certificate
/// configured on the ingress controller wins over the operator's `router-ca`.
pub async fn ingress_router_ca(kube: &dyn KubeClient) -> Result<String> {
    let controller = ingress_controller(kube).await?;
    let default_certificate = controller
        .pointer("/spec/defaultCertificate/name")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty());

    let (namespace, name) = match default_certificate {
        Some(name) => (INGRESS_NAMESPACE, name),
        None => (INGRESS_OPERATOR_NAMESPACE, ROUTER_CA_SECRET),
    };
    let secret: Secret = typed::get(kube, Some(namespace), name)
        .await?
        .ok_or_else(|| KubeError::ClusterFactNotFound(format!("secret {namespace}/{name}")))?;

    let certificate = secret
        .data
        .as_ref()
        .and_then(|data| data.get("tls.crt"))
        .ok_or_else(|| {
            KubeError::ClusterFactNotFound(format!("tls.crt key in secret {namespace}/{name}"))
        })?;
    Ok(base64::engine::general_purpose::STANDARD.encode(&certificate.0))
}

/// Desired version of the cluster
pub async fn cluster_version(kube: &dyn KubeClient) -> Result<String> {
    let reference = ObjectRef::new("config.openshift.io/v1", "ClusterVersion", None, "version");
    let version = kube
        .get(&reference)
        .await?
        .ok_or_else(|| KubeError::ClusterFactNotFound("cluster version".to_string()))?;

    version
        .pointer("/status/desired/version")
        .and_then(Value::as_str)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .ok_or_else(|| KubeError::ClusterFactNotFound("cluster desired version".to_string()))
}

/// All facts exposed to the values template as `OpenShift`
pub async fn cluster_info(kube: &dyn KubeClient) -> Result<OpenShiftInfo> {
    Ok(OpenShiftInfo {
        ingress_domain: ingress_domain(kube).await?,
        router_ca: ingress_router_ca(kube).await?,
        version: cluster_version(kube).await?,
    })
}

/// Make sure the project exists, requesting it otherwise
pub async fn ensure_openshift_project(
    kube: &dyn KubeClient,
    name: &str,
    grace_period: Duration,
) -> Result<()> {
    kube.connected().await?;

    let project = ObjectRef::new("project.openshift.io/v1", "Project", None, name);
    if kube.get(&project).await?.is_some() {
        tracing::debug!(project = name, "project already exists");
        return Ok(());
    }

    tracing::info!(project = name, "creating OpenShift project");
    let request = json!({
        "apiVersion": "project.openshift.io/v1",
        "kind": "ProjectRequest",
        "metadata": {"name": name},
        "displayName": name,
        "description": format!("TSSC: {name}"),
    });
    match kube.create(&request).await {
        Ok(_) => {}
        Err(e) if e.is_conflict() => {
            tracing::debug!(project = name, "project requested concurrently");
            return Ok(());
        }
        Err(e) => return Err(e),
    }

    tokio::time::sleep(grace_period).await;
    tracing::info!(project = name, "OpenShift project created");
    Ok(())
}

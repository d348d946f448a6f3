//! Removal of the temporary RBAC granted to chart installation jobs
//!
//! Charts label short lived permissions with `<repo-uri>/post-deploy=delete`,
//! they are removed once every chart is deployed.

use std::future::Future;
use std::time::Duration;
use tssc_core::constants::repo_key;

use crate::client::{KubeClient, ObjectRef};
use crate::error::Result;

/// Attempts of [`retry_delete_resources`]
pub const CLEANUP_ATTEMPTS: usize = 5;

/// Pause between attempts of [`retry_delete_resources`]
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(10);

/// Kinds removed, in order
const CLEANUP_KINDS: &[(&str, &str)] = &[
    ("rbac.authorization.k8s.io/v1", "ClusterRoleBinding"),
    ("rbac.authorization.k8s.io/v1", "ClusterRole"),
    ("rbac.authorization.k8s.io/v1", "RoleBinding"),
    ("rbac.authorization.k8s.io/v1", "Role"),
    ("v1", "ServiceAccount"),
];

/// `<repo-uri>/post-deploy=delete`
pub fn cleanup_selector() -> String {
    format!("{}=delete", repo_key("post-deploy"))
}

/// Delete every labeled resource. List failures are returned.
pub async fn delete_resources(kube: &dyn KubeClient) -> Result<usize> {
    let selector = cleanup_selector();
    let mut deleted = 0;
    for (api_version, kind) in CLEANUP_KINDS {
        let found = kube
            .list(api_version, kind, None, Some(&selector))
            .await?;
        for obj in &found {
            let reference = ObjectRef::from_object(obj)?;
            tracing::debug!(resource = %reference, "deleting temporary resource");
            if kube.delete(&reference).await? {
                deleted += 1;
            }
        }
    }
    Ok(deleted)
}

/// Run `operation` up to `attempts` times, sleeping `interval` in between
pub async fn retry<T, F, Fut>(attempts: usize, interval: Duration, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= attempts => return Err(e),
            Err(e) => {
                tracing::warn!(attempt, error = %e, "retrying");
                attempt += 1;
                tokio::time::sleep(interval).await;
            }
        }
    }
}

/// [`delete_resources`] retried 5 times, 10 seconds apart
pub async fn retry_delete_resources(kube: &dyn KubeClient) -> Result<usize> {
    retry(CLEANUP_ATTEMPTS, CLEANUP_INTERVAL, || delete_resources(kube)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeKubeClient;
    use serde_json::json;

    fn labeled(api_version: &str, kind: &str, namespace: Option<&str>, name: &str) -> serde_json::Value {
        let mut metadata = json!({
            "name": name,
            "labels": {"tssc.redhat-appstudio.github.com/post-deploy": "delete"}
        });
        if let Some(ns) = namespace {
            metadata["namespace"] = json!(ns);
        }
        json!({"apiVersion": api_version, "kind": kind, "metadata": metadata})
    }

    #[tokio::test]
    async fn test_delete_resources() {
        let fake = FakeKubeClient::with_objects([
            labeled("rbac.authorization.k8s.io/v1", "ClusterRoleBinding", None, "crb"),
            labeled("rbac.authorization.k8s.io/v1", "Role", Some("tssc"), "role"),
            labeled("v1", "ServiceAccount", Some("tssc-dh"), "sa"),
            json!({
                "apiVersion": "v1",
                "kind": "ServiceAccount",
                "metadata": {"name": "keep", "namespace": "tssc"}
            }),
        ]);

        assert_eq!(delete_resources(&fake).await.unwrap(), 3);
        let remaining = fake.references();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].name, "keep");
    }

    #[tokio::test]
    async fn test_list_errors_propagate() {
        let fake = FakeKubeClient::new();
        fake.fail_list("RoleBinding");
        assert!(delete_resources(&fake).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up() {
        let fake = FakeKubeClient::new();
        fake.fail_list("ClusterRoleBinding");

        let started = tokio::time::Instant::now();
        assert!(retry_delete_resources(&fake).await.is_err());
        assert_eq!(fake.operation_counts().lists, CLEANUP_ATTEMPTS);
        assert!(started.elapsed() >= CLEANUP_INTERVAL * 4);
    }
}

//! Template `lookup` backed by the cluster

use serde_json::json;
use std::sync::Arc;
use tokio::runtime::Handle;
use tssc_engine::{Lookup, LookupError};

use crate::client::{KubeClient, ObjectRef};
use crate::error::Result;

/// Reads objects through a [`KubeClient`] on behalf of templates.
///
/// Template rendering is synchronous, calls block the current worker of a
/// multi-threaded runtime while the request runs.
#[derive(Clone)]
pub struct ClusterLookup {
    kube: Arc<dyn KubeClient>,
    handle: Handle,
}

impl ClusterLookup {
    /// Must be created from within the runtime
    pub fn new(kube: Arc<dyn KubeClient>) -> Self {
        Self {
            kube,
            handle: Handle::current(),
        }
    }

    async fn fetch(
        &self,
        api_version: &str,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> Result<Option<serde_json::Value>> {
        let namespaced = self.kube.is_namespaced(api_version, kind).await?;
        let namespace = Some(namespace).filter(|ns| namespaced && !ns.is_empty());

        if !name.is_empty() {
            let reference = ObjectRef::new(api_version, kind, namespace, name);
            return self.kube.get(&reference).await;
        }

        let items = self.kube.list(api_version, kind, namespace, None).await?;
        Ok(Some(json!({
            "apiVersion": api_version,
            "kind": format!("{kind}List"),
            "items": items,
        })))
    }
}

impl Lookup for ClusterLookup {
    fn lookup(
        &self,
        api_version: &str,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> std::result::Result<Option<serde_json::Value>, LookupError> {
        tracing::debug!(api_version, kind, namespace, name, "template lookup");
        let result = tokio::task::block_in_place(|| {
            self.handle
                .block_on(self.fetch(api_version, kind, namespace, name))
        });
        match result {
            Ok(found) => Ok(found),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(LookupError::new(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeKubeClient;
    use tssc_engine::{Engine, Variables};

    fn fake() -> FakeKubeClient {
        FakeKubeClient::with_objects([
            json!({
                "apiVersion": "v1",
                "kind": "Secret",
                "metadata": {"name": "tssc-quay-integration", "namespace": "tssc"},
                "data": {"url": "aHR0cHM6Ly9xdWF5Lmlv"}
            }),
            json!({
                "apiVersion": "v1",
                "kind": "Namespace",
                "metadata": {"name": "tssc"}
            }),
        ])
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_lookup_object_and_list() {
        let lookup = ClusterLookup::new(Arc::new(fake()));

        let secret = lookup
            .lookup("v1", "Secret", "tssc", "tssc-quay-integration")
            .unwrap()
            .unwrap();
        assert_eq!(secret["data"]["url"], "aHR0cHM6Ly9xdWF5Lmlv");

        assert!(lookup.lookup("v1", "Secret", "tssc", "missing").unwrap().is_none());

        // Namespace is ignored for cluster scoped kinds
        let namespaces = lookup.lookup("v1", "Namespace", "ignored", "").unwrap().unwrap();
        assert_eq!(namespaces["kind"], "NamespaceList");
        assert_eq!(namespaces["items"].as_array().unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_lookup_errors() {
        let lookup = ClusterLookup::new(Arc::new(fake()));
        assert!(lookup.lookup("example.com/v1", "Widget", "tssc", "x").is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_engine_with_cluster_lookup() {
        let engine = Engine::new(Arc::new(ClusterLookup::new(Arc::new(fake()))));
        let out = engine
            .render(
                r#"{{ lookup("v1", "Secret", "tssc", "absent") | toJson }}"#,
                &Variables::new(),
            )
            .unwrap();
        assert_eq!(out, "{}");
    }
}

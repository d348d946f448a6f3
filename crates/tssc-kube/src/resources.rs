//! Rendered manifests turned into ordered cluster objects
//!
//! A chart manifest is a multi-document YAML stream. Documents are parsed
//! into JSON objects, placed in the release namespace when their kind is
//! namespaced, and applied in dependency order: namespaces and RBAC before
//! configuration, configuration before workloads, custom resources last.

use serde_json::Value;

use crate::client::{KubeClient, ObjectRef};
use crate::error::{KubeError, Result};

/// Annotation marking a template as a chart test
pub const HOOK_ANNOTATION: &str = "helm.sh/hook";

/// Resource category for ordering during installation
///
/// Resources are applied from lowest to highest value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceCategory {
    Crd = 0,
    Namespace = 1,
    /// ResourceQuota, LimitRange
    NamespaceConfig = 2,
    /// ClusterRole, ClusterRoleBinding
    ClusterRbac = 10,
    /// Role, RoleBinding, ServiceAccount
    NamespacedRbac = 11,
    /// ConfigMap, Secret
    Config = 20,
    Storage = 21,
    Network = 30,
    Workload = 40,
    /// Job, CronJob
    Batch = 50,
    Autoscaling = 60,
    /// Operators, routes, projects and anything served by a non core group
    CustomResource = 70,
    Other = 100,
}

const CORE_GROUPS: &[&str] = &[
    "",
    "apps",
    "batch",
    "autoscaling",
    "policy",
    "networking.k8s.io",
    "rbac.authorization.k8s.io",
    "storage.k8s.io",
    "admissionregistration.k8s.io",
    "apiextensions.k8s.io",
    "certificates.k8s.io",
    "coordination.k8s.io",
    "discovery.k8s.io",
    "events.k8s.io",
    "scheduling.k8s.io",
];

impl ResourceCategory {
    pub fn from_resource(kind: &str, api_version: &str) -> Self {
        match kind {
            "CustomResourceDefinition" => Self::Crd,
            "Namespace" => Self::Namespace,
            "ResourceQuota" | "LimitRange" => Self::NamespaceConfig,
            "ClusterRole" | "ClusterRoleBinding" => Self::ClusterRbac,
            "Role" | "RoleBinding" | "ServiceAccount" => Self::NamespacedRbac,
            "ConfigMap" | "Secret" => Self::Config,
            "PersistentVolume" | "PersistentVolumeClaim" | "StorageClass" => Self::Storage,
            "NetworkPolicy" | "Service" | "Endpoints" | "Ingress" | "IngressClass" => Self::Network,
            "Deployment" | "StatefulSet" | "DaemonSet" | "ReplicaSet" | "Pod" => Self::Workload,
            "Job" | "CronJob" => Self::Batch,
            "HorizontalPodAutoscaler" | "PodDisruptionBudget" => Self::Autoscaling,
            _ if Self::is_custom_api_version(api_version) => Self::CustomResource,
            _ => Self::Other,
        }
    }

    /// Whether the group of `api_version` is outside the Kubernetes core groups
    pub fn is_custom_api_version(api_version: &str) -> bool {
        let group = match api_version.split_once('/') {
            Some((group, _)) => group,
            None => "",
        };
        !CORE_GROUPS.contains(&group)
    }
}

/// A single manifest document ready to be sent to the cluster
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub reference: ObjectRef,
    pub object: Value,
}

impl Resource {
    pub fn category(&self) -> ResourceCategory {
        ResourceCategory::from_resource(&self.reference.kind, &self.reference.api_version)
    }

    /// Chart test, applied by verification only
    pub fn is_test(&self) -> bool {
        self.object
            .pointer("/metadata/annotations")
            .and_then(|annotations| annotations.get(HOOK_ANNOTATION))
            .and_then(Value::as_str)
            .is_some_and(|hooks| hooks.split(',').any(|hook| hook.trim().starts_with("test")))
    }

    /// Set the namespace of the document and its reference
    fn set_namespace(&mut self, namespace: Option<&str>) {
        self.reference.namespace = namespace.map(String::from);
        if let Some(metadata) = self.object.get_mut("metadata").and_then(Value::as_object_mut) {
            match namespace {
                Some(ns) => {
                    metadata.insert("namespace".to_string(), Value::from(ns));
                }
                None => {
                    metadata.remove("namespace");
                }
            }
        }
    }
}

/// Split a multi-document manifest into objects, skipping empty and comment
/// only documents
pub fn parse_manifest(manifest: &str) -> Result<Vec<Resource>> {
    let mut resources = Vec::new();

    for (index, doc) in split_documents(manifest).enumerate() {
        let doc = doc.trim();
        if doc.is_empty()
            || doc
                .lines()
                .all(|l| l.trim().is_empty() || l.trim().starts_with('#'))
        {
            continue;
        }

        let object: Value = serde_yaml::from_str(doc).map_err(|e| {
            KubeError::InvalidManifest(format!("failed to parse document {index}: {e}"))
        })?;
        if object.is_null() {
            continue;
        }
        let reference = ObjectRef::from_object(&object).map_err(|e| {
            KubeError::InvalidManifest(format!("document {index}: {e}"))
        })?;
        resources.push(Resource { reference, object });
    }

    Ok(resources)
}

/// Documents separated by `---` lines
fn split_documents(manifest: &str) -> impl Iterator<Item = String> + '_ {
    let mut documents = vec![String::new()];
    for line in manifest.lines() {
        if line.trim_end() == "---" || line.starts_with("--- ") {
            documents.push(String::new());
            continue;
        }
        if let Some(current) = documents.last_mut() {
            current.push_str(line);
            current.push('\n');
        }
    }
    documents.into_iter()
}

/// Place namespaced objects without a namespace in `default_namespace`, and
/// drop the namespace of cluster scoped ones
pub async fn scope_resources(
    kube: &dyn KubeClient,
    resources: &mut [Resource],
    default_namespace: &str,
) -> Result<()> {
    for resource in resources.iter_mut() {
        let namespaced = kube
            .is_namespaced(&resource.reference.api_version, &resource.reference.kind)
            .await?;
        let namespace = if namespaced {
            Some(
                resource
                    .reference
                    .namespace
                    .clone()
                    .unwrap_or_else(|| default_namespace.to_string()),
            )
        } else {
            None
        };
        resource.set_namespace(namespace.as_deref());
    }
    Ok(())
}

/// Stable sort by category, documents of the same category keep their order
pub fn sort_for_apply(resources: &mut [Resource]) {
    resources.sort_by_key(Resource::category);
}

/// Separate chart tests from the objects to install
pub fn partition_tests(resources: Vec<Resource>) -> (Vec<Resource>, Vec<Resource>) {
    resources.into_iter().partition(|r| !r.is_test())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeKubeClient;

    const MANIFEST: &str = r#"---
# Source: tssc-dh/templates/deployment.yaml
apiVersion: apps/v1
kind: Deployment
metadata:
  name: backstage
---
# Source: tssc-dh/templates/empty.yaml
# nothing rendered
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: app-config
  namespace: tssc-dh
data:
  key: "---"
---
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRole
metadata:
  name: tssc-dh
  namespace: ignored
---
apiVersion: project.openshift.io/v1
kind: ProjectRequest
metadata:
  name: tssc-app
---
apiVersion: v1
kind: Pod
metadata:
  name: test-connection
  annotations:
    helm.sh/hook: test
"#;

    #[test]
    fn test_parse_manifest() {
        let resources = parse_manifest(MANIFEST).unwrap();
        let kinds: Vec<&str> = resources.iter().map(|r| r.reference.kind.as_str()).collect();
        assert_eq!(
            kinds,
            vec!["Deployment", "ConfigMap", "ClusterRole", "ProjectRequest", "Pod"]
        );
        assert_eq!(resources[1].object["data"]["key"], "---");
    }

    #[test]
    fn test_parse_manifest_errors() {
        let err = parse_manifest("kind: ConfigMap\nmetadata:\n  name: x\n").unwrap_err();
        assert!(err.to_string().contains("apiVersion"));

        let err = parse_manifest("a: [unclosed").unwrap_err();
        assert!(matches!(err, KubeError::InvalidManifest(_)));
    }

    #[test]
    fn test_sort_and_partition() {
        let (mut install, tests) = partition_tests(parse_manifest(MANIFEST).unwrap());
        assert_eq!(tests.len(), 1);
        assert_eq!(tests[0].reference.name, "test-connection");

        sort_for_apply(&mut install);
        let kinds: Vec<&str> = install.iter().map(|r| r.reference.kind.as_str()).collect();
        assert_eq!(
            kinds,
            vec!["ClusterRole", "ConfigMap", "Deployment", "ProjectRequest"]
        );
    }

    #[tokio::test]
    async fn test_scope_resources() {
        let fake = FakeKubeClient::new();
        let mut resources = parse_manifest(MANIFEST).unwrap();
        scope_resources(&fake, &mut resources, "tssc").await.unwrap();

        assert_eq!(resources[0].reference.namespace.as_deref(), Some("tssc"));
        assert_eq!(resources[0].object["metadata"]["namespace"], "tssc");
        assert_eq!(resources[1].reference.namespace.as_deref(), Some("tssc-dh"));
        assert_eq!(resources[2].reference.namespace, None);
        assert!(resources[2].object["metadata"].get("namespace").is_none());
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            ResourceCategory::from_resource("Subscription", "operators.coreos.com/v1alpha1"),
            ResourceCategory::CustomResource
        );
        assert_eq!(
            ResourceCategory::from_resource("Lease", "coordination.k8s.io/v1"),
            ResourceCategory::Other
        );
        assert!(ResourceCategory::Namespace < ResourceCategory::ClusterRbac);
        assert!(ResourceCategory::Config < ResourceCategory::Workload);
    }
}

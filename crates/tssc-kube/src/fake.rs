//! In-memory cluster for testing
//!
//! Stores object documents keyed by type and name, resolves scopes through a
//! small discovery registry and counts operations for assertions. Creating a
//! `ProjectRequest` materializes the matching `Project` and `Namespace`, the
//! same way OpenShift does. Like on OpenShift, project requests can only be
//! created, never applied.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use crate::client::{KubeClient, ObjectRef, matches_labels, object_labels};
use crate::error::{KubeError, Result};

type Store = BTreeMap<ObjectRef, Value>;

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone)]
pub struct OperationCounts {
    pub gets: usize,
    pub lists: usize,
    pub creates: usize,
    pub replaces: usize,
    pub applies: usize,
    pub deletes: usize,
}

/// In-memory [`KubeClient`]
#[derive(Clone)]
pub struct FakeKubeClient {
    store: Arc<RwLock<Store>>,
    /// (apiVersion, kind) -> namespaced
    discovery: Arc<RwLock<HashMap<(String, String), bool>>>,
    operations: Arc<RwLock<OperationCounts>>,
    connected: Arc<RwLock<bool>>,
    failing_lists: Arc<RwLock<BTreeSet<String>>>,
    /// (apiVersion, kind) served without the `patch` verb
    create_only: Arc<RwLock<BTreeSet<(String, String)>>>,
    version: String,
}

const DEFAULT_KINDS: &[(&str, &str, bool)] = &[
    ("v1", "Namespace", false),
    ("v1", "ConfigMap", true),
    ("v1", "Secret", true),
    ("v1", "ServiceAccount", true),
    ("v1", "Pod", true),
    ("v1", "Service", true),
    ("apps/v1", "Deployment", true),
    ("batch/v1", "Job", true),
    ("rbac.authorization.k8s.io/v1", "ClusterRole", false),
    ("rbac.authorization.k8s.io/v1", "ClusterRoleBinding", false),
    ("rbac.authorization.k8s.io/v1", "Role", true),
    ("rbac.authorization.k8s.io/v1", "RoleBinding", true),
    ("project.openshift.io/v1", "Project", false),
    ("project.openshift.io/v1", "ProjectRequest", false),
    ("operator.openshift.io/v1", "IngressController", true),
    ("config.openshift.io/v1", "ClusterVersion", false),
    ("operators.coreos.com/v1alpha1", "Subscription", true),
];

impl Default for FakeKubeClient {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeKubeClient {
    pub fn new() -> Self {
        let discovery = DEFAULT_KINDS
            .iter()
            .map(|(api_version, kind, namespaced)| {
                ((api_version.to_string(), kind.to_string()), *namespaced)
            })
            .collect();
        Self {
            store: Arc::new(RwLock::new(BTreeMap::new())),
            discovery: Arc::new(RwLock::new(discovery)),
            operations: Arc::new(RwLock::new(OperationCounts::default())),
            connected: Arc::new(RwLock::new(true)),
            failing_lists: Arc::new(RwLock::new(BTreeSet::new())),
            create_only: Arc::new(RwLock::new(BTreeSet::from([(
                "project.openshift.io/v1".to_string(),
                "ProjectRequest".to_string(),
            )]))),
            version: "v1.31.0".to_string(),
        }
    }

    /// Pre-populate with objects
    pub fn with_objects(objects: impl IntoIterator<Item = Value>) -> Self {
        let fake = Self::new();
        for obj in objects {
            fake.insert(obj);
        }
        fake
    }

    /// Serve an additional kind
    pub fn register(&self, api_version: &str, kind: &str, namespaced: bool) {
        self.discovery
            .write()
            .unwrap()
            .insert((api_version.to_string(), kind.to_string()), namespaced);
    }

    /// Store an object as is, bypassing counters
    pub fn insert(&self, obj: Value) {
        if let Ok((reference, obj)) = self.normalize(&obj) {
            self.store.write().unwrap().insert(reference, obj);
        }
    }

    /// Read an object, bypassing counters
    pub fn object(&self, reference: &ObjectRef) -> Option<Value> {
        self.store.read().unwrap().get(reference).cloned()
    }

    /// All stored references
    pub fn references(&self) -> Vec<ObjectRef> {
        self.store.read().unwrap().keys().cloned().collect()
    }

    /// Simulate an unreachable API server
    pub fn set_connected(&self, connected: bool) {
        *self.connected.write().unwrap() = connected;
    }

    /// Make every list of `kind` fail
    pub fn fail_list(&self, kind: &str) {
        self.failing_lists.write().unwrap().insert(kind.to_string());
    }

    pub fn operation_counts(&self) -> OperationCounts {
        self.operations.read().unwrap().clone()
    }

    pub fn reset_counts(&self) {
        *self.operations.write().unwrap() = OperationCounts::default();
    }

    fn count(&self, f: impl FnOnce(&mut OperationCounts)) {
        f(&mut self.operations.write().unwrap());
    }

    fn check_connected(&self) -> Result<()> {
        if *self.connected.read().unwrap() {
            Ok(())
        } else {
            Err(KubeError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )))
        }
    }

    fn scope(&self, api_version: &str, kind: &str) -> Result<bool> {
        self.discovery
            .read()
            .unwrap()
            .get(&(api_version.to_string(), kind.to_string()))
            .copied()
            .ok_or_else(|| KubeError::UnknownResource {
                api_version: api_version.to_string(),
                kind: kind.to_string(),
            })
    }

    /// Reference normalized to the scope of its kind
    fn scoped(&self, reference: &ObjectRef) -> Result<ObjectRef> {
        let namespaced = self.scope(&reference.api_version, &reference.kind)?;
        let mut scoped = reference.clone();
        if !namespaced {
            scoped.namespace = None;
        } else if scoped.namespace.is_none() {
            scoped.namespace = Some("default".to_string());
        }
        Ok(scoped)
    }

    fn normalize(&self, obj: &Value) -> Result<(ObjectRef, Value)> {
        let reference = self.scoped(&ObjectRef::from_object(obj)?)?;
        let mut obj = obj.clone();
        if let Some(metadata) = obj.get_mut("metadata").and_then(Value::as_object_mut) {
            match &reference.namespace {
                Some(ns) => {
                    metadata.insert("namespace".to_string(), Value::from(ns.as_str()));
                }
                None => {
                    metadata.remove("namespace");
                }
            }
        }
        Ok((reference, obj))
    }

    /// OpenShift turns a project request into a project and its namespace
    fn materialize_project(&self, store: &mut Store, name: &str) {
        let namespace = json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": {"name": name},
            "status": {"phase": "Active"}
        });
        let project = json!({
            "apiVersion": "project.openshift.io/v1",
            "kind": "Project",
            "metadata": {"name": name},
            "status": {"phase": "Active"}
        });
        for obj in [namespace, project] {
            if let Ok(reference) = ObjectRef::from_object(&obj) {
                store.entry(reference).or_insert(obj);
            }
        }
    }
}

#[async_trait]
impl KubeClient for FakeKubeClient {
    async fn server_version(&self) -> Result<String> {
        self.check_connected()?;
        Ok(self.version.clone())
    }

    async fn is_namespaced(&self, api_version: &str, kind: &str) -> Result<bool> {
        self.scope(api_version, kind)
    }

    async fn supports_apply(&self, api_version: &str, kind: &str) -> Result<bool> {
        self.scope(api_version, kind)?;
        Ok(!self
            .create_only
            .read()
            .unwrap()
            .contains(&(api_version.to_string(), kind.to_string())))
    }

    async fn get(&self, object: &ObjectRef) -> Result<Option<Value>> {
        self.check_connected()?;
        self.count(|ops| ops.gets += 1);
        let reference = self.scoped(object)?;
        Ok(self.store.read().unwrap().get(&reference).cloned())
    }

    async fn list(
        &self,
        api_version: &str,
        kind: &str,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<Value>> {
        self.check_connected()?;
        self.count(|ops| ops.lists += 1);
        if self.failing_lists.read().unwrap().contains(kind) {
            return Err(KubeError::Io(std::io::Error::other(format!(
                "listing {kind} is forbidden"
            ))));
        }
        let namespaced = self.scope(api_version, kind)?;
        let namespace = namespace.filter(|ns| namespaced && !ns.is_empty());

        let store = self.store.read().unwrap();
        Ok(store
            .iter()
            .filter(|(reference, _)| reference.api_version == api_version && reference.kind == kind)
            .filter(|(reference, _)| {
                namespace.is_none_or(|ns| reference.namespace.as_deref() == Some(ns))
            })
            .filter(|(_, obj)| {
                label_selector.is_none_or(|selector| matches_labels(&object_labels(obj), selector))
            })
            .map(|(_, obj)| obj.clone())
            .collect())
    }

    async fn create(&self, obj: &Value) -> Result<Value> {
        self.check_connected()?;
        self.count(|ops| ops.creates += 1);
        let (reference, obj) = self.normalize(obj)?;

        let mut store = self.store.write().unwrap();
        if store.contains_key(&reference) {
            return Err(KubeError::AlreadyExists {
                kind: reference.kind,
                name: reference.name,
            });
        }
        if reference.api_version == "project.openshift.io/v1" && reference.kind == "ProjectRequest" {
            self.materialize_project(&mut store, &reference.name);
        }
        store.insert(reference, obj.clone());
        Ok(obj)
    }

    async fn replace(&self, obj: &Value) -> Result<Value> {
        self.check_connected()?;
        self.count(|ops| ops.replaces += 1);
        let (reference, obj) = self.normalize(obj)?;

        let mut store = self.store.write().unwrap();
        if !store.contains_key(&reference) {
            return Err(KubeError::NotFound {
                kind: reference.kind,
                name: reference.name,
            });
        }
        store.insert(reference, obj.clone());
        Ok(obj)
    }

    async fn apply(&self, obj: &Value, dry_run: bool) -> Result<Value> {
        self.check_connected()?;
        self.count(|ops| ops.applies += 1);
        let (reference, obj) = self.normalize(obj)?;
        if !self.supports_apply(&reference.api_version, &reference.kind).await? {
            return Err(KubeError::MethodNotAllowed {
                kind: reference.kind,
                verb: "apply".into(),
            });
        }
        if dry_run {
            return Ok(obj);
        }

        self.store.write().unwrap().insert(reference, obj.clone());
        Ok(obj)
    }

    async fn delete(&self, object: &ObjectRef) -> Result<bool> {
        self.check_connected()?;
        self.count(|ops| ops.deletes += 1);
        let reference = self.scoped(object)?;
        Ok(self.store.write().unwrap().remove(&reference).is_some())
    }
}

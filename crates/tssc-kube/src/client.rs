//! Cluster access interface
//!
//! Every cluster interaction of the installer goes through [`KubeClient`].
//! Objects travel as plain JSON documents carrying `apiVersion`, `kind` and
//! `metadata`, the scope of a kind is resolved through discovery. Typed
//! access on top of it lives in [`crate::typed`].

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{KubeError, Result};

/// Field manager used for server-side apply
pub const FIELD_MANAGER: &str = "tssc";

/// Reference to a single object
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectRef {
    pub api_version: String,
    pub kind: String,
    /// Namespace, `None` for cluster scoped objects
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectRef {
    pub fn new(api_version: &str, kind: &str, namespace: Option<&str>, name: &str) -> Self {
        Self {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            namespace: namespace.filter(|ns| !ns.is_empty()).map(String::from),
            name: name.to_string(),
        }
    }

    /// Read the reference out of an object document
    pub fn from_object(obj: &Value) -> Result<Self> {
        let field = |path: &[&str]| -> Option<&str> {
            let mut current = obj;
            for key in path {
                current = current.get(key)?;
            }
            current.as_str()
        };

        let api_version = field(&["apiVersion"])
            .ok_or_else(|| KubeError::InvalidManifest("resource missing apiVersion".into()))?;
        let kind = field(&["kind"])
            .ok_or_else(|| KubeError::InvalidManifest("resource missing kind".into()))?;
        let name = field(&["metadata", "name"]).ok_or_else(|| {
            KubeError::InvalidManifest(format!("{kind} is missing metadata.name"))
        })?;

        Ok(Self::new(
            api_version,
            kind,
            field(&["metadata", "namespace"]),
            name,
        ))
    }

    /// API group, empty for the core group
    pub fn group(&self) -> &str {
        match self.api_version.split_once('/') {
            Some((group, _)) => group,
            None => "",
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", ns, self.kind, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

/// Thin capability interface over the cluster API
#[async_trait]
pub trait KubeClient: Send + Sync {
    /// Version reported by the API server
    async fn server_version(&self) -> Result<String>;

    /// Whether the kind is namespaced, `UnknownResource` when not served
    async fn is_namespaced(&self, api_version: &str, kind: &str) -> Result<bool>;

    /// Whether the kind accepts server-side apply. Some kinds, e.g.
    /// `ProjectRequest`, can only be created.
    async fn supports_apply(&self, api_version: &str, kind: &str) -> Result<bool>;

    /// Fetch an object, `None` when it doesn't exist
    async fn get(&self, object: &ObjectRef) -> Result<Option<Value>>;

    /// List objects of a kind, across all namespaces when `namespace` is `None`
    async fn list(
        &self,
        api_version: &str,
        kind: &str,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<Value>>;

    /// Create an object, `AlreadyExists` on conflict
    async fn create(&self, obj: &Value) -> Result<Value>;

    /// Replace an existing object
    async fn replace(&self, obj: &Value) -> Result<Value>;

    /// Server-side apply
    async fn apply(&self, obj: &Value, dry_run: bool) -> Result<Value>;

    /// Delete an object, `false` when it was already gone
    async fn delete(&self, object: &ObjectRef) -> Result<bool>;

    /// Issue a server version call, failures mean the cluster is unreachable
    async fn connected(&self) -> Result<()> {
        self.server_version()
            .await
            .map(|version| tracing::debug!(%version, "kubernetes client connected"))
            .map_err(|e| KubeError::ClientNotConnected {
                message: e.to_string(),
            })
    }
}

/// Parse a `key=value,key` label selector. Only equality and existence
/// requirements are supported.
pub fn parse_label_selector(selector: &str) -> Vec<(String, Option<String>)> {
    selector
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|requirement| match requirement.split_once('=') {
            Some((key, value)) => (
                key.trim_end_matches('=').trim().to_string(),
                Some(value.trim_start_matches('=').trim().to_string()),
            ),
            None => (requirement.to_string(), None),
        })
        .collect()
}

/// Whether the labels satisfy the selector
pub fn matches_labels(labels: &BTreeMap<String, String>, selector: &str) -> bool {
    parse_label_selector(selector)
        .iter()
        .all(|(key, value)| match (labels.get(key), value) {
            (Some(actual), Some(expected)) => actual == expected,
            (Some(_), None) => true,
            (None, _) => false,
        })
}

/// Labels of an object document
pub fn object_labels(obj: &Value) -> BTreeMap<String, String> {
    obj.pointer("/metadata/labels")
        .and_then(Value::as_object)
        .map(|labels| {
            labels
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

//! Live cluster reads from templates
//!
//! The engine never sees a Kubernetes client. It calls a [`Lookup`], which the
//! cluster layer implements on top of its dynamic client and tests replace with
//! in-memory fixtures.

use std::collections::BTreeMap;
use thiserror::Error;

/// Failure other than "not found" while reading from the cluster
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct LookupError {
    message: String,
}

impl LookupError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Synchronous resource reader used by the `lookup` template helper.
///
/// With a `name`, returns the object. With an empty `name`, returns the list
/// of objects as `{"items": [...]}`. `Ok(None)` means not found. `namespace`
/// is only meaningful for namespaced kinds.
pub trait Lookup: Send + Sync {
    fn lookup(
        &self,
        api_version: &str,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> Result<Option<serde_json::Value>, LookupError>;
}

/// Never finds anything. Used when rendering without a cluster.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLookup;

impl Lookup for NoopLookup {
    fn lookup(&self, _: &str, _: &str, _: &str, _: &str) -> Result<Option<serde_json::Value>, LookupError> {
        Ok(None)
    }
}

/// In-memory fixtures keyed by apiVersion, kind, namespace and name
#[derive(Debug, Default, Clone)]
pub struct StaticLookup {
    objects: BTreeMap<(String, String, String, String), serde_json::Value>,
}

impl StaticLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an object, keyed by its own apiVersion, kind and metadata
    pub fn with_object(mut self, object: serde_json::Value) -> Self {
        let field = |pointer: &str| {
            object
                .pointer(pointer)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        let key = (
            field("/apiVersion"),
            field("/kind"),
            field("/metadata/namespace"),
            field("/metadata/name"),
        );
        self.objects.insert(key, object);
        self
    }
}

impl Lookup for StaticLookup {
    fn lookup(
        &self,
        api_version: &str,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> Result<Option<serde_json::Value>, LookupError> {
        if !name.is_empty() {
            let key = (
                api_version.to_string(),
                kind.to_string(),
                namespace.to_string(),
                name.to_string(),
            );
            return Ok(self.objects.get(&key).cloned());
        }

        let items: Vec<_> = self
            .objects
            .iter()
            .filter(|((a, k, ns, _), _)| {
                a == api_version && k == kind && (namespace.is_empty() || ns == namespace)
            })
            .map(|(_, object)| object.clone())
            .collect();
        if items.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::json!({
            "apiVersion": api_version,
            "kind": format!("{kind}List"),
            "items": items,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fixtures() -> StaticLookup {
        StaticLookup::new()
            .with_object(json!({
                "apiVersion": "v1",
                "kind": "Secret",
                "metadata": {"namespace": "tssc", "name": "tssc-github-integration"},
                "data": {"token": "dG9rZW4="}
            }))
            .with_object(json!({
                "apiVersion": "v1",
                "kind": "Secret",
                "metadata": {"namespace": "tssc", "name": "tssc-quay-integration"}
            }))
    }

    #[test]
    fn test_get_by_name() {
        let lookup = fixtures();
        let found = lookup
            .lookup("v1", "Secret", "tssc", "tssc-github-integration")
            .unwrap()
            .unwrap();
        assert_eq!(found["data"]["token"], "dG9rZW4=");
        assert!(lookup.lookup("v1", "Secret", "tssc", "missing").unwrap().is_none());
    }

    #[test]
    fn test_list() {
        let lookup = fixtures();
        let list = lookup.lookup("v1", "Secret", "tssc", "").unwrap().unwrap();
        assert_eq!(list["kind"], "SecretList");
        assert_eq!(list["items"].as_array().unwrap().len(), 2);
        assert!(lookup.lookup("v1", "ConfigMap", "tssc", "").unwrap().is_none());
        assert!(NoopLookup.lookup("v1", "Secret", "tssc", "").unwrap().is_none());
    }
}

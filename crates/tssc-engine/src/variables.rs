//! Variables available to the values template
//!
//! ```jinja
//! namespace: {{ Installer.Namespace }}
//! domain: {{ OpenShift.Ingress.Domain }}
//! {%- if Installer.Products.Developer_Hub.enabled %}
//! ...
//! {%- endif %}
//! ```

use serde::Serialize;
use serde_json::{Map, Value, json};
use tssc_core::Spec;

use crate::error::{EngineError, Result};

/// Cluster facts read from OpenShift
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenShiftInfo {
    pub ingress_domain: String,
    pub router_ca: String,
    pub version: String,
}

/// `Installer` and `OpenShift` template variables
#[derive(Debug, Clone, Serialize)]
pub struct Variables {
    #[serde(rename = "Installer")]
    installer: Value,

    #[serde(rename = "OpenShift")]
    openshift: Value,
}

impl Default for Variables {
    fn default() -> Self {
        Self::new()
    }
}

impl Variables {
    pub fn new() -> Self {
        Self {
            installer: Value::Object(Map::new()),
            openshift: Value::Object(Map::new()),
        }
    }

    /// Namespace, settings and products keyed by their sanitized name
    pub fn set_installer(&mut self, spec: &Spec) -> Result<()> {
        let mut products = Map::new();
        for product in &spec.products {
            products.insert(product.key_name(), serde_json::to_value(product)?);
        }
        let settings = match &spec.settings {
            Some(settings) => serde_json::to_value(settings)?,
            None => Value::Object(Map::new()),
        };

        self.installer = json!({
            "Namespace": spec.namespace,
            "Settings": settings,
            "Products": products,
        });
        Ok(())
    }

    /// Ingress domain, router CA, cluster version and its `major.minor`
    pub fn set_openshift(&mut self, info: &OpenShiftInfo) -> Result<()> {
        let minor = minor_version(&info.version)?;
        self.openshift = json!({
            "Ingress": {
                "Domain": info.ingress_domain,
                "RouterCA": info.router_ca,
            },
            "Version": info.version,
            "MinorVersion": minor,
        });
        Ok(())
    }

    pub fn installer(&self) -> &Value {
        &self.installer
    }

    pub fn openshift(&self) -> &Value {
        &self.openshift
    }

    /// Both variables as a single mapping
    pub fn to_value(&self) -> Value {
        json!({
            "Installer": self.installer,
            "OpenShift": self.openshift,
        })
    }
}

/// `major.minor` of a version string, e.g. `4.16.3` becomes `4.16`
pub fn minor_version(version: &str) -> Result<String> {
    let parts: Vec<&str> = version.split('.').collect();
    if parts.len() < 2 {
        return Err(EngineError::InvalidVersion {
            version: version.to_string(),
        });
    }
    Ok(parts[..2].join("."))
}

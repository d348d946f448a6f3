//! Installer configuration
//!
//! The configuration document lives under the `tssc` root key:
//!
//! ```yaml
//! tssc:
//!   namespace: tssc
//!   settings:
//!     crc: false
//!   products:
//!     - name: Developer Hub
//!       enabled: true
//!       namespace: tssc-dh
//!       properties:
//!         catalogURL: https://example.com/catalog.yaml
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use crate::chartfs::ChartFs;
use crate::constants::CONFIG_FILENAME;
use crate::error::{CoreError, Result};

/// Well known product names
pub const DEVELOPER_HUB: &str = "Developer Hub";
pub const OPENSHIFT_PIPELINES: &str = "OpenShift Pipelines";

static NON_KEY_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zA-Z0-9_]+").expect("valid regex"));
static UNDERSCORES: Lazy<Regex> = Lazy::new(|| Regex::new(r"_+").expect("valid regex"));

/// A product the installer can deploy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub name: String,

    #[serde(default)]
    pub enabled: bool,

    /// Target namespace, required when enabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Product specific settings, passed through to the values template
    #[serde(default)]
    pub properties: Mapping,
}

impl Product {
    /// Name usable as a template key: non alphanumeric runs become a single
    /// underscore, leading and trailing underscores are trimmed, and a leading
    /// digit gets an underscore prefix.
    pub fn key_name(&self) -> String {
        let key = NON_KEY_CHARS.replace_all(&self.name, "_");
        let key = UNDERSCORES.replace_all(key.trim_matches('_'), "_");
        match key.chars().next() {
            Some(c) if c.is_ascii_digit() => format!("_{key}"),
            _ => key.into_owned(),
        }
    }

    /// Namespace, or an empty string when unset
    pub fn namespace(&self) -> &str {
        self.namespace.as_deref().unwrap_or_default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.enabled && self.namespace().trim().is_empty() {
            return Err(CoreError::invalid_config(format!(
                "missing namespace for enabled product {:?}",
                self.name
            )));
        }
        Ok(())
    }
}

/// Installer configuration sections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spec {
    /// Namespace holding the installer resources. Charts may target others.
    #[serde(default)]
    pub namespace: String,

    /// Cluster wide settings, required but may be empty
    #[serde(default)]
    pub settings: Option<Mapping>,

    #[serde(default)]
    pub products: Vec<Product>,
}

/// Root configuration document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "tssc")]
    pub installer: Spec,
}

impl Config {
    /// Parse and validate a configuration payload
    pub fn from_bytes(payload: &[u8]) -> Result<Self> {
        Self::parse(payload, "<bytes>")
    }

    /// Parse and validate a configuration file on disk
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let payload = std::fs::read(path)?;
        Self::parse(&payload, &path.display().to_string())
    }

    /// Parse and validate a configuration file from the installer resources
    pub fn from_chartfs(cfs: &ChartFs, name: &str) -> Result<Self> {
        let payload = cfs.read(name)?;
        Self::parse(&payload, name)
    }

    /// The default configuration shipped with the installer
    pub fn default_from(cfs: &ChartFs) -> Result<Self> {
        Self::from_chartfs(cfs, CONFIG_FILENAME)
    }

    fn parse(payload: &[u8], source_name: &str) -> Result<Self> {
        if payload.iter().all(u8::is_ascii_whitespace) {
            return Err(CoreError::EmptyConfig {
                source_name: source_name.to_string(),
            });
        }
        let config: Config =
            serde_yaml::from_slice(payload).map_err(|e| CoreError::UnmarshalConfig {
                source_name: source_name.to_string(),
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let root = &self.installer;
        if root.namespace.trim().is_empty() {
            return Err(CoreError::invalid_config("missing namespace"));
        }
        if root.settings.is_none() {
            return Err(CoreError::invalid_config("missing settings"));
        }

        let mut names = HashSet::new();
        for product in &root.products {
            if !names.insert(product.name.as_str()) {
                return Err(CoreError::invalid_config(format!(
                    "duplicate product {:?}",
                    product.name
                )));
            }
            product.validate()?;
        }
        Ok(())
    }

    pub fn namespace(&self) -> &str {
        &self.installer.namespace
    }

    pub fn settings(&self) -> Mapping {
        self.installer.settings.clone().unwrap_or_default()
    }

    pub fn get_product(&self, name: &str) -> Result<&Product> {
        self.installer
            .products
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| CoreError::ProductNotFound {
                name: name.to_string(),
            })
    }

    /// Enabled products, in configuration order
    pub fn enabled_products(&self) -> impl Iterator<Item = &Product> {
        self.installer.products.iter().filter(|p| p.enabled)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let yaml = serde_yaml::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&yaml)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
tssc:
  namespace: tssc
  settings:
    crc: false
  products:
    - name: Developer Hub
      enabled: true
      namespace: tssc-dh
      properties:
        catalogURL: https://example.com/catalog.yaml
    - name: OpenShift Pipelines
      enabled: false
      properties: {}
"#;

    #[test]
    fn test_parse() {
        let cfg = Config::from_bytes(SAMPLE.as_bytes()).unwrap();
        assert_eq!(cfg.namespace(), "tssc");
        assert_eq!(cfg.installer.products.len(), 2);

        let dh = cfg.get_product(DEVELOPER_HUB).unwrap();
        assert_eq!(dh.namespace(), "tssc-dh");
        assert_eq!(
            dh.properties.get("catalogURL").and_then(|v| v.as_str()),
            Some("https://example.com/catalog.yaml")
        );

        let enabled: Vec<_> = cfg.enabled_products().map(|p| p.name.as_str()).collect();
        assert_eq!(enabled, vec![DEVELOPER_HUB]);
        assert!(matches!(
            cfg.get_product("Quay"),
            Err(CoreError::ProductNotFound { .. })
        ));
    }

    #[test]
    fn test_round_trip() {
        let cfg = Config::from_bytes(SAMPLE.as_bytes()).unwrap();
        let payload = cfg.to_string();
        assert!(payload.starts_with("tssc:"));
        let parsed = Config::from_bytes(payload.as_bytes()).unwrap();
        assert_eq!(cfg, parsed);
        assert_eq!(payload, parsed.to_string());
    }

    #[test]
    fn test_empty_config() {
        assert!(matches!(
            Config::from_bytes(b""),
            Err(CoreError::EmptyConfig { .. })
        ));
        assert!(matches!(
            Config::from_bytes(b"  \n"),
            Err(CoreError::EmptyConfig { .. })
        ));
    }

    #[test]
    fn test_unmarshal_error() {
        let err = Config::from_bytes(b"tssc: [not, a, mapping]").unwrap_err();
        assert!(matches!(err, CoreError::UnmarshalConfig { .. }));
    }

    #[test]
    fn test_validation_boundaries() {
        let missing_namespace = "tssc:\n  namespace: \"\"\n  settings: {}\n";
        assert!(matches!(
            Config::from_bytes(missing_namespace.as_bytes()),
            Err(CoreError::InvalidConfig { .. })
        ));

        let missing_settings = "tssc:\n  namespace: tssc\n";
        assert!(matches!(
            Config::from_bytes(missing_settings.as_bytes()),
            Err(CoreError::InvalidConfig { .. })
        ));

        // Empty settings are fine
        let empty_settings = "tssc:\n  namespace: tssc\n  settings: {}\n";
        assert!(Config::from_bytes(empty_settings.as_bytes()).is_ok());

        let enabled_without_namespace = r#"
tssc:
  namespace: tssc
  settings: {}
  products:
    - name: Developer Hub
      enabled: true
"#;
        assert!(matches!(
            Config::from_bytes(enabled_without_namespace.as_bytes()),
            Err(CoreError::InvalidConfig { .. })
        ));

        let disabled_without_namespace =
            enabled_without_namespace.replace("enabled: true", "enabled: false");
        assert!(Config::from_bytes(disabled_without_namespace.as_bytes()).is_ok());

        let duplicated = r#"
tssc:
  namespace: tssc
  settings: {}
  products:
    - name: Quay
    - name: Quay
"#;
        assert!(matches!(
            Config::from_bytes(duplicated.as_bytes()),
            Err(CoreError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_key_name() {
        let key = |name: &str| {
            Product {
                name: name.to_string(),
                enabled: false,
                namespace: None,
                properties: Mapping::new(),
            }
            .key_name()
        };
        assert_eq!(key("Developer Hub"), "Developer_Hub");
        assert_eq!(key("OpenShift Pipelines"), "OpenShift_Pipelines");
        assert_eq!(key("  Trusted -- Artifact  Signer "), "Trusted_Artifact_Signer");
        assert_eq!(key("3scale"), "_3scale");
        assert_eq!(key("a__b"), "a_b");
    }

    #[test]
    fn test_default_config_is_valid() {
        let cfs = ChartFs::embedded().unwrap();
        let cfg = Config::default_from(&cfs).unwrap();
        assert!(!cfg.namespace().is_empty());
        assert!(cfg.enabled_products().count() > 0);
    }
}

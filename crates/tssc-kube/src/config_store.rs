//! Cluster configuration persisted as a labeled `ConfigMap`

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use std::sync::Arc;
use tssc_core::Config;
use tssc_core::constants::{APP_NAME, CONFIG_FILENAME, repo_key};

use crate::client::KubeClient;
use crate::error::{KubeError, Result};
use crate::typed;

/// Name of the configuration object
pub const CONFIG_MAP_NAME: &str = "tssc-config";

/// Label selecting the configuration object, `<label>=true`
pub fn config_label() -> String {
    repo_key("config")
}

/// Reads and writes the cluster configuration
#[derive(Clone)]
pub struct ConfigStore {
    kube: Arc<dyn KubeClient>,
}

impl ConfigStore {
    pub fn new(kube: Arc<dyn KubeClient>) -> Self {
        Self { kube }
    }

    /// The configuration object for the given config, in its installer namespace
    pub fn config_map_for(cfg: &Config) -> Result<ConfigMap> {
        Ok(ConfigMap {
            metadata: ObjectMeta {
                name: Some(CONFIG_MAP_NAME.to_string()),
                namespace: Some(cfg.namespace().to_string()),
                labels: Some(BTreeMap::from([
                    (config_label(), "true".to_string()),
                    ("app.kubernetes.io/managed-by".to_string(), APP_NAME.to_string()),
                ])),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(CONFIG_FILENAME.to_string(), cfg.to_yaml()?)])),
            ..Default::default()
        })
    }

    /// The single configuration object, searched in all namespaces
    pub async fn get_config_map(&self) -> Result<ConfigMap> {
        let selector = format!("{}=true", config_label());
        tracing::debug!(selector = %selector, "searching for the cluster configuration");
        let mut found: Vec<ConfigMap> = typed::list(self.kube.as_ref(), None, Some(&selector)).await?;

        match found.len() {
            0 => Err(KubeError::ConfigNotFound),
            1 => Ok(found.remove(0)),
            _ => Err(KubeError::MultipleConfigFound {
                names: found.iter().map(qualified_name).collect(),
            }),
        }
    }

    /// Read and parse the stored configuration
    pub async fn read(&self) -> Result<Config> {
        let config_map = self.get_config_map().await?;
        let name = qualified_name(&config_map);
        let payload = config_map
            .data
            .as_ref()
            .and_then(|data| data.get(CONFIG_FILENAME))
            .filter(|payload| !payload.trim().is_empty())
            .ok_or_else(|| KubeError::IncompleteConfig {
                name: name.clone(),
                message: format!("missing '{CONFIG_FILENAME}' key"),
            })?;

        Config::from_bytes(payload.as_bytes()).map_err(|e| KubeError::IncompleteConfig {
            name,
            message: e.to_string(),
        })
    }

    /// Store a new configuration, fails when one already exists
    pub async fn create(&self, cfg: &Config) -> Result<()> {
        match self.get_config_map().await {
            Ok(existing) => {
                return Err(KubeError::ConfigAlreadyExists {
                    namespace: existing.metadata.namespace.unwrap_or_default(),
                });
            }
            Err(KubeError::ConfigNotFound) => {}
            Err(e) => return Err(e),
        }

        tracing::info!(namespace = cfg.namespace(), "creating the cluster configuration");
        typed::create(self.kube.as_ref(), &Self::config_map_for(cfg)?).await?;
        Ok(())
    }

    /// Replace the stored configuration payload
    pub async fn update(&self, cfg: &Config) -> Result<()> {
        let mut existing = self.get_config_map().await?;
        let desired = Self::config_map_for(cfg)?;

        if existing.metadata.namespace != desired.metadata.namespace {
            // The installer namespace changed, move the object
            tracing::info!(
                from = existing.metadata.namespace.as_deref().unwrap_or_default(),
                to = cfg.namespace(),
                "moving the cluster configuration"
            );
            typed::delete::<ConfigMap>(
                self.kube.as_ref(),
                existing.metadata.namespace.as_deref(),
                CONFIG_MAP_NAME,
            )
            .await?;
            typed::create(self.kube.as_ref(), &desired).await?;
            return Ok(());
        }

        tracing::info!(namespace = cfg.namespace(), "updating the cluster configuration");
        existing.data = desired.data;
        existing.metadata.labels = desired.metadata.labels;
        typed::replace(self.kube.as_ref(), &existing).await?;
        Ok(())
    }

    /// Remove the stored configuration
    pub async fn delete(&self) -> Result<()> {
        let existing = self.get_config_map().await?;
        let namespace = existing.metadata.namespace.as_deref();
        let name = existing.metadata.name.as_deref().unwrap_or(CONFIG_MAP_NAME);
        tracing::info!(namespace, name, "deleting the cluster configuration");
        typed::delete::<ConfigMap>(self.kube.as_ref(), namespace, name).await?;
        Ok(())
    }
}

fn qualified_name(config_map: &ConfigMap) -> String {
    format!(
        "{}/{}",
        config_map.metadata.namespace.as_deref().unwrap_or_default(),
        config_map.metadata.name.as_deref().unwrap_or_default()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeKubeClient;

    const CONFIG: &str = r#"
tssc:
  namespace: tssc
  settings:
    crc: false
  products:
    - name: Developer Hub
      enabled: true
      namespace: tssc-dh
"#;

    fn store() -> (FakeKubeClient, ConfigStore) {
        let fake = FakeKubeClient::new();
        let store = ConfigStore::new(Arc::new(fake.clone()));
        (fake, store)
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let (fake, store) = store();
        let cfg = Config::from_bytes(CONFIG.as_bytes()).unwrap();

        assert!(matches!(store.read().await, Err(KubeError::ConfigNotFound)));

        store.create(&cfg).await.unwrap();
        let stored = store.read().await.unwrap();
        assert_eq!(stored, cfg);

        // The stored payload is the serialized configuration, byte for byte
        let payload = cfg.to_yaml().unwrap();
        let config_map = fake
            .object(&crate::client::ObjectRef::new("v1", "ConfigMap", Some("tssc"), CONFIG_MAP_NAME))
            .unwrap();
        assert_eq!(config_map["data"][CONFIG_FILENAME], payload.as_str());
        assert_eq!(stored.to_yaml().unwrap(), payload);

        let err = store.create(&cfg).await.unwrap_err();
        assert!(matches!(err, KubeError::ConfigAlreadyExists { ref namespace } if namespace == "tssc"));

        store.delete().await.unwrap();
        assert!(matches!(store.read().await, Err(KubeError::ConfigNotFound)));
    }

    #[tokio::test]
    async fn test_update() {
        let (_, store) = store();
        let cfg = Config::from_bytes(CONFIG.as_bytes()).unwrap();
        store.create(&cfg).await.unwrap();

        let updated =
            Config::from_bytes(CONFIG.replace("crc: false", "crc: true").as_bytes()).unwrap();
        store.update(&updated).await.unwrap();
        assert_eq!(store.read().await.unwrap(), updated);

        let moved = Config::from_bytes(
            CONFIG.replace("namespace: tssc\n", "namespace: tssc-next\n").as_bytes(),
        )
        .unwrap();
        store.update(&moved).await.unwrap();
        let config_map = store.get_config_map().await.unwrap();
        assert_eq!(config_map.metadata.namespace.as_deref(), Some("tssc-next"));
    }

    #[tokio::test]
    async fn test_multiple_configs() {
        let (fake, store) = store();
        let cfg = Config::from_bytes(CONFIG.as_bytes()).unwrap();
        let mut other = ConfigStore::config_map_for(&cfg).unwrap();
        other.metadata.namespace = Some("elsewhere".to_string());
        fake.insert(typed::to_object(&ConfigStore::config_map_for(&cfg).unwrap()).unwrap());
        fake.insert(typed::to_object(&other).unwrap());

        let err = store.read().await.unwrap_err();
        assert!(matches!(err, KubeError::MultipleConfigFound { ref names } if names.len() == 2));
    }

    #[tokio::test]
    async fn test_incomplete_config() {
        let (fake, store) = store();
        let cfg = Config::from_bytes(CONFIG.as_bytes()).unwrap();
        let mut config_map = ConfigStore::config_map_for(&cfg).unwrap();
        config_map.data = Some(BTreeMap::new());
        fake.insert(typed::to_object(&config_map).unwrap());

        let err = store.read().await.unwrap_err();
        assert!(matches!(err, KubeError::IncompleteConfig { .. }));
    }

    #[test]
    fn test_config_label() {
        assert_eq!(config_label(), "tssc.redhat-appstudio.github.com/config");
    }
}

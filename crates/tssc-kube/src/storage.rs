//! Release history persisted as Secrets in the release namespace

use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use std::sync::Arc;
use tssc_core::constants::APP_NAME;

use crate::client::KubeClient;
use crate::error::{KubeError, Result};
use crate::release::{StoredRelease, decode_from_storage, encode_for_storage, storage_labels};
use crate::typed;

/// Secret type of release records
pub const RELEASE_SECRET_TYPE: &str = "tssc.redhat-appstudio.github.com/release.v1";

const RELEASE_KEY: &str = "release";

/// Reads and writes release records
#[derive(Clone)]
pub struct ReleaseStore {
    kube: Arc<dyn KubeClient>,
}

impl ReleaseStore {
    pub fn new(kube: Arc<dyn KubeClient>) -> Self {
        Self { kube }
    }

    fn build_secret(release: &StoredRelease) -> Result<Secret> {
        Ok(Secret {
            metadata: ObjectMeta {
                name: Some(release.storage_key()),
                namespace: Some(release.namespace.clone()),
                labels: Some(storage_labels(release)),
                ..Default::default()
            },
            type_: Some(RELEASE_SECRET_TYPE.to_string()),
            data: Some(BTreeMap::from([(
                RELEASE_KEY.to_string(),
                ByteString(encode_for_storage(release)?.into_bytes()),
            )])),
            ..Default::default()
        })
    }

    fn parse_secret(secret: &Secret) -> Result<StoredRelease> {
        let data = secret
            .data
            .as_ref()
            .and_then(|data| data.get(RELEASE_KEY))
            .ok_or_else(|| {
                KubeError::Serialization(format!(
                    "secret '{}' is missing the release data",
                    secret.metadata.name.as_deref().unwrap_or_default()
                ))
            })?;
        let encoded = String::from_utf8(data.0.clone())
            .map_err(|e| KubeError::Serialization(format!("invalid UTF-8 in secret: {e}")))?;
        decode_from_storage(&encoded)
    }

    /// All revisions of a release, newest first, `ReleaseNotFound` when none
    pub async fn history(&self, namespace: &str, name: &str) -> Result<Vec<StoredRelease>> {
        let selector = format!("owner={APP_NAME},name={name}");
        let secrets: Vec<Secret> =
            typed::list(self.kube.as_ref(), Some(namespace), Some(&selector)).await?;

        let mut releases = secrets
            .iter()
            .filter(|secret| secret.type_.as_deref() == Some(RELEASE_SECRET_TYPE))
            .map(Self::parse_secret)
            .collect::<Result<Vec<_>>>()?;
        if releases.is_empty() {
            return Err(KubeError::ReleaseNotFound {
                name: name.to_string(),
                namespace: namespace.to_string(),
            });
        }
        releases.sort_by(|a, b| b.revision.cmp(&a.revision));
        Ok(releases)
    }

    /// Newest revision
    pub async fn latest(&self, namespace: &str, name: &str) -> Result<StoredRelease> {
        let mut history = self.history(namespace, name).await?;
        Ok(history.remove(0))
    }

    pub async fn create(&self, release: &StoredRelease) -> Result<()> {
        tracing::debug!(
            release = %release.name,
            namespace = %release.namespace,
            revision = release.revision,
            "storing release"
        );
        typed::create(self.kube.as_ref(), &Self::build_secret(release)?).await?;
        Ok(())
    }

    pub async fn update(&self, release: &StoredRelease) -> Result<()> {
        typed::replace(self.kube.as_ref(), &Self::build_secret(release)?).await?;
        Ok(())
    }

    /// Keep only the `keep` newest revisions, returns how many were removed
    pub async fn prune(&self, namespace: &str, name: &str, keep: usize) -> Result<usize> {
        let history = self.history(namespace, name).await?;
        let mut removed = 0;
        for release in history.iter().skip(keep) {
            tracing::debug!(release = name, revision = release.revision, "pruning release revision");
            if typed::delete::<Secret>(self.kube.as_ref(), Some(namespace), &release.storage_key())
                .await?
            {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeKubeClient;
    use crate::release::ReleaseState;
    use serde_json::json;
    use tssc_core::chart::test_chart;

    fn store() -> (FakeKubeClient, ReleaseStore) {
        let fake = FakeKubeClient::new();
        (fake.clone(), ReleaseStore::new(Arc::new(fake)))
    }

    #[tokio::test]
    async fn test_history_and_prune() {
        let (fake, store) = store();
        assert!(matches!(
            store.history("tssc", "tssc-dh").await,
            Err(KubeError::ReleaseNotFound { .. })
        ));

        let chart = test_chart("tssc-dh", &[]);
        let mut first = StoredRelease::for_install("tssc-dh", "tssc", &chart, json!({}), String::new());
        store.create(&first).await.unwrap();
        first.mark_deployed();
        store.update(&first).await.unwrap();

        let second = StoredRelease::for_upgrade(&first, &chart, json!({}), String::new());
        store.create(&second).await.unwrap();

        let latest = store.latest("tssc", "tssc-dh").await.unwrap();
        assert_eq!(latest.revision, 2);
        assert_eq!(store.history("tssc", "tssc-dh").await.unwrap()[1].state, ReleaseState::Deployed);

        assert_eq!(store.prune("tssc", "tssc-dh", 1).await.unwrap(), 1);
        assert_eq!(store.history("tssc", "tssc-dh").await.unwrap().len(), 1);
        assert_eq!(fake.references().len(), 1);
    }

    #[tokio::test]
    async fn test_history_ignores_other_releases() {
        let (fake, store) = store();
        let chart = test_chart("tssc-dh", &[]);
        let release = StoredRelease::for_install("tssc-dh", "tssc", &chart, json!({}), String::new());
        store.create(&release).await.unwrap();

        fake.insert(json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": {"name": "unrelated", "namespace": "tssc", "labels": {"owner": "tssc", "name": "tssc-dh"}},
            "type": "Opaque"
        }));

        assert_eq!(store.history("tssc", "tssc-dh").await.unwrap().len(), 1);
        assert!(store.history("tssc", "tssc-pipelines").await.is_err());
        assert!(store.history("other", "tssc-dh").await.is_err());
    }
}

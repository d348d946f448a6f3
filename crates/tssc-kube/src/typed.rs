//! Typed access on top of [`KubeClient`] for the `k8s-openapi` resources

use k8s_openapi::Resource;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::client::{KubeClient, ObjectRef};
use crate::error::Result;

/// Reference to a typed resource
pub fn object_ref<K: Resource>(namespace: Option<&str>, name: &str) -> ObjectRef {
    ObjectRef::new(K::API_VERSION, K::KIND, namespace, name)
}

/// Serialize a typed resource into an object document
pub fn to_object<K: Resource + Serialize>(resource: &K) -> Result<Value> {
    Ok(serde_json::to_value(resource)?)
}

/// Deserialize an object document into a typed resource
pub fn from_object<K: Resource + DeserializeOwned>(mut obj: Value) -> Result<K> {
    // List items may come without their type meta
    if let Some(map) = obj.as_object_mut() {
        map.entry("apiVersion")
            .or_insert_with(|| Value::from(K::API_VERSION));
        map.entry("kind").or_insert_with(|| Value::from(K::KIND));
    }
    Ok(serde_json::from_value(obj)?)
}

pub async fn get<K>(kube: &dyn KubeClient, namespace: Option<&str>, name: &str) -> Result<Option<K>>
where
    K: Resource + DeserializeOwned,
{
    kube.get(&object_ref::<K>(namespace, name))
        .await?
        .map(from_object)
        .transpose()
}

pub async fn list<K>(
    kube: &dyn KubeClient,
    namespace: Option<&str>,
    label_selector: Option<&str>,
) -> Result<Vec<K>>
where
    K: Resource + DeserializeOwned,
{
    kube.list(K::API_VERSION, K::KIND, namespace, label_selector)
        .await?
        .into_iter()
        .map(from_object)
        .collect()
}

pub async fn create<K>(kube: &dyn KubeClient, resource: &K) -> Result<K>
where
    K: Resource + Serialize + DeserializeOwned,
{
    from_object(kube.create(&to_object(resource)?).await?)
}

pub async fn replace<K>(kube: &dyn KubeClient, resource: &K) -> Result<K>
where
    K: Resource + Serialize + DeserializeOwned,
{
    from_object(kube.replace(&to_object(resource)?).await?)
}

pub async fn apply<K>(kube: &dyn KubeClient, resource: &K) -> Result<K>
where
    K: Resource + Serialize + DeserializeOwned,
{
    from_object(kube.apply(&to_object(resource)?, false).await?)
}

pub async fn delete<K: Resource>(
    kube: &dyn KubeClient,
    namespace: Option<&str>,
    name: &str,
) -> Result<bool> {
    kube.delete(&object_ref::<K>(namespace, name)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeKubeClient;
    use k8s_openapi::api::core::v1::ConfigMap;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn config_map(name: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("tssc".to_string()),
                ..Default::default()
            },
            data: Some([("key".to_string(), "value".to_string())].into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_typed_round() {
        let kube = FakeKubeClient::new();
        create(&kube, &config_map("a")).await.unwrap();

        let found: ConfigMap = get(&kube, Some("tssc"), "a").await.unwrap().unwrap();
        assert_eq!(found.data.unwrap()["key"], "value");

        let missing: Option<ConfigMap> = get(&kube, Some("tssc"), "b").await.unwrap();
        assert!(missing.is_none());

        let all: Vec<ConfigMap> = list(&kube, None, None).await.unwrap();
        assert_eq!(all.len(), 1);

        assert!(delete::<ConfigMap>(&kube, Some("tssc"), "a").await.unwrap());
        assert!(!delete::<ConfigMap>(&kube, Some("tssc"), "a").await.unwrap());
    }

    #[test]
    fn test_from_object_fills_type_meta() {
        let cm: ConfigMap = from_object(serde_json::json!({"metadata": {"name": "x"}})).unwrap();
        assert_eq!(cm.metadata.name.as_deref(), Some("x"));
    }
}

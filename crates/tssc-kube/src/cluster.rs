//! [`KubeClient`] backed by a live cluster

use async_trait::async_trait;
use kube::{
    Client, Config,
    api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams},
    config::{KubeConfigOptions, Kubeconfig},
    core::{GroupVersionKind, TypeMeta},
    discovery::{ApiCapabilities, ApiResource, Discovery, Scope, verbs},
};
use serde_json::Value;
use std::path::Path;
use tokio::sync::RwLock;

use crate::client::{FIELD_MANAGER, KubeClient, ObjectRef};
use crate::error::{KubeError, Result};

/// Cluster client with cached discovery
pub struct ClusterClient {
    client: Client,
    discovery: RwLock<Discovery>,
}

impl ClusterClient {
    /// Connect using the given kube-config file. An empty or missing path
    /// falls back to the inferred configuration, e.g. in-cluster.
    pub async fn from_kubeconfig(path: Option<&Path>) -> Result<Self> {
        let config = match path.filter(|p| !p.as_os_str().is_empty() && p.exists()) {
            Some(path) => {
                tracing::debug!(kubeconfig = %path.display(), "loading kube-config");
                let kubeconfig =
                    Kubeconfig::read_from(path).map_err(|e| KubeError::Kubeconfig(e.to_string()))?;
                Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .map_err(|e| KubeError::Kubeconfig(e.to_string()))?
            }
            None => {
                tracing::debug!("inferring kube-config");
                Config::infer()
                    .await
                    .map_err(|e| KubeError::Kubeconfig(e.to_string()))?
            }
        };
        let client = Client::try_from(config)?;
        Self::with_client(client).await
    }

    /// Create from an existing client
    pub async fn with_client(client: Client) -> Result<Self> {
        let discovery = Discovery::new(client.clone()).run().await?;
        Ok(Self {
            client,
            discovery: RwLock::new(discovery),
        })
    }

    /// Resolve a type, refreshing discovery once when the type is unknown
    /// (CRDs installed by earlier charts)
    async fn resolve(&self, api_version: &str, kind: &str) -> Result<(ApiResource, ApiCapabilities)> {
        let gvk = gvk_from_type_meta(&TypeMeta {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
        });

        if let Some(found) = self.discovery.read().await.resolve_gvk(&gvk) {
            return Ok(found);
        }

        tracing::debug!(api_version, kind, "refreshing discovery");
        let refreshed = Discovery::new(self.client.clone()).run().await?;
        let found = refreshed.resolve_gvk(&gvk);
        *self.discovery.write().await = refreshed;
        found.ok_or_else(|| KubeError::UnknownResource {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
        })
    }

    async fn api_for(&self, reference: &ObjectRef) -> Result<(Api<DynamicObject>, ApiResource)> {
        let (resource, capabilities) = self.resolve(&reference.api_version, &reference.kind).await?;
        let api = match (&capabilities.scope, &reference.namespace) {
            (Scope::Namespaced, Some(ns)) => {
                Api::namespaced_with(self.client.clone(), ns, &resource)
            }
            (Scope::Namespaced, None) => Api::default_namespaced_with(self.client.clone(), &resource),
            (Scope::Cluster, _) => Api::all_with(self.client.clone(), &resource),
        };
        Ok((api, resource))
    }
}

fn gvk_from_type_meta(type_meta: &TypeMeta) -> GroupVersionKind {
    let (group, version) = match type_meta.api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", type_meta.api_version.as_str()),
    };
    GroupVersionKind::gvk(group, version, &type_meta.kind)
}

fn to_dynamic(obj: &Value) -> Result<DynamicObject> {
    Ok(serde_json::from_value(obj.clone())?)
}

fn to_value(mut obj: DynamicObject, resource: &ApiResource) -> Result<Value> {
    if obj.types.is_none() {
        obj.types = Some(TypeMeta {
            api_version: resource.api_version.clone(),
            kind: resource.kind.clone(),
        });
    }
    Ok(serde_json::to_value(obj)?)
}

#[async_trait]
impl KubeClient for ClusterClient {
    async fn server_version(&self) -> Result<String> {
        let info = self.client.apiserver_version().await?;
        Ok(info.git_version)
    }

    async fn is_namespaced(&self, api_version: &str, kind: &str) -> Result<bool> {
        let (_, capabilities) = self.resolve(api_version, kind).await?;
        Ok(capabilities.scope == Scope::Namespaced)
    }

    async fn supports_apply(&self, api_version: &str, kind: &str) -> Result<bool> {
        let (_, capabilities) = self.resolve(api_version, kind).await?;
        Ok(capabilities.supports_operation(verbs::PATCH))
    }

    async fn get(&self, object: &ObjectRef) -> Result<Option<Value>> {
        let (api, resource) = self.api_for(object).await?;
        api.get_opt(&object.name)
            .await?
            .map(|obj| to_value(obj, &resource))
            .transpose()
    }

    async fn list(
        &self,
        api_version: &str,
        kind: &str,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<Value>> {
        let (resource, capabilities) = self.resolve(api_version, kind).await?;
        let api: Api<DynamicObject> = match (&capabilities.scope, namespace) {
            (Scope::Namespaced, Some(ns)) if !ns.is_empty() => {
                Api::namespaced_with(self.client.clone(), ns, &resource)
            }
            _ => Api::all_with(self.client.clone(), &resource),
        };

        let mut params = ListParams::default();
        if let Some(selector) = label_selector {
            params = params.labels(selector);
        }
        api.list(&params)
            .await?
            .items
            .into_iter()
            .map(|obj| to_value(obj, &resource))
            .collect()
    }

    async fn create(&self, obj: &Value) -> Result<Value> {
        let reference = ObjectRef::from_object(obj)?;
        let (api, resource) = self.api_for(&reference).await?;
        match api.create(&PostParams::default(), &to_dynamic(obj)?).await {
            Ok(created) => to_value(created, &resource),
            Err(kube::Error::Api(resp)) if resp.code == 409 => Err(KubeError::AlreadyExists {
                kind: reference.kind,
                name: reference.name,
            }),
            Err(kube::Error::Api(resp)) if resp.code == 405 => Err(KubeError::MethodNotAllowed {
                kind: reference.kind,
                verb: "create".into(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn replace(&self, obj: &Value) -> Result<Value> {
        let reference = ObjectRef::from_object(obj)?;
        let (api, resource) = self.api_for(&reference).await?;
        let mut dynamic = to_dynamic(obj)?;

        if dynamic.metadata.resource_version.is_none() {
            let current = api.get_opt(&reference.name).await?.ok_or_else(|| KubeError::NotFound {
                kind: reference.kind.clone(),
                name: reference.name.clone(),
            })?;
            dynamic.metadata.resource_version = current.metadata.resource_version;
        }

        let replaced = api
            .replace(&reference.name, &PostParams::default(), &dynamic)
            .await?;
        to_value(replaced, &resource)
    }

    async fn apply(&self, obj: &Value, dry_run: bool) -> Result<Value> {
        let reference = ObjectRef::from_object(obj)?;
        let (api, resource) = self.api_for(&reference).await?;

        let mut params = PatchParams::apply(FIELD_MANAGER).force();
        params.dry_run = dry_run;

        match api
            .patch(&reference.name, &params, &Patch::Apply(&to_dynamic(obj)?))
            .await
        {
            Ok(applied) => to_value(applied, &resource),
            Err(kube::Error::Api(resp)) if resp.code == 405 => Err(KubeError::MethodNotAllowed {
                kind: reference.kind,
                verb: "apply".into(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, object: &ObjectRef) -> Result<bool> {
        let (api, _) = self.api_for(object).await?;
        match api.delete(&object.name, &DeleteParams::default()).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

//! Kubernetes-backed resource store
//!
//! Every kind goes through `Api<DynamicObject>` built from its
//! [`ResourceKind`], so no generated client is needed for the Carvel CRDs.

use async_trait::async_trait;
use k8s_openapi::api::authorization::v1::{
    ResourceAttributes, SelfSubjectAccessReview, SelfSubjectAccessReviewSpec,
};
use kube::Client;
use kube::api::{Api, ApiResource, DeleteParams, DynamicObject, ListParams, PostParams};
use kube::core::GroupVersionKind;
use serde_json::Value;

use super::{ListOptions, ResourceStore};
use crate::error::{KubeError, Result};
use crate::resources::ResourceKind;

/// Resolves the client for a cluster name
#[async_trait]
pub trait ClientProvider: Send + Sync {
    async fn client(&self, cluster: &str) -> Result<Client>;
}

/// Serves a single cluster with one client
pub struct SingleClusterProvider {
    cluster: String,
    client: Client,
}

impl SingleClusterProvider {
    /// Use the ambient kubeconfig or in-cluster configuration
    pub async fn try_default(cluster: impl Into<String>) -> Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self::new(cluster, client))
    }

    /// Create with an existing client
    pub fn new(cluster: impl Into<String>, client: Client) -> Self {
        Self {
            cluster: cluster.into(),
            client,
        }
    }
}

#[async_trait]
impl ClientProvider for SingleClusterProvider {
    async fn client(&self, cluster: &str) -> Result<Client> {
        if cluster.is_empty() || cluster == self.cluster {
            Ok(self.client.clone())
        } else {
            Err(KubeError::UnknownCluster(cluster.to_string()))
        }
    }
}

/// Resource store talking to the Kubernetes API
pub struct KubeStore<P = SingleClusterProvider> {
    provider: P,
}

impl<P: ClientProvider> KubeStore<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Get the dynamic API for a kind, across all namespaces when empty
    async fn api(
        &self,
        kind: &ResourceKind,
        cluster: &str,
        namespace: &str,
    ) -> Result<Api<DynamicObject>> {
        let client = self.provider.client(cluster).await?;
        let gvk = GroupVersionKind::gvk(kind.group, kind.version, kind.kind);
        let resource = ApiResource::from_gvk_with_plural(&gvk, kind.plural);
        Ok(if namespace.is_empty() {
            Api::all_with(client, &resource)
        } else {
            Api::namespaced_with(client, namespace, &resource)
        })
    }
}

fn object_name(kind: &ResourceKind, object: &DynamicObject) -> Result<String> {
    object
        .metadata
        .name
        .clone()
        .ok_or_else(|| KubeError::Decode {
            kind: kind.kind.to_string(),
            message: "object has no metadata.name".to_string(),
        })
}

#[async_trait]
impl<P: ClientProvider> ResourceStore for KubeStore<P> {
    async fn get_list(
        &self,
        kind: &ResourceKind,
        cluster: &str,
        namespace: &str,
        options: &ListOptions,
    ) -> Result<Vec<Value>> {
        let api = self.api(kind, cluster, namespace).await?;
        let mut params = ListParams::default();
        if let Some(fields) = &options.field_selector {
            params = params.fields(fields);
        }
        if let Some(labels) = &options.label_selector {
            params = params.labels(labels);
        }

        let list = api.list(&params).await?;
        tracing::debug!(kind = kind.kind, namespace, count = list.items.len(), "listed objects");
        list.items
            .into_iter()
            .map(|item| serde_json::to_value(item).map_err(KubeError::from))
            .collect()
    }

    async fn get_one(
        &self,
        kind: &ResourceKind,
        cluster: &str,
        namespace: &str,
        name: &str,
    ) -> Result<Value> {
        let api = self.api(kind, cluster, namespace).await?;
        let object = api.get(name).await?;
        Ok(serde_json::to_value(object)?)
    }

    async fn create_one(
        &self,
        kind: &ResourceKind,
        cluster: &str,
        namespace: &str,
        object: Value,
    ) -> Result<Value> {
        let api = self.api(kind, cluster, namespace).await?;
        let object: DynamicObject = serde_json::from_value(object)?;
        let created = api.create(&PostParams::default(), &object).await?;
        Ok(serde_json::to_value(created)?)
    }

    async fn update_one(
        &self,
        kind: &ResourceKind,
        cluster: &str,
        namespace: &str,
        object: Value,
    ) -> Result<Value> {
        let api = self.api(kind, cluster, namespace).await?;
        let object: DynamicObject = serde_json::from_value(object)?;
        let name = object_name(kind, &object)?;
        let updated = api.replace(&name, &PostParams::default(), &object).await?;
        Ok(serde_json::to_value(updated)?)
    }

    async fn delete_one(
        &self,
        kind: &ResourceKind,
        cluster: &str,
        namespace: &str,
        name: &str,
    ) -> Result<()> {
        let api = self.api(kind, cluster, namespace).await?;
        api.delete(name, &DeleteParams::default()).await?;
        Ok(())
    }

    async fn can_i(
        &self,
        kind: &ResourceKind,
        cluster: &str,
        namespace: &str,
        verb: &str,
    ) -> Result<bool> {
        let client = self.provider.client(cluster).await?;
        let api: Api<SelfSubjectAccessReview> = Api::all(client);
        let review = SelfSubjectAccessReview {
            spec: SelfSubjectAccessReviewSpec {
                resource_attributes: Some(ResourceAttributes {
                    group: Some(kind.group.to_string()),
                    resource: Some(kind.plural.to_string()),
                    verb: Some(verb.to_string()),
                    namespace: Some(namespace.to_string()).filter(|n| !n.is_empty()),
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        };

        let response = api.create(&PostParams::default(), &review).await?;
        Ok(response.status.map(|s| s.allowed).unwrap_or(false))
    }
}

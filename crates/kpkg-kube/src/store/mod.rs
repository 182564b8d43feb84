//! Resource stores
//!
//! The plugin only needs a narrow set of capabilities from the cluster:
//! list, get, create, update and delete objects of a given kind, plus an
//! access check. [`ResourceStore`] exposes exactly that over raw JSON, and
//! [`TypedStore`] decodes into the models of [`crate::resources`] once, at
//! this boundary.
//!
//! - **KubeStore**: talks to a cluster through kube-rs dynamic objects
//! - **MockStore**: in-memory store for tests

mod cluster;
mod mock;

pub use cluster::{ClientProvider, KubeStore, SingleClusterProvider};
pub use mock::{MockStore, OperationCounts, StoreOperation};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{KubeError, Result};
use crate::resources::{Resource, ResourceKind};

/// Selectors applied to list calls
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// e.g. `spec.refName=tetris.foo.example.com`
    pub field_selector: Option<String>,
    /// e.g. `kapp.k14s.io/app=1234`
    pub label_selector: Option<String>,
}

impl ListOptions {
    pub fn fields(selector: impl Into<String>) -> Self {
        Self {
            field_selector: Some(selector.into()),
            label_selector: None,
        }
    }

    pub fn labels(selector: impl Into<String>) -> Self {
        Self {
            field_selector: None,
            label_selector: Some(selector.into()),
        }
    }
}

/// Raw access to cluster objects
///
/// An empty namespace addresses every namespace for lists. Implementations
/// must be Send + Sync for use across async tasks.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// List objects of a kind
    async fn get_list(
        &self,
        kind: &ResourceKind,
        cluster: &str,
        namespace: &str,
        options: &ListOptions,
    ) -> Result<Vec<Value>>;

    /// Get a single object
    async fn get_one(
        &self,
        kind: &ResourceKind,
        cluster: &str,
        namespace: &str,
        name: &str,
    ) -> Result<Value>;

    /// Create an object, returning it as stored
    async fn create_one(
        &self,
        kind: &ResourceKind,
        cluster: &str,
        namespace: &str,
        object: Value,
    ) -> Result<Value>;

    /// Replace an existing object, returning it as stored
    async fn update_one(
        &self,
        kind: &ResourceKind,
        cluster: &str,
        namespace: &str,
        object: Value,
    ) -> Result<Value>;

    /// Delete an object
    async fn delete_one(
        &self,
        kind: &ResourceKind,
        cluster: &str,
        namespace: &str,
        name: &str,
    ) -> Result<()>;

    /// Whether the caller may perform `verb` on objects of a kind
    async fn can_i(
        &self,
        kind: &ResourceKind,
        cluster: &str,
        namespace: &str,
        verb: &str,
    ) -> Result<bool>;
}

/// Typed access on top of any [`ResourceStore`]
#[async_trait]
pub trait TypedStore: ResourceStore {
    async fn list<R: Resource>(
        &self,
        cluster: &str,
        namespace: &str,
        options: &ListOptions,
    ) -> Result<Vec<R>> {
        self.get_list(&R::KIND, cluster, namespace, options)
            .await?
            .into_iter()
            .map(decode::<R>)
            .collect()
    }

    async fn get<R: Resource>(&self, cluster: &str, namespace: &str, name: &str) -> Result<R> {
        decode(self.get_one(&R::KIND, cluster, namespace, name).await?)
    }

    async fn create<R: Resource>(&self, cluster: &str, namespace: &str, object: &R) -> Result<R> {
        let value = encode(object)?;
        decode(self.create_one(&R::KIND, cluster, namespace, value).await?)
    }

    async fn update<R: Resource>(&self, cluster: &str, namespace: &str, object: &R) -> Result<R> {
        let value = encode(object)?;
        decode(self.update_one(&R::KIND, cluster, namespace, value).await?)
    }

    async fn delete<R: Resource>(&self, cluster: &str, namespace: &str, name: &str) -> Result<()> {
        self.delete_one(&R::KIND, cluster, namespace, name).await
    }
}

impl<S: ResourceStore + ?Sized> TypedStore for S {}

/// Decode a stored object into its model
pub fn decode<R: Resource>(value: Value) -> Result<R> {
    serde_json::from_value(value).map_err(|e| KubeError::Decode {
        kind: R::KIND.kind.to_string(),
        message: e.to_string(),
    })
}

/// Encode a model, stamping its apiVersion and kind
pub fn encode<R: Resource>(object: &R) -> Result<Value> {
    let mut value = serde_json::to_value(object)?;
    if let Value::Object(map) = &mut value {
        map.insert("apiVersion".to_string(), Value::String(R::KIND.api_version()));
        map.insert("kind".to_string(), Value::String(R::KIND.kind.to_string()));
    }
    Ok(value)
}

/// Field selector matching a package's logical name
pub fn ref_name_selector(ref_name: &str) -> ListOptions {
    ListOptions::fields(format!("spec.refName={}", ref_name))
}

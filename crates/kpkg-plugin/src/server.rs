//! Plugin server
//!
//! [`Server`] holds the store and the configuration every operation needs.
//! The operations themselves live next to their domain: `available`,
//! `installed` and `repositories`.

use std::sync::{Arc, LazyLock};

use kpkg_core::api::{
    AvailablePackageReference, Context, InstalledPackageReference, PackageRepositoryReference,
};
use kpkg_core::{CoreError, PluginConfig, Result};
use kpkg_kube::resources::Resource;
use kpkg_kube::{ListOptions, ResourceStore, TypedStore};
use regex::Regex;

/// DNS-1123 subdomain, the shape of Kubernetes object names
static OBJECT_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
        .expect("valid regex")
});

const MAX_OBJECT_NAME_LEN: usize = 253;

/// The kapp-controller packages plugin
pub struct Server<S> {
    store: Arc<S>,
    config: PluginConfig,
}

impl<S: ResourceStore + 'static> Server<S> {
    /// Create a server owning its store
    pub fn new(store: S, config: PluginConfig) -> Self {
        Self::with_shared_store(Arc::new(store), config)
    }

    /// Create a server sharing a store with the caller
    pub fn with_shared_store(store: Arc<S>, config: PluginConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub(crate) fn shared_store(&self) -> Arc<S> {
        Arc::clone(&self.store)
    }

    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    /// Cluster a request targets
    pub(crate) fn cluster<'a>(&'a self, context: &'a Context) -> &'a str {
        self.config.cluster_or_default(&context.cluster)
    }

    pub(crate) fn global_namespace(&self) -> &str {
        &self.config.global_packaging_namespace
    }

    /// Namespaces a query covers
    ///
    /// A namespace also sees the global packaging namespace; the empty
    /// namespace stands for all of them.
    pub(crate) fn namespaces_in_scope(&self, namespace: &str) -> Vec<String> {
        let global = self.global_namespace();
        if namespace.is_empty() || namespace == global {
            vec![namespace.to_string()]
        } else {
            vec![namespace.to_string(), global.to_string()]
        }
    }

    /// List a kind across the namespaces in scope
    pub(crate) async fn list_in_scope<R: Resource>(
        &self,
        cluster: &str,
        namespace: &str,
    ) -> Result<Vec<R>> {
        let mut items = Vec::new();
        for ns in self.namespaces_in_scope(namespace) {
            let mut listed = self
                .store
                .list::<R>(cluster, &ns, &ListOptions::default())
                .await
                .map_err(|e| e.into_core("list", R::KIND.kind, ""))?;
            items.append(&mut listed);
        }
        Ok(items)
    }

    pub(crate) async fn get_resource<R: Resource>(
        &self,
        cluster: &str,
        namespace: &str,
        name: &str,
    ) -> Result<R> {
        self.store
            .get::<R>(cluster, namespace, name)
            .await
            .map_err(|e| e.into_core("get", R::KIND.kind, name))
    }

    pub(crate) fn available_ref(
        &self,
        cluster: &str,
        namespace: &str,
        ref_name: &str,
    ) -> AvailablePackageReference {
        AvailablePackageReference {
            context: Context::new(cluster, namespace),
            identifier: ref_name.to_string(),
            plugin: self.config.plugin.clone(),
        }
    }

    pub(crate) fn installed_ref(
        &self,
        cluster: &str,
        namespace: &str,
        name: &str,
    ) -> InstalledPackageReference {
        InstalledPackageReference {
            context: Context::new(cluster, namespace),
            identifier: name.to_string(),
            plugin: self.config.plugin.clone(),
        }
    }

    pub(crate) fn repository_ref(
        &self,
        cluster: &str,
        namespace: &str,
        name: &str,
    ) -> PackageRepositoryReference {
        PackageRepositoryReference {
            context: Context::new(cluster, namespace),
            identifier: name.to_string(),
            plugin: self.config.plugin.clone(),
        }
    }
}

/// Reject an empty required field
pub(crate) fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(CoreError::invalid_argument(format!("no {} provided", field)));
    }
    Ok(())
}

/// Reject names Kubernetes would not accept
pub(crate) fn validate_name(field: &str, value: &str) -> Result<()> {
    require(field, value)?;
    if value.len() > MAX_OBJECT_NAME_LEN || !OBJECT_NAME.is_match(value) {
        return Err(CoreError::invalid_argument(format!(
            "invalid {} '{}': must be a lowercase DNS subdomain",
            field, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kpkg_kube::MockStore;

    #[test]
    fn test_namespaces_in_scope() {
        let server = Server::new(MockStore::new(), PluginConfig::default());
        assert_eq!(server.namespaces_in_scope(""), vec![""]);
        assert_eq!(
            server.namespaces_in_scope("default"),
            vec!["default", "kapp-controller-packaging-global"]
        );
        assert_eq!(
            server.namespaces_in_scope("kapp-controller-packaging-global"),
            vec!["kapp-controller-packaging-global"]
        );
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("name", "my-install").is_ok());
        assert!(validate_name("name", "tetris.foo.example.com").is_ok());
        assert!(validate_name("name", "").is_err());
        assert!(validate_name("name", "My_Install").is_err());
        assert!(validate_name("name", "-leading").is_err());
        assert!(validate_name("name", &"a".repeat(254)).is_err());
    }

    #[test]
    fn test_empty_cluster_uses_packaging_cluster() {
        let server = Server::new(MockStore::new(), PluginConfig::default());
        assert_eq!(server.cluster(&Context::new("", "default")), "default");
        assert_eq!(server.cluster(&Context::new("other", "default")), "other");
    }
}

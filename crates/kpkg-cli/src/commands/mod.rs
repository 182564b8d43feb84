//! CLI commands

use kpkg_core::PluginConfig;
use kpkg_core::api::Context;
use kpkg_kube::{KubeStore, SingleClusterProvider};
use kpkg_plugin::Server;

use crate::error::Result;

pub mod available;
pub mod installed;
pub mod repo;

/// Plugin server talking to the current kubeconfig context
pub type KubeServer = Server<KubeStore<SingleClusterProvider>>;

/// Connect to the packaging cluster named in the configuration
pub async fn connect(config: PluginConfig) -> Result<KubeServer> {
    let provider = SingleClusterProvider::try_default(&config.global_packaging_cluster).await?;
    tracing::debug!(cluster = %config.global_packaging_cluster, "connected");
    Ok(Server::new(KubeStore::new(provider), config))
}

/// Request context for a namespace, every namespace when `all` is set
pub fn context(namespace: &str, all: bool) -> Context {
    Context::new("", if all { "" } else { namespace })
}

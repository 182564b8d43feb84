//! Request and response payloads of the exposed operations
//!
//! These are transport-neutral: serde derives give them a JSON form for the
//! CLI, but no wire protocol is implied.

mod packages;
mod repositories;

pub use packages::*;
pub use repositories::*;

use serde::{Deserialize, Serialize};

use crate::config::{PLUGIN_NAME, PLUGIN_VERSION};

/// Cluster and namespace a request is scoped to
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    #[serde(default)]
    pub cluster: String,
    #[serde(default)]
    pub namespace: String,
}

impl Context {
    pub fn new(cluster: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            namespace: namespace.into(),
        }
    }
}

/// Identity of the plugin serving a reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginRef {
    pub name: String,
    pub version: String,
}

impl Default for PluginRef {
    fn default() -> Self {
        Self {
            name: PLUGIN_NAME.to_string(),
            version: PLUGIN_VERSION.to_string(),
        }
    }
}

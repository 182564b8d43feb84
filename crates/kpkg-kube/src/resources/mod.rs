//! Typed models of the resources the plugin reads and writes
//!
//! Every kind is described by a [`ResourceKind`] so the store can address it
//! without generated clients. Decoding into these models happens once, at
//! the store boundary.

mod carvel;
mod duration;

pub use carvel::*;
pub use duration::{format_sync_period, parse_sync_period};

use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Group, version, kind and plural of a resource type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceKind {
    pub group: &'static str,
    pub version: &'static str,
    pub kind: &'static str,
    pub plural: &'static str,
}

impl ResourceKind {
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.to_string()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind)
    }
}

pub const DATA_PACKAGING_GROUP: &str = "data.packaging.carvel.dev";
pub const PACKAGING_GROUP: &str = "packaging.carvel.dev";
pub const KAPPCTRL_GROUP: &str = "kappctrl.k14s.io";

pub const PACKAGE: ResourceKind = ResourceKind {
    group: DATA_PACKAGING_GROUP,
    version: "v1alpha1",
    kind: "Package",
    plural: "packages",
};

pub const PACKAGE_METADATA: ResourceKind = ResourceKind {
    group: DATA_PACKAGING_GROUP,
    version: "v1alpha1",
    kind: "PackageMetadata",
    plural: "packagemetadatas",
};

pub const PACKAGE_INSTALL: ResourceKind = ResourceKind {
    group: PACKAGING_GROUP,
    version: "v1alpha1",
    kind: "PackageInstall",
    plural: "packageinstalls",
};

pub const PACKAGE_REPOSITORY: ResourceKind = ResourceKind {
    group: PACKAGING_GROUP,
    version: "v1alpha1",
    kind: "PackageRepository",
    plural: "packagerepositories",
};

pub const APP: ResourceKind = ResourceKind {
    group: KAPPCTRL_GROUP,
    version: "v1alpha1",
    kind: "App",
    plural: "apps",
};

pub const SECRET: ResourceKind = ResourceKind {
    group: "",
    version: "v1",
    kind: "Secret",
    plural: "secrets",
};

pub const CONFIG_MAP: ResourceKind = ResourceKind {
    group: "",
    version: "v1",
    kind: "ConfigMap",
    plural: "configmaps",
};

macro_rules! kinds {
    ($($name:ident = $group:literal, $version:literal, $kind:literal, $plural:literal;)*) => {
        $(
            pub const $name: ResourceKind = ResourceKind {
                group: $group,
                version: $version,
                kind: $kind,
                plural: $plural,
            };
        )*
    };
}

kinds! {
    SERVICE_ACCOUNT = "", "v1", "ServiceAccount", "serviceaccounts";
    SERVICE = "", "v1", "Service", "services";
    POD = "", "v1", "Pod", "pods";
    PERSISTENT_VOLUME_CLAIM = "", "v1", "PersistentVolumeClaim", "persistentvolumeclaims";
    DEPLOYMENT = "apps", "v1", "Deployment", "deployments";
    REPLICA_SET = "apps", "v1", "ReplicaSet", "replicasets";
    STATEFUL_SET = "apps", "v1", "StatefulSet", "statefulsets";
    DAEMON_SET = "apps", "v1", "DaemonSet", "daemonsets";
    JOB = "batch", "v1", "Job", "jobs";
    CRON_JOB = "batch", "v1", "CronJob", "cronjobs";
    INGRESS = "networking.k8s.io", "v1", "Ingress", "ingresses";
    NETWORK_POLICY = "networking.k8s.io", "v1", "NetworkPolicy", "networkpolicies";
    ROLE = "rbac.authorization.k8s.io", "v1", "Role", "roles";
    ROLE_BINDING = "rbac.authorization.k8s.io", "v1", "RoleBinding", "rolebindings";
    CLUSTER_ROLE = "rbac.authorization.k8s.io", "v1", "ClusterRole", "clusterroles";
    CLUSTER_ROLE_BINDING = "rbac.authorization.k8s.io", "v1", "ClusterRoleBinding", "clusterrolebindings";
    NAMESPACE = "", "v1", "Namespace", "namespaces";
    CUSTOM_RESOURCE_DEFINITION = "apiextensions.k8s.io", "v1", "CustomResourceDefinition", "customresourcedefinitions";
}

/// Kinds searched for the objects kapp deployed for an install
///
/// kapp labels everything it applies; these are the kinds packages ship.
pub const DEPLOYED_KINDS: &[ResourceKind] = &[
    NAMESPACE,
    CUSTOM_RESOURCE_DEFINITION,
    SERVICE_ACCOUNT,
    CLUSTER_ROLE,
    CLUSTER_ROLE_BINDING,
    ROLE,
    ROLE_BINDING,
    CONFIG_MAP,
    SECRET,
    PERSISTENT_VOLUME_CLAIM,
    SERVICE,
    DEPLOYMENT,
    REPLICA_SET,
    STATEFUL_SET,
    DAEMON_SET,
    POD,
    JOB,
    CRON_JOB,
    INGRESS,
    NETWORK_POLICY,
];

/// A typed resource the store can decode into
pub trait Resource: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: ResourceKind;

    fn metadata(&self) -> &ObjectMeta;

    fn metadata_mut(&mut self) -> &mut ObjectMeta;

    fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    fn namespace(&self) -> &str {
        self.metadata().namespace.as_deref().unwrap_or_default()
    }

    fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata()
            .annotations
            .as_ref()
            .and_then(|a| a.get(key))
            .map(String::as_str)
    }
}

macro_rules! impl_resource {
    ($ty:ty, $kind:expr) => {
        impl Resource for $ty {
            const KIND: ResourceKind = $kind;

            fn metadata(&self) -> &ObjectMeta {
                &self.metadata
            }

            fn metadata_mut(&mut self) -> &mut ObjectMeta {
                &mut self.metadata
            }
        }
    };
}

impl_resource!(Package, PACKAGE);
impl_resource!(PackageMetadata, PACKAGE_METADATA);
impl_resource!(PackageInstall, PACKAGE_INSTALL);
impl_resource!(PackageRepository, PACKAGE_REPOSITORY);
impl_resource!(App, APP);
impl_resource!(Secret, SECRET);
impl_resource!(ConfigMap, CONFIG_MAP);

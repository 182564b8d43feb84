//! kpkg Kube - Kubernetes integration for kpkg
//!
//! This crate provides:
//! - **Resources**: typed models of the Carvel packaging CRDs, kapp-controller Apps and Secrets
//! - **Stores**: the `ResourceStore` capability trait, a kube-rs implementation and an in-memory mock
//! - **Waiting**: polling for objects a controller creates asynchronously

pub mod error;
pub mod resources;
pub mod store;
pub mod wait;

pub use error::{KubeError, Result};
pub use resources::{Resource, ResourceKind};
pub use store::{
    ClientProvider, KubeStore, ListOptions, MockStore, OperationCounts, ResourceStore,
    SingleClusterProvider, StoreOperation, TypedStore,
};
pub use wait::wait_for_resource;

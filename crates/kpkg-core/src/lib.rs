//! kpkg Core - shared types and pure logic for the kapp-controller packages plugin
//!
//! This crate has no cluster access. It provides:
//! - `versions`: grouping version records into sorted version histories
//! - `constraint`: semver range expressions and resolution
//! - `pagination`: page tokens and slicing
//! - `status`: projecting reconciliation conditions into API status
//! - `config`: plugin configuration
//! - `api`: request and response payloads

pub mod api;
pub mod config;
pub mod constraint;
pub mod error;
pub mod pagination;
pub mod status;
pub mod versions;

pub use config::{PluginConfig, UpgradePolicy, VersionsInSummary, WaitConfig};
pub use constraint::VersionConstraint;
pub use error::{Code, CoreError, Result};
pub use pagination::{Page, PaginationOptions};
pub use status::{PackageStatus, ReconcileCondition, StatusReason, StatusView};
pub use versions::{PackageVersion, VersionRecord, VersionedPackage, build_version_sets};

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{Context, PluginRef};
use crate::status::PackageStatus;

/// Reference to a package available for installation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailablePackageReference {
    pub context: Context,
    /// Logical package name (`refName`)
    pub identifier: String,
    pub plugin: PluginRef,
}

/// Reference to an installed package
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledPackageReference {
    pub context: Context,
    /// Name of the package install
    pub identifier: String,
    pub plugin: PluginRef,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageAppVersion {
    pub pkg_version: String,
    pub app_version: String,
}

impl PackageAppVersion {
    /// Carvel packages carry a single version for both fields
    pub fn same(version: impl Into<String>) -> Self {
        let version = version.into();
        Self {
            pkg_version: version.clone(),
            app_version: version,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterOptions {
    /// Case-insensitive text matched against name and descriptions
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub categories: Vec<String>,
    /// Repository names, `namespace/name` or a bare name
    #[serde(default)]
    pub repositories: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailablePackageSummary {
    pub available_package_ref: AvailablePackageReference,
    pub name: String,
    pub latest_version: PackageAppVersion,
    pub icon_url: String,
    pub display_name: String,
    pub short_description: String,
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailablePackageSummaries {
    pub summaries: Vec<AvailablePackageSummary>,
    pub next_page_token: Option<String>,
    /// Distinct categories across the returned summaries, sorted
    pub categories: Vec<String>,
}

/// Versions of one package, newest first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailablePackageVersions {
    pub package_app_versions: Vec<PackageAppVersion>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Maintainer {
    pub name: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailablePackageDetail {
    pub available_package_ref: AvailablePackageReference,
    pub name: String,
    pub version: PackageAppVersion,
    pub repo_url: String,
    pub home_url: String,
    pub icon_url: String,
    pub display_name: String,
    pub short_description: String,
    pub long_description: String,
    pub readme: String,
    /// YAML generated from the values schema
    pub default_values: String,
    /// JSON-encoded OpenAPI v3 schema of the package values
    pub values_schema: String,
    pub maintainers: Vec<Maintainer>,
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionReference {
    /// Version or version constraint
    pub version: String,
}

impl VersionReference {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationOptions {
    /// Time between reconciliations
    #[serde(default, with = "humantime_serde")]
    pub interval: Option<Duration>,
    /// Pause reconciliation
    #[serde(default)]
    pub suspend: bool,
    #[serde(default)]
    pub service_account_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledPackageSummary {
    pub installed_package_ref: InstalledPackageReference,
    pub name: String,
    pub pkg_version_reference: VersionReference,
    pub current_version: PackageAppVersion,
    pub icon_url: String,
    pub pkg_display_name: String,
    pub short_description: String,
    /// Highest available version satisfying the install's constraint
    pub latest_matching_version: Option<PackageAppVersion>,
    pub latest_version: PackageAppVersion,
    pub status: PackageStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledPackageSummaries {
    pub summaries: Vec<InstalledPackageSummary>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledPackageDetail {
    pub installed_package_ref: InstalledPackageReference,
    pub pkg_version_reference: VersionReference,
    pub name: String,
    pub current_version: PackageAppVersion,
    pub values_applied: String,
    pub reconciliation_options: ReconciliationOptions,
    pub status: PackageStatus,
    pub post_installation_notes: String,
    pub available_package_ref: AvailablePackageReference,
    pub latest_matching_version: Option<PackageAppVersion>,
    pub latest_version: PackageAppVersion,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInstalledPackageRequest {
    pub available_package_ref: AvailablePackageReference,
    pub target_context: Context,
    pub name: String,
    pub pkg_version_reference: VersionReference,
    /// YAML values for the install
    #[serde(default)]
    pub values: String,
    #[serde(default)]
    pub reconciliation_options: Option<ReconciliationOptions>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInstalledPackageRequest {
    pub installed_package_ref: InstalledPackageReference,
    pub pkg_version_reference: VersionReference,
    #[serde(default)]
    pub values: String,
    #[serde(default)]
    pub reconciliation_options: Option<ReconciliationOptions>,
}

/// A cluster object deployed for an installed package
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRef {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    /// Empty for cluster-scoped objects
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledPackageResourceRefs {
    pub context: Context,
    pub resource_refs: Vec<ResourceRef>,
}

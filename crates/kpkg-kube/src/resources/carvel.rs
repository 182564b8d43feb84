//! Carvel packaging and kapp-controller custom resources
//!
//! Only the fields the plugin reads or writes are modelled; unknown fields
//! are ignored on decode.

use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kpkg_core::{ReconcileCondition, VersionRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Annotation kapp-controller sets on packages fetched from a repository
pub const PACKAGE_REPOSITORY_REF_ANNOTATION: &str = "packaging.carvel.dev/package-repository-ref";

/// Annotation allowing an install to move to a lower version
pub const DOWNGRADABLE_ANNOTATION: &str = "packaging.carvel.dev/downgradable";

/// One version of a package
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Package {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: PackageSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PackageSpec {
    pub ref_name: String,
    pub version: String,
    pub licenses: Vec<String>,
    pub released_at: Option<DateTime<Utc>>,
    pub capacity_requirements_description: String,
    pub release_notes: String,
    pub values_schema: ValuesSchema,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValuesSchema {
    #[serde(rename = "openAPIv3", skip_serializing_if = "Option::is_none")]
    pub open_api_v3: Option<serde_json::Value>,
}

impl VersionRecord for Package {
    fn ref_name(&self) -> &str {
        &self.spec.ref_name
    }

    fn version(&self) -> &str {
        &self.spec.version
    }
}

/// Version-independent description of a package
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageMetadata {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: PackageMetadataSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PackageMetadataSpec {
    pub display_name: String,
    pub long_description: String,
    pub short_description: String,
    #[serde(rename = "iconSVGBase64")]
    pub icon_svg_base64: String,
    pub provider_name: String,
    pub maintainers: Vec<MaintainerSpec>,
    pub categories: Vec<String>,
    pub support_description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintainerSpec {
    pub name: String,
}

/// Request to install and keep reconciled one package
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageInstall {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: PackageInstallSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PackageInstallStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PackageInstallSpec {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub service_account_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_ref: Option<PackageRef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<PackageInstallValues>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_period: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub paused: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub canceled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PackageRef {
    pub ref_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_selection: Option<VersionSelection>,
}

/// Semver selection shared by installs and repository tag selection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VersionSelection {
    pub constraints: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prereleases: Option<Prereleases>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Prereleases {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub identifiers: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PackageInstallValues {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<SecretKeyRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretKeyRef {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PackageInstallStatus {
    #[serde(flatten)]
    pub reconcile: ReconcileStatus,
    pub version: String,
    pub last_attempted_version: String,
}

impl PackageInstall {
    pub fn ref_name(&self) -> &str {
        self.spec
            .package_ref
            .as_ref()
            .map(|r| r.ref_name.as_str())
            .unwrap_or_default()
    }

    /// Constraint the install selects versions with
    pub fn constraints(&self) -> Option<&str> {
        self.spec
            .package_ref
            .as_ref()
            .and_then(|r| r.version_selection.as_ref())
            .map(|s| s.constraints.as_str())
            .filter(|c| !c.is_empty())
    }

    /// Names of the secrets holding the install's values
    pub fn values_secret_names(&self) -> Vec<&str> {
        self.spec
            .values
            .iter()
            .filter_map(|v| v.secret_ref.as_ref())
            .map(|r| r.name.as_str())
            .filter(|n| !n.is_empty())
            .collect()
    }

    pub fn reconcile_status(&self) -> Option<&ReconcileStatus> {
        self.status.as_ref().map(|s| &s.reconcile)
    }
}

/// Source of packages for a namespace, or for every namespace when global
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageRepository {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: PackageRepositorySpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PackageRepositoryStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PackageRepositorySpec {
    pub fetch: PackageRepositoryFetch,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_period: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub paused: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PackageRepositoryFetch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imgpkg_bundle: Option<ImgpkgBundleFetch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageFetch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git: Option<GitFetch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpFetch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline: Option<InlineFetch>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImgpkgBundleFetch {
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<LocalRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_selection: Option<TagSelection>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageFetch {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<LocalRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_selection: Option<TagSelection>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GitFetch {
    pub url: String,
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<LocalRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpFetch {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<LocalRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InlineFetch {
    pub paths: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagSelection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semver: Option<VersionSelection>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalRef {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageRepositoryStatus {
    #[serde(flatten)]
    pub reconcile: ReconcileStatus,
}

impl PackageRepository {
    pub fn reconcile_status(&self) -> Option<&ReconcileStatus> {
        self.status.as_ref().map(|s| &s.reconcile)
    }

    /// Name of the secret referenced by whichever fetch is configured
    pub fn secret_name(&self) -> Option<&str> {
        let fetch = &self.spec.fetch;
        let secret_ref = fetch
            .imgpkg_bundle
            .as_ref()
            .and_then(|f| f.secret_ref.as_ref())
            .or_else(|| fetch.image.as_ref().and_then(|f| f.secret_ref.as_ref()))
            .or_else(|| fetch.git.as_ref().and_then(|f| f.secret_ref.as_ref()))
            .or_else(|| fetch.http.as_ref().and_then(|f| f.secret_ref.as_ref()));
        secret_ref.map(|r| r.name.as_str()).filter(|n| !n.is_empty())
    }

    /// Point the configured fetch at a secret, or clear the reference
    pub fn set_secret_name(&mut self, name: Option<&str>) {
        let secret_ref = name.map(|n| LocalRef {
            name: n.to_string(),
        });
        let fetch = &mut self.spec.fetch;
        if let Some(f) = fetch.imgpkg_bundle.as_mut() {
            f.secret_ref = secret_ref;
        } else if let Some(f) = fetch.image.as_mut() {
            f.secret_ref = secret_ref;
        } else if let Some(f) = fetch.git.as_mut() {
            f.secret_ref = secret_ref;
        } else if let Some(f) = fetch.http.as_mut() {
            f.secret_ref = secret_ref;
        }
    }
}

/// Low-level application kapp-controller creates for each install
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct App {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: AppSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AppStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_period: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub service_account_name: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub paused: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppStatus {
    #[serde(flatten)]
    pub reconcile: ReconcileStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch: Option<AppStepStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deploy: Option<AppStepStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppStepStatus {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kapp: Option<KappDeployStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KappDeployStatus {
    pub associated_resources: AssociatedResources,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssociatedResources {
    /// Label selector matching every object kapp applied, e.g. `kapp.k14s.io/app=1234`
    pub label: String,
}

impl App {
    /// Selector for the objects kapp deployed, once the first deploy ran
    pub fn deployed_label_selector(&self) -> Option<&str> {
        self.status
            .as_ref()?
            .deploy
            .as_ref()?
            .kapp
            .as_ref()
            .map(|k| k.associated_resources.label.as_str())
            .filter(|l| !l.is_empty())
    }
}

/// Reconciliation state shared by every kapp-controller resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconcileStatus {
    pub conditions: Vec<Condition>,
    pub observed_generation: i64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub friendly_description: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub useful_error_message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl ReconcileStatus {
    /// Current reconciliation condition
    ///
    /// kapp-controller keeps a single condition; if there are more, the
    /// first one wins.
    pub fn condition(&self) -> Option<ReconcileCondition> {
        if self.conditions.len() > 1 {
            tracing::warn!(
                count = self.conditions.len(),
                "expected a single reconciliation condition, using the first one"
            );
        }
        self.conditions
            .first()
            .map(|c| ReconcileCondition::parse(&c.type_))
    }

    pub fn useful_error_message(&self) -> Option<&str> {
        Some(self.useful_error_message.as_str()).filter(|m| !m.is_empty())
    }
}

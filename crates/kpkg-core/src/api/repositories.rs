use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::time::Duration;

use super::{Context, PluginRef};
use crate::error::{CoreError, Result};
use crate::status::PackageStatus;

/// Placeholder returned instead of secret values, and accepted on write as
/// "leave this field unchanged"
pub const REDACTED: &str = "REDACTED";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageRepositoryReference {
    pub context: Context,
    /// Repository name
    pub identifier: String,
    pub plugin: PluginRef,
}

/// Source a repository fetches its package bundle from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RepositoryType {
    ImgpkgBundle,
    Image,
    Git,
    Http,
    Inline,
}

impl RepositoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ImgpkgBundle => "imgpkgBundle",
            Self::Image => "image",
            Self::Git => "git",
            Self::Http => "http",
            Self::Inline => "inline",
        }
    }
}

impl std::fmt::Display for RepositoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RepositoryType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "imgpkgBundle" => Ok(Self::ImgpkgBundle),
            "image" => Ok(Self::Image),
            "git" => Ok(Self::Git),
            "http" => Ok(Self::Http),
            "inline" => Ok(Self::Inline),
            other => Err(CoreError::invalid_argument(format!(
                "unsupported repository type '{}'",
                other
            ))),
        }
    }
}

/// Kind of credentials a repository authenticates with
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthType {
    #[default]
    None,
    BasicAuth,
    Ssh,
    DockerConfig,
    Bearer,
}

impl std::fmt::Display for AuthType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::BasicAuth => "basic auth",
            Self::Ssh => "ssh",
            Self::DockerConfig => "docker config",
            Self::Bearer => "bearer token",
        };
        f.write_str(s)
    }
}

/// One credential field of an update request
///
/// On the wire the field is a plain string; [`REDACTED`] decodes to `Keep`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretField {
    /// Keep the value currently stored
    Keep,
    /// Store this value
    Replace(String),
}

impl SecretField {
    pub fn from_wire(value: &str) -> Self {
        if value == REDACTED {
            Self::Keep
        } else {
            Self::Replace(value.to_string())
        }
    }

    pub fn to_wire(&self) -> &str {
        match self {
            Self::Keep => REDACTED,
            Self::Replace(value) => value,
        }
    }

    pub fn is_keep(&self) -> bool {
        matches!(self, Self::Keep)
    }

    /// New value, falling back to the stored one when kept
    pub fn resolve(&self, existing: Option<&str>) -> Option<String> {
        match self {
            Self::Keep => existing.map(str::to_string),
            Self::Replace(value) => Some(value.clone()),
        }
    }
}

impl From<&str> for SecretField {
    fn from(value: &str) -> Self {
        Self::Replace(value.to_string())
    }
}

impl Serialize for SecretField {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.to_wire())
    }
}

impl<'de> Deserialize<'de> for SecretField {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Self::from_wire(&value))
    }
}

/// Credentials carried inline in a repository request or response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RepositoryCredentials {
    BasicAuth {
        username: SecretField,
        password: SecretField,
    },
    Ssh {
        private_key: SecretField,
        known_hosts: SecretField,
    },
    DockerConfig {
        server: SecretField,
        username: SecretField,
        password: SecretField,
        email: SecretField,
    },
    Bearer {
        token: SecretField,
    },
}

impl RepositoryCredentials {
    pub fn auth_type(&self) -> AuthType {
        match self {
            Self::BasicAuth { .. } => AuthType::BasicAuth,
            Self::Ssh { .. } => AuthType::Ssh,
            Self::DockerConfig { .. } => AuthType::DockerConfig,
            Self::Bearer { .. } => AuthType::Bearer,
        }
    }

    pub fn fields(&self) -> Vec<&SecretField> {
        match self {
            Self::BasicAuth { username, password } => vec![username, password],
            Self::Ssh {
                private_key,
                known_hosts,
            } => vec![private_key, known_hosts],
            Self::DockerConfig {
                server,
                username,
                password,
                email,
            } => vec![server, username, password, email],
            Self::Bearer { token } => vec![token],
        }
    }

    /// Every field asks to keep the stored value
    pub fn is_all_keep(&self) -> bool {
        self.fields().iter().all(|f| f.is_keep())
    }

    /// Fully redacted credentials of the given type
    pub fn redacted(auth_type: AuthType) -> Option<Self> {
        let k = || SecretField::Keep;
        match auth_type {
            AuthType::None => None,
            AuthType::BasicAuth => Some(Self::BasicAuth {
                username: k(),
                password: k(),
            }),
            AuthType::Ssh => Some(Self::Ssh {
                private_key: k(),
                known_hosts: k(),
            }),
            AuthType::DockerConfig => Some(Self::DockerConfig {
                server: k(),
                username: k(),
                password: k(),
                email: k(),
            }),
            AuthType::Bearer => Some(Self::Bearer { token: k() }),
        }
    }
}

/// Authentication settings of a repository
///
/// Either inline `credentials` (a secret the plugin creates and owns) or a
/// `secret_ref` naming a secret the user manages. Neither means no auth.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageRepositoryAuth {
    #[serde(rename = "type", default)]
    pub auth_type: AuthType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<RepositoryCredentials>,
}

/// Fetch options that only apply to some repository types
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryCustomDetail {
    /// Semver constraint selecting the bundle or image tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_selection: Option<String>,
    /// Git branch, tag or commit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageRepositorySummary {
    pub package_repo_ref: PackageRepositoryReference,
    pub name: String,
    pub description: String,
    pub namespace_scoped: bool,
    #[serde(rename = "type")]
    pub repo_type: Option<RepositoryType>,
    pub url: String,
    pub requires_auth: bool,
    pub status: PackageStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageRepositoryDetail {
    pub package_repo_ref: PackageRepositoryReference,
    pub name: String,
    pub description: String,
    pub namespace_scoped: bool,
    #[serde(rename = "type")]
    pub repo_type: RepositoryType,
    pub url: String,
    #[serde(default, with = "humantime_serde")]
    pub interval: Option<Duration>,
    pub auth: Option<PackageRepositoryAuth>,
    pub custom_detail: RepositoryCustomDetail,
    pub status: PackageStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddPackageRepositoryRequest {
    pub context: Context,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub namespace_scoped: bool,
    #[serde(rename = "type")]
    pub repo_type: RepositoryType,
    #[serde(default)]
    pub url: String,
    #[serde(default, with = "humantime_serde")]
    pub interval: Option<Duration>,
    #[serde(default)]
    pub auth: Option<PackageRepositoryAuth>,
    #[serde(default)]
    pub custom_detail: Option<RepositoryCustomDetail>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePackageRepositoryRequest {
    pub package_repo_ref: PackageRepositoryReference,
    /// Must match the current type when given; the type never changes
    #[serde(rename = "type", default)]
    pub repo_type: Option<RepositoryType>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
    #[serde(default, with = "humantime_serde")]
    pub interval: Option<Duration>,
    #[serde(default)]
    pub auth: Option<PackageRepositoryAuth>,
    #[serde(default)]
    pub custom_detail: Option<RepositoryCustomDetail>,
}

/// Verbs the caller may use on repositories, per scope
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageRepositoriesPermissions {
    pub plugin: PluginRef,
    pub global: IndexMap<String, bool>,
    pub namespace: IndexMap<String, bool>,
}

//! Plugin configuration
//!
//! Built once at startup and passed by reference to every component that
//! needs it. The on-disk form is the shared plugin configuration JSON, with
//! this plugin's section under `kappController.packages.v1alpha1`.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::api::PluginRef;
use crate::error::{CoreError, Result};

pub const DEFAULT_GLOBAL_PACKAGING_NAMESPACE: &str = "kapp-controller-packaging-global";
pub const DEFAULT_CLUSTER: &str = "default";
pub const DEFAULT_MANAGED_BY: &str = "kpkg";
pub const PLUGIN_NAME: &str = "kapp_controller.packages";
pub const PLUGIN_VERSION: &str = "v1alpha1";

/// Configuration for the kapp-controller packages plugin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PluginConfig {
    /// Identity stamped on every reference the plugin returns
    #[serde(skip)]
    pub plugin: PluginRef,

    /// Upgrade policy applied to new and updated installs
    pub default_upgrade_policy: UpgradePolicy,

    /// Prerelease identifiers to select; `None` disables prerelease selection
    pub default_prereleases_version_selection: Option<Vec<String>>,

    /// Allow installs to move to a lower version
    pub default_allow_downgrades: bool,

    /// Namespace whose packages and repositories are visible everywhere
    pub global_packaging_namespace: String,

    /// Cluster that hosts the packaging resources
    pub global_packaging_cluster: String,

    /// Limits for version summaries
    pub versions_in_summary: VersionsInSummary,

    /// Polling used after creating an install
    pub install_wait: WaitConfig,

    /// Value of the managed-by marker on plugin-managed secrets
    pub managed_by: String,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            plugin: PluginRef::default(),
            default_upgrade_policy: UpgradePolicy::None,
            default_prereleases_version_selection: None,
            default_allow_downgrades: false,
            global_packaging_namespace: DEFAULT_GLOBAL_PACKAGING_NAMESPACE.to_string(),
            global_packaging_cluster: DEFAULT_CLUSTER.to_string(),
            versions_in_summary: VersionsInSummary::default(),
            install_wait: WaitConfig::default(),
            managed_by: DEFAULT_MANAGED_BY.to_string(),
        }
    }
}

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default, rename = "kappController")]
    kapp_controller: Option<KappControllerSection>,
}

#[derive(Deserialize, Default)]
struct KappControllerSection {
    #[serde(default)]
    packages: Option<PackagesSection>,
}

#[derive(Deserialize, Default)]
struct PackagesSection {
    #[serde(default)]
    v1alpha1: Option<PluginConfig>,
}

impl PluginConfig {
    /// Load from a plugin configuration file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse the plugin configuration document
    ///
    /// A document without this plugin's section yields the defaults.
    pub fn from_json(content: &str) -> Result<Self> {
        let file: ConfigFile =
            serde_json::from_str(content).map_err(|e| CoreError::InvalidConfig(e.to_string()))?;

        let config = file
            .kapp_controller
            .and_then(|k| k.packages)
            .and_then(|p| p.v1alpha1)
            .unwrap_or_default();
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.global_packaging_namespace.is_empty() {
            return Err(CoreError::InvalidConfig(
                "globalPackagingNamespace must not be empty".to_string(),
            ));
        }
        if self.install_wait.interval.is_zero() {
            return Err(CoreError::InvalidConfig(
                "installWait.interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve an empty cluster name to the packaging cluster
    pub fn cluster_or_default<'a>(&'a self, cluster: &'a str) -> &'a str {
        if cluster.is_empty() {
            &self.global_packaging_cluster
        } else {
            cluster
        }
    }
}

/// How far an install may move automatically from the selected version
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpgradePolicy {
    #[default]
    None,
    Major,
    Minor,
    Patch,
}

impl UpgradePolicy {
    /// Version selection constraint for an install pinned at `version`
    pub fn constraint_for(&self, version: &semver::Version) -> String {
        match self {
            Self::None => version.to_string(),
            Self::Major => format!(">={}", version),
            Self::Minor => format!(">={} <{}.0.0", version, version.major + 1),
            Self::Patch => format!(
                ">={} <{}.{}.0",
                version,
                version.major,
                version.minor + 1
            ),
        }
    }
}

impl std::str::FromStr for UpgradePolicy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(Self::None),
            "major" => Ok(Self::Major),
            "minor" => Ok(Self::Minor),
            "patch" => Ok(Self::Patch),
            other => Err(CoreError::InvalidConfig(format!(
                "unknown upgrade policy '{}'",
                other
            ))),
        }
    }
}

/// How many versions a summary keeps at each level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionsInSummary {
    pub major: usize,
    pub minor: usize,
    pub patch: usize,
}

impl Default for VersionsInSummary {
    fn default() -> Self {
        Self {
            major: 3,
            minor: 3,
            patch: 3,
        }
    }
}

/// Poll interval and deadline for asynchronous resource creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitConfig {
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semver::Version;

    #[test]
    fn test_defaults_without_plugin_section() {
        let config = PluginConfig::from_json(r#"{"helm": {"packages": {}}}"#).unwrap();
        assert_eq!(config, PluginConfig::default());
        assert_eq!(config.global_packaging_namespace, "kapp-controller-packaging-global");
        assert_eq!(config.plugin.name, PLUGIN_NAME);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plugins.json");
        std::fs::write(
            &path,
            r#"{
              "kappController": {
                "packages": {
                  "v1alpha1": {
                    "defaultUpgradePolicy": "minor",
                    "defaultPrereleasesVersionSelection": ["rc"],
                    "defaultAllowDowngrades": true,
                    "globalPackagingNamespace": "carvel-global",
                    "installWait": {"interval": "100ms", "timeout": "2s"},
                    "versionsInSummary": {"major": 1}
                  }
                }
              }
            }"#,
        )
        .unwrap();

        let config = PluginConfig::load_from(&path).unwrap();
        assert_eq!(config.default_upgrade_policy, UpgradePolicy::Minor);
        assert_eq!(
            config.default_prereleases_version_selection,
            Some(vec!["rc".to_string()])
        );
        assert!(config.default_allow_downgrades);
        assert_eq!(config.global_packaging_namespace, "carvel-global");
        assert_eq!(config.global_packaging_cluster, DEFAULT_CLUSTER);
        assert_eq!(config.install_wait.interval, Duration::from_millis(100));
        assert_eq!(config.install_wait.timeout, Duration::from_secs(2));
        assert_eq!(config.versions_in_summary.major, 1);
        assert_eq!(config.versions_in_summary.minor, 3);
    }

    #[test]
    fn test_unknown_policy_is_rejected() {
        let err = PluginConfig::from_json(
            r#"{"kappController": {"packages": {"v1alpha1": {"defaultUpgradePolicy": "always"}}}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig(_)));
        assert!("always".parse::<UpgradePolicy>().is_err());
        assert_eq!("patch".parse::<UpgradePolicy>().unwrap(), UpgradePolicy::Patch);
    }

    #[test]
    fn test_upgrade_policy_constraints() {
        let v = Version::new(1, 2, 3);
        assert_eq!(UpgradePolicy::None.constraint_for(&v), "1.2.3");
        assert_eq!(UpgradePolicy::Major.constraint_for(&v), ">=1.2.3");
        assert_eq!(UpgradePolicy::Minor.constraint_for(&v), ">=1.2.3 <2.0.0");
        assert_eq!(UpgradePolicy::Patch.constraint_for(&v), ">=1.2.3 <1.3.0");
    }

    #[test]
    fn test_cluster_defaulting() {
        let config = PluginConfig::default();
        assert_eq!(config.cluster_or_default(""), "default");
        assert_eq!(config.cluster_or_default("other"), "other");
    }
}

//! Version sets
//!
//! Groups version-tagged records by their logical package name and keeps
//! each group sorted newest first. A record whose version does not parse
//! fails the whole build: a catalog is never assembled from a partial group.

use semver::Version;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};

use crate::config::VersionsInSummary;
use crate::constraint::VersionConstraint;
use crate::error::{CoreError, Result};

/// A record carrying one version of a logical package
pub trait VersionRecord {
    /// Logical package name shared by every version of the package
    fn ref_name(&self) -> &str;

    /// Raw version string
    fn version(&self) -> &str;
}

/// A parsed version paired with the record it came from
#[derive(Debug, Clone)]
pub struct PackageVersion<R> {
    pub version: Version,
    pub record: R,
}

/// All versions of one logical package, newest first
#[derive(Debug, Clone)]
pub struct VersionedPackage<R> {
    pub ref_name: String,
    versions: Vec<PackageVersion<R>>,
}

impl<R: VersionRecord> VersionedPackage<R> {
    /// Build the sorted version history for records sharing one name
    pub fn from_records(ref_name: impl Into<String>, records: Vec<R>) -> Result<Self> {
        let ref_name = ref_name.into();
        let mut versions = Vec::with_capacity(records.len());
        for record in records {
            let version = parse_version(record.ref_name(), record.version())?;
            versions.push(PackageVersion { version, record });
        }
        // stable: equal versions keep input order
        versions.sort_by(|a, b| b.version.cmp(&a.version));
        Ok(Self { ref_name, versions })
    }
}

impl<R> VersionedPackage<R> {
    /// Versions in descending order
    pub fn versions(&self) -> &[PackageVersion<R>] {
        &self.versions
    }

    pub fn latest(&self) -> Option<&PackageVersion<R>> {
        self.versions.first()
    }

    /// Find an exact version, compared semantically ("v1.2.3" finds 1.2.3)
    pub fn find(&self, version: &str) -> Option<&PackageVersion<R>> {
        let wanted = parse_version(&self.ref_name, version).ok()?;
        self.versions.iter().find(|v| v.version == wanted)
    }

    /// Highest version satisfying the constraint
    ///
    /// The history is sorted newest first, so the first hit is the highest.
    pub fn latest_matching(&self, constraint: &VersionConstraint) -> Option<&PackageVersion<R>> {
        self.versions.iter().find(|v| constraint.matches(&v.version))
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Consume the package and return its records, newest first
    pub fn into_records(self) -> Vec<R> {
        self.versions.into_iter().map(|v| v.record).collect()
    }
}

/// Group records by logical name into sorted version histories
pub fn build_version_sets<R, I>(records: I) -> Result<BTreeMap<String, VersionedPackage<R>>>
where
    R: VersionRecord,
    I: IntoIterator<Item = R>,
{
    let mut grouped: BTreeMap<String, Vec<R>> = BTreeMap::new();
    for record in records {
        grouped
            .entry(record.ref_name().to_string())
            .or_default()
            .push(record);
    }

    grouped
        .into_iter()
        .map(|(name, records)| {
            let package = VersionedPackage::from_records(name.clone(), records)?;
            Ok((name, package))
        })
        .collect()
}

/// Parse a package version
///
/// Accepts a leading `v` and pads partial versions (`1.2` is `1.2.0`).
pub fn parse_version(name: &str, raw: &str) -> Result<Version> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);

    let malformed = |reason: String| CoreError::MalformedVersion {
        name: name.to_string(),
        version: raw.to_string(),
        reason,
    };

    match Version::parse(trimmed) {
        Ok(v) => Ok(v),
        Err(err) => {
            let core_end = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
            let (core, rest) = trimmed.split_at(core_end);
            let parts: Vec<&str> = core.split('.').collect();
            if parts.is_empty()
                || parts.len() >= 3
                || parts.iter().any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()))
            {
                return Err(malformed(err.to_string()));
            }
            let mut padded = parts.join(".");
            for _ in parts.len()..3 {
                padded.push_str(".0");
            }
            padded.push_str(rest);
            Version::parse(&padded).map_err(|e| malformed(e.to_string()))
        }
    }
}

/// Reduce a descending version list to the versions shown in a summary
///
/// Keeps the newest `major` majors, the newest `minor` minors per major and
/// the newest `patch` patches per minor. Input order is preserved.
pub fn summarize_versions<'a, I>(versions: I, limits: &VersionsInSummary) -> Vec<&'a Version>
where
    I: IntoIterator<Item = &'a Version>,
{
    let mut tracked: HashMap<u64, HashMap<u64, Vec<u64>>> = HashMap::new();
    let mut summary = Vec::new();

    for version in versions {
        let major_count = tracked.len();
        let minors = match tracked.entry(version.major) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                if major_count < limits.major {
                    entry.insert(HashMap::from([(version.minor, vec![version.patch])]));
                    summary.push(version);
                }
                continue;
            }
        };

        let minor_count = minors.len();
        let patches = match minors.entry(version.minor) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                if minor_count < limits.minor {
                    entry.insert(vec![version.patch]);
                    summary.push(version);
                }
                continue;
            }
        };

        if patches.contains(&version.patch) || patches.len() >= limits.patch {
            continue;
        }
        patches.push(version.patch);
        summary.push(version);
    }

    summary
}

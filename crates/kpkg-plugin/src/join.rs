//! Joining package metadata with streamed package versions
//!
//! Package versions are listed and decoded by a producer task and sent over
//! a bounded channel while the request consumes them. The producer sorts
//! what it lists by (refName, namespace) before sending, so the available
//! join is a single-cursor merge over an order this module established.
//!
//! The channel only carries decoded packages. A failed list surfaces
//! through [`PackageStream::finish`], which callers must await after
//! consuming, even when the stream looked complete.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use kpkg_core::{CoreError, Result, VersionedPackage, build_version_sets};
use kpkg_kube::resources::{Package, PackageMetadata, Resource};
use kpkg_kube::{ListOptions, ResourceStore, TypedStore};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Packages buffered between the producer and the consumer
pub const STREAM_CAPACITY: usize = 20;

fn package_key(package: &Package) -> (&str, &str) {
    (package.spec.ref_name.as_str(), package.namespace())
}

/// Packages streamed from a producer task
pub struct PackageStream {
    receiver: mpsc::Receiver<Package>,
    producer: JoinHandle<Result<()>>,
}

impl PackageStream {
    /// Start listing packages in the given namespaces
    ///
    /// Dropping the stream stops the producer at its next send.
    pub fn spawn<S: ResourceStore + 'static>(
        store: Arc<S>,
        cluster: String,
        namespaces: Vec<String>,
        options: ListOptions,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(STREAM_CAPACITY);

        let producer = tokio::spawn(async move {
            let mut packages = Vec::new();
            for namespace in &namespaces {
                let mut listed = store
                    .list::<Package>(&cluster, namespace, &options)
                    .await
                    .map_err(|e| e.into_core("list", "Package", ""))?;
                packages.append(&mut listed);
            }
            packages.sort_by(|a, b| package_key(a).cmp(&package_key(b)));

            tracing::debug!(count = packages.len(), "streaming packages");
            for package in packages {
                if sender.send(package).await.is_err() {
                    tracing::debug!("package consumer went away, stopping");
                    break;
                }
            }
            Ok(())
        });

        Self { receiver, producer }
    }

    pub async fn next(&mut self) -> Option<Package> {
        self.receiver.recv().await
    }

    /// Stop consuming and report the producer's outcome
    pub async fn finish(mut self) -> Result<()> {
        self.receiver.close();
        match self.producer.await {
            Ok(result) => result,
            Err(e) => Err(CoreError::internal(format!(
                "package listing task failed: {}",
                e
            ))),
        }
    }
}

/// Merge a window of metadata with the package stream
///
/// `metadatas` must be sorted by (name, namespace). Packages without
/// metadata are skipped; metadata without packages is an error.
pub async fn join_available(
    metadatas: Vec<PackageMetadata>,
    stream: &mut PackageStream,
) -> Result<Vec<(PackageMetadata, VersionedPackage<Package>)>> {
    let mut joined = Vec::with_capacity(metadatas.len());
    let mut pending = stream.next().await;

    for metadata in metadatas {
        let key = (metadata.name(), metadata.namespace());

        // Skip packages that sort before this metadata
        loop {
            let ordering = match &pending {
                Some(package) => package_key(package).cmp(&key),
                None => break,
            };
            if ordering != Ordering::Less {
                break;
            }
            if let Some(orphan) = &pending {
                tracing::warn!(
                    "skipping package '{}' in namespace '{}': no package metadata",
                    orphan.name(),
                    orphan.namespace()
                );
            }
            pending = stream.next().await;
        }

        let mut run = Vec::new();
        while pending.as_ref().is_some_and(|p| package_key(p) == key) {
            if let Some(package) = pending.take() {
                run.push(package);
            }
            pending = stream.next().await;
        }

        if run.is_empty() {
            return Err(CoreError::MissingVersions {
                name: metadata.name().to_string(),
                namespace: metadata.namespace().to_string(),
            });
        }

        let versions = VersionedPackage::from_records(metadata.name(), run)?;
        joined.push((metadata, versions));
    }

    Ok(joined)
}

/// Metadata and versions resolved for one install
pub struct ResolvedPackage<'a> {
    pub metadata: &'a PackageMetadata,
    pub versions: &'a VersionedPackage<Package>,
}

/// Metadata and versions indexed by namespace, for installed-package joins
pub struct InstalledIndex {
    metadata: HashMap<(String, String), PackageMetadata>,
    versions: HashMap<String, BTreeMap<String, VersionedPackage<Package>>>,
    global_namespace: String,
}

impl InstalledIndex {
    /// Drain the stream and index everything it produced
    pub async fn collect(
        metadatas: Vec<PackageMetadata>,
        mut stream: PackageStream,
        global_namespace: &str,
    ) -> Result<Self> {
        let mut by_namespace: HashMap<String, Vec<Package>> = HashMap::new();
        while let Some(package) = stream.next().await {
            by_namespace
                .entry(package.namespace().to_string())
                .or_default()
                .push(package);
        }
        stream.finish().await?;

        let versions = by_namespace
            .into_iter()
            .map(|(namespace, packages)| Ok((namespace, build_version_sets(packages)?)))
            .collect::<Result<HashMap<_, _>>>()?;

        let metadata = metadatas
            .into_iter()
            .map(|m| ((m.namespace().to_string(), m.name().to_string()), m))
            .collect();

        Ok(Self {
            metadata,
            versions,
            global_namespace: global_namespace.to_string(),
        })
    }

    /// Resolve a package from the install's namespace, then the global one
    pub fn resolve(&self, namespace: &str, ref_name: &str) -> Option<ResolvedPackage<'_>> {
        [namespace, self.global_namespace.as_str()]
            .into_iter()
            .find_map(|ns| {
                let metadata = self.metadata.get(&(ns.to_string(), ref_name.to_string()))?;
                let versions = self.versions.get(ns).and_then(|v| v.get(ref_name));
                if versions.is_none() {
                    tracing::warn!(
                        "package metadata '{}' in namespace '{}' has no package versions",
                        ref_name,
                        ns
                    );
                }
                Some(ResolvedPackage {
                    metadata,
                    versions: versions?,
                })
            })
    }
}

//! Available packages

use std::collections::BTreeSet;

use kpkg_core::api::{
    AvailablePackageDetail, AvailablePackageReference, AvailablePackageSummaries,
    AvailablePackageSummary, AvailablePackageVersions, Context, FilterOptions, Maintainer,
    PackageAppVersion,
};
use kpkg_core::versions::summarize_versions;
use kpkg_core::{CoreError, PaginationOptions, Result, VersionedPackage, pagination};
use kpkg_kube::resources::{
    PACKAGE_REPOSITORY_REF_ANNOTATION, Package, PackageMetadata, Resource,
};
use kpkg_kube::store::ref_name_selector;
use kpkg_kube::{ListOptions, ResourceStore, TypedStore};

use crate::join::{PackageStream, join_available};
use crate::render;
use crate::server::{Server, require};

/// Whether metadata passes the caller's filters
fn matches_filter(metadata: &PackageMetadata, filter: &FilterOptions) -> bool {
    let query = filter.query.trim().to_lowercase();
    if !query.is_empty() {
        let spec = &metadata.spec;
        let hit = [
            metadata.name(),
            spec.display_name.as_str(),
            spec.short_description.as_str(),
        ]
        .iter()
        .any(|field| field.to_lowercase().contains(&query));
        if !hit {
            return false;
        }
    }

    if !filter.categories.is_empty()
        && !metadata
            .spec
            .categories
            .iter()
            .any(|c| filter.categories.contains(c))
    {
        return false;
    }

    if !filter.repositories.is_empty() {
        // `namespace/name` of the repository that provided the package
        let Some(repo_ref) = metadata.annotation(PACKAGE_REPOSITORY_REF_ANNOTATION) else {
            return false;
        };
        let repo_name = repo_ref.split_once('/').map_or(repo_ref, |(_, name)| name);
        if !filter
            .repositories
            .iter()
            .any(|r| r == repo_ref || r == repo_name)
        {
            return false;
        }
    }

    true
}

impl<S: ResourceStore + 'static> Server<S> {
    /// Summaries of the packages available in a namespace, one page at a time
    pub async fn get_available_package_summaries(
        &self,
        context: &Context,
        filter: &FilterOptions,
        pagination: &PaginationOptions,
    ) -> Result<AvailablePackageSummaries> {
        let cluster = self.cluster(context).to_string();
        let offset = pagination.offset()?;

        let mut metadatas: Vec<PackageMetadata> =
            self.list_in_scope(&cluster, &context.namespace).await?;
        metadatas.retain(|m| matches_filter(m, filter));
        metadatas.sort_by(|a, b| (a.name(), a.namespace()).cmp(&(b.name(), b.namespace())));

        let page = pagination::slice(metadatas, offset, pagination.page_size)?;
        if page.items.is_empty() {
            return Ok(AvailablePackageSummaries::default());
        }

        let mut stream = PackageStream::spawn(
            self.shared_store(),
            cluster.clone(),
            self.namespaces_in_scope(&context.namespace),
            ListOptions::default(),
        );
        let joined = join_available(page.items, &mut stream).await;
        // A failed listing explains an incomplete join, so it takes precedence
        stream.finish().await?;
        let joined = joined?;

        let summaries: Vec<AvailablePackageSummary> = joined
            .iter()
            .map(|(metadata, versions)| self.available_summary(&cluster, metadata, versions))
            .collect();
        let categories: BTreeSet<String> = summaries
            .iter()
            .flat_map(|s| s.categories.iter().cloned())
            .collect();

        Ok(AvailablePackageSummaries {
            summaries,
            next_page_token: page.next_page_token,
            categories: categories.into_iter().collect(),
        })
    }

    fn available_summary(
        &self,
        cluster: &str,
        metadata: &PackageMetadata,
        versions: &VersionedPackage<Package>,
    ) -> AvailablePackageSummary {
        let latest = versions
            .latest()
            .map(|v| PackageAppVersion::same(v.version.to_string()))
            .unwrap_or_default();

        AvailablePackageSummary {
            available_package_ref: self.available_ref(cluster, metadata.namespace(), metadata.name()),
            name: metadata.name().to_string(),
            latest_version: latest,
            icon_url: render::icon_url(&metadata.spec.icon_svg_base64),
            display_name: metadata.spec.display_name.clone(),
            short_description: metadata.spec.short_description.clone(),
            categories: metadata.spec.categories.clone(),
        }
    }

    /// Every version of a package, sorted newest first
    pub(crate) async fn package_versions(
        &self,
        cluster: &str,
        namespace: &str,
        ref_name: &str,
    ) -> Result<VersionedPackage<Package>> {
        let packages: Vec<Package> = self
            .store()
            .list(cluster, namespace, &ref_name_selector(ref_name))
            .await
            .map_err(|e| e.into_core("list", "Package", ref_name))?;
        if packages.is_empty() {
            return Err(CoreError::MissingVersions {
                name: ref_name.to_string(),
                namespace: namespace.to_string(),
            });
        }
        VersionedPackage::from_records(ref_name, packages)
    }

    /// Versions of a package, reduced to the configured summary limits
    pub async fn get_available_package_versions(
        &self,
        reference: &AvailablePackageReference,
    ) -> Result<AvailablePackageVersions> {
        require("package identifier", &reference.identifier)?;
        require("namespace", &reference.context.namespace)?;
        let cluster = self.cluster(&reference.context);

        let versions = self
            .package_versions(cluster, &reference.context.namespace, &reference.identifier)
            .await?;
        let summary = summarize_versions(
            versions.versions().iter().map(|v| &v.version),
            &self.config().versions_in_summary,
        );

        Ok(AvailablePackageVersions {
            package_app_versions: summary
                .into_iter()
                .map(|v| PackageAppVersion::same(v.to_string()))
                .collect(),
        })
    }

    /// Detail of one package version, the latest when none is requested
    pub async fn get_available_package_detail(
        &self,
        reference: &AvailablePackageReference,
        pkg_version: &str,
    ) -> Result<AvailablePackageDetail> {
        require("package identifier", &reference.identifier)?;
        require("namespace", &reference.context.namespace)?;
        let cluster = self.cluster(&reference.context);
        let namespace = reference.context.namespace.as_str();
        let ref_name = reference.identifier.as_str();

        let metadata: PackageMetadata = self.get_resource(cluster, namespace, ref_name).await?;
        let versions = self.package_versions(cluster, namespace, ref_name).await?;

        let chosen = match pkg_version {
            "" => versions.latest(),
            version => versions.find(version),
        };
        let chosen = chosen.ok_or_else(|| {
            CoreError::not_found(format!(
                "version '{}' of package '{}' not found in namespace '{}'",
                pkg_version, ref_name, namespace
            ))
        })?;
        let package = &chosen.record;

        let values_schema = package
            .spec
            .values_schema
            .open_api_v3
            .as_ref()
            .map(|s| s.to_string())
            .unwrap_or_default();

        Ok(AvailablePackageDetail {
            available_package_ref: self.available_ref(cluster, namespace, ref_name),
            name: metadata.name().to_string(),
            version: PackageAppVersion::same(chosen.version.to_string()),
            repo_url: String::new(),
            home_url: String::new(),
            icon_url: render::icon_url(&metadata.spec.icon_svg_base64),
            display_name: metadata.spec.display_name.clone(),
            short_description: metadata.spec.short_description.clone(),
            long_description: metadata.spec.long_description.clone(),
            readme: render::readme(&metadata, package),
            default_values: render::default_values(package.spec.values_schema.open_api_v3.as_ref()),
            values_schema,
            maintainers: metadata
                .spec
                .maintainers
                .iter()
                .map(|m| Maintainer {
                    name: m.name.clone(),
                    email: String::new(),
                })
                .collect(),
            categories: metadata.spec.categories.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn metadata(name: &str, display: &str, categories: &[&str], repo: Option<&str>) -> PackageMetadata {
        let mut m = PackageMetadata::default();
        m.metadata.name = Some(name.to_string());
        m.metadata.namespace = Some("default".to_string());
        m.spec.display_name = display.to_string();
        m.spec.categories = categories.iter().map(|c| c.to_string()).collect();
        if let Some(repo) = repo {
            m.metadata.annotations = Some(BTreeMap::from([(
                PACKAGE_REPOSITORY_REF_ANNOTATION.to_string(),
                repo.to_string(),
            )]));
        }
        m
    }

    #[test]
    fn test_query_filter() {
        let m = metadata("tetris.foo.example.com", "Classic Tetris", &[], None);
        let filter = |q: &str| FilterOptions {
            query: q.to_string(),
            ..Default::default()
        };
        assert!(matches_filter(&m, &filter("")));
        assert!(matches_filter(&m, &filter("TETRIS")));
        assert!(matches_filter(&m, &filter("classic")));
        assert!(!matches_filter(&m, &filter("pacman")));
    }

    #[test]
    fn test_category_filter() {
        let m = metadata("tetris.foo.example.com", "Tetris", &["logging", "games"], None);
        let filter = |c: &[&str]| FilterOptions {
            categories: c.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        };
        assert!(matches_filter(&m, &filter(&["games"])));
        assert!(matches_filter(&m, &filter(&["networking", "logging"])));
        assert!(!matches_filter(&m, &filter(&["networking"])));
    }

    #[test]
    fn test_repository_filter() {
        let with_repo = metadata("a", "A", &[], Some("default/tce-repo"));
        let without_repo = metadata("b", "B", &[], None);
        let filter = |r: &str| FilterOptions {
            repositories: vec![r.to_string()],
            ..Default::default()
        };
        assert!(matches_filter(&with_repo, &filter("tce-repo")));
        assert!(matches_filter(&with_repo, &filter("default/tce-repo")));
        assert!(!matches_filter(&with_repo, &filter("other/tce-repo")));
        assert!(!matches_filter(&without_repo, &filter("tce-repo")));
    }
}

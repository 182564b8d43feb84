//! Installed packages
//!
//! An installed package is a `PackageInstall` plus the objects around it:
//! the values secrets it reads, the `App` kapp-controller creates for it and
//! the package versions it selects from.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kpkg_core::api::{
    Context, CreateInstalledPackageRequest, InstalledPackageDetail, InstalledPackageReference,
    InstalledPackageResourceRefs, InstalledPackageSummaries, InstalledPackageSummary,
    PackageAppVersion, ReconciliationOptions, ResourceRef, UpdateInstalledPackageRequest,
    VersionReference,
};
use kpkg_core::status::{self, StatusView};
use kpkg_core::{
    CoreError, PaginationOptions, Result, VersionConstraint, VersionedPackage,
    pagination,
};
use kpkg_kube::resources::{
    APP, App, DEPLOYED_KINDS, DOWNGRADABLE_ANNOTATION, Package, PackageInstall, PackageInstallValues,
    PackageMetadata, PackageRef, Prereleases, Resource, SecretKeyRef, VersionSelection,
    format_sync_period, parse_sync_period,
};
use kpkg_kube::{ListOptions, ResourceKind, ResourceStore, TypedStore, wait_for_resource};
use tokio::task::JoinSet;

use crate::join::{InstalledIndex, PackageStream};
use crate::render;
use crate::server::{Server, require, validate_name};

/// Key the values YAML is stored under
pub const VALUES_KEY: &str = "values.yaml";

const OPAQUE_SECRET_TYPE: &str = "Opaque";

/// Label kapp puts on every object it applies for an app
const KAPP_APP_LABEL: &str = "kapp.k14s.io/app";

/// What an update did to the values secrets of an install
enum ValuesChange {
    None,
    Created(String),
    Rewritten { previous: Secret, updated: Secret },
}

fn values_secret_name(install_name: &str) -> String {
    format!("{}-values", install_name)
}

/// Version the install is running, or the one it last tried
fn current_version(install: &PackageInstall) -> String {
    install
        .status
        .as_ref()
        .map(|s| {
            if s.version.is_empty() {
                s.last_attempted_version.clone()
            } else {
                s.version.clone()
            }
        })
        .unwrap_or_default()
}

fn latest_version(versions: &VersionedPackage<Package>) -> PackageAppVersion {
    versions
        .latest()
        .map(|v| PackageAppVersion::same(v.version.to_string()))
        .unwrap_or_default()
}

/// Highest version satisfying the install's constraint
fn latest_matching_version(
    install: &PackageInstall,
    versions: &VersionedPackage<Package>,
) -> Result<Option<PackageAppVersion>> {
    let Some(constraints) = install.constraints() else {
        return Ok(None);
    };
    let constraint = VersionConstraint::parse(constraints)?;
    Ok(versions
        .latest_matching(&constraint)
        .map(|v| PackageAppVersion::same(v.version.to_string())))
}

fn check_values(values: &str) -> Result<()> {
    serde_yaml::from_str::<serde_yaml::Value>(values)
        .map(|_| ())
        .map_err(|e| CoreError::invalid_argument(format!("values are not valid YAML: {}", e)))
}

fn values_secret(name: &str, namespace: &str, values: &str) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        type_: Some(OPAQUE_SECRET_TYPE.to_string()),
        string_data: Some(BTreeMap::from([(VALUES_KEY.to_string(), values.to_string())])),
        ..Default::default()
    }
}

/// Content of a values secret, one key or all of them
fn secret_content(secret: &Secret, key: Option<&str>) -> String {
    let mut entries: BTreeMap<&str, String> = BTreeMap::new();
    if let Some(data) = &secret.data {
        for (k, v) in data {
            entries.insert(k.as_str(), String::from_utf8_lossy(&v.0).into_owned());
        }
    }
    if let Some(data) = &secret.string_data {
        for (k, v) in data {
            entries.insert(k.as_str(), v.clone());
        }
    }

    match key {
        Some(key) => entries.remove(key).unwrap_or_default(),
        None => entries.into_values().collect::<Vec<_>>().join("\n"),
    }
}

fn set_downgradable(install: &mut PackageInstall, allowed: bool) {
    let annotations = install.metadata.annotations.get_or_insert_with(BTreeMap::new);
    if allowed {
        annotations.insert(DOWNGRADABLE_ANNOTATION.to_string(), String::new());
    } else {
        annotations.remove(DOWNGRADABLE_ANNOTATION);
    }
    if annotations.is_empty() {
        install.metadata.annotations = None;
    }
}

fn apply_options(install: &mut PackageInstall, options: &ReconciliationOptions) {
    if !options.service_account_name.is_empty() {
        install.spec.service_account_name = options.service_account_name.clone();
    }
    install.spec.sync_period = options.interval.map(format_sync_period);
    install.spec.paused = options.suspend;
}

impl<S: ResourceStore + 'static> Server<S> {
    /// Metadata of a package, from the namespace or the global one
    async fn find_metadata(
        &self,
        cluster: &str,
        namespace: &str,
        ref_name: &str,
    ) -> Result<PackageMetadata> {
        let mut candidates = vec![namespace];
        if namespace != self.global_namespace() {
            candidates.push(self.global_namespace());
        }

        for ns in candidates {
            match self.store().get::<PackageMetadata>(cluster, ns, ref_name).await {
                Ok(metadata) => return Ok(metadata),
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e.into_core("get", "PackageMetadata", ref_name)),
            }
        }
        Err(CoreError::not_found(format!(
            "package metadata '{}' not found in namespace '{}' or '{}'",
            ref_name,
            namespace,
            self.global_namespace()
        )))
    }

    /// Version selection for an install pinned at a requested version
    fn version_selection(
        &self,
        versions: &VersionedPackage<Package>,
        requested: &str,
    ) -> Result<VersionSelection> {
        let chosen = versions.find(requested).ok_or_else(|| {
            CoreError::not_found(format!(
                "version '{}' of package '{}' not found",
                requested, versions.ref_name
            ))
        })?;
        Ok(VersionSelection {
            constraints: self
                .config()
                .default_upgrade_policy
                .constraint_for(&chosen.version),
            prereleases: self
                .config()
                .default_prereleases_version_selection
                .as_ref()
                .map(|identifiers| Prereleases {
                    identifiers: identifiers.clone(),
                }),
        })
    }

    /// Summaries of the package installs in a namespace
    pub async fn get_installed_package_summaries(
        &self,
        context: &Context,
        pagination: &PaginationOptions,
    ) -> Result<InstalledPackageSummaries> {
        let cluster = self.cluster(context).to_string();
        let offset = pagination.offset()?;

        let mut installs: Vec<PackageInstall> = self
            .store()
            .list(&cluster, &context.namespace, &ListOptions::default())
            .await
            .map_err(|e| e.into_core("list", "PackageInstall", ""))?;
        installs.sort_by(|a, b| (a.namespace(), a.name()).cmp(&(b.namespace(), b.name())));

        let page = pagination::slice(installs, offset, pagination.page_size)?;
        if page.items.is_empty() {
            return Ok(InstalledPackageSummaries {
                summaries: Vec::new(),
                next_page_token: page.next_page_token,
            });
        }

        let metadatas: Vec<PackageMetadata> =
            self.list_in_scope(&cluster, &context.namespace).await?;
        let stream = PackageStream::spawn(
            self.shared_store(),
            cluster.clone(),
            self.namespaces_in_scope(&context.namespace),
            ListOptions::default(),
        );
        let index = InstalledIndex::collect(metadatas, stream, self.global_namespace()).await?;

        let mut summaries = Vec::with_capacity(page.items.len());
        for install in &page.items {
            let Some(resolved) = index.resolve(install.namespace(), install.ref_name()) else {
                tracing::warn!(
                    "skipping package install '{}' in namespace '{}': package '{}' not found",
                    install.name(),
                    install.namespace(),
                    install.ref_name()
                );
                continue;
            };

            let latest_matching = latest_matching_version(install, resolved.versions)
                .unwrap_or_else(|e| {
                    tracing::warn!(
                        "cannot compute the latest matching version of '{}': {}",
                        install.name(),
                        e
                    );
                    None
                });
            let reconcile = install.reconcile_status();

            summaries.push(InstalledPackageSummary {
                installed_package_ref: self.installed_ref(
                    &cluster,
                    install.namespace(),
                    install.name(),
                ),
                name: install.name().to_string(),
                pkg_version_reference: VersionReference::new(
                    install.constraints().unwrap_or_default(),
                ),
                current_version: PackageAppVersion::same(current_version(install)),
                icon_url: render::icon_url(&resolved.metadata.spec.icon_svg_base64),
                pkg_display_name: resolved.metadata.spec.display_name.clone(),
                short_description: resolved.metadata.spec.short_description.clone(),
                latest_matching_version: latest_matching,
                latest_version: latest_version(resolved.versions),
                status: status::project(
                    reconcile.and_then(|s| s.condition()).as_ref(),
                    reconcile.and_then(|s| s.useful_error_message()),
                    StatusView::Summary,
                ),
            });
        }

        Ok(InstalledPackageSummaries {
            summaries,
            next_page_token: page.next_page_token,
        })
    }

    /// Detail of one package install
    pub async fn get_installed_package_detail(
        &self,
        reference: &InstalledPackageReference,
    ) -> Result<InstalledPackageDetail> {
        require("installed package identifier", &reference.identifier)?;
        require("namespace", &reference.context.namespace)?;
        let cluster = self.cluster(&reference.context);
        let namespace = reference.context.namespace.as_str();
        let name = reference.identifier.as_str();

        let install: PackageInstall = self.get_resource(cluster, namespace, name).await?;
        let metadata = self.find_metadata(cluster, namespace, install.ref_name()).await?;
        let versions = self
            .package_versions(cluster, metadata.namespace(), metadata.name())
            .await?;

        let app = match self.store().get::<App>(cluster, namespace, name).await {
            Ok(app) => Some(app),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e.into_core("get", "App", name)),
        };

        let mut values = Vec::new();
        for values_ref in install.spec.values.iter().filter_map(|v| v.secret_ref.as_ref()) {
            match self
                .store()
                .get::<Secret>(cluster, namespace, &values_ref.name)
                .await
            {
                Ok(secret) => values.push((
                    values_ref.name.as_str(),
                    secret_content(&secret, values_ref.key.as_deref()),
                )),
                Err(e) if e.is_not_found() => tracing::warn!(
                    "values secret '{}' of package install '{}' not found",
                    values_ref.name,
                    name
                ),
                Err(e) => return Err(e.into_core("get", "Secret", &values_ref.name)),
            }
        }

        let reconcile = install.reconcile_status();
        Ok(InstalledPackageDetail {
            installed_package_ref: self.installed_ref(cluster, namespace, name),
            pkg_version_reference: VersionReference::new(install.constraints().unwrap_or_default()),
            name: name.to_string(),
            current_version: PackageAppVersion::same(current_version(&install)),
            values_applied: render::values_applied(values),
            reconciliation_options: ReconciliationOptions {
                interval: install.spec.sync_period.as_deref().and_then(parse_sync_period),
                suspend: install.spec.paused,
                service_account_name: install.spec.service_account_name.clone(),
            },
            status: status::project(
                reconcile.and_then(|s| s.condition()).as_ref(),
                reconcile.and_then(|s| s.useful_error_message()),
                StatusView::Detail,
            ),
            post_installation_notes: render::post_installation_notes(app.as_ref()),
            available_package_ref: self.available_ref(
                cluster,
                metadata.namespace(),
                metadata.name(),
            ),
            latest_matching_version: latest_matching_version(&install, &versions)?,
            latest_version: latest_version(&versions),
        })
    }

    /// Objects kapp deployed for a package install
    ///
    /// kapp labels what it applies with the app's label; every kind in
    /// [`DEPLOYED_KINDS`] is searched for it across all namespaces. Kinds the
    /// caller cannot list are skipped.
    pub async fn get_installed_package_resource_refs(
        &self,
        reference: &InstalledPackageReference,
    ) -> Result<InstalledPackageResourceRefs> {
        require("installed package identifier", &reference.identifier)?;
        require("namespace", &reference.context.namespace)?;
        let cluster = self.cluster(&reference.context);
        let namespace = reference.context.namespace.as_str();
        let name = reference.identifier.as_str();

        let _: PackageInstall = self.get_resource(cluster, namespace, name).await?;
        let context = Context::new(cluster, namespace);

        let Some(selector) = self.deployed_selector(cluster, namespace, name).await? else {
            tracing::warn!("no kapp label found for package install '{}'", name);
            return Ok(InstalledPackageResourceRefs {
                context,
                resource_refs: Vec::new(),
            });
        };
        tracing::debug!(%selector, "looking up deployed resources");

        let mut lookups = JoinSet::new();
        for kind in DEPLOYED_KINDS {
            let store = self.shared_store();
            let cluster = cluster.to_string();
            let options = ListOptions::labels(selector.clone());
            lookups.spawn(async move {
                let listed = store.get_list(kind, &cluster, "", &options).await;
                (kind, listed)
            });
        }

        let mut resource_refs = Vec::new();
        while let Some(joined) = lookups.join_next().await {
            let (kind, listed) = joined
                .map_err(|e| CoreError::internal(format!("resource lookup task failed: {}", e)))?;
            match listed {
                Ok(objects) => resource_refs.extend(objects.iter().map(|o| resource_ref(kind, o))),
                Err(e) => tracing::debug!("skipping {}: {}", kind, e),
            }
        }
        resource_refs.sort();

        Ok(InstalledPackageResourceRefs {
            context,
            resource_refs,
        })
    }

    /// Label selector of the objects deployed for an install
    ///
    /// Read from the App status; older kapp-controllers only record the label
    /// value in the app's `<name>-ctrl` ConfigMap.
    async fn deployed_selector(
        &self,
        cluster: &str,
        namespace: &str,
        name: &str,
    ) -> Result<Option<String>> {
        match self.store().get::<App>(cluster, namespace, name).await {
            Ok(app) => {
                if let Some(selector) = app.deployed_label_selector() {
                    return Ok(Some(selector.to_string()));
                }
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into_core("get", "App", name)),
        }

        let ctrl_name = format!("{}-ctrl", name);
        let config_map = match self
            .store()
            .get::<ConfigMap>(cluster, namespace, &ctrl_name)
            .await
        {
            Ok(config_map) => config_map,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e.into_core("get", "ConfigMap", &ctrl_name)),
        };
        let label_value = config_map
            .data
            .as_ref()
            .and_then(|d| d.get("spec"))
            .and_then(|spec| match serde_json::from_str::<serde_json::Value>(spec) {
                Ok(spec) => spec.get("labelValue")?.as_str().map(str::to_string),
                Err(e) => {
                    tracing::warn!("unable to parse the spec of ConfigMap '{}': {}", ctrl_name, e);
                    None
                }
            })
            .filter(|v| !v.is_empty());
        Ok(label_value.map(|v| format!("{}={}", KAPP_APP_LABEL, v)))
    }

    /// Install a package and wait for kapp-controller to pick it up
    pub async fn create_installed_package(
        &self,
        request: &CreateInstalledPackageRequest,
    ) -> Result<InstalledPackageReference> {
        let available = &request.available_package_ref;
        require("package identifier", &available.identifier)?;
        require("package namespace", &available.context.namespace)?;
        validate_name("name", &request.name)?;
        require("target namespace", &request.target_context.namespace)?;
        require("version", &request.pkg_version_reference.version)?;
        let options = request.reconciliation_options.clone().unwrap_or_default();
        require("service account name", &options.service_account_name)?;

        let cluster = self.cluster(&available.context);
        if self.cluster(&request.target_context) != cluster {
            return Err(CoreError::unimplemented(
                "installing a package into another cluster is not supported",
            ));
        }
        let namespace = request.target_context.namespace.as_str();
        let name = request.name.as_str();

        let metadata = self
            .find_metadata(cluster, &available.context.namespace, &available.identifier)
            .await?;
        let versions = self
            .package_versions(cluster, metadata.namespace(), metadata.name())
            .await?;
        let selection =
            self.version_selection(&versions, &request.pkg_version_reference.version)?;

        let secret = if request.values.trim().is_empty() {
            None
        } else {
            check_values(&request.values)?;
            Some(values_secret(&values_secret_name(name), namespace, &request.values))
        };

        let mut install = PackageInstall::default();
        install.metadata.name = Some(name.to_string());
        install.metadata.namespace = Some(namespace.to_string());
        install.spec.package_ref = Some(PackageRef {
            ref_name: metadata.name().to_string(),
            version_selection: Some(selection),
        });
        if let Some(secret) = &secret {
            install.spec.values.push(PackageInstallValues {
                secret_ref: Some(SecretKeyRef {
                    name: secret.name().to_string(),
                    key: None,
                }),
            });
        }
        apply_options(&mut install, &options);
        set_downgradable(&mut install, self.config().default_allow_downgrades);

        if let Some(secret) = &secret {
            self.store()
                .create(cluster, namespace, secret)
                .await
                .map_err(|e| e.into_core("create", "Secret", secret.name()))?;
        }

        if let Err(e) = self.store().create(cluster, namespace, &install).await {
            if let Some(secret) = &secret {
                self.cleanup::<Secret>(cluster, namespace, secret.name()).await;
            }
            return Err(e.into_core("create", "PackageInstall", name));
        }
        tracing::info!(install = name, namespace, "created package install");

        let wait = &self.config().install_wait;
        if let Err(e) = wait_for_resource(
            self.store(),
            &APP,
            cluster,
            namespace,
            name,
            wait.interval,
            wait.timeout,
        )
        .await
        {
            tracing::warn!("package install '{}' did not produce an App: {}", name, e);
            self.cleanup::<PackageInstall>(cluster, namespace, name).await;
            if let Some(secret) = &secret {
                self.cleanup::<Secret>(cluster, namespace, secret.name()).await;
            }
            return Err(e.into_core("wait for", "App", name));
        }

        Ok(self.installed_ref(cluster, namespace, name))
    }

    /// Change the version, values or reconciliation options of an install
    pub async fn update_installed_package(
        &self,
        request: &UpdateInstalledPackageRequest,
    ) -> Result<InstalledPackageReference> {
        let reference = &request.installed_package_ref;
        require("installed package identifier", &reference.identifier)?;
        require("namespace", &reference.context.namespace)?;
        require("version", &request.pkg_version_reference.version)?;
        let cluster = self.cluster(&reference.context);
        let namespace = reference.context.namespace.as_str();
        let name = reference.identifier.as_str();

        let mut install: PackageInstall = self.get_resource(cluster, namespace, name).await?;
        let metadata = self.find_metadata(cluster, namespace, install.ref_name()).await?;
        let versions = self
            .package_versions(cluster, metadata.namespace(), metadata.name())
            .await?;
        let selection =
            self.version_selection(&versions, &request.pkg_version_reference.version)?;

        if let Some(package_ref) = install.spec.package_ref.as_mut() {
            package_ref.version_selection = Some(selection);
        }
        if let Some(options) = &request.reconciliation_options {
            apply_options(&mut install, options);
        }
        set_downgradable(&mut install, self.config().default_allow_downgrades);

        let mut values_change = ValuesChange::None;
        if !request.values.trim().is_empty() {
            check_values(&request.values)?;
            let existing = install
                .spec
                .values
                .iter()
                .find_map(|v| v.secret_ref.clone())
                .filter(|r| !r.name.is_empty());

            match existing {
                Some(secret_ref) => {
                    let previous: Secret = self
                        .get_resource(cluster, namespace, &secret_ref.name)
                        .await?;
                    let mut secret = previous.clone();
                    let key = secret_ref.key.unwrap_or_else(|| VALUES_KEY.to_string());
                    if let Some(data) = secret.data.as_mut() {
                        data.remove(&key);
                    }
                    secret
                        .string_data
                        .get_or_insert_with(BTreeMap::new)
                        .insert(key, request.values.clone());
                    let updated = self
                        .store()
                        .update(cluster, namespace, &secret)
                        .await
                        .map_err(|e| e.into_core("update", "Secret", &secret_ref.name))?;
                    values_change = ValuesChange::Rewritten { previous, updated };
                }
                None => {
                    let secret =
                        values_secret(&values_secret_name(name), namespace, &request.values);
                    self.store()
                        .create(cluster, namespace, &secret)
                        .await
                        .map_err(|e| e.into_core("create", "Secret", secret.name()))?;
                    install.spec.values.push(PackageInstallValues {
                        secret_ref: Some(SecretKeyRef {
                            name: secret.name().to_string(),
                            key: None,
                        }),
                    });
                    values_change = ValuesChange::Created(secret.name().to_string());
                }
            }
        }

        if let Err(e) = self.store().update(cluster, namespace, &install).await {
            self.revert_values(cluster, namespace, values_change).await;
            return Err(e.into_core("update", "PackageInstall", name));
        }
        tracing::info!(install = name, namespace, "updated package install");

        Ok(self.installed_ref(cluster, namespace, name))
    }

    /// Delete an install and the values secrets it references
    pub async fn delete_installed_package(
        &self,
        reference: &InstalledPackageReference,
    ) -> Result<()> {
        require("installed package identifier", &reference.identifier)?;
        require("namespace", &reference.context.namespace)?;
        let cluster = self.cluster(&reference.context);
        let namespace = reference.context.namespace.as_str();
        let name = reference.identifier.as_str();

        let install: PackageInstall = self.get_resource(cluster, namespace, name).await?;
        self.store()
            .delete::<PackageInstall>(cluster, namespace, name)
            .await
            .map_err(|e| e.into_core("delete", "PackageInstall", name))?;
        tracing::info!(install = name, namespace, "deleted package install");

        for secret_name in install.values_secret_names() {
            match self
                .store()
                .delete::<Secret>(cluster, namespace, secret_name)
                .await
            {
                Ok(()) => {}
                Err(e) if e.is_not_found() => tracing::warn!(
                    "values secret '{}' of package install '{}' was already gone",
                    secret_name,
                    name
                ),
                Err(e) => return Err(e.into_core("delete", "Secret", secret_name)),
            }
        }
        Ok(())
    }

    /// Best-effort delete during compensation
    /// Undo a values secret change after the install could not be updated
    async fn revert_values(&self, cluster: &str, namespace: &str, change: ValuesChange) {
        match change {
            ValuesChange::None => {}
            ValuesChange::Created(name) => self.cleanup::<Secret>(cluster, namespace, &name).await,
            ValuesChange::Rewritten { previous, mut updated } => {
                updated.data = previous.data;
                updated.string_data = previous.string_data;
                if let Err(e) = self.store().update(cluster, namespace, &updated).await {
                    tracing::warn!(
                        "failed to restore values secret '{}': {}",
                        updated.name(),
                        e
                    );
                }
            }
        }
    }

    async fn cleanup<R: Resource>(&self, cluster: &str, namespace: &str, name: &str) {
        if let Err(e) = self.store().delete::<R>(cluster, namespace, name).await {
            if !e.is_not_found() {
                tracing::warn!("failed to clean up {} '{}': {}", R::KIND, name, e);
            }
        }
    }
}

/// Reference to a listed object, falling back to the kind it was listed as
fn resource_ref(kind: &ResourceKind, object: &serde_json::Value) -> ResourceRef {
    let field = |pointer: &str| {
        object
            .pointer(pointer)
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
    };
    ResourceRef {
        api_version: field("/apiVersion").unwrap_or_else(|| kind.api_version()),
        kind: field("/kind").unwrap_or_else(|| kind.kind.to_string()),
        name: field("/metadata/name").unwrap_or_default(),
        namespace: field("/metadata/namespace").unwrap_or_default(),
    }
}

//! Package repositories

use indexmap::IndexMap;
use kpkg_core::api::{
    AddPackageRepositoryRequest, Context, PackageRepositoriesPermissions,
    PackageRepositoryDetail, PackageRepositoryReference, PackageRepositorySummary,
    RepositoryCustomDetail, RepositoryType, UpdatePackageRepositoryRequest,
};
use kpkg_core::status::{self, StatusView};
use kpkg_core::{CoreError, PackageStatus, Result};
use kpkg_kube::resources::{
    GitFetch, HttpFetch, ImageFetch, ImgpkgBundleFetch, InlineFetch, PACKAGE_REPOSITORY,
    PackageRepository, PackageRepositoryFetch, Resource, TagSelection, VersionSelection,
    format_sync_period, parse_sync_period,
};
use kpkg_kube::{ResourceStore, TypedStore};
use kpkg_repo::fetch::{repository_type, repository_url};
use kpkg_repo::{AuthRequest, AuthState, CredentialManager};

use crate::server::{Server, require, validate_name};

/// Annotation holding the user's description of a repository
pub const DESCRIPTION_ANNOTATION: &str = "kpkg.dev/description";

/// Verbs reported by the permissions check
const REPOSITORY_VERBS: [&str; 6] = ["create", "delete", "get", "list", "update", "watch"];

fn tag_selection(custom: &RepositoryCustomDetail) -> Option<TagSelection> {
    custom.tag_selection.as_ref().map(|constraints| TagSelection {
        semver: Some(VersionSelection {
            constraints: constraints.clone(),
            prereleases: None,
        }),
    })
}

/// Fetch section for a repository type
fn build_fetch(
    repo_type: RepositoryType,
    url: &str,
    custom: &RepositoryCustomDetail,
    inline: Option<InlineFetch>,
) -> PackageRepositoryFetch {
    let url = url.to_string();
    let mut fetch = PackageRepositoryFetch::default();
    match repo_type {
        RepositoryType::ImgpkgBundle => {
            fetch.imgpkg_bundle = Some(ImgpkgBundleFetch {
                image: url,
                secret_ref: None,
                tag_selection: tag_selection(custom),
            })
        }
        RepositoryType::Image => {
            fetch.image = Some(ImageFetch {
                url,
                secret_ref: None,
                sub_path: custom.sub_path.clone(),
                tag_selection: tag_selection(custom),
            })
        }
        RepositoryType::Git => {
            fetch.git = Some(GitFetch {
                url,
                git_ref: custom.git_ref.clone(),
                secret_ref: None,
                sub_path: custom.sub_path.clone(),
            })
        }
        RepositoryType::Http => {
            fetch.http = Some(HttpFetch {
                url,
                sha256: None,
                secret_ref: None,
                sub_path: custom.sub_path.clone(),
            })
        }
        RepositoryType::Inline => fetch.inline = Some(inline.unwrap_or_default()),
    }
    fetch
}

/// Type-specific fetch options of a repository
fn custom_detail(repo: &PackageRepository) -> RepositoryCustomDetail {
    let fetch = &repo.spec.fetch;
    let semver = |t: &Option<TagSelection>| {
        t.as_ref()
            .and_then(|t| t.semver.as_ref())
            .map(|s| s.constraints.clone())
            .filter(|c| !c.is_empty())
    };

    if let Some(f) = &fetch.imgpkg_bundle {
        RepositoryCustomDetail {
            tag_selection: semver(&f.tag_selection),
            ..Default::default()
        }
    } else if let Some(f) = &fetch.image {
        RepositoryCustomDetail {
            tag_selection: semver(&f.tag_selection),
            sub_path: f.sub_path.clone(),
            ..Default::default()
        }
    } else if let Some(f) = &fetch.git {
        RepositoryCustomDetail {
            git_ref: f.git_ref.clone(),
            sub_path: f.sub_path.clone(),
            ..Default::default()
        }
    } else if let Some(f) = &fetch.http {
        RepositoryCustomDetail {
            sub_path: f.sub_path.clone(),
            ..Default::default()
        }
    } else {
        RepositoryCustomDetail::default()
    }
}

fn set_description(repo: &mut PackageRepository, description: &str) {
    let annotations = repo.metadata.annotations.get_or_insert_with(Default::default);
    if description.is_empty() {
        annotations.remove(DESCRIPTION_ANNOTATION);
    } else {
        annotations.insert(DESCRIPTION_ANNOTATION.to_string(), description.to_string());
    }
    if annotations.is_empty() {
        repo.metadata.annotations = None;
    }
}

fn require_url(repo_type: RepositoryType, url: &str) -> Result<()> {
    if repo_type == RepositoryType::Inline {
        return Ok(());
    }
    require("url", url)
}

fn repository_status(repo: &PackageRepository, view: StatusView) -> PackageStatus {
    let reconcile = repo.reconcile_status();
    status::project(
        reconcile.and_then(|s| s.condition()).as_ref(),
        reconcile.and_then(|s| s.useful_error_message()),
        view,
    )
}

impl<S: ResourceStore + 'static> Server<S> {
    fn credentials<'a>(&'a self, cluster: &'a str) -> CredentialManager<'a, S> {
        CredentialManager::new(self.store(), cluster, &self.config().managed_by)
    }

    /// Repositories of a namespace and the global ones
    pub async fn get_package_repository_summaries(
        &self,
        context: &Context,
    ) -> Result<Vec<PackageRepositorySummary>> {
        let cluster = self.cluster(context);
        let mut repos: Vec<PackageRepository> =
            self.list_in_scope(cluster, &context.namespace).await?;
        repos.sort_by(|a, b| (a.namespace(), a.name()).cmp(&(b.namespace(), b.name())));

        Ok(repos
            .iter()
            .map(|repo| PackageRepositorySummary {
                package_repo_ref: self.repository_ref(cluster, repo.namespace(), repo.name()),
                name: repo.name().to_string(),
                description: repo
                    .annotation(DESCRIPTION_ANNOTATION)
                    .unwrap_or_default()
                    .to_string(),
                namespace_scoped: repo.namespace() != self.global_namespace(),
                repo_type: repository_type(repo),
                url: repository_url(repo).to_string(),
                requires_auth: repo.secret_name().is_some(),
                status: repository_status(repo, StatusView::Summary),
            })
            .collect())
    }

    /// Detail of one repository, with its credentials redacted
    pub async fn get_package_repository_detail(
        &self,
        reference: &PackageRepositoryReference,
    ) -> Result<PackageRepositoryDetail> {
        require("repository identifier", &reference.identifier)?;
        require("namespace", &reference.context.namespace)?;
        let cluster = self.cluster(&reference.context);
        let namespace = reference.context.namespace.as_str();
        let name = reference.identifier.as_str();

        let repo: PackageRepository = self.get_resource(cluster, namespace, name).await?;
        let repo_type = repository_type(&repo).ok_or_else(|| {
            CoreError::internal(format!("repository '{}' has no fetch source", name))
        })?;
        let auth = self.credentials(cluster).auth_for_detail(&repo).await?;

        Ok(PackageRepositoryDetail {
            package_repo_ref: self.repository_ref(cluster, namespace, name),
            name: name.to_string(),
            description: repo
                .annotation(DESCRIPTION_ANNOTATION)
                .unwrap_or_default()
                .to_string(),
            namespace_scoped: namespace != self.global_namespace(),
            repo_type,
            url: repository_url(&repo).to_string(),
            interval: repo.spec.sync_period.as_deref().and_then(parse_sync_period),
            auth,
            custom_detail: custom_detail(&repo),
            status: repository_status(&repo, StatusView::Detail),
        })
    }

    /// Create a repository and the secret it authenticates with
    pub async fn add_package_repository(
        &self,
        request: &AddPackageRepositoryRequest,
    ) -> Result<PackageRepositoryReference> {
        validate_name("name", &request.name)?;
        let cluster = self.cluster(&request.context);
        let global = self.global_namespace();
        let namespace = match (request.namespace_scoped, request.context.namespace.as_str()) {
            (true, "") => return Err(CoreError::invalid_argument("no namespace provided")),
            (true, ns) if ns == global => {
                return Err(CoreError::invalid_argument(format!(
                    "namespace-scoped repositories cannot be created in the global namespace '{}'",
                    global
                )));
            }
            (true, ns) => ns,
            (false, "") => global,
            (false, ns) if ns == global => ns,
            (false, ns) => {
                return Err(CoreError::invalid_argument(format!(
                    "global repositories must be created in namespace '{}', not '{}'",
                    global, ns
                )));
            }
        };
        require_url(request.repo_type, &request.url)?;
        let auth = AuthRequest::from_api(request.auth.as_ref())?;
        let name = request.name.as_str();

        let mut repo = PackageRepository::default();
        repo.metadata.name = Some(name.to_string());
        repo.metadata.namespace = Some(namespace.to_string());
        repo.spec.fetch = build_fetch(
            request.repo_type,
            &request.url,
            &request.custom_detail.clone().unwrap_or_default(),
            None,
        );
        repo.spec.sync_period = request.interval.map(format_sync_period);
        set_description(&mut repo, &request.description);

        let credentials = self.credentials(cluster);
        let prepared = credentials
            .prepare_create(name, namespace, request.repo_type, &auth)
            .await?;
        repo.set_secret_name(prepared.as_ref().map(|p| p.name.as_str()));
        let managed = prepared.as_ref().filter(|p| p.managed);

        let created = match self.store().create(cluster, namespace, &repo).await {
            Ok(created) => created,
            Err(e) => {
                if let Some(secret) = managed {
                    credentials.discard(namespace, &secret.name).await;
                }
                return Err(e.into_core("create", "PackageRepository", name));
            }
        };
        tracing::info!(repository = name, namespace, "created package repository");

        if let Some(secret) = managed {
            if let Err(e) = credentials.adopt(namespace, &secret.name, &created).await {
                tracing::warn!(
                    "failed to link secret '{}' to repository '{}': {}",
                    secret.name,
                    name,
                    e
                );
                if let Err(cleanup) = self
                    .store()
                    .delete::<PackageRepository>(cluster, namespace, name)
                    .await
                {
                    tracing::warn!("failed to delete repository '{}': {}", name, cleanup);
                }
                credentials.discard(namespace, &secret.name).await;
                return Err(e);
            }
        }

        Ok(self.repository_ref(cluster, namespace, name))
    }

    /// Change the source, interval, description or auth of a repository
    pub async fn update_package_repository(
        &self,
        request: &UpdatePackageRepositoryRequest,
    ) -> Result<PackageRepositoryReference> {
        let reference = &request.package_repo_ref;
        require("repository identifier", &reference.identifier)?;
        require("namespace", &reference.context.namespace)?;
        let cluster = self.cluster(&reference.context);
        let namespace = reference.context.namespace.as_str();
        let name = reference.identifier.as_str();

        let mut repo: PackageRepository = self.get_resource(cluster, namespace, name).await?;
        if repo
            .reconcile_status()
            .and_then(|s| s.condition())
            .is_some_and(|c| c.is_transitioning())
        {
            return Err(CoreError::failed_precondition(format!(
                "repository '{}' is being reconciled, try again later",
                name
            )));
        }

        let repo_type = repository_type(&repo).ok_or_else(|| {
            CoreError::internal(format!("repository '{}' has no fetch source", name))
        })?;
        if let Some(requested) = request.repo_type
            && requested != repo_type
        {
            return Err(CoreError::invalid_argument(format!(
                "repository type cannot change from {} to {}",
                repo_type, requested
            )));
        }
        require_url(repo_type, &request.url)?;
        let auth = AuthRequest::from_api(request.auth.as_ref())?;

        // the auth state is read from the fetch section before it is rebuilt
        let credentials = self.credentials(cluster);
        let update = credentials.plan_update(&repo, repo_type, &auth).await?;
        let current_secret = repo.secret_name().map(str::to_string);

        let inline = repo.spec.fetch.inline.take();
        repo.spec.fetch = build_fetch(
            repo_type,
            &request.url,
            &request.custom_detail.clone().unwrap_or_default(),
            inline,
        );
        if let Some(interval) = request.interval {
            repo.spec.sync_period = Some(format_sync_period(interval));
        }
        set_description(&mut repo, &request.description);

        repo.set_secret_name(update.secret_name(current_secret.as_deref()));

        let updated = match self.store().update(cluster, namespace, &repo).await {
            Ok(updated) => updated,
            Err(e) => {
                credentials.rollback_update(namespace, &update).await;
                return Err(e.into_core("update", "PackageRepository", name));
            }
        };
        tracing::info!(repository = name, namespace, "updated package repository");

        credentials.complete_update(&update, &updated).await?;
        Ok(self.repository_ref(cluster, namespace, name))
    }

    /// Delete a repository and the secret the plugin created for it
    pub async fn delete_package_repository(
        &self,
        reference: &PackageRepositoryReference,
    ) -> Result<()> {
        require("repository identifier", &reference.identifier)?;
        require("namespace", &reference.context.namespace)?;
        let cluster = self.cluster(&reference.context);
        let namespace = reference.context.namespace.as_str();
        let name = reference.identifier.as_str();

        let repo: PackageRepository = self.get_resource(cluster, namespace, name).await?;
        let credentials = self.credentials(cluster);
        let state = credentials.state(&repo).await?;

        self.store()
            .delete::<PackageRepository>(cluster, namespace, name)
            .await
            .map_err(|e| e.into_core("delete", "PackageRepository", name))?;
        tracing::info!(repository = name, namespace, "deleted package repository");

        if let AuthState::PluginManaged(secret) = state {
            credentials.discard(namespace, secret.name()).await;
        }
        Ok(())
    }

    async fn repository_verbs(
        &self,
        cluster: &str,
        namespace: &str,
    ) -> Result<IndexMap<String, bool>> {
        let mut verbs = IndexMap::new();
        for verb in REPOSITORY_VERBS {
            let allowed = self
                .store()
                .can_i(&PACKAGE_REPOSITORY, cluster, namespace, verb)
                .await
                .map_err(|e| e.into_core("check access to", "PackageRepository", ""))?;
            verbs.insert(verb.to_string(), allowed);
        }
        Ok(verbs)
    }

    /// What the caller may do with repositories globally and in a namespace
    pub async fn get_package_repository_permissions(
        &self,
        context: &Context,
    ) -> Result<PackageRepositoriesPermissions> {
        let cluster = self.cluster(context);
        let global = self.repository_verbs(cluster, self.global_namespace()).await?;
        let namespace = if context.namespace.is_empty() {
            IndexMap::new()
        } else {
            self.repository_verbs(cluster, &context.namespace).await?
        };

        Ok(PackageRepositoriesPermissions {
            plugin: self.config().plugin.clone(),
            global,
            namespace,
        })
    }
}

//! Credential lifecycle of a repository
//!
//! Auth is either plugin-managed (the request carries credentials, the
//! plugin owns a secret holding them) or user-managed (the request names an
//! existing secret). A repository keeps the mode it was created with.
//!
//! Writes are ordered so every failure leaves at most one orphan the caller
//! can remove: on create the secret comes first and is owned by the
//! repository afterwards; on update a new secret is created, the
//! repository relinked, and only then is the old secret deleted.

use k8s_openapi::api::core::v1::Secret;
use kpkg_core::CoreError;
use kpkg_core::api::{AuthType, PackageRepositoryAuth, RepositoryCredentials, RepositoryType};
use kpkg_kube::resources::{PackageRepository, Resource};
use kpkg_kube::{ResourceStore, TypedStore};

use crate::Result;
use crate::auth;
use crate::credentials::ResolvedCredentials;
use crate::fetch;
use crate::secret;

/// Auth a request asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthRequest {
    None,
    /// Credentials the plugin stores in a secret it owns
    Managed(RepositoryCredentials),
    /// A secret the user created and keeps managing
    UserManaged {
        auth_type: AuthType,
        secret_name: String,
    },
}

impl AuthRequest {
    /// Interpret the auth section of a request
    pub fn from_api(auth: Option<&PackageRepositoryAuth>) -> Result<Self> {
        let Some(auth) = auth else {
            return Ok(Self::None);
        };
        let secret_ref = auth.secret_ref.as_deref().filter(|s| !s.is_empty());

        match (secret_ref, &auth.credentials) {
            (Some(_), Some(_)) => Err(CoreError::invalid_argument(
                "auth cannot combine a secret reference with inline credentials",
            )),
            (None, None) if auth.auth_type == AuthType::None => Ok(Self::None),
            (None, None) => Err(CoreError::invalid_argument(format!(
                "{} auth requires credentials or a secret reference",
                auth.auth_type
            ))),
            (_, _) if auth.auth_type == AuthType::None => Err(CoreError::invalid_argument(
                "auth type must be set when credentials or a secret reference are given",
            )),
            (Some(name), None) => Ok(Self::UserManaged {
                auth_type: auth.auth_type,
                secret_name: name.to_string(),
            }),
            (None, Some(credentials)) => {
                if credentials.auth_type() != auth.auth_type {
                    return Err(CoreError::invalid_argument(format!(
                        "auth type {} does not match the {} credentials given",
                        auth.auth_type,
                        credentials.auth_type()
                    )));
                }
                Ok(Self::Managed(credentials.clone()))
            }
        }
    }

    pub fn auth_type(&self) -> AuthType {
        match self {
            Self::None => AuthType::None,
            Self::Managed(credentials) => credentials.auth_type(),
            Self::UserManaged { auth_type, .. } => *auth_type,
        }
    }
}

/// Auth currently configured on a repository
#[derive(Debug, Clone)]
pub enum AuthState {
    None,
    PluginManaged(Secret),
    UserManaged(Secret),
    /// The referenced secret does not exist
    Missing(String),
}

impl AuthState {
    pub fn secret_name(&self) -> Option<&str> {
        match self {
            Self::None => None,
            Self::PluginManaged(s) | Self::UserManaged(s) => s.metadata.name.as_deref(),
            Self::Missing(name) => Some(name),
        }
    }
}

/// Secret prepared for a repository about to be created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedSecret {
    pub name: String,
    pub managed: bool,
}

/// Outcome of planning an auth change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthUpdate {
    /// The repository keeps its current secret reference
    Unchanged,
    /// A new plugin-managed secret was created and must be linked
    Managed {
        secret_name: String,
        previous: Option<String>,
    },
    /// The repository now references a user-managed secret
    Reference { secret_name: String },
    /// Auth is removed; the previous secret is deleted when plugin-managed
    Removed { previous: String, delete: bool },
}

impl AuthUpdate {
    /// Secret the repository references once the update applies
    pub fn secret_name<'a>(&'a self, current: Option<&'a str>) -> Option<&'a str> {
        match self {
            Self::Unchanged => current,
            Self::Managed { secret_name, .. } | Self::Reference { secret_name } => {
                Some(secret_name)
            }
            Self::Removed { .. } => None,
        }
    }
}

/// Manages the secrets behind repository auth
pub struct CredentialManager<'a, S: ?Sized> {
    store: &'a S,
    cluster: &'a str,
    managed_by: &'a str,
}

impl<'a, S: ResourceStore + ?Sized> CredentialManager<'a, S> {
    pub fn new(store: &'a S, cluster: &'a str, managed_by: &'a str) -> Self {
        Self {
            store,
            cluster,
            managed_by,
        }
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret> {
        self.store
            .get::<Secret>(self.cluster, namespace, name)
            .await
            .map_err(|e| e.into_core("get", "Secret", name))
    }

    async fn create_managed(
        &self,
        repo_name: &str,
        namespace: &str,
        credentials: &ResolvedCredentials,
    ) -> Result<String> {
        let secret = secret::managed_secret(repo_name, namespace, credentials, self.managed_by)?;
        let name = secret.name().to_string();
        self.store
            .create(self.cluster, namespace, &secret)
            .await
            .map_err(|e| e.into_core("create", "Secret", &name))?;
        tracing::debug!(secret = %name, repository = repo_name, "created repository secret");
        Ok(name)
    }

    async fn validate_user_secret(
        &self,
        namespace: &str,
        secret_name: &str,
        auth_type: AuthType,
    ) -> Result<()> {
        let secret = self.get_secret(namespace, secret_name).await?;
        auth::validate_secret_type(&secret, auth_type)
    }

    /// Inspect the auth a repository is configured with
    pub async fn state(&self, repo: &PackageRepository) -> Result<AuthState> {
        let Some(name) = repo.secret_name() else {
            return Ok(AuthState::None);
        };
        match self.store.get::<Secret>(self.cluster, repo.namespace(), name).await {
            Ok(secret) if secret::is_plugin_managed(&secret, repo, self.managed_by) => {
                Ok(AuthState::PluginManaged(secret))
            }
            Ok(secret) => Ok(AuthState::UserManaged(secret)),
            Err(e) if e.is_not_found() => {
                tracing::warn!(
                    "repository '{}' references missing secret '{}'",
                    repo.name(),
                    name
                );
                Ok(AuthState::Missing(name.to_string()))
            }
            Err(e) => Err(e.into_core("get", "Secret", name)),
        }
    }

    /// Auth to report for a repository, with credentials redacted
    pub async fn auth_for_detail(
        &self,
        repo: &PackageRepository,
    ) -> Result<Option<PackageRepositoryAuth>> {
        let auth = match self.state(repo).await? {
            AuthState::None => None,
            AuthState::PluginManaged(s) => {
                let auth_type = auth::classify(&s)?;
                Some(secret::redacted_auth(auth_type, s.name(), true))
            }
            AuthState::UserManaged(s) => {
                let auth_type = auth::classify(&s).unwrap_or_else(|e| {
                    tracing::warn!("cannot classify secret '{}': {}", s.name(), e);
                    AuthType::None
                });
                Some(secret::redacted_auth(auth_type, s.name(), false))
            }
            AuthState::Missing(name) => Some(secret::redacted_auth(AuthType::None, &name, false)),
        };
        Ok(auth)
    }

    /// Prepare the secret for a repository that does not exist yet
    ///
    /// A plugin-managed secret is created here and must be handed to
    /// [`Self::adopt`] once the repository exists, or to [`Self::discard`]
    /// if creating it fails.
    pub async fn prepare_create(
        &self,
        repo_name: &str,
        namespace: &str,
        repo_type: RepositoryType,
        request: &AuthRequest,
    ) -> Result<Option<PreparedSecret>> {
        fetch::validate_auth(repo_type, request.auth_type())?;
        match request {
            AuthRequest::None => Ok(None),
            AuthRequest::Managed(credentials) => {
                let resolved = ResolvedCredentials::resolve(credentials, None)?;
                let name = self.create_managed(repo_name, namespace, &resolved).await?;
                Ok(Some(PreparedSecret {
                    name,
                    managed: true,
                }))
            }
            AuthRequest::UserManaged {
                auth_type,
                secret_name,
            } => {
                self.validate_user_secret(namespace, secret_name, *auth_type)
                    .await?;
                Ok(Some(PreparedSecret {
                    name: secret_name.clone(),
                    managed: false,
                }))
            }
        }
    }

    /// Make a repository the owner of its plugin-managed secret
    pub async fn adopt(
        &self,
        namespace: &str,
        secret_name: &str,
        repo: &PackageRepository,
    ) -> Result<()> {
        let mut secret = self.get_secret(namespace, secret_name).await?;
        secret::set_owner(&mut secret, repo)?;
        self.store
            .update(self.cluster, namespace, &secret)
            .await
            .map_err(|e| e.into_core("update", "Secret", secret_name))?;
        Ok(())
    }

    /// Delete a secret as part of cleanup, tolerating its absence
    ///
    /// Failures are logged rather than returned so the caller can surface
    /// the error that triggered the cleanup.
    pub async fn discard(&self, namespace: &str, secret_name: &str) {
        match self
            .store
            .delete::<Secret>(self.cluster, namespace, secret_name)
            .await
        {
            Ok(()) => tracing::debug!(secret = secret_name, "deleted repository secret"),
            Err(e) if e.is_not_found() => {}
            Err(e) => tracing::warn!("failed to delete secret '{}': {}", secret_name, e),
        }
    }

    /// Work out and stage an auth change on an existing repository
    ///
    /// A new plugin-managed secret is created here. Nothing else is written.
    pub async fn plan_update(
        &self,
        repo: &PackageRepository,
        repo_type: RepositoryType,
        request: &AuthRequest,
    ) -> Result<AuthUpdate> {
        fetch::validate_auth(repo_type, request.auth_type())?;
        let namespace = repo.namespace();
        let state = self.state(repo).await?;

        let mode_change = || {
            CoreError::invalid_argument(
                "auth management mode cannot be changed, remove auth first",
            )
        };

        match (state, request) {
            (AuthState::PluginManaged(_), AuthRequest::UserManaged { .. })
            | (AuthState::UserManaged(_), AuthRequest::Managed(_)) => Err(mode_change()),

            (AuthState::PluginManaged(old), AuthRequest::Managed(credentials)) => {
                let stored = ResolvedCredentials::from_secret(&old)?;
                if stored.auth_type() == credentials.auth_type() && credentials.is_all_keep() {
                    return Ok(AuthUpdate::Unchanged);
                }
                let resolved = ResolvedCredentials::resolve(credentials, Some(&stored))?;
                if resolved == stored {
                    return Ok(AuthUpdate::Unchanged);
                }
                let secret_name = self.create_managed(repo.name(), namespace, &resolved).await?;
                Ok(AuthUpdate::Managed {
                    secret_name,
                    previous: Some(old.name().to_string()),
                })
            }

            (
                AuthState::None | AuthState::Missing(_),
                AuthRequest::Managed(credentials),
            ) => {
                let resolved = ResolvedCredentials::resolve(credentials, None)?;
                let secret_name = self.create_managed(repo.name(), namespace, &resolved).await?;
                Ok(AuthUpdate::Managed {
                    secret_name,
                    previous: None,
                })
            }

            (
                state,
                AuthRequest::UserManaged {
                    auth_type,
                    secret_name,
                },
            ) => {
                self.validate_user_secret(namespace, secret_name, *auth_type)
                    .await?;
                if state.secret_name() == Some(secret_name.as_str()) {
                    Ok(AuthUpdate::Unchanged)
                } else {
                    Ok(AuthUpdate::Reference {
                        secret_name: secret_name.clone(),
                    })
                }
            }

            (AuthState::PluginManaged(old), AuthRequest::None) => Ok(AuthUpdate::Removed {
                previous: old.name().to_string(),
                delete: true,
            }),
            (AuthState::UserManaged(_) | AuthState::Missing(_), AuthRequest::None) => {
                let previous = repo.secret_name().unwrap_or_default().to_string();
                Ok(AuthUpdate::Removed {
                    previous,
                    delete: false,
                })
            }
            (AuthState::None, AuthRequest::None) => Ok(AuthUpdate::Unchanged),
        }
    }

    /// Finish an update once the repository has been relinked
    pub async fn complete_update(
        &self,
        update: &AuthUpdate,
        repo: &PackageRepository,
    ) -> Result<()> {
        let namespace = repo.namespace();
        match update {
            AuthUpdate::Managed {
                secret_name,
                previous,
            } => {
                if let Some(previous) = previous {
                    self.discard(namespace, previous).await;
                }
                self.adopt(namespace, secret_name, repo).await
            }
            AuthUpdate::Removed {
                previous,
                delete: true,
            } => {
                self.discard(namespace, previous).await;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Undo a staged update after the repository could not be relinked
    pub async fn rollback_update(&self, namespace: &str, update: &AuthUpdate) {
        if let AuthUpdate::Managed { secret_name, .. } = update {
            self.discard(namespace, secret_name).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::tests::secret_with;
    use kpkg_core::api::SecretField;
    use kpkg_kube::MockStore;
    use kpkg_kube::resources::{ImgpkgBundleFetch, SECRET};

    const CLUSTER: &str = "default";

    fn basic(username: &str, password: &str) -> AuthRequest {
        AuthRequest::Managed(RepositoryCredentials::BasicAuth {
            username: SecretField::from_wire(username),
            password: SecretField::from_wire(password),
        })
    }

    /// Repository with a plugin-managed secret holding foo/bar
    async fn managed_repo(store: &MockStore) -> (PackageRepository, String) {
        let mut repo = PackageRepository::default();
        repo.metadata.name = Some("repo".to_string());
        repo.metadata.namespace = Some("default".to_string());
        repo.spec.fetch.imgpkg_bundle = Some(ImgpkgBundleFetch {
            image: "registry.example.com/repo:1.0.0".to_string(),
            ..Default::default()
        });

        let manager = CredentialManager::new(store, CLUSTER, "kpkg");
        let prepared = manager
            .prepare_create("repo", "default", RepositoryType::ImgpkgBundle, &basic("foo", "bar"))
            .await
            .unwrap()
            .unwrap();
        assert!(prepared.managed);

        repo.set_secret_name(Some(&prepared.name));
        store.insert(CLUSTER, &repo).unwrap();
        let repo: PackageRepository = store.object(CLUSTER, "default", "repo").unwrap();
        manager.adopt("default", &prepared.name, &repo).await.unwrap();
        (repo, prepared.name)
    }

    #[test]
    fn test_request_interpretation() {
        assert_eq!(AuthRequest::from_api(None).unwrap(), AuthRequest::None);

        let mixed = PackageRepositoryAuth {
            auth_type: AuthType::BasicAuth,
            secret_ref: Some("s".to_string()),
            credentials: RepositoryCredentials::redacted(AuthType::BasicAuth),
        };
        assert!(AuthRequest::from_api(Some(&mixed)).is_err());

        let mismatched = PackageRepositoryAuth {
            auth_type: AuthType::Ssh,
            secret_ref: None,
            credentials: RepositoryCredentials::redacted(AuthType::BasicAuth),
        };
        assert!(AuthRequest::from_api(Some(&mismatched)).is_err());

        let empty = PackageRepositoryAuth {
            auth_type: AuthType::Bearer,
            ..Default::default()
        };
        assert!(AuthRequest::from_api(Some(&empty)).is_err());

        let user = PackageRepositoryAuth {
            auth_type: AuthType::Ssh,
            secret_ref: Some("git-key".to_string()),
            credentials: None,
        };
        assert_eq!(
            AuthRequest::from_api(Some(&user)).unwrap(),
            AuthRequest::UserManaged {
                auth_type: AuthType::Ssh,
                secret_name: "git-key".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_redacted_update_writes_nothing() {
        let store = MockStore::new();
        let (repo, _) = managed_repo(&store).await;
        store.reset_counts();

        let manager = CredentialManager::new(&store, CLUSTER, "kpkg");
        let update = manager
            .plan_update(&repo, RepositoryType::ImgpkgBundle, &basic("REDACTED", "REDACTED"))
            .await
            .unwrap();
        assert_eq!(update, AuthUpdate::Unchanged);
        manager.complete_update(&update, &repo).await.unwrap();
        assert_eq!(store.operation_counts().writes(), 0);
    }

    #[tokio::test]
    async fn test_password_update_replaces_secret() {
        let store = MockStore::new();
        let (mut repo, old_name) = managed_repo(&store).await;

        let manager = CredentialManager::new(&store, CLUSTER, "kpkg");
        let update = manager
            .plan_update(&repo, RepositoryType::ImgpkgBundle, &basic("REDACTED", "baz"))
            .await
            .unwrap();
        let AuthUpdate::Managed {
            secret_name,
            previous,
        } = &update
        else {
            panic!("expected a new managed secret, got {update:?}");
        };
        assert_eq!(previous.as_deref(), Some(old_name.as_str()));

        let linked = update.secret_name(repo.secret_name()).map(str::to_string);
        repo.set_secret_name(linked.as_deref());
        manager.complete_update(&update, &repo).await.unwrap();

        assert!(store.object::<Secret>(CLUSTER, "default", &old_name).is_none());
        let new_secret: Secret = store.object(CLUSTER, "default", secret_name).unwrap();
        assert!(secret::is_plugin_managed(&new_secret, &repo, "kpkg"));
        assert_eq!(
            ResolvedCredentials::from_secret(&new_secret).unwrap(),
            ResolvedCredentials::Basic {
                username: "foo".to_string(),
                password: "baz".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_mode_change_rejected() {
        let store = MockStore::new();
        let (repo, _) = managed_repo(&store).await;
        store
            .insert(CLUSTER, &secret_with("user-secret", &[("token", "t")]))
            .unwrap();

        let manager = CredentialManager::new(&store, CLUSTER, "kpkg");
        let request = AuthRequest::UserManaged {
            auth_type: AuthType::Bearer,
            secret_name: "user-secret".to_string(),
        };
        let err = manager
            .plan_update(&repo, RepositoryType::ImgpkgBundle, &request)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("mode cannot be changed"));
    }

    #[tokio::test]
    async fn test_remove_managed_auth_deletes_secret() {
        let store = MockStore::new();
        let (repo, old_name) = managed_repo(&store).await;

        let manager = CredentialManager::new(&store, CLUSTER, "kpkg");
        let update = manager
            .plan_update(&repo, RepositoryType::ImgpkgBundle, &AuthRequest::None)
            .await
            .unwrap();
        assert_eq!(update.secret_name(repo.secret_name()), None);
        manager.complete_update(&update, &repo).await.unwrap();
        assert!(store.object::<Secret>(CLUSTER, "default", &old_name).is_none());
    }

    #[tokio::test]
    async fn test_user_secret_validated() {
        let store = MockStore::new();
        store
            .insert(CLUSTER, &secret_with("git-key", &[("ssh-privatekey", "k")]))
            .unwrap();
        let manager = CredentialManager::new(&store, CLUSTER, "kpkg");

        let ok = AuthRequest::UserManaged {
            auth_type: AuthType::Ssh,
            secret_name: "git-key".to_string(),
        };
        let prepared = manager
            .prepare_create("repo", "default", RepositoryType::Git, &ok)
            .await
            .unwrap()
            .unwrap();
        assert!(!prepared.managed);

        let wrong_type = AuthRequest::UserManaged {
            auth_type: AuthType::BasicAuth,
            secret_name: "git-key".to_string(),
        };
        assert!(
            manager
                .prepare_create("repo", "default", RepositoryType::Git, &wrong_type)
                .await
                .is_err()
        );

        let missing = AuthRequest::UserManaged {
            auth_type: AuthType::Ssh,
            secret_name: "nope".to_string(),
        };
        let err = manager
            .prepare_create("repo", "default", RepositoryType::Git, &missing)
            .await
            .unwrap_err();
        assert_eq!(err.code(), kpkg_core::Code::NotFound);
    }

    #[tokio::test]
    async fn test_detail_auth_is_redacted() {
        let store = MockStore::new();
        let (repo, _) = managed_repo(&store).await;
        let manager = CredentialManager::new(&store, CLUSTER, "kpkg");

        let auth = manager.auth_for_detail(&repo).await.unwrap().unwrap();
        assert_eq!(auth.auth_type, AuthType::BasicAuth);
        assert_eq!(auth.secret_ref, None);
        assert!(auth.credentials.unwrap().is_all_keep());
    }

    #[tokio::test]
    async fn test_discard_tolerates_failures() {
        let store = MockStore::new();
        let manager = CredentialManager::new(&store, CLUSTER, "kpkg");
        manager.discard("default", "never-created").await;

        store.fail_next("delete", &SECRET, 500);
        manager.discard("default", "never-created").await;
        assert_eq!(store.operation_counts().deletes, 2);
    }
}

//! Fetch sources of a repository and the auth each accepts

use kpkg_core::CoreError;
use kpkg_core::api::{AuthType, RepositoryType};
use kpkg_kube::resources::PackageRepository;

use crate::Result;

/// Type of the configured fetch source, if any
pub fn repository_type(repo: &PackageRepository) -> Option<RepositoryType> {
    let fetch = &repo.spec.fetch;
    if fetch.imgpkg_bundle.is_some() {
        Some(RepositoryType::ImgpkgBundle)
    } else if fetch.image.is_some() {
        Some(RepositoryType::Image)
    } else if fetch.git.is_some() {
        Some(RepositoryType::Git)
    } else if fetch.http.is_some() {
        Some(RepositoryType::Http)
    } else if fetch.inline.is_some() {
        Some(RepositoryType::Inline)
    } else {
        None
    }
}

/// URL of the configured fetch source, empty for inline repositories
pub fn repository_url(repo: &PackageRepository) -> &str {
    let fetch = &repo.spec.fetch;
    fetch
        .imgpkg_bundle
        .as_ref()
        .map(|f| f.image.as_str())
        .or_else(|| fetch.image.as_ref().map(|f| f.url.as_str()))
        .or_else(|| fetch.git.as_ref().map(|f| f.url.as_str()))
        .or_else(|| fetch.http.as_ref().map(|f| f.url.as_str()))
        .unwrap_or_default()
}

/// Auth types a fetch source can use
pub fn allowed_auth_types(repo_type: RepositoryType) -> &'static [AuthType] {
    match repo_type {
        RepositoryType::ImgpkgBundle | RepositoryType::Image => &[
            AuthType::BasicAuth,
            AuthType::DockerConfig,
            AuthType::Bearer,
        ],
        RepositoryType::Git => &[AuthType::BasicAuth, AuthType::Ssh],
        RepositoryType::Http => &[AuthType::BasicAuth],
        RepositoryType::Inline => &[],
    }
}

/// Reject auth a fetch source cannot use
pub fn validate_auth(repo_type: RepositoryType, auth_type: AuthType) -> Result<()> {
    if auth_type == AuthType::None || allowed_auth_types(repo_type).contains(&auth_type) {
        Ok(())
    } else {
        Err(CoreError::invalid_argument(format!(
            "auth type {} is not supported for {} repositories",
            auth_type, repo_type
        )))
    }
}

//! Plugin-managed repository secrets
//!
//! A secret created by the plugin carries the managed-by annotation and,
//! once the repository exists, a controller owner reference to it. Both
//! must be present for the secret to count as plugin-managed.

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kpkg_core::CoreError;
use kpkg_core::api::{AuthType, PackageRepositoryAuth, RepositoryCredentials};
use kpkg_kube::resources::{PACKAGE_REPOSITORY, PackageRepository, Resource};
use rand::Rng;
use std::collections::BTreeMap;

use crate::Result;
use crate::credentials::ResolvedCredentials;

pub const MANAGED_BY_ANNOTATION: &str = "app.kubernetes.io/managed-by";

/// Characters used for generated name suffixes
const SUFFIX_CHARS: &[u8] = b"bcdfghjklmnpqrstvwxz2456789";
const SUFFIX_LEN: usize = 5;
const MAX_PREFIX_LEN: usize = 58;

/// `{repo}-{random suffix}`, the prefix truncated to keep a valid name
pub fn generate_secret_name(repo_name: &str) -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| SUFFIX_CHARS[rng.random_range(0..SUFFIX_CHARS.len())] as char)
        .collect();
    let prefix: String = repo_name.chars().take(MAX_PREFIX_LEN).collect();
    format!("{}-{}", prefix.trim_end_matches('-'), suffix)
}

/// Build a new plugin-managed secret for a repository
pub fn managed_secret(
    repo_name: &str,
    namespace: &str,
    credentials: &ResolvedCredentials,
    managed_by: &str,
) -> Result<Secret> {
    Ok(Secret {
        metadata: ObjectMeta {
            name: Some(generate_secret_name(repo_name)),
            namespace: Some(namespace.to_string()),
            annotations: Some(BTreeMap::from([(
                MANAGED_BY_ANNOTATION.to_string(),
                managed_by.to_string(),
            )])),
            ..Default::default()
        },
        type_: Some(credentials.secret_type().to_string()),
        data: Some(credentials.secret_data()?),
        ..Default::default()
    })
}

/// Controller owner reference pointing at a repository
pub fn owner_reference(repo: &PackageRepository) -> Result<OwnerReference> {
    let uid = repo.metadata.uid.clone().ok_or_else(|| {
        CoreError::internal(format!(
            "repository '{}' has no uid to own its secret",
            repo.name()
        ))
    })?;
    Ok(OwnerReference {
        api_version: PACKAGE_REPOSITORY.api_version(),
        kind: PACKAGE_REPOSITORY.kind.to_string(),
        name: repo.name().to_string(),
        uid,
        controller: Some(true),
        block_owner_deletion: None,
    })
}

/// Make the repository the secret's controller
pub fn set_owner(secret: &mut Secret, repo: &PackageRepository) -> Result<()> {
    let owner = owner_reference(repo)?;
    let refs = secret.metadata.owner_references.get_or_insert_with(Vec::new);
    refs.retain(|r| !(r.kind == owner.kind && r.name == owner.name));
    refs.push(owner);
    Ok(())
}

fn is_controlled_by(secret: &Secret, repo: &PackageRepository) -> bool {
    secret
        .metadata
        .owner_references
        .iter()
        .flatten()
        .any(|r| {
            r.kind == PACKAGE_REPOSITORY.kind
                && r.name == repo.name()
                && r.controller == Some(true)
        })
}

/// Whether the plugin created this secret for this repository
pub fn is_plugin_managed(secret: &Secret, repo: &PackageRepository, managed_by: &str) -> bool {
    let annotated = secret
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(MANAGED_BY_ANNOTATION))
        .is_some_and(|v| v == managed_by);
    annotated && is_controlled_by(secret, repo)
}

/// Auth as reported on read
///
/// Plugin-managed secrets are reported by type with every value redacted.
/// User-managed secrets are reported by name only.
pub fn redacted_auth(auth_type: AuthType, secret_name: &str, managed: bool) -> PackageRepositoryAuth {
    if managed {
        PackageRepositoryAuth {
            auth_type,
            secret_ref: None,
            credentials: RepositoryCredentials::redacted(auth_type),
        }
    } else {
        PackageRepositoryAuth {
            auth_type,
            secret_ref: Some(secret_name.to_string()),
            credentials: None,
        }
    }
}

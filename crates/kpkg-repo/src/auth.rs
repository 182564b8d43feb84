//! Auth-type classification of repository secrets
//!
//! A secret's auth type is inferred from the well-known keys present in
//! its data. A well-formed secret matches exactly one type.

use k8s_openapi::api::core::v1::Secret;
use kpkg_core::CoreError;
use kpkg_core::api::AuthType;

use crate::Result;

pub const USERNAME_KEY: &str = "username";
pub const PASSWORD_KEY: &str = "password";
pub const SSH_PRIVATE_KEY_KEY: &str = "ssh-privatekey";
pub const SSH_KNOWN_HOSTS_KEY: &str = "ssh-knownhosts";
pub const DOCKER_CONFIG_KEY: &str = ".dockerconfigjson";
pub const BEARER_TOKEN_KEY: &str = "token";

pub const BASIC_AUTH_SECRET_TYPE: &str = "kubernetes.io/basic-auth";
pub const SSH_AUTH_SECRET_TYPE: &str = "kubernetes.io/ssh-auth";
pub const DOCKER_CONFIG_SECRET_TYPE: &str = "kubernetes.io/dockerconfigjson";
pub const OPAQUE_SECRET_TYPE: &str = "Opaque";

fn has_key(secret: &Secret, key: &str) -> bool {
    secret.data.as_ref().is_some_and(|d| d.contains_key(key))
        || secret.string_data.as_ref().is_some_and(|d| d.contains_key(key))
}

/// String value of a secret key, from `data` or `stringData`
pub fn secret_value(secret: &Secret, key: &str) -> Option<String> {
    if let Some(value) = secret.data.as_ref().and_then(|d| d.get(key)) {
        return String::from_utf8(value.0.clone()).ok();
    }
    secret.string_data.as_ref().and_then(|d| d.get(key)).cloned()
}

pub fn is_basic_auth(secret: &Secret) -> bool {
    has_key(secret, USERNAME_KEY) && has_key(secret, PASSWORD_KEY)
}

pub fn is_ssh_auth(secret: &Secret) -> bool {
    has_key(secret, SSH_PRIVATE_KEY_KEY)
}

pub fn is_docker_auth(secret: &Secret) -> bool {
    has_key(secret, DOCKER_CONFIG_KEY)
}

pub fn is_bearer_auth(secret: &Secret) -> bool {
    has_key(secret, BEARER_TOKEN_KEY)
}

/// Infer the auth type of a secret
pub fn classify(secret: &Secret) -> Result<AuthType> {
    let matches: Vec<AuthType> = [
        (is_basic_auth(secret), AuthType::BasicAuth),
        (is_ssh_auth(secret), AuthType::Ssh),
        (is_docker_auth(secret), AuthType::DockerConfig),
        (is_bearer_auth(secret), AuthType::Bearer),
    ]
    .into_iter()
    .filter_map(|(matched, auth_type)| matched.then_some(auth_type))
    .collect();

    let name = secret.metadata.name.as_deref().unwrap_or_default();
    match matches.as_slice() {
        [auth_type] => Ok(*auth_type),
        [] => Err(CoreError::invalid_argument(format!(
            "secret '{}' does not contain credentials of a supported auth type",
            name
        ))),
        many => Err(CoreError::invalid_argument(format!(
            "secret '{}' is ambiguous, it matches {} auth types",
            name,
            many.len()
        ))),
    }
}

/// Check that a user-supplied secret holds the declared auth type
pub fn validate_secret_type(secret: &Secret, expected: AuthType) -> Result<()> {
    let actual = classify(secret)?;
    if actual != expected {
        return Err(CoreError::invalid_argument(format!(
            "secret '{}' holds {} credentials but {} was requested",
            secret.metadata.name.as_deref().unwrap_or_default(),
            actual,
            expected
        )));
    }
    Ok(())
}

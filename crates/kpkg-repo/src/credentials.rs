//! Repository credentials and their secret encoding
//!
//! Credentials arrive through the API as [`RepositoryCredentials`], whose
//! fields may be the redaction placeholder. Merging with the stored secret
//! turns them into [`ResolvedCredentials`], which hold real values only.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::Secret;
use kpkg_core::CoreError;
use kpkg_core::api::{AuthType, RepositoryCredentials, SecretField};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::Result;
use crate::auth::{
    self, BASIC_AUTH_SECRET_TYPE, BEARER_TOKEN_KEY, DOCKER_CONFIG_KEY, DOCKER_CONFIG_SECRET_TYPE,
    OPAQUE_SECRET_TYPE, PASSWORD_KEY, SSH_AUTH_SECRET_TYPE, SSH_KNOWN_HOSTS_KEY,
    SSH_PRIVATE_KEY_KEY, USERNAME_KEY,
};

/// Credentials with every value known
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedCredentials {
    Basic {
        username: String,
        password: String,
    },
    Ssh {
        private_key: String,
        known_hosts: Option<String>,
    },
    DockerConfig {
        server: String,
        username: String,
        password: String,
        email: Option<String>,
    },
    Bearer {
        token: String,
    },
}

/// `.dockerconfigjson` format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DockerConfig {
    #[serde(default)]
    pub auths: BTreeMap<String, DockerAuth>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DockerAuth {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,
}

impl DockerAuth {
    /// Username and password, falling back to the encoded `auth` field
    fn user_password(&self) -> Option<(String, String)> {
        if let (Some(u), Some(p)) = (&self.username, &self.password) {
            return Some((u.clone(), p.clone()));
        }
        let decoded = STANDARD.decode(self.auth.as_deref()?).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (u, p) = decoded.split_once(':')?;
        Some((u.to_string(), p.to_string()))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn required(value: Option<String>, field: &str, auth_type: AuthType) -> Result<String> {
    non_empty(value).ok_or_else(|| {
        CoreError::invalid_argument(format!("{} credentials require a {}", auth_type, field))
    })
}

impl ResolvedCredentials {
    pub fn auth_type(&self) -> AuthType {
        match self {
            Self::Basic { .. } => AuthType::BasicAuth,
            Self::Ssh { .. } => AuthType::Ssh,
            Self::DockerConfig { .. } => AuthType::DockerConfig,
            Self::Bearer { .. } => AuthType::Bearer,
        }
    }

    /// Merge requested credentials with the stored ones
    ///
    /// Redacted fields take the stored value. Keeping a value is only
    /// possible when stored credentials of the same type exist.
    pub fn resolve(
        request: &RepositoryCredentials,
        existing: Option<&ResolvedCredentials>,
    ) -> Result<Self> {
        let existing = existing.filter(|e| e.auth_type() == request.auth_type());
        if existing.is_none() && request.fields().iter().any(|f| f.is_keep()) {
            return Err(CoreError::invalid_argument(format!(
                "cannot keep redacted {} values without stored credentials of that type",
                request.auth_type()
            )));
        }

        let keep = |field: &SecretField, stored: Option<&str>| field.resolve(stored);
        let auth_type = request.auth_type();
        let resolved = match request {
            RepositoryCredentials::BasicAuth { username, password } => {
                let (u, p) = match existing {
                    Some(Self::Basic { username, password }) => {
                        (Some(username.as_str()), Some(password.as_str()))
                    }
                    _ => (None, None),
                };
                Self::Basic {
                    username: required(keep(username, u), "username", auth_type)?,
                    password: required(keep(password, p), "password", auth_type)?,
                }
            }
            RepositoryCredentials::Ssh {
                private_key,
                known_hosts,
            } => {
                let (k, h) = match existing {
                    Some(Self::Ssh {
                        private_key,
                        known_hosts,
                    }) => (Some(private_key.as_str()), known_hosts.as_deref()),
                    _ => (None, None),
                };
                Self::Ssh {
                    private_key: required(keep(private_key, k), "private key", auth_type)?,
                    known_hosts: non_empty(keep(known_hosts, h)),
                }
            }
            RepositoryCredentials::DockerConfig {
                server,
                username,
                password,
                email,
            } => {
                let (s, u, p, e) = match existing {
                    Some(Self::DockerConfig {
                        server,
                        username,
                        password,
                        email,
                    }) => (
                        Some(server.as_str()),
                        Some(username.as_str()),
                        Some(password.as_str()),
                        email.as_deref(),
                    ),
                    _ => (None, None, None, None),
                };
                Self::DockerConfig {
                    server: required(keep(server, s), "server", auth_type)?,
                    username: required(keep(username, u), "username", auth_type)?,
                    password: required(keep(password, p), "password", auth_type)?,
                    email: non_empty(keep(email, e)),
                }
            }
            RepositoryCredentials::Bearer { token } => {
                let t = match existing {
                    Some(Self::Bearer { token }) => Some(token.as_str()),
                    _ => None,
                };
                Self::Bearer {
                    token: required(keep(token, t), "token", auth_type)?,
                }
            }
        };
        Ok(resolved)
    }

    /// Read credentials back from a secret
    pub fn from_secret(secret: &Secret) -> Result<Self> {
        let name = secret.metadata.name.as_deref().unwrap_or_default();
        let value = |key: &str| auth::secret_value(secret, key);
        let auth_type = auth::classify(secret)?;

        let resolved = match auth_type {
            AuthType::BasicAuth => Self::Basic {
                username: value(USERNAME_KEY).unwrap_or_default(),
                password: value(PASSWORD_KEY).unwrap_or_default(),
            },
            AuthType::Ssh => Self::Ssh {
                private_key: value(SSH_PRIVATE_KEY_KEY).unwrap_or_default(),
                known_hosts: non_empty(value(SSH_KNOWN_HOSTS_KEY)),
            },
            AuthType::DockerConfig => {
                let raw = value(DOCKER_CONFIG_KEY).unwrap_or_default();
                let config: DockerConfig = serde_json::from_str(&raw).map_err(|e| {
                    CoreError::internal(format!(
                        "secret '{}' holds an invalid docker config: {}",
                        name, e
                    ))
                })?;
                let (server, entry) = config.auths.into_iter().next().ok_or_else(|| {
                    CoreError::internal(format!("secret '{}' has an empty docker config", name))
                })?;
                let (username, password) = entry.user_password().unwrap_or_default();
                Self::DockerConfig {
                    server,
                    username,
                    password,
                    email: non_empty(entry.email),
                }
            }
            AuthType::Bearer => Self::Bearer {
                token: value(BEARER_TOKEN_KEY).unwrap_or_default(),
            },
            AuthType::None => {
                return Err(CoreError::internal(format!(
                    "secret '{}' holds no credentials",
                    name
                )));
            }
        };
        Ok(resolved)
    }

    /// Kubernetes secret type for these credentials
    pub fn secret_type(&self) -> &'static str {
        match self {
            Self::Basic { .. } => BASIC_AUTH_SECRET_TYPE,
            Self::Ssh { .. } => SSH_AUTH_SECRET_TYPE,
            Self::DockerConfig { .. } => DOCKER_CONFIG_SECRET_TYPE,
            Self::Bearer { .. } => OPAQUE_SECRET_TYPE,
        }
    }

    /// Secret data for these credentials
    pub fn secret_data(&self) -> Result<BTreeMap<String, ByteString>> {
        let mut data = BTreeMap::new();
        let mut put = |key: &str, value: &str| {
            data.insert(key.to_string(), ByteString(value.as_bytes().to_vec()));
        };

        match self {
            Self::Basic { username, password } => {
                put(USERNAME_KEY, username);
                put(PASSWORD_KEY, password);
            }
            Self::Ssh {
                private_key,
                known_hosts,
            } => {
                put(SSH_PRIVATE_KEY_KEY, private_key);
                if let Some(hosts) = known_hosts {
                    put(SSH_KNOWN_HOSTS_KEY, hosts);
                }
            }
            Self::DockerConfig {
                server,
                username,
                password,
                email,
            } => {
                let entry = DockerAuth {
                    username: Some(username.clone()),
                    password: Some(password.clone()),
                    email: email.clone(),
                    auth: Some(STANDARD.encode(format!("{}:{}", username, password))),
                };
                let config = DockerConfig {
                    auths: BTreeMap::from([(server.clone(), entry)]),
                };
                let json = serde_json::to_string(&config)
                    .map_err(|e| CoreError::internal(format!("encoding docker config: {}", e)))?;
                put(DOCKER_CONFIG_KEY, &json);
            }
            Self::Bearer { token } => put(BEARER_TOKEN_KEY, token),
        }
        Ok(data)
    }
}

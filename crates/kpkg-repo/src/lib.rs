//! kpkg Repo - credential handling for package repositories
//!
//! - `auth`: inferring the auth type of a secret
//! - `credentials`: resolving redacted credentials and encoding secrets
//! - `secret`: plugin-managed secret naming, ownership and redaction
//! - `fetch`: fetch sources and the auth each accepts
//! - `manager`: the create, update and delete lifecycle of auth secrets

pub mod auth;
pub mod credentials;
pub mod fetch;
pub mod manager;
pub mod secret;

pub use credentials::{DockerAuth, DockerConfig, ResolvedCredentials};
pub use manager::{AuthRequest, AuthState, AuthUpdate, CredentialManager, PreparedSecret};

/// Errors surface in the API taxonomy directly
pub type Result<T> = kpkg_core::Result<T>;

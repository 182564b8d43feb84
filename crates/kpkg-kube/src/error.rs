//! Error types for kpkg-kube

use kpkg_core::CoreError;
use thiserror::Error;

/// Result type for kpkg-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors raised by the backing resource store
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// Object does not exist
    #[error("{kind} '{name}' not found in namespace '{namespace}'")]
    NotFound {
        kind: String,
        namespace: String,
        name: String,
    },

    /// Object already exists
    #[error("{kind} '{name}' already exists in namespace '{namespace}'")]
    AlreadyExists {
        kind: String,
        namespace: String,
        name: String,
    },

    /// Stored object does not match the expected shape
    #[error("unable to decode {kind}: {message}")]
    Decode { kind: String, message: String },

    /// Cluster is not served by the client provider
    #[error("cluster '{0}' is not configured")]
    UnknownCluster(String),

    /// Timeout
    #[error("operation timed out after {elapsed} waiting for {what}")]
    Timeout { what: String, elapsed: String },

    /// Storage error
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<serde_json::Error> for KubeError {
    fn from(e: serde_json::Error) -> Self {
        KubeError::Decode {
            kind: "object".to_string(),
            message: e.to_string(),
        }
    }
}

impl KubeError {
    /// HTTP status of an API error
    pub fn status_code(&self) -> Option<u16> {
        match self {
            KubeError::Api(kube::Error::Api(resp)) => Some(resp.code),
            KubeError::NotFound { .. } => Some(404),
            KubeError::AlreadyExists { .. } => Some(409),
            _ => None,
        }
    }

    /// Check if this is a Kubernetes 404 Not Found error
    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(404)
    }

    /// Check if this is a conflict error (409)
    pub fn is_conflict(&self) -> bool {
        self.status_code() == Some(409)
    }

    /// Translate into the API taxonomy, tagged with what was attempted
    ///
    /// Produces messages like `unable to get the PackageMetadata 'tetris' due to '...'`.
    pub fn into_core(self, verb: &str, kind: &str, name: &str) -> CoreError {
        let message = if name.is_empty() {
            format!("unable to {} the {} due to '{}'", verb, kind, self)
        } else {
            format!("unable to {} the {} '{}' due to '{}'", verb, kind, name, self)
        };

        match self {
            KubeError::Timeout { what, elapsed } => return CoreError::Timeout { what, elapsed },
            KubeError::UnknownCluster(_) => return CoreError::FailedPrecondition(message),
            _ => {}
        }

        match self.status_code() {
            Some(404) => CoreError::NotFound(message),
            Some(409) => CoreError::AlreadyExists(message),
            Some(403) => CoreError::PermissionDenied(message),
            Some(401) => CoreError::Unauthenticated(message),
            Some(400) | Some(422) => CoreError::InvalidArgument(message),
            _ => CoreError::Internal(message),
        }
    }
}

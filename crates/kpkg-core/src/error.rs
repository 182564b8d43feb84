//! Error taxonomy shared by every kpkg operation
//!
//! Each error resolves to a [`Code`], the coarse class a transport layer
//! maps onto its own status codes.

use thiserror::Error;

/// Coarse error class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    InvalidArgument,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    Unauthenticated,
    FailedPrecondition,
    Unimplemented,
    Internal,
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::InvalidArgument => "InvalidArgument",
            Self::NotFound => "NotFound",
            Self::AlreadyExists => "AlreadyExists",
            Self::PermissionDenied => "PermissionDenied",
            Self::Unauthenticated => "Unauthenticated",
            Self::FailedPrecondition => "FailedPrecondition",
            Self::Unimplemented => "Unimplemented",
            Self::Internal => "Internal",
        };
        write!(f, "{}", s)
    }
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    #[error("unimplemented: {0}")]
    Unimplemented(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("package '{name}' has malformed version '{version}': {reason}")]
    MalformedVersion {
        name: String,
        version: String,
        reason: String,
    },

    #[error("invalid version constraint '{constraint}': {reason}")]
    InvalidConstraint { constraint: String, reason: String },

    #[error("no package versions found for package metadata '{namespace}/{name}'")]
    MissingVersions { name: String, namespace: String },

    #[error("unable to interpret page token '{token}': {reason}")]
    InvalidPageToken { token: String, reason: String },

    #[error("timed out after {elapsed} waiting for {what}")]
    Timeout { what: String, elapsed: String },

    #[error("invalid plugin configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Error class for this error
    pub fn code(&self) -> Code {
        match self {
            Self::InvalidArgument(_) | Self::InvalidPageToken { .. } => Code::InvalidArgument,
            Self::NotFound(_) => Code::NotFound,
            Self::AlreadyExists(_) => Code::AlreadyExists,
            Self::PermissionDenied(_) => Code::PermissionDenied,
            Self::Unauthenticated(_) => Code::Unauthenticated,
            Self::FailedPrecondition(_) => Code::FailedPrecondition,
            Self::Unimplemented(_) => Code::Unimplemented,
            Self::Internal(_)
            | Self::MalformedVersion { .. }
            | Self::InvalidConstraint { .. }
            | Self::MissingVersions { .. }
            | Self::Timeout { .. }
            | Self::InvalidConfig(_)
            | Self::Io(_) => Code::Internal,
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn failed_precondition(message: impl Into<String>) -> Self {
        Self::FailedPrecondition(message.into())
    }

    pub fn unimplemented(message: impl Into<String>) -> Self {
        Self::Unimplemented(message.into())
    }

    /// Check if this error means the backing object does not exist
    pub fn is_not_found(&self) -> bool {
        self.code() == Code::NotFound
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

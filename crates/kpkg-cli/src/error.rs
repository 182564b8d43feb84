//! CLI error types with exit code handling
//!
//! Every failure is reported through miette; the exit code tells scripts
//! which class of error occurred.

use kpkg_core::{Code, CoreError};
use kpkg_kube::KubeError;
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// An operation of the plugin failed
    #[error("{message}")]
    #[diagnostic(code(kpkg::cli::plugin))]
    Plugin {
        code: Code,
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Plugin configuration could not be loaded
    #[error("Configuration error: {message}")]
    #[diagnostic(
        code(kpkg::cli::config),
        help("the file must hold a kappController.packages.v1alpha1 section")
    )]
    Config { message: String },

    /// The cluster could not be reached
    #[error("Cluster error: {message}")]
    #[diagnostic(
        code(kpkg::cli::cluster),
        help("check your kubeconfig and current context")
    )]
    Cluster { message: String },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(kpkg::cli::io))]
    Io { message: String },

    /// Output could not be produced
    #[error("Internal error: {message}")]
    #[diagnostic(code(kpkg::cli::internal))]
    Internal { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Plugin { code, .. } => match code {
                Code::InvalidArgument => exit_codes::INVALID_ARGUMENT,
                Code::NotFound => exit_codes::NOT_FOUND,
                Code::PermissionDenied | Code::Unauthenticated => exit_codes::ACCESS_ERROR,
                Code::AlreadyExists | Code::FailedPrecondition => exit_codes::CONFLICT,
                Code::Unimplemented | Code::Internal => exit_codes::ERROR,
            },
            CliError::Config { .. } => exit_codes::CONFIG_ERROR,
            CliError::Cluster { .. } => exit_codes::CLUSTER_ERROR,
            CliError::Io { .. } | CliError::Internal { .. } => exit_codes::ERROR,
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

fn help_for(code: Code) -> Option<String> {
    let help = match code {
        Code::NotFound => "check the name and the namespace (-n)",
        Code::PermissionDenied => "check the RBAC permissions of your current context",
        Code::Unauthenticated => "your credentials for this cluster may have expired",
        Code::FailedPrecondition => "wait for kapp-controller to finish reconciling and retry",
        _ => return None,
    };
    Some(help.to_string())
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidConfig(message) => CliError::Config { message },
            CoreError::Io(e) => CliError::Io {
                message: e.to_string(),
            },
            other => {
                let code = other.code();
                CliError::Plugin {
                    code,
                    message: other.to_string(),
                    help: help_for(code),
                }
            }
        }
    }
}

impl From<KubeError> for CliError {
    fn from(err: KubeError) -> Self {
        CliError::Cluster {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::internal(format!("cannot encode output: {}", err))
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_follow_error_class() {
        let not_found: CliError = CoreError::not_found("PackageInstall 'x'").into();
        assert_eq!(not_found.exit_code(), exit_codes::NOT_FOUND);

        let invalid: CliError = CoreError::invalid_argument("no name provided").into();
        assert_eq!(invalid.exit_code(), exit_codes::INVALID_ARGUMENT);

        let config: CliError = CoreError::InvalidConfig("bad".into()).into();
        assert_eq!(config.exit_code(), exit_codes::CONFIG_ERROR);

        let missing = CoreError::MissingVersions {
            name: "tetris".into(),
            namespace: "default".into(),
        };
        assert_eq!(CliError::from(missing).exit_code(), exit_codes::ERROR);
    }

    #[test]
    fn test_help_is_attached_to_known_codes() {
        match CliError::from(CoreError::not_found("x")) {
            CliError::Plugin { help, .. } => assert!(help.is_some()),
            other => panic!("unexpected error: {other:?}"),
        }
        match CliError::from(CoreError::internal("x")) {
            CliError::Plugin { help, .. } => assert!(help.is_none()),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

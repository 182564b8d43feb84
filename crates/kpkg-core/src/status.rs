//! Reconciliation status projection
//!
//! kapp-controller reports progress as a condition on the reconciled
//! object. The API surface only exposes a small status enum plus a human
//! reason, recomputed on every read.

use serde::{Deserialize, Serialize};

/// Condition type reported by the reconciling controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileCondition {
    Reconciling,
    ReconcileSucceeded,
    ReconcileFailed,
    Deleting,
    DeleteFailed,
    ValuesSchemaCheckFailed,
    Other(String),
}

impl ReconcileCondition {
    pub fn parse(condition_type: &str) -> Self {
        match condition_type {
            "Reconciling" => Self::Reconciling,
            "ReconcileSucceeded" => Self::ReconcileSucceeded,
            "ReconcileFailed" => Self::ReconcileFailed,
            "Deleting" => Self::Deleting,
            "DeleteFailed" => Self::DeleteFailed,
            "ValuesSchemaCheckFailed" => Self::ValuesSchemaCheckFailed,
            other => Self::Other(other.to_string()),
        }
    }

    /// Whether the controller is still working on the object
    pub fn is_transitioning(&self) -> bool {
        matches!(self, Self::Reconciling | Self::Deleting)
    }

    fn reason(&self) -> StatusReason {
        match self {
            Self::ReconcileSucceeded => StatusReason::Installed,
            Self::Reconciling | Self::Deleting => StatusReason::Pending,
            Self::ReconcileFailed | Self::DeleteFailed | Self::ValuesSchemaCheckFailed => {
                StatusReason::Failed
            }
            Self::Other(_) => StatusReason::Unspecified,
        }
    }

    fn short_reason(&self) -> &'static str {
        match self {
            Self::ReconcileSucceeded => "Deployed",
            Self::Reconciling => "Reconciling",
            Self::Deleting => "Deleting",
            Self::ReconcileFailed => "Reconcile failed",
            Self::DeleteFailed => "Delete failed",
            Self::ValuesSchemaCheckFailed => "Values schema check failed",
            Self::Other(_) => "Unknown",
        }
    }
}

/// API-facing status class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusReason {
    #[default]
    Unspecified,
    Pending,
    Installed,
    Failed,
}

impl std::fmt::Display for StatusReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unspecified => "unspecified",
            Self::Pending => "pending",
            Self::Installed => "installed",
            Self::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Which payload the status is projected for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusView {
    /// List views always use the short reason
    Summary,
    /// Detail views prefer the controller's full error message
    Detail,
}

/// Projected status of a package install or repository
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageStatus {
    pub ready: bool,
    pub reason: StatusReason,
    pub user_reason: String,
}

/// Project a condition into an API status
pub fn project(
    condition: Option<&ReconcileCondition>,
    useful_error_message: Option<&str>,
    view: StatusView,
) -> PackageStatus {
    let Some(condition) = condition else {
        return PackageStatus {
            ready: false,
            reason: StatusReason::Unspecified,
            user_reason: "No status information yet".to_string(),
        };
    };

    let user_reason = match (view, useful_error_message) {
        (StatusView::Detail, Some(message)) if !message.trim().is_empty() => message.to_string(),
        _ => condition.short_reason().to_string(),
    };

    PackageStatus {
        ready: *condition == ReconcileCondition::ReconcileSucceeded,
        reason: condition.reason(),
        user_reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(condition: &str) -> PackageStatus {
        project(
            Some(&ReconcileCondition::parse(condition)),
            Some("kapp: Error: waiting on reconcile"),
            StatusView::Summary,
        )
    }

    #[test]
    fn test_condition_mapping() {
        let cases = [
            ("ReconcileSucceeded", StatusReason::Installed, "Deployed"),
            ("Reconciling", StatusReason::Pending, "Reconciling"),
            ("Deleting", StatusReason::Pending, "Deleting"),
            ("ReconcileFailed", StatusReason::Failed, "Reconcile failed"),
            ("DeleteFailed", StatusReason::Failed, "Delete failed"),
            (
                "ValuesSchemaCheckFailed",
                StatusReason::Failed,
                "Values schema check failed",
            ),
            ("SomethingNew", StatusReason::Unspecified, "Unknown"),
        ];

        for (condition, reason, user_reason) in cases {
            let status = summary(condition);
            assert_eq!(status.reason, reason, "{condition}");
            assert_eq!(status.user_reason, user_reason, "{condition}");
            assert_eq!(status.ready, condition == "ReconcileSucceeded");
        }
    }

    #[test]
    fn test_missing_condition() {
        let status = project(None, Some("ignored"), StatusView::Detail);
        assert!(!status.ready);
        assert_eq!(status.reason, StatusReason::Unspecified);
        assert_eq!(status.user_reason, "No status information yet");
    }

    #[test]
    fn test_detail_prefers_useful_error_message() {
        let failed = ReconcileCondition::parse("ReconcileFailed");
        let message = "Deploying: Error (see .status.usefulErrorMessage for details)";

        let detail = project(Some(&failed), Some(message), StatusView::Detail);
        assert_eq!(detail.user_reason, message);
        assert_eq!(detail.reason, StatusReason::Failed);

        let summary = project(Some(&failed), Some(message), StatusView::Summary);
        assert_eq!(summary.user_reason, "Reconcile failed");

        let blank = project(Some(&failed), Some("  "), StatusView::Detail);
        assert_eq!(blank.user_reason, "Reconcile failed");
    }

    #[test]
    fn test_transitioning_conditions() {
        assert!(ReconcileCondition::Reconciling.is_transitioning());
        assert!(ReconcileCondition::Deleting.is_transitioning());
        assert!(!ReconcileCondition::ReconcileFailed.is_transitioning());
        assert!(!ReconcileCondition::ReconcileSucceeded.is_transitioning());
    }
}

//! Display formatting for CLI output

use std::time::Duration;

use console::{StyledObject, style};
use indicatif::{ProgressBar, ProgressStyle};
use kpkg_core::{PackageStatus, StatusReason};
use serde::Serialize;

use crate::error::Result;

/// Print any payload as pretty JSON
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Colored status word
pub fn status_style(status: &PackageStatus) -> StyledObject<String> {
    let text = status.reason.to_string();
    match status.reason {
        StatusReason::Installed => style(text).green(),
        StatusReason::Failed => style(text).red(),
        StatusReason::Pending => style(text).yellow(),
        StatusReason::Unspecified => style(text).dim(),
    }
}

/// Placeholder for empty cells
pub fn or_dash(value: &str) -> &str {
    if value.is_empty() { "-" } else { value }
}

/// Spinner on stderr while the cluster is queried
pub fn spinner(message: impl Into<String>) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        spinner.set_style(template);
    }
    spinner.set_message(message.into());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Print a `key: value` line of a detail view
pub fn field(key: &str, value: impl std::fmt::Display) {
    println!("{:<18} {}", style(format!("{}:", key)).bold(), value);
}

/// Print a section heading of a detail view
pub fn heading(title: &str) {
    println!();
    println!("{}", style(title).bold().underlined());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_or_dash() {
        assert_eq!(or_dash(""), "-");
        assert_eq!(or_dash("1.2.3"), "1.2.3");
    }

    #[test]
    fn test_status_text() {
        let status = PackageStatus {
            ready: true,
            reason: StatusReason::Installed,
            user_reason: "Deployed".to_string(),
        };
        assert_eq!(status_style(&status).force_styling(false).to_string(), "installed");
    }
}

//! Installed packages - list, inspect, install, upgrade and remove

use std::path::Path;
use std::time::Duration;

use console::style;
use kpkg_core::PaginationOptions;
use kpkg_core::api::{
    AvailablePackageReference, CreateInstalledPackageRequest, InstalledPackageReference,
    ReconciliationOptions, UpdateInstalledPackageRequest, VersionReference,
};

use super::{KubeServer, context};
use crate::display::{self, or_dash, status_style};
use crate::error::{CliError, Result};

/// Options for installing a package
pub struct InstallOptions<'a> {
    pub package: &'a str,
    pub package_namespace: Option<&'a str>,
    pub version: &'a str,
    pub values_file: Option<&'a Path>,
    pub service_account: &'a str,
    pub sync_period: Option<Duration>,
}

fn read_values(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path).map_err(|e| CliError::Io {
            message: format!("cannot read {}: {}", path.display(), e),
        }),
        None => Ok(String::new()),
    }
}

fn reference(server: &KubeServer, namespace: &str, name: &str) -> InstalledPackageReference {
    InstalledPackageReference {
        context: context(namespace, false),
        identifier: name.to_string(),
        plugin: server.config().plugin.clone(),
    }
}

/// Run the installed list command
pub async fn list(
    server: &KubeServer,
    namespace: &str,
    all_namespaces: bool,
    pagination: PaginationOptions,
    output_json: bool,
) -> Result<()> {
    let spinner = display::spinner("Listing installed packages...");
    let result = server
        .get_installed_package_summaries(&context(namespace, all_namespaces), &pagination)
        .await;
    spinner.finish_and_clear();
    let summaries = result?;

    if output_json {
        return display::print_json(&summaries);
    }

    if summaries.summaries.is_empty() {
        println!("No packages installed in namespace {}", namespace);
        return Ok(());
    }

    println!(
        "{:<25} {:<15} {:<30} {:<12} {:<12} {:<10}",
        style("NAME").bold(),
        style("NAMESPACE").bold(),
        style("PACKAGE").bold(),
        style("VERSION").bold(),
        style("UPGRADE").bold(),
        style("STATUS").bold()
    );
    for summary in &summaries.summaries {
        let upgrade = summary
            .latest_matching_version
            .as_ref()
            .filter(|v| v.pkg_version != summary.current_version.pkg_version)
            .map(|v| v.pkg_version.as_str())
            .unwrap_or("");
        println!(
            "{:<25} {:<15} {:<30} {:<12} {:<12} {}",
            summary.name,
            summary.installed_package_ref.context.namespace,
            or_dash(&summary.pkg_display_name),
            summary.current_version.pkg_version,
            or_dash(upgrade),
            status_style(&summary.status)
        );
    }

    if let Some(token) = &summaries.next_page_token {
        println!();
        println!("More results: --page-token {}", style(token).cyan());
    }
    Ok(())
}

/// Run the installed show command
pub async fn show(server: &KubeServer, namespace: &str, name: &str, output_json: bool) -> Result<()> {
    let detail = server
        .get_installed_package_detail(&reference(server, namespace, name))
        .await?;

    if output_json {
        return display::print_json(&detail);
    }

    display::field("Name", style(&detail.name).cyan());
    display::field("Namespace", &detail.installed_package_ref.context.namespace);
    display::field("Package", &detail.available_package_ref.identifier);
    display::field("Constraint", &detail.pkg_version_reference.version);
    display::field("Version", or_dash(&detail.current_version.pkg_version));
    display::field("Latest", or_dash(&detail.latest_version.pkg_version));
    display::field("Status", status_style(&detail.status));
    if !detail.status.user_reason.is_empty() {
        display::field("Reason", &detail.status.user_reason);
    }
    display::field(
        "Service account",
        or_dash(&detail.reconciliation_options.service_account_name),
    );

    if !detail.values_applied.is_empty() {
        display::heading("Values");
        println!("{}", detail.values_applied);
    }
    if !detail.post_installation_notes.is_empty() {
        display::heading("Notes");
        println!("{}", detail.post_installation_notes);
    }
    Ok(())
}

/// Run the installed resources command
pub async fn resources(
    server: &KubeServer,
    namespace: &str,
    name: &str,
    output_json: bool,
) -> Result<()> {
    let spinner = display::spinner("Looking up deployed resources...");
    let result = server
        .get_installed_package_resource_refs(&reference(server, namespace, name))
        .await;
    spinner.finish_and_clear();
    let refs = result?;

    if output_json {
        return display::print_json(&refs);
    }

    if refs.resource_refs.is_empty() {
        println!("No resources deployed for {}", name);
        return Ok(());
    }

    println!(
        "{:<30} {:<25} {:<20} {:<40}",
        style("API VERSION").bold(),
        style("KIND").bold(),
        style("NAMESPACE").bold(),
        style("NAME").bold()
    );
    for resource in &refs.resource_refs {
        println!(
            "{:<30} {:<25} {:<20} {}",
            resource.api_version,
            resource.kind,
            or_dash(&resource.namespace),
            resource.name
        );
    }
    Ok(())
}

/// Run the install command
pub async fn install(
    server: &KubeServer,
    namespace: &str,
    name: &str,
    options: InstallOptions<'_>,
) -> Result<()> {
    let request = CreateInstalledPackageRequest {
        available_package_ref: AvailablePackageReference {
            context: context(options.package_namespace.unwrap_or(namespace), false),
            identifier: options.package.to_string(),
            plugin: server.config().plugin.clone(),
        },
        target_context: context(namespace, false),
        name: name.to_string(),
        pkg_version_reference: VersionReference::new(options.version),
        values: read_values(options.values_file)?,
        reconciliation_options: Some(ReconciliationOptions {
            interval: options.sync_period,
            suspend: false,
            service_account_name: options.service_account.to_string(),
        }),
    };

    let spinner = display::spinner(format!("Installing {}...", name));
    let result = server.create_installed_package(&request).await;
    spinner.finish_and_clear();
    let created = result?;

    println!(
        "{} Installed {} ({}) in namespace {}",
        style("✓").green().bold(),
        style(&created.identifier).cyan(),
        options.package,
        created.context.namespace
    );
    Ok(())
}

/// Run the upgrade command
pub async fn upgrade(
    server: &KubeServer,
    namespace: &str,
    name: &str,
    version: &str,
    values_file: Option<&Path>,
) -> Result<()> {
    let request = UpdateInstalledPackageRequest {
        installed_package_ref: reference(server, namespace, name),
        pkg_version_reference: VersionReference::new(version),
        values: read_values(values_file)?,
        reconciliation_options: None,
    };
    let updated = server.update_installed_package(&request).await?;

    println!(
        "{} Updated {} to {}",
        style("✓").green().bold(),
        style(&updated.identifier).cyan(),
        version
    );
    Ok(())
}

/// Run the uninstall command
pub async fn delete(server: &KubeServer, namespace: &str, name: &str) -> Result<()> {
    server
        .delete_installed_package(&reference(server, namespace, name))
        .await?;
    println!(
        "{} Uninstalled {} from namespace {}",
        style("✓").green().bold(),
        style(name).cyan(),
        namespace
    );
    Ok(())
}

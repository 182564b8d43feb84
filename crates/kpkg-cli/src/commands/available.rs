//! Available packages - browse what repositories offer

use console::style;
use kpkg_core::PaginationOptions;
use kpkg_core::api::{AvailablePackageReference, FilterOptions};

use super::{KubeServer, context};
use crate::display::{self, or_dash};
use crate::error::Result;

/// Run the available list command
pub async fn list(
    server: &KubeServer,
    namespace: &str,
    all_namespaces: bool,
    filter: FilterOptions,
    pagination: PaginationOptions,
    output_json: bool,
) -> Result<()> {
    let spinner = display::spinner("Listing available packages...");
    let result = server
        .get_available_package_summaries(&context(namespace, all_namespaces), &filter, &pagination)
        .await;
    spinner.finish_and_clear();
    let summaries = result?;

    if output_json {
        return display::print_json(&summaries);
    }

    if summaries.summaries.is_empty() {
        println!("No packages available in namespace {}", namespace);
        return Ok(());
    }

    println!(
        "{:<40} {:<25} {:<12} {:<30}",
        style("NAME").bold(),
        style("DISPLAY NAME").bold(),
        style("LATEST").bold(),
        style("NAMESPACE").bold()
    );
    for summary in &summaries.summaries {
        println!(
            "{:<40} {:<25} {:<12} {:<30}",
            summary.name,
            or_dash(&summary.display_name),
            summary.latest_version.pkg_version,
            summary.available_package_ref.context.namespace
        );
    }

    if let Some(token) = &summaries.next_page_token {
        println!();
        println!("More results: --page-token {}", style(token).cyan());
    }
    Ok(())
}

fn reference(server: &KubeServer, namespace: &str, name: &str) -> AvailablePackageReference {
    AvailablePackageReference {
        context: context(namespace, false),
        identifier: name.to_string(),
        plugin: server.config().plugin.clone(),
    }
}

/// Run the available show command
pub async fn show(
    server: &KubeServer,
    namespace: &str,
    name: &str,
    version: Option<&str>,
    output_json: bool,
) -> Result<()> {
    let detail = server
        .get_available_package_detail(&reference(server, namespace, name), version.unwrap_or(""))
        .await?;

    if output_json {
        return display::print_json(&detail);
    }

    display::field("Name", style(&detail.name).cyan());
    display::field("Display name", or_dash(&detail.display_name));
    display::field("Version", &detail.version.pkg_version);
    display::field("Namespace", &detail.available_package_ref.context.namespace);
    display::field("Categories", or_dash(&detail.categories.join(", ")));
    let maintainers: Vec<&str> = detail.maintainers.iter().map(|m| m.name.as_str()).collect();
    display::field("Maintainers", or_dash(&maintainers.join(", ")));

    if !detail.readme.is_empty() {
        display::heading("Readme");
        println!("{}", detail.readme);
    }
    if !detail.default_values.is_empty() {
        display::heading("Default values");
        println!("{}", detail.default_values);
    }
    Ok(())
}

/// Run the available versions command
pub async fn versions(
    server: &KubeServer,
    namespace: &str,
    name: &str,
    output_json: bool,
) -> Result<()> {
    let versions = server
        .get_available_package_versions(&reference(server, namespace, name))
        .await?;

    if output_json {
        return display::print_json(&versions);
    }

    println!("{}", style("VERSION").bold());
    for version in &versions.package_app_versions {
        println!("{}", version.pkg_version);
    }
    Ok(())
}

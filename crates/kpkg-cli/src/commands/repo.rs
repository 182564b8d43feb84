//! Package repositories - list, inspect, add and remove

use std::time::Duration;

use console::style;
use kpkg_core::api::{
    AddPackageRepositoryRequest, PackageRepositoryReference, RepositoryCustomDetail,
    RepositoryType,
};

use super::{KubeServer, context};
use crate::display::{self, or_dash, status_style};
use crate::error::Result;

/// Options for adding a repository
pub struct AddOptions<'a> {
    pub repo_type: RepositoryType,
    pub url: &'a str,
    pub description: &'a str,
    pub global: bool,
    pub interval: Option<Duration>,
    pub tag_selection: Option<&'a str>,
}

fn reference(server: &KubeServer, namespace: &str, name: &str) -> PackageRepositoryReference {
    PackageRepositoryReference {
        context: context(namespace, false),
        identifier: name.to_string(),
        plugin: server.config().plugin.clone(),
    }
}

/// Run the repo list command
pub async fn list(
    server: &KubeServer,
    namespace: &str,
    all_namespaces: bool,
    output_json: bool,
) -> Result<()> {
    let repos = server
        .get_package_repository_summaries(&context(namespace, all_namespaces))
        .await?;

    if output_json {
        return display::print_json(&repos);
    }

    if repos.is_empty() {
        println!("No repositories configured");
        println!();
        println!(
            "Add one with: {}",
            style("kpkg repo add <name> --type imgpkgBundle --url <url>").cyan()
        );
        return Ok(());
    }

    println!(
        "{:<25} {:<35} {:<14} {:<8} {:<10}",
        style("NAME").bold(),
        style("NAMESPACE").bold(),
        style("TYPE").bold(),
        style("AUTH").bold(),
        style("STATUS").bold()
    );
    for repo in &repos {
        let repo_type = repo.repo_type.map(|t| t.as_str()).unwrap_or("-");
        println!(
            "{:<25} {:<35} {:<14} {:<8} {}",
            repo.name,
            repo.package_repo_ref.context.namespace,
            repo_type,
            if repo.requires_auth { "yes" } else { "no" },
            status_style(&repo.status)
        );
    }
    Ok(())
}

/// Run the repo show command
pub async fn show(server: &KubeServer, namespace: &str, name: &str, output_json: bool) -> Result<()> {
    let detail = server
        .get_package_repository_detail(&reference(server, namespace, name))
        .await?;

    if output_json {
        return display::print_json(&detail);
    }

    display::field("Name", style(&detail.name).cyan());
    display::field("Namespace", &detail.package_repo_ref.context.namespace);
    display::field("Description", or_dash(&detail.description));
    display::field("Type", detail.repo_type);
    display::field("URL", or_dash(&detail.url));
    display::field("Scope", if detail.namespace_scoped { "namespace" } else { "global" });
    if let Some(interval) = detail.interval {
        display::field("Interval", format!("{}s", interval.as_secs()));
    }
    if let Some(auth) = &detail.auth {
        display::field("Auth", auth.auth_type);
        if let Some(secret) = &auth.secret_ref {
            display::field("Secret", secret);
        }
    }
    display::field("Status", status_style(&detail.status));
    if !detail.status.user_reason.is_empty() {
        display::field("Reason", &detail.status.user_reason);
    }
    Ok(())
}

/// Run the repo add command
pub async fn add(
    server: &KubeServer,
    namespace: &str,
    name: &str,
    options: AddOptions<'_>,
) -> Result<()> {
    let global_namespace = server.config().global_packaging_namespace.clone();
    let request = AddPackageRepositoryRequest {
        context: context(if options.global { global_namespace.as_str() } else { namespace }, false),
        name: name.to_string(),
        description: options.description.to_string(),
        namespace_scoped: !options.global,
        repo_type: options.repo_type,
        url: options.url.to_string(),
        interval: options.interval,
        auth: None,
        custom_detail: options.tag_selection.map(|tags| RepositoryCustomDetail {
            tag_selection: Some(tags.to_string()),
            ..Default::default()
        }),
    };
    let created = server.add_package_repository(&request).await?;

    println!(
        "{} Added repository {} in namespace {}",
        style("✓").green().bold(),
        style(&created.identifier).cyan(),
        created.context.namespace
    );
    Ok(())
}

/// Run the repo delete command
pub async fn delete(server: &KubeServer, namespace: &str, name: &str) -> Result<()> {
    server
        .delete_package_repository(&reference(server, namespace, name))
        .await?;
    println!(
        "{} Removed repository {}",
        style("✓").green().bold(),
        style(name).cyan()
    );
    Ok(())
}

/// Run the repo permissions command
pub async fn permissions(
    server: &KubeServer,
    namespace: &str,
    output_json: bool,
) -> Result<()> {
    let permissions = server
        .get_package_repository_permissions(&context(namespace, false))
        .await?;

    if output_json {
        return display::print_json(&permissions);
    }

    println!(
        "{:<10} {:<10} {:<10}",
        style("VERB").bold(),
        style("GLOBAL").bold(),
        style("NAMESPACE").bold()
    );
    for (verb, allowed) in &permissions.global {
        let scoped = permissions.namespace.get(verb).copied().unwrap_or(false);
        println!(
            "{:<10} {:<10} {:<10}",
            verb,
            if *allowed { "yes" } else { "no" },
            if scoped { "yes" } else { "no" }
        );
    }
    Ok(())
}

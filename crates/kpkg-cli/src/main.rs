//! kpkg - browse and manage kapp-controller packages from the command line

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use kpkg_core::api::{FilterOptions, RepositoryType};
use kpkg_core::{PaginationOptions, PluginConfig};
use tracing_subscriber::EnvFilter;

mod commands;
mod display;
mod error;
mod exit_codes;

use error::Result;

#[derive(Parser)]
#[command(name = "kpkg")]
#[command(author = "kpkg Contributors")]
#[command(version)]
#[command(about = "Browse, install and manage kapp-controller packages", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Plugin configuration file
    #[arg(long, global = true, env = "KPKG_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Packages offered by the repositories
    #[command(subcommand)]
    Available(AvailableCommand),

    /// Installed packages
    #[command(subcommand)]
    Installed(InstalledCommand),

    /// Install a package
    Install {
        /// Name of the installation
        name: String,

        /// Package reference name (e.g. tetris.example.com)
        #[arg(short, long)]
        package: String,

        /// Version constraint
        #[arg(long = "pkg-version")]
        pkg_version: String,

        /// Namespace the package metadata lives in, defaults to the target namespace
        #[arg(long)]
        package_namespace: Option<String>,

        /// Values file
        #[arg(short = 'f', long = "values")]
        values: Option<PathBuf>,

        /// Service account the installation runs as
        #[arg(long)]
        service_account: String,

        /// Seconds between reconciliations
        #[arg(long)]
        sync_period: Option<u64>,

        #[command(flatten)]
        namespace: NamespaceArg,
    },

    /// Change the version or values of an installation
    Upgrade {
        /// Name of the installation
        name: String,

        /// New version constraint
        #[arg(long = "pkg-version")]
        pkg_version: String,

        /// Values file
        #[arg(short = 'f', long = "values")]
        values: Option<PathBuf>,

        #[command(flatten)]
        namespace: NamespaceArg,
    },

    /// Remove an installation and its values
    Uninstall {
        /// Name of the installation
        name: String,

        #[command(flatten)]
        namespace: NamespaceArg,
    },

    /// Package repositories
    #[command(subcommand)]
    Repo(RepoCommand),
}

#[derive(Subcommand)]
enum AvailableCommand {
    /// List available packages
    #[command(alias = "ls")]
    List {
        /// Text searched in names and descriptions
        #[arg(short, long, default_value = "")]
        query: String,

        /// Only packages in these categories
        #[arg(long = "category")]
        categories: Vec<String>,

        /// Only packages from these repositories (name or namespace/name)
        #[arg(long = "repo")]
        repositories: Vec<String>,

        #[command(flatten)]
        scope: ScopeArgs,

        #[command(flatten)]
        page: PageArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show one version of a package
    Show {
        /// Package reference name
        name: String,

        /// Version to show, the latest when omitted
        #[arg(long = "pkg-version")]
        pkg_version: Option<String>,

        #[command(flatten)]
        namespace: NamespaceArg,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the versions of a package
    Versions {
        /// Package reference name
        name: String,

        #[command(flatten)]
        namespace: NamespaceArg,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum InstalledCommand {
    /// List installed packages
    #[command(alias = "ls")]
    List {
        #[command(flatten)]
        scope: ScopeArgs,

        #[command(flatten)]
        page: PageArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show an installation
    Show {
        /// Name of the installation
        name: String,

        #[command(flatten)]
        namespace: NamespaceArg,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the cluster objects deployed for an installation
    Resources {
        /// Name of the installation
        name: String,

        #[command(flatten)]
        namespace: NamespaceArg,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum RepoCommand {
    /// List repositories
    #[command(alias = "ls")]
    List {
        #[command(flatten)]
        scope: ScopeArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show a repository
    Show {
        /// Repository name
        name: String,

        #[command(flatten)]
        namespace: NamespaceArg,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Add a repository
    Add {
        /// Repository name
        name: String,

        /// Fetch type: imgpkgBundle, image, git, http
        #[arg(long = "type")]
        repo_type: RepositoryType,

        /// Bundle, image, git or HTTP URL
        #[arg(long)]
        url: String,

        #[arg(long, default_value = "")]
        description: String,

        /// Add to the global packaging namespace
        #[arg(long)]
        global: bool,

        /// Seconds between syncs
        #[arg(long)]
        interval: Option<u64>,

        /// Semver constraint for bundle or image tags
        #[arg(long)]
        tag_selection: Option<String>,

        #[command(flatten)]
        namespace: NamespaceArg,
    },

    /// Remove a repository
    #[command(alias = "rm")]
    Delete {
        /// Repository name
        name: String,

        #[command(flatten)]
        namespace: NamespaceArg,
    },

    /// Show which repository operations are allowed
    Permissions {
        #[command(flatten)]
        namespace: NamespaceArg,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct NamespaceArg {
    /// Namespace
    #[arg(short, long, default_value = "default")]
    namespace: String,
}

#[derive(Args)]
struct ScopeArgs {
    #[command(flatten)]
    namespace: NamespaceArg,

    /// Every namespace
    #[arg(short = 'A', long)]
    all_namespaces: bool,
}

#[derive(Args)]
struct PageArgs {
    /// Token returned by the previous page
    #[arg(long, default_value = "")]
    page_token: String,

    /// Items per page, 0 for all
    #[arg(long, default_value_t = 0)]
    page_size: u32,
}

impl From<PageArgs> for PaginationOptions {
    fn from(args: PageArgs) -> Self {
        PaginationOptions::new(args.page_token, args.page_size)
    }
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<PluginConfig> {
    match path {
        Some(path) => Ok(PluginConfig::load_from(path)?),
        None => Ok(PluginConfig::default()),
    }
}

#[tokio::main]
async fn main() {
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.debug);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let server = commands::connect(config).await?;

    match cli.command {
        Commands::Available(command) => match command {
            AvailableCommand::List {
                query,
                categories,
                repositories,
                scope,
                page,
                json,
            } => {
                let filter = FilterOptions {
                    query,
                    categories,
                    repositories,
                };
                commands::available::list(
                    &server,
                    &scope.namespace.namespace,
                    scope.all_namespaces,
                    filter,
                    page.into(),
                    json,
                )
                .await
            }
            AvailableCommand::Show {
                name,
                pkg_version,
                namespace,
                json,
            } => {
                commands::available::show(
                    &server,
                    &namespace.namespace,
                    &name,
                    pkg_version.as_deref(),
                    json,
                )
                .await
            }
            AvailableCommand::Versions {
                name,
                namespace,
                json,
            } => commands::available::versions(&server, &namespace.namespace, &name, json).await,
        },

        Commands::Installed(command) => match command {
            InstalledCommand::List { scope, page, json } => {
                commands::installed::list(
                    &server,
                    &scope.namespace.namespace,
                    scope.all_namespaces,
                    page.into(),
                    json,
                )
                .await
            }
            InstalledCommand::Show {
                name,
                namespace,
                json,
            } => commands::installed::show(&server, &namespace.namespace, &name, json).await,
            InstalledCommand::Resources {
                name,
                namespace,
                json,
            } => commands::installed::resources(&server, &namespace.namespace, &name, json).await,
        },

        Commands::Install {
            name,
            package,
            pkg_version,
            package_namespace,
            values,
            service_account,
            sync_period,
            namespace,
        } => {
            let options = commands::installed::InstallOptions {
                package: &package,
                package_namespace: package_namespace.as_deref(),
                version: &pkg_version,
                values_file: values.as_deref(),
                service_account: &service_account,
                sync_period: sync_period.map(Duration::from_secs),
            };
            commands::installed::install(&server, &namespace.namespace, &name, options).await
        }

        Commands::Upgrade {
            name,
            pkg_version,
            values,
            namespace,
        } => {
            commands::installed::upgrade(
                &server,
                &namespace.namespace,
                &name,
                &pkg_version,
                values.as_deref(),
            )
            .await
        }

        Commands::Uninstall { name, namespace } => {
            commands::installed::delete(&server, &namespace.namespace, &name).await
        }

        Commands::Repo(command) => match command {
            RepoCommand::List { scope, json } => {
                commands::repo::list(
                    &server,
                    &scope.namespace.namespace,
                    scope.all_namespaces,
                    json,
                )
                .await
            }
            RepoCommand::Show {
                name,
                namespace,
                json,
            } => commands::repo::show(&server, &namespace.namespace, &name, json).await,
            RepoCommand::Add {
                name,
                repo_type,
                url,
                description,
                global,
                interval,
                tag_selection,
                namespace,
            } => {
                let options = commands::repo::AddOptions {
                    repo_type,
                    url: &url,
                    description: &description,
                    global,
                    interval: interval.map(Duration::from_secs),
                    tag_selection: tag_selection.as_deref(),
                };
                commands::repo::add(&server, &namespace.namespace, &name, options).await
            }
            RepoCommand::Delete { name, namespace } => {
                commands::repo::delete(&server, &namespace.namespace, &name).await
            }
            RepoCommand::Permissions { namespace, json } => {
                commands::repo::permissions(&server, &namespace.namespace, json).await
            }
        },
    }
}

//! End-to-end tests of the plugin operations over the in-memory store

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kpkg_core::api::{
    AddPackageRepositoryRequest, AuthType, AvailablePackageReference, Context,
    CreateInstalledPackageRequest, FilterOptions, InstalledPackageReference,
    PackageRepositoryAuth, PackageRepositoryReference, ReconciliationOptions,
    RepositoryCredentials, RepositoryType, ResourceRef, SecretField, UpdateInstalledPackageRequest,
    UpdatePackageRepositoryRequest, VersionReference,
};
use kpkg_core::{Code, PaginationOptions, PluginConfig};
use kpkg_kube::resources::{
    App, AppStatus, AppStepStatus, AssociatedResources, CLUSTER_ROLE, DEPLOYMENT, KappDeployStatus,
    PACKAGE_INSTALL, PACKAGE_REPOSITORY, Package, PackageInstall, PackageInstallStatus,
    PackageMetadata, PackageRef, PackageRepository, Resource, SERVICE, VersionSelection,
};
use kpkg_kube::{MockStore, ResourceKind, ResourceStore};
use kpkg_plugin::Server;

const CLUSTER: &str = "default";
const NAMESPACE: &str = "default";
const GLOBAL: &str = "kapp-controller-packaging-global";

fn package(namespace: &str, ref_name: &str, version: &str) -> Package {
    let mut p = Package::default();
    p.metadata.name = Some(format!("{}.{}", ref_name, version));
    p.metadata.namespace = Some(namespace.to_string());
    p.spec.ref_name = ref_name.to_string();
    p.spec.version = version.to_string();
    p
}

fn metadata(namespace: &str, name: &str, categories: &[&str]) -> PackageMetadata {
    let mut m = PackageMetadata::default();
    m.metadata.name = Some(name.to_string());
    m.metadata.namespace = Some(namespace.to_string());
    m.spec.display_name = name.split('.').next().unwrap_or_default().to_string();
    m.spec.short_description = format!("The {} package", name);
    m.spec.long_description = format!("The {} package, in more words", name);
    m.spec.categories = categories.iter().map(|c| c.to_string()).collect();
    m
}

fn install(name: &str, ref_name: &str, constraints: &str) -> PackageInstall {
    let mut i = PackageInstall::default();
    i.metadata.name = Some(name.to_string());
    i.metadata.namespace = Some(NAMESPACE.to_string());
    i.spec.service_account_name = "default".to_string();
    i.spec.package_ref = Some(PackageRef {
        ref_name: ref_name.to_string(),
        version_selection: Some(VersionSelection {
            constraints: constraints.to_string(),
            prereleases: None,
        }),
    });
    i.status = Some(PackageInstallStatus {
        version: "1.2.3".to_string(),
        ..Default::default()
    });
    i
}

/// Store with tetris 1.2.3 and 1.2.7 available in the default namespace
fn tetris_store() -> MockStore {
    let store = MockStore::new();
    store
        .insert(
            CLUSTER,
            &metadata(NAMESPACE, "tetris.foo.example.com", &["games"]),
        )
        .unwrap();
    for version in ["1.2.3", "1.2.7"] {
        store
            .insert(
                CLUSTER,
                &package(NAMESPACE, "tetris.foo.example.com", version),
            )
            .unwrap();
    }
    store
}

fn server(store: &Arc<MockStore>) -> Server<MockStore> {
    Server::with_shared_store(Arc::clone(store), PluginConfig::default())
}

fn context() -> Context {
    Context::new("", NAMESPACE)
}

mod available_packages {
    use super::*;

    #[tokio::test]
    async fn test_summary_reports_latest_version() {
        let store = Arc::new(tetris_store());
        let summaries = server(&store)
            .get_available_package_summaries(
                &context(),
                &FilterOptions::default(),
                &PaginationOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(summaries.summaries.len(), 1);
        let summary = &summaries.summaries[0];
        assert_eq!(summary.available_package_ref.identifier, "tetris.foo.example.com");
        assert_eq!(summary.latest_version.pkg_version, "1.2.7");
        assert_eq!(summary.latest_version.app_version, "1.2.7");
        assert_eq!(summaries.categories, vec!["games"]);
        assert!(summaries.next_page_token.is_none());
    }

    #[tokio::test]
    async fn test_global_packages_are_visible() {
        let store = tetris_store();
        store
            .insert(CLUSTER, &metadata(GLOBAL, "pacman.foo.example.com", &["games", "retro"]))
            .unwrap();
        store
            .insert(CLUSTER, &package(GLOBAL, "pacman.foo.example.com", "0.1.0"))
            .unwrap();
        let store = Arc::new(store);

        let summaries = server(&store)
            .get_available_package_summaries(
                &context(),
                &FilterOptions::default(),
                &PaginationOptions::default(),
            )
            .await
            .unwrap();

        let names: Vec<&str> = summaries.summaries.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["pacman.foo.example.com", "tetris.foo.example.com"]);
        assert_eq!(
            summaries.summaries[0].available_package_ref.context.namespace,
            GLOBAL
        );
        assert_eq!(summaries.categories, vec!["games", "retro"]);
    }

    #[tokio::test]
    async fn test_pages_follow_the_token() {
        let store = MockStore::new();
        for name in ["a.example.com", "b.example.com", "c.example.com"] {
            store.insert(CLUSTER, &metadata(NAMESPACE, name, &[])).unwrap();
            store.insert(CLUSTER, &package(NAMESPACE, name, "1.0.0")).unwrap();
        }
        let store = Arc::new(store);
        let server = server(&store);

        let first = server
            .get_available_package_summaries(
                &context(),
                &FilterOptions::default(),
                &PaginationOptions::new("", 2),
            )
            .await
            .unwrap();
        assert_eq!(first.summaries.len(), 2);
        let token = first.next_page_token.unwrap();

        let second = server
            .get_available_package_summaries(
                &context(),
                &FilterOptions::default(),
                &PaginationOptions::new(token, 2),
            )
            .await
            .unwrap();
        assert_eq!(second.summaries.len(), 1);
        assert_eq!(second.summaries[0].name, "c.example.com");
        assert!(second.next_page_token.is_none());
    }

    #[tokio::test]
    async fn test_invalid_page_token() {
        let store = Arc::new(tetris_store());
        let err = server(&store)
            .get_available_package_summaries(
                &context(),
                &FilterOptions::default(),
                &PaginationOptions::new("not-a-number", 10),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_metadata_without_versions_is_internal() {
        let store = tetris_store();
        store
            .insert(CLUSTER, &metadata(NAMESPACE, "empty.foo.example.com", &[]))
            .unwrap();
        let store = Arc::new(store);

        let err = server(&store)
            .get_available_package_summaries(
                &context(),
                &FilterOptions::default(),
                &PaginationOptions::default(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::Internal);
        assert!(err.to_string().contains("empty.foo.example.com"));
    }

    #[tokio::test]
    async fn test_versions_newest_first() {
        let store = tetris_store();
        store
            .insert(CLUSTER, &package(NAMESPACE, "tetris.foo.example.com", "2.0.0"))
            .unwrap();
        let store = Arc::new(store);
        let reference = AvailablePackageReference {
            context: context(),
            identifier: "tetris.foo.example.com".to_string(),
            ..Default::default()
        };

        let versions = server(&store)
            .get_available_package_versions(&reference)
            .await
            .unwrap();
        let versions: Vec<&str> = versions
            .package_app_versions
            .iter()
            .map(|v| v.pkg_version.as_str())
            .collect();
        assert_eq!(versions, vec!["2.0.0", "1.2.7", "1.2.3"]);
    }

    #[tokio::test]
    async fn test_detail_version_selection() {
        let store = Arc::new(tetris_store());
        let server = server(&store);
        let reference = AvailablePackageReference {
            context: context(),
            identifier: "tetris.foo.example.com".to_string(),
            ..Default::default()
        };

        let latest = server
            .get_available_package_detail(&reference, "")
            .await
            .unwrap();
        assert_eq!(latest.version.pkg_version, "1.2.7");
        assert!(latest.readme.contains("## Description"));

        let pinned = server
            .get_available_package_detail(&reference, "1.2.3")
            .await
            .unwrap();
        assert_eq!(pinned.version.pkg_version, "1.2.3");

        let err = server
            .get_available_package_detail(&reference, "9.9.9")
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::NotFound);
    }
}

mod installed_packages {
    use super::*;

    fn create_request(name: &str, version: &str, values: &str) -> CreateInstalledPackageRequest {
        CreateInstalledPackageRequest {
            available_package_ref: AvailablePackageReference {
                context: context(),
                identifier: "tetris.foo.example.com".to_string(),
                ..Default::default()
            },
            target_context: context(),
            name: name.to_string(),
            pkg_version_reference: VersionReference::new(version),
            values: values.to_string(),
            reconciliation_options: Some(ReconciliationOptions {
                interval: Some(Duration::from_secs(600)),
                suspend: false,
                service_account_name: "default".to_string(),
            }),
        }
    }

    fn fast_wait() -> PluginConfig {
        let mut config = PluginConfig::default();
        config.install_wait.interval = Duration::from_millis(5);
        config.install_wait.timeout = Duration::from_millis(30);
        config
    }

    #[tokio::test]
    async fn test_unmatched_constraint_leaves_latest_matching_empty() {
        let store = tetris_store();
        store
            .insert(CLUSTER, &install("pinned", "tetris.foo.example.com", "9.9.9"))
            .unwrap();
        store
            .insert(CLUSTER, &install("ranged", "tetris.foo.example.com", ">=1.2.0"))
            .unwrap();
        let store = Arc::new(store);

        let summaries = server(&store)
            .get_installed_package_summaries(&context(), &PaginationOptions::default())
            .await
            .unwrap();

        assert_eq!(summaries.summaries.len(), 2);
        let pinned = &summaries.summaries[0];
        assert_eq!(pinned.name, "pinned");
        assert_eq!(pinned.latest_version.pkg_version, "1.2.7");
        assert!(pinned.latest_matching_version.is_none());
        assert_eq!(pinned.current_version.pkg_version, "1.2.3");

        let ranged = &summaries.summaries[1];
        assert_eq!(
            ranged
                .latest_matching_version
                .as_ref()
                .map(|v| v.pkg_version.as_str()),
            Some("1.2.7")
        );
    }

    #[tokio::test]
    async fn test_install_without_package_is_skipped() {
        let store = tetris_store();
        store
            .insert(CLUSTER, &install("ghost", "ghost.foo.example.com", "1.0.0"))
            .unwrap();
        store
            .insert(CLUSTER, &install("my-tetris", "tetris.foo.example.com", "1.2.3"))
            .unwrap();
        let store = Arc::new(store);

        let summaries = server(&store)
            .get_installed_package_summaries(&context(), &PaginationOptions::new("", 2))
            .await
            .unwrap();

        assert_eq!(summaries.summaries.len(), 1);
        assert_eq!(summaries.summaries[0].name, "my-tetris");
        // the token counts installs, not the summaries that survived the join
        assert_eq!(summaries.next_page_token.as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_create_waits_for_app() {
        let store = tetris_store();
        let mut app = App::default();
        app.metadata.name = Some("my-tetris".to_string());
        app.metadata.namespace = Some(NAMESPACE.to_string());
        store.insert(CLUSTER, &app).unwrap();
        let store = Arc::new(store);
        let server = Server::with_shared_store(Arc::clone(&store), fast_wait());

        let reference = server
            .create_installed_package(&create_request("my-tetris", "1.2.3", "port: 8080\n"))
            .await
            .unwrap();
        assert_eq!(reference.identifier, "my-tetris");

        let install: PackageInstall = store.object(CLUSTER, NAMESPACE, "my-tetris").unwrap();
        assert_eq!(install.constraints(), Some("1.2.3"));
        assert_eq!(install.values_secret_names(), vec!["my-tetris-values"]);
        assert_eq!(install.spec.sync_period.as_deref(), Some("600s"));
        assert!(store
            .object::<Secret>(CLUSTER, NAMESPACE, "my-tetris-values")
            .is_some());
    }

    #[tokio::test]
    async fn test_create_cleans_up_when_app_never_appears() {
        let store = Arc::new(tetris_store());
        let server = Server::with_shared_store(Arc::clone(&store), fast_wait());

        let err = server
            .create_installed_package(&create_request("my-tetris", "1.2.3", "port: 8080\n"))
            .await
            .unwrap_err();

        assert_eq!(err.code(), Code::Internal);
        assert!(store
            .object::<PackageInstall>(CLUSTER, NAMESPACE, "my-tetris")
            .is_none());
        assert!(store.objects::<Secret>().is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_version() {
        let store = Arc::new(tetris_store());
        let err = server(&store)
            .create_installed_package(&create_request("my-tetris", "9.9.9", ""))
            .await
            .unwrap_err();

        assert_eq!(err.code(), Code::NotFound);
        assert_eq!(store.operation_counts().writes(), 0);
    }

    #[tokio::test]
    async fn test_create_requires_service_account() {
        let store = Arc::new(tetris_store());
        let mut request = create_request("my-tetris", "1.2.3", "");
        request.reconciliation_options = None;

        let err = server(&store)
            .create_installed_package(&request)
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_delete_removes_values_secrets() {
        let store = tetris_store();
        let mut app = App::default();
        app.metadata.name = Some("my-tetris".to_string());
        app.metadata.namespace = Some(NAMESPACE.to_string());
        store.insert(CLUSTER, &app).unwrap();
        let store = Arc::new(store);
        let server = Server::with_shared_store(Arc::clone(&store), fast_wait());

        let reference = server
            .create_installed_package(&create_request("my-tetris", "1.2.3", "port: 8080\n"))
            .await
            .unwrap();
        server.delete_installed_package(&reference).await.unwrap();

        assert!(store.objects::<PackageInstall>().is_empty());
        assert!(store.objects::<Secret>().is_empty());
    }

    /// Server whose store already holds the install's App, so creation returns at once
    fn server_with_app(name: &str) -> (Arc<MockStore>, Server<MockStore>) {
        let store = tetris_store();
        let mut app = App::default();
        app.metadata.name = Some(name.to_string());
        app.metadata.namespace = Some(NAMESPACE.to_string());
        store.insert(CLUSTER, &app).unwrap();
        let store = Arc::new(store);
        let server = Server::with_shared_store(Arc::clone(&store), fast_wait());
        (store, server)
    }

    #[tokio::test]
    async fn test_update_rewrites_values_and_constraint() {
        let (store, server) = server_with_app("my-tetris");
        let reference = server
            .create_installed_package(&create_request("my-tetris", "1.2.3", "port: 8080\n"))
            .await
            .unwrap();

        let request = UpdateInstalledPackageRequest {
            installed_package_ref: InstalledPackageReference {
                context: reference.context.clone(),
                identifier: reference.identifier.clone(),
                ..Default::default()
            },
            pkg_version_reference: VersionReference::new("1.2.7"),
            values: "port: 9090\n".to_string(),
            reconciliation_options: None,
        };
        server.update_installed_package(&request).await.unwrap();

        let install: PackageInstall = store.object(CLUSTER, NAMESPACE, "my-tetris").unwrap();
        assert_eq!(install.constraints(), Some("1.2.7"));
        assert_eq!(install.values_secret_names(), vec!["my-tetris-values"]);
        let secret: Secret = store.object(CLUSTER, NAMESPACE, "my-tetris-values").unwrap();
        let values = secret.string_data.unwrap_or_default();
        assert_eq!(values.get("values.yaml").map(String::as_str), Some("port: 9090\n"));
    }

    #[tokio::test]
    async fn test_update_rejects_invalid_values() {
        let (store, server) = server_with_app("my-tetris");
        server
            .create_installed_package(&create_request("my-tetris", "1.2.3", ""))
            .await
            .unwrap();
        let writes = store.operation_counts().writes();

        let request = UpdateInstalledPackageRequest {
            installed_package_ref: InstalledPackageReference {
                context: context(),
                identifier: "my-tetris".to_string(),
                ..Default::default()
            },
            pkg_version_reference: VersionReference::new("1.2.3"),
            values: "port: [8080\n".to_string(),
            reconciliation_options: None,
        };
        let err = server.update_installed_package(&request).await.unwrap_err();

        assert_eq!(err.code(), Code::InvalidArgument);
        assert_eq!(store.operation_counts().writes(), writes);
    }

    /// Add an object kapp deployed, labelled with `app`
    async fn deployed(store: &MockStore, kind: &ResourceKind, namespace: &str, name: &str, app: &str) {
        let mut object = serde_json::json!({
            "apiVersion": kind.api_version(),
            "kind": kind.kind,
            "metadata": {"name": name, "labels": {"kapp.k14s.io/app": app}}
        });
        if !namespace.is_empty() {
            object["metadata"]["namespace"] = namespace.into();
        }
        store.create_one(kind, CLUSTER, namespace, object).await.unwrap();
    }

    fn tetris_ref() -> InstalledPackageReference {
        InstalledPackageReference {
            context: context(),
            identifier: "my-tetris".to_string(),
            ..Default::default()
        }
    }

    fn resource(api_version: &str, kind: &str, name: &str, namespace: &str) -> ResourceRef {
        ResourceRef {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
            namespace: namespace.to_string(),
        }
    }

    #[tokio::test]
    async fn test_resource_refs_follow_app_label() {
        let store = tetris_store();
        store
            .insert(CLUSTER, &install("my-tetris", "tetris.foo.example.com", "1.2.3"))
            .unwrap();
        let mut app = App::default();
        app.metadata.name = Some("my-tetris".to_string());
        app.metadata.namespace = Some(NAMESPACE.to_string());
        app.status = Some(AppStatus {
            deploy: Some(AppStepStatus {
                kapp: Some(KappDeployStatus {
                    associated_resources: AssociatedResources {
                        label: "kapp.k14s.io/app=1634807201".to_string(),
                    },
                }),
                ..Default::default()
            }),
            ..Default::default()
        });
        store.insert(CLUSTER, &app).unwrap();

        deployed(&store, &DEPLOYMENT, "tetris", "tetris", "1634807201").await;
        deployed(&store, &SERVICE, "tetris", "tetris-svc", "1634807201").await;
        deployed(&store, &CLUSTER_ROLE, "", "tetris-reader", "1634807201").await;
        deployed(&store, &DEPLOYMENT, "tetris", "pacman", "99").await;

        let store = Arc::new(store);
        let refs = server(&store)
            .get_installed_package_resource_refs(&tetris_ref())
            .await
            .unwrap();

        assert_eq!(refs.context, Context::new(CLUSTER, NAMESPACE));
        assert_eq!(
            refs.resource_refs,
            vec![
                resource("apps/v1", "Deployment", "tetris", "tetris"),
                resource("rbac.authorization.k8s.io/v1", "ClusterRole", "tetris-reader", ""),
                resource("v1", "Service", "tetris-svc", "tetris"),
            ]
        );
    }

    #[tokio::test]
    async fn test_resource_refs_fall_back_to_ctrl_config_map() {
        let store = tetris_store();
        store
            .insert(CLUSTER, &install("my-tetris", "tetris.foo.example.com", "1.2.3"))
            .unwrap();
        let mut config_map = ConfigMap::default();
        config_map.metadata.name = Some("my-tetris-ctrl".to_string());
        config_map.metadata.namespace = Some(NAMESPACE.to_string());
        config_map.data = Some(
            [("spec".to_string(), r#"{"labelKey":"kapp.k14s.io/app","labelValue":"42"}"#.to_string())]
                .into_iter()
                .collect(),
        );
        store.insert(CLUSTER, &config_map).unwrap();

        deployed(&store, &DEPLOYMENT, NAMESPACE, "tetris", "42").await;
        deployed(&store, &SERVICE, NAMESPACE, "tetris-svc", "42").await;
        store.fail_next("list", &SERVICE, 403);

        let store = Arc::new(store);
        let refs = server(&store)
            .get_installed_package_resource_refs(&tetris_ref())
            .await
            .unwrap();

        assert_eq!(
            refs.resource_refs,
            vec![resource("apps/v1", "Deployment", "tetris", NAMESPACE)]
        );
    }

    #[tokio::test]
    async fn test_resource_refs_of_undeployed_install() {
        let store = tetris_store();
        store
            .insert(CLUSTER, &install("my-tetris", "tetris.foo.example.com", "1.2.3"))
            .unwrap();
        let store = Arc::new(store);

        let refs = server(&store)
            .get_installed_package_resource_refs(&tetris_ref())
            .await
            .unwrap();
        assert!(refs.resource_refs.is_empty());

        let mut missing = tetris_ref();
        missing.identifier = "pacman".to_string();
        let err = server(&store)
            .get_installed_package_resource_refs(&missing)
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::NotFound);
    }

    fn update_request(version: &str, values: &str) -> UpdateInstalledPackageRequest {
        UpdateInstalledPackageRequest {
            installed_package_ref: InstalledPackageReference {
                context: context(),
                identifier: "my-tetris".to_string(),
                ..Default::default()
            },
            pkg_version_reference: VersionReference::new(version),
            values: values.to_string(),
            reconciliation_options: None,
        }
    }

    #[tokio::test]
    async fn test_failed_update_removes_new_values_secret() {
        let (store, server) = server_with_app("my-tetris");
        server
            .create_installed_package(&create_request("my-tetris", "1.2.3", ""))
            .await
            .unwrap();
        assert!(store.objects::<Secret>().is_empty());
        store.fail_next("update", &PACKAGE_INSTALL, 500);

        let err = server
            .update_installed_package(&update_request("1.2.7", "port: 9090\n"))
            .await
            .unwrap_err();

        assert_eq!(err.code(), Code::Internal);
        assert!(store.objects::<Secret>().is_empty());
        let install: PackageInstall = store.object(CLUSTER, NAMESPACE, "my-tetris").unwrap();
        assert_eq!(install.constraints(), Some("1.2.3"));
        assert!(install.values_secret_names().is_empty());
    }

    #[tokio::test]
    async fn test_failed_update_restores_existing_values() {
        let (store, server) = server_with_app("my-tetris");
        server
            .create_installed_package(&create_request("my-tetris", "1.2.3", "port: 8080\n"))
            .await
            .unwrap();
        store.fail_next("update", &PACKAGE_INSTALL, 500);

        let err = server
            .update_installed_package(&update_request("1.2.7", "port: 9090\n"))
            .await
            .unwrap_err();

        assert_eq!(err.code(), Code::Internal);
        let secret: Secret = store.object(CLUSTER, NAMESPACE, "my-tetris-values").unwrap();
        let values = secret.string_data.unwrap_or_default();
        assert_eq!(values.get("values.yaml").map(String::as_str), Some("port: 8080\n"));
    }

    #[tokio::test]
    async fn test_detail_reports_values_and_options() {
        let (_store, server) = server_with_app("my-tetris");
        let reference = server
            .create_installed_package(&create_request("my-tetris", "1.2.3", "port: 8080\n"))
            .await
            .unwrap();

        let detail = server
            .get_installed_package_detail(&InstalledPackageReference {
                context: reference.context.clone(),
                identifier: reference.identifier.clone(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(detail.name, "my-tetris");
        assert_eq!(detail.pkg_version_reference.version, "1.2.3");
        assert_eq!(detail.latest_version.pkg_version, "1.2.7");
        assert_eq!(
            detail
                .latest_matching_version
                .as_ref()
                .map(|v| v.pkg_version.as_str()),
            Some("1.2.3")
        );
        assert!(detail.values_applied.contains("# my-tetris-values"));
        assert!(detail.values_applied.contains("port: 8080"));
        assert_eq!(detail.reconciliation_options.service_account_name, "default");
        assert_eq!(
            detail.reconciliation_options.interval,
            Some(Duration::from_secs(600))
        );
        assert_eq!(detail.available_package_ref.identifier, "tetris.foo.example.com");
        assert_eq!(detail.available_package_ref.context.namespace, NAMESPACE);
    }

    #[tokio::test]
    async fn test_detail_of_missing_install() {
        let store = Arc::new(tetris_store());
        let reference = InstalledPackageReference {
            context: context(),
            identifier: "nope".to_string(),
            ..Default::default()
        };
        let err = server(&store)
            .get_installed_package_detail(&reference)
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::NotFound);
    }
}

mod repositories {
    use super::*;

    fn basic_auth(username: &str, password: &str) -> PackageRepositoryAuth {
        PackageRepositoryAuth {
            auth_type: AuthType::BasicAuth,
            secret_ref: None,
            credentials: Some(RepositoryCredentials::BasicAuth {
                username: SecretField::from_wire(username),
                password: SecretField::from_wire(password),
            }),
        }
    }

    fn add_request(auth: Option<PackageRepositoryAuth>) -> AddPackageRepositoryRequest {
        AddPackageRepositoryRequest {
            context: context(),
            name: "my-repo".to_string(),
            description: "Private packages".to_string(),
            namespace_scoped: true,
            repo_type: RepositoryType::ImgpkgBundle,
            url: "registry.example.com/packages:1.0.0".to_string(),
            interval: Some(Duration::from_secs(300)),
            auth,
            custom_detail: None,
        }
    }

    fn update_request(auth: Option<PackageRepositoryAuth>) -> UpdatePackageRepositoryRequest {
        UpdatePackageRepositoryRequest {
            package_repo_ref: reference(),
            repo_type: None,
            description: "Private packages".to_string(),
            url: "registry.example.com/packages:1.0.0".to_string(),
            interval: Some(Duration::from_secs(300)),
            auth,
            custom_detail: None,
        }
    }

    fn reference() -> PackageRepositoryReference {
        PackageRepositoryReference {
            context: context(),
            identifier: "my-repo".to_string(),
            ..Default::default()
        }
    }

    fn stored_secret(store: &MockStore) -> Secret {
        let secrets = store.objects::<Secret>();
        assert_eq!(secrets.len(), 1, "expected exactly one secret");
        secrets.into_iter().next().unwrap()
    }

    fn secret_value(secret: &Secret, key: &str) -> String {
        secret
            .data
            .as_ref()
            .and_then(|d| d.get(key))
            .map(|v| String::from_utf8_lossy(&v.0).into_owned())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_add_with_managed_credentials() {
        let store = Arc::new(MockStore::new());
        server(&store)
            .add_package_repository(&add_request(Some(basic_auth("admin", "s3cret"))))
            .await
            .unwrap();

        let repo: PackageRepository = store.object(CLUSTER, NAMESPACE, "my-repo").unwrap();
        let secret = stored_secret(&store);
        assert_eq!(repo.secret_name(), secret.metadata.name.as_deref());
        assert!(secret.name().starts_with("my-repo-"));

        let owners = secret.metadata.owner_references.unwrap_or_default();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].kind, "PackageRepository");
        assert_eq!(Some(owners[0].uid.as_str()), repo.metadata.uid.as_deref());
    }

    #[tokio::test]
    async fn test_add_discards_secret_when_repository_fails() {
        let store = Arc::new(MockStore::new());
        store.fail_next("create", &PACKAGE_REPOSITORY, 500);

        let err = server(&store)
            .add_package_repository(&add_request(Some(basic_auth("admin", "s3cret"))))
            .await
            .unwrap_err();

        assert_eq!(err.code(), Code::Internal);
        assert!(store.objects::<Secret>().is_empty());
        assert!(store.objects::<PackageRepository>().is_empty());
    }

    #[tokio::test]
    async fn test_global_repository_in_namespace_is_rejected() {
        let store = Arc::new(MockStore::new());
        let mut request = add_request(None);
        request.namespace_scoped = false;

        let err = server(&store)
            .add_package_repository(&request)
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_detail_redacts_credentials() {
        let store = Arc::new(MockStore::new());
        let server = server(&store);
        server
            .add_package_repository(&add_request(Some(basic_auth("admin", "s3cret"))))
            .await
            .unwrap();

        let detail = server.get_package_repository_detail(&reference()).await.unwrap();
        let json = serde_json::to_string(&detail).unwrap();
        assert!(!json.contains("s3cret"));
        assert!(!json.contains("admin"));

        assert_eq!(detail.description, "Private packages");
        assert_eq!(detail.interval, Some(Duration::from_secs(300)));
        let auth = detail.auth.unwrap();
        assert_eq!(auth.auth_type, AuthType::BasicAuth);
        assert!(auth.credentials.unwrap().is_all_keep());
    }

    #[tokio::test]
    async fn test_redacted_update_writes_no_secret() {
        let store = Arc::new(MockStore::new());
        let server = server(&store);
        server
            .add_package_repository(&add_request(Some(basic_auth("admin", "s3cret"))))
            .await
            .unwrap();
        let before = stored_secret(&store);
        store.reset_counts();

        server
            .update_package_repository(&update_request(Some(basic_auth("REDACTED", "REDACTED"))))
            .await
            .unwrap();

        let secret_writes = store
            .operations()
            .iter()
            .filter(|op| op.kind == "Secret" && op.verb != "get" && op.verb != "list")
            .count();
        assert_eq!(secret_writes, 0);
        assert_eq!(stored_secret(&store).metadata.name, before.metadata.name);
    }

    #[tokio::test]
    async fn test_password_update_keeps_username() {
        let store = Arc::new(MockStore::new());
        let server = server(&store);
        server
            .add_package_repository(&add_request(Some(basic_auth("admin", "s3cret"))))
            .await
            .unwrap();
        let before = stored_secret(&store);

        server
            .update_package_repository(&update_request(Some(basic_auth("REDACTED", "hunter2"))))
            .await
            .unwrap();

        let after = stored_secret(&store);
        assert_ne!(after.metadata.name, before.metadata.name);
        assert_eq!(secret_value(&after, "username"), "admin");
        assert_eq!(secret_value(&after, "password"), "hunter2");

        let repo: PackageRepository = store.object(CLUSTER, NAMESPACE, "my-repo").unwrap();
        assert_eq!(repo.secret_name(), after.metadata.name.as_deref());
    }

    #[tokio::test]
    async fn test_switch_to_user_secret_is_rejected() {
        let store = Arc::new(MockStore::new());
        let mut user_secret = Secret::default();
        user_secret.metadata.name = Some("user-secret".to_string());
        user_secret.metadata.namespace = Some(NAMESPACE.to_string());
        user_secret.data = Some(
            [("username", "bob"), ("password", "builder")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec())))
                .collect(),
        );
        store.insert(CLUSTER, &user_secret).unwrap();
        let server = server(&store);
        server
            .add_package_repository(&add_request(Some(basic_auth("admin", "s3cret"))))
            .await
            .unwrap();
        let repo: PackageRepository = store.object(CLUSTER, NAMESPACE, "my-repo").unwrap();
        let managed = repo.secret_name().unwrap().to_string();

        let err = server
            .update_package_repository(&update_request(Some(PackageRepositoryAuth {
                auth_type: AuthType::BasicAuth,
                secret_ref: Some("user-secret".to_string()),
                credentials: None,
            })))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);

        let repo: PackageRepository = store.object(CLUSTER, NAMESPACE, "my-repo").unwrap();
        assert_eq!(repo.secret_name(), Some(managed.as_str()));

        server.delete_package_repository(&reference()).await.unwrap();
        let left: Vec<String> = store
            .objects::<Secret>()
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(left, vec!["user-secret".to_string()]);
    }

    #[tokio::test]
    async fn test_type_change_is_rejected() {
        let store = Arc::new(MockStore::new());
        let server = server(&store);
        server.add_package_repository(&add_request(None)).await.unwrap();

        let mut request = update_request(None);
        request.repo_type = Some(RepositoryType::Git);
        let err = server.update_package_repository(&request).await.unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_delete_removes_managed_secret() {
        let store = Arc::new(MockStore::new());
        let server = server(&store);
        server
            .add_package_repository(&add_request(Some(basic_auth("admin", "s3cret"))))
            .await
            .unwrap();

        server.delete_package_repository(&reference()).await.unwrap();
        assert!(store.objects::<PackageRepository>().is_empty());
        assert!(store.objects::<Secret>().is_empty());
    }

    #[tokio::test]
    async fn test_summaries_include_global_repositories() {
        let store = MockStore::new();
        let mut global = PackageRepository::default();
        global.metadata.name = Some("community".to_string());
        global.metadata.namespace = Some(GLOBAL.to_string());
        global.spec.fetch.imgpkg_bundle = Some(Default::default());
        store.insert(CLUSTER, &global).unwrap();
        let store = Arc::new(store);
        let server = server(&store);
        server.add_package_repository(&add_request(None)).await.unwrap();

        let summaries = server
            .get_package_repository_summaries(&context())
            .await
            .unwrap();
        let scoped: Vec<(&str, bool)> = summaries
            .iter()
            .map(|s| (s.name.as_str(), s.namespace_scoped))
            .collect();
        assert_eq!(scoped, vec![("my-repo", true), ("community", false)]);
    }

    #[tokio::test]
    async fn test_permissions() {
        let store = Arc::new(MockStore::new());
        store.deny(NAMESPACE, "delete");

        let permissions = server(&store)
            .get_package_repository_permissions(&context())
            .await
            .unwrap();
        assert!(permissions.global.values().all(|allowed| *allowed));
        assert_eq!(permissions.namespace.get("delete"), Some(&false));
        assert_eq!(permissions.namespace.get("create"), Some(&true));
        assert_eq!(permissions.namespace.len(), 6);
    }
}

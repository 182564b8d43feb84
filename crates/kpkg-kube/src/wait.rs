//! Waiting for asynchronously created resources
//!
//! Some objects only exist once a controller has reacted to another one
//! (kapp-controller creates an App for every PackageInstall). The helper
//! polls until the object shows up or the deadline passes.

use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{KubeError, Result};
use crate::resources::ResourceKind;
use crate::store::ResourceStore;

/// Poll until the object exists
///
/// Checks immediately, then every `interval`. NotFound keeps waiting; any
/// other error ends the wait.
pub async fn wait_for_resource<S: ResourceStore + ?Sized>(
    store: &S,
    kind: &ResourceKind,
    cluster: &str,
    namespace: &str,
    name: &str,
    interval: Duration,
    timeout: Duration,
) -> Result<Value> {
    let start = Instant::now();
    let deadline = start + timeout;

    loop {
        match store.get_one(kind, cluster, namespace, name).await {
            Ok(object) => {
                tracing::debug!(
                    kind = kind.kind,
                    namespace,
                    name,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "resource is available"
                );
                return Ok(object);
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(KubeError::Timeout {
                what: format!("{} '{}' in namespace '{}'", kind.kind, name, namespace),
                elapsed: format!("{:?}", start.elapsed()),
            });
        }

        // Wait before retry
        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{APP, App};
    use crate::store::MockStore;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn app(name: &str) -> App {
        App {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_returns_existing_object_immediately() {
        let store = MockStore::new();
        store.insert("default", &app("my-tetris")).unwrap();

        let found = wait_for_resource(
            &store,
            &APP,
            "default",
            "default",
            "my-tetris",
            Duration::from_millis(10),
            Duration::from_millis(50),
        )
        .await
        .unwrap();
        assert_eq!(found["metadata"]["name"], "my-tetris");
        assert_eq!(store.operation_counts().gets, 1);
    }

    #[tokio::test]
    async fn test_object_appearing_later_is_found() {
        let store = MockStore::new();
        let writer = store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer.insert("default", &app("my-tetris")).unwrap();
        });

        let found = wait_for_resource(
            &store,
            &APP,
            "default",
            "default",
            "my-tetris",
            Duration::from_millis(5),
            Duration::from_secs(2),
        )
        .await;
        assert!(found.is_ok());
        assert!(store.operation_counts().gets > 1);
    }

    #[tokio::test]
    async fn test_times_out() {
        let store = MockStore::new();
        let err = wait_for_resource(
            &store,
            &APP,
            "default",
            "default",
            "missing",
            Duration::from_millis(5),
            Duration::from_millis(30),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, KubeError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_other_errors_abort() {
        let store = MockStore::new();
        store.fail_next("get", &APP, 403);
        let err = wait_for_resource(
            &store,
            &APP,
            "default",
            "default",
            "my-tetris",
            Duration::from_millis(5),
            Duration::from_millis(30),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status_code(), Some(403));
    }
}

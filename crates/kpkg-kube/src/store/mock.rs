//! Mock resource store for testing
//!
//! Objects live in memory, keyed the way the API server orders them
//! (namespace, then name), so lists come back in the same order a real
//! cluster would return them.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{ListOptions, ResourceStore};
use crate::error::{KubeError, Result};
use crate::resources::{Resource, ResourceKind};

/// (plural, cluster, namespace, name)
type ObjectKey = (String, String, String, String);

/// In-memory resource store for testing
#[derive(Clone, Default)]
pub struct MockStore {
    objects: Arc<RwLock<BTreeMap<ObjectKey, Value>>>,
    /// Track operation counts for assertions
    operations: Arc<RwLock<Vec<StoreOperation>>>,
    failures: Arc<RwLock<Vec<InjectedFailure>>>,
    denied: Arc<RwLock<HashSet<(String, String)>>>,
    next_uid: Arc<AtomicU64>,
}

/// One recorded store call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOperation {
    pub verb: &'static str,
    pub kind: &'static str,
    pub namespace: String,
    pub name: String,
}

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperationCounts {
    pub gets: usize,
    pub lists: usize,
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
}

impl OperationCounts {
    /// Creates, updates and deletes
    pub fn writes(&self) -> usize {
        self.creates + self.updates + self.deletes
    }
}

#[derive(Debug, Clone)]
struct InjectedFailure {
    verb: &'static str,
    kind: &'static str,
    status: u16,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

impl MockStore {
    /// Create a new empty mock store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an object directly, without recording an operation
    pub fn insert<R: Resource>(&self, cluster: &str, object: &R) -> Result<()> {
        let value = super::encode(object)?;
        let namespace = object.namespace().to_string();
        let name = object.name().to_string();
        let value = self.stamp(value, &namespace);
        write(&self.objects).insert(
            (R::KIND.plural.to_string(), cluster.to_string(), namespace, name),
            value,
        );
        Ok(())
    }

    /// Typed snapshot of a stored object
    pub fn object<R: Resource>(&self, cluster: &str, namespace: &str, name: &str) -> Option<R> {
        let key = key(&R::KIND, cluster, namespace, name);
        read(&self.objects)
            .get(&key)
            .cloned()
            .and_then(|v| super::decode(v).ok())
    }

    /// Typed snapshot of every stored object of a kind
    pub fn objects<R: Resource>(&self) -> Vec<R> {
        read(&self.objects)
            .iter()
            .filter(|((plural, ..), _)| plural == R::KIND.plural)
            .filter_map(|(_, v)| super::decode(v.clone()).ok())
            .collect()
    }

    /// Make the next `verb` on `kind` fail with the given HTTP status
    pub fn fail_next(&self, verb: &'static str, kind: &ResourceKind, status: u16) {
        write(&self.failures).push(InjectedFailure {
            verb,
            kind: kind.kind,
            status,
        });
    }

    /// Deny `verb` in a namespace for access checks
    pub fn deny(&self, namespace: &str, verb: &str) {
        write(&self.denied).insert((namespace.to_string(), verb.to_string()));
    }

    /// Every call recorded so far
    pub fn operations(&self) -> Vec<StoreOperation> {
        read(&self.operations).clone()
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> OperationCounts {
        let mut counts = OperationCounts::default();
        for op in read(&self.operations).iter() {
            match op.verb {
                "get" => counts.gets += 1,
                "list" => counts.lists += 1,
                "create" => counts.creates += 1,
                "update" => counts.updates += 1,
                "delete" => counts.deletes += 1,
                _ => {}
            }
        }
        counts
    }

    /// Reset operation counts
    pub fn reset_counts(&self) {
        write(&self.operations).clear();
    }

    fn record(&self, verb: &'static str, kind: &ResourceKind, namespace: &str, name: &str) -> Result<()> {
        write(&self.operations).push(StoreOperation {
            verb,
            kind: kind.kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        });

        let mut failures = write(&self.failures);
        if let Some(pos) = failures
            .iter()
            .position(|f| f.verb == verb && f.kind == kind.kind)
        {
            let failure = failures.remove(pos);
            return Err(KubeError::Api(kube::Error::Api(kube::core::ErrorResponse {
                status: "Failure".to_string(),
                message: format!("injected {} failure", verb),
                reason: "Injected".to_string(),
                code: failure.status,
            })));
        }
        Ok(())
    }

    /// Fill in server-side metadata
    fn stamp(&self, mut value: Value, namespace: &str) -> Value {
        if let Value::Object(map) = &mut value {
            let metadata = map
                .entry("metadata")
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(meta) = metadata {
                if !namespace.is_empty() {
                    meta.insert("namespace".to_string(), Value::String(namespace.to_string()));
                }
                if !meta.contains_key("uid") {
                    let uid = self.next_uid.fetch_add(1, Ordering::SeqCst) + 1;
                    meta.insert("uid".to_string(), Value::String(format!("mock-uid-{:04}", uid)));
                }
                let version = meta
                    .get("resourceVersion")
                    .and_then(Value::as_str)
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(0);
                meta.insert(
                    "resourceVersion".to_string(),
                    Value::String((version + 1).to_string()),
                );
            }
        }
        value
    }
}

fn key(kind: &ResourceKind, cluster: &str, namespace: &str, name: &str) -> ObjectKey {
    (
        kind.plural.to_string(),
        cluster.to_string(),
        namespace.to_string(),
        name.to_string(),
    )
}

fn object_name(value: &Value) -> String {
    value
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn not_found(kind: &ResourceKind, namespace: &str, name: &str) -> KubeError {
    KubeError::NotFound {
        kind: kind.kind.to_string(),
        namespace: namespace.to_string(),
        name: name.to_string(),
    }
}

/// Evaluate `a.b=c,d!=e` style selectors against a JSON object
fn matches_selector(value: &Value, selector: &str, lookup: impl Fn(&Value, &str) -> Option<String>) -> bool {
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .all(|term| {
            if let Some((field, expected)) = term.split_once("!=") {
                lookup(value, field.trim()).as_deref() != Some(expected.trim())
            } else if let Some((field, expected)) =
                term.split_once("==").or_else(|| term.split_once('='))
            {
                lookup(value, field.trim()).as_deref() == Some(expected.trim())
            } else {
                // bare label key: existence
                lookup(value, term).is_some()
            }
        })
}

fn field_value(value: &Value, path: &str) -> Option<String> {
    let pointer = format!("/{}", path.replace('.', "/"));
    match value.pointer(&pointer)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn label_value(value: &Value, key: &str) -> Option<String> {
    value
        .get("metadata")?
        .get("labels")?
        .get(key)?
        .as_str()
        .map(str::to_string)
}

#[async_trait]
impl ResourceStore for MockStore {
    async fn get_list(
        &self,
        kind: &ResourceKind,
        cluster: &str,
        namespace: &str,
        options: &ListOptions,
    ) -> Result<Vec<Value>> {
        self.record("list", kind, namespace, "")?;

        let objects = read(&self.objects);
        let items = objects
            .iter()
            .filter(|((plural, c, ns, _), _)| {
                plural == kind.plural && c == cluster && (namespace.is_empty() || ns == namespace)
            })
            .map(|(_, v)| v)
            .filter(|v| {
                options
                    .field_selector
                    .as_deref()
                    .is_none_or(|s| matches_selector(v, s, field_value))
            })
            .filter(|v| {
                options
                    .label_selector
                    .as_deref()
                    .is_none_or(|s| matches_selector(v, s, label_value))
            })
            .cloned()
            .collect();
        Ok(items)
    }

    async fn get_one(
        &self,
        kind: &ResourceKind,
        cluster: &str,
        namespace: &str,
        name: &str,
    ) -> Result<Value> {
        self.record("get", kind, namespace, name)?;

        read(&self.objects)
            .get(&key(kind, cluster, namespace, name))
            .cloned()
            .ok_or_else(|| not_found(kind, namespace, name))
    }

    async fn create_one(
        &self,
        kind: &ResourceKind,
        cluster: &str,
        namespace: &str,
        object: Value,
    ) -> Result<Value> {
        let name = object_name(&object);
        self.record("create", kind, namespace, &name)?;

        let key = key(kind, cluster, namespace, &name);
        let mut objects = write(&self.objects);
        if objects.contains_key(&key) {
            return Err(KubeError::AlreadyExists {
                kind: kind.kind.to_string(),
                namespace: namespace.to_string(),
                name,
            });
        }
        let stored = self.stamp(object, namespace);
        objects.insert(key, stored.clone());
        Ok(stored)
    }

    async fn update_one(
        &self,
        kind: &ResourceKind,
        cluster: &str,
        namespace: &str,
        object: Value,
    ) -> Result<Value> {
        let name = object_name(&object);
        self.record("update", kind, namespace, &name)?;

        let key = key(kind, cluster, namespace, &name);
        let mut objects = write(&self.objects);
        let Some(existing) = objects.get(&key) else {
            return Err(not_found(kind, namespace, &name));
        };

        let mut object = object;
        // uid is immutable
        if let (Some(uid), Some(Value::Object(meta))) = (
            existing.pointer("/metadata/uid").cloned(),
            object.get_mut("metadata"),
        ) {
            meta.insert("uid".to_string(), uid);
        }
        let stored = self.stamp(object, namespace);
        objects.insert(key, stored.clone());
        Ok(stored)
    }

    async fn delete_one(
        &self,
        kind: &ResourceKind,
        cluster: &str,
        namespace: &str,
        name: &str,
    ) -> Result<()> {
        self.record("delete", kind, namespace, name)?;

        write(&self.objects)
            .remove(&key(kind, cluster, namespace, name))
            .map(|_| ())
            .ok_or_else(|| not_found(kind, namespace, name))
    }

    async fn can_i(
        &self,
        _kind: &ResourceKind,
        _cluster: &str,
        namespace: &str,
        verb: &str,
    ) -> Result<bool> {
        let denied = read(&self.denied);
        Ok(!denied.contains(&(namespace.to_string(), verb.to_string())))
    }
}

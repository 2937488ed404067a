use crate::model::request::{RequestDocument, SourceType, StatusFilter, StoredDocument};
use crate::model::timestamp::RawTimestamp;
use crate::store::{CollectionMap, Decision, DocumentStore, Snapshot, StoreError};
use anyhow::{Context, Result};
use chrono::Utc;
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, warn};

#[derive(Default)]
struct Collection {
    docs: BTreeMap<String, Map<String, Value>>,
    denied: Option<String>,
    /// Status-scoped queries fail until this index is created.
    missing_index: Option<String>,
}

struct Inner {
    collections: Mutex<HashMap<String, Collection>>,
    /// Bumped on every change to a collection; watchers re-read on wake.
    versions: Mutex<HashMap<String, watch::Sender<u64>>>,
}

/// In-process live document store.
///
/// Documents are kept as JSON objects, the way a document database hands them out,
/// and converted to [`RequestDocument`] when a snapshot is taken.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                collections: Mutex::new(HashMap::new()),
                versions: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Load documents from a JSON file shaped `{"leave": {"<id>": {..}}, "out": {..}}`.
    pub fn seed_from_file(&self, path: &Path, collections: &CollectionMap) -> Result<usize> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading seed file {}", path.display()))?;
        let seed: HashMap<SourceType, BTreeMap<String, Value>> =
            serde_json::from_str(&raw).context("seed file is not valid JSON")?;

        let mut total = 0;
        for (source, docs) in seed {
            let collection = collections
                .resolve(source)
                .with_context(|| format!("no collection configured for {source}"))?;
            for (id, doc) in docs {
                self.insert(collection, &id, doc);
                total += 1;
            }
        }
        Ok(total)
    }

    /// Create or replace a document, as an external writer would.
    pub fn insert(&self, collection: &str, id: &str, doc: Value) {
        let doc = match doc {
            Value::Object(map) => map,
            other => {
                warn!(collection, id, "ignoring non-object document: {other}");
                return;
            }
        };
        self.collections()
            .entry(collection.to_string())
            .or_default()
            .docs
            .insert(id.to_string(), doc);
        self.bump(collection);
    }

    pub fn remove(&self, collection: &str, id: &str) -> bool {
        let removed = self
            .collections()
            .get_mut(collection)
            .and_then(|c| c.docs.remove(id))
            .is_some();
        if removed {
            self.bump(collection);
        }
        removed
    }

    /// Deny all access to a collection, e.g. to model revoked access rules.
    pub fn deny(&self, collection: &str, reason: &str) {
        self.collections()
            .entry(collection.to_string())
            .or_default()
            .denied = Some(reason.to_string());
        self.bump(collection);
    }

    /// Make status-scoped queries on a collection fail, as an unbuilt index would.
    pub fn require_index(&self, collection: &str, message: &str) {
        self.collections()
            .entry(collection.to_string())
            .or_default()
            .missing_index = Some(message.to_string());
        self.bump(collection);
    }

    pub fn document(&self, collection: &str, id: &str) -> Option<Value> {
        self.collections()
            .get(collection)
            .and_then(|c| c.docs.get(id))
            .map(|doc| Value::Object(doc.clone()))
    }

    fn collections(&self) -> MutexGuard<'_, HashMap<String, Collection>> {
        self.inner
            .collections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn version_channel(&self, collection: &str) -> watch::Sender<u64> {
        let mut versions = self
            .inner
            .versions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        versions
            .entry(collection.to_string())
            .or_insert_with(|| watch::channel(0).0)
            .clone()
    }

    fn bump(&self, collection: &str) {
        self.version_channel(collection).send_modify(|v| *v += 1);
    }

    fn snapshot(&self, collection: &str, filter: &StatusFilter) -> Result<Snapshot, StoreError> {
        let collections = self.collections();
        let Some(entry) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        if let Some(reason) = &entry.denied {
            return Err(StoreError::PermissionDenied {
                message: reason.clone(),
            });
        }
        if let Some(message) = entry.missing_index.as_ref().filter(|_| *filter != StatusFilter::All) {
            return Err(StoreError::MissingIndex {
                message: message.clone(),
            });
        }

        let snapshot = entry
            .docs
            .iter()
            .filter(|(_, doc)| filter.matches_raw(doc.get("status").and_then(Value::as_str)))
            .filter_map(|(id, doc)| {
                match serde_json::from_value::<RequestDocument>(Value::Object(doc.clone())) {
                    Ok(body) => Some(StoredDocument {
                        id: id.clone(),
                        body,
                    }),
                    Err(e) => {
                        warn!(collection, id = %id, error = %e, "skipping malformed document");
                        None
                    }
                }
            })
            .collect();
        Ok(snapshot)
    }

    fn write<F>(&self, collection: &str, id: &str, op: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut BTreeMap<String, Map<String, Value>>) -> Result<(), StoreError>,
    {
        {
            let mut collections = self.collections();
            let entry = collections.entry(collection.to_string()).or_default();
            if let Some(reason) = &entry.denied {
                return Err(StoreError::PermissionDenied {
                    message: reason.clone(),
                });
            }
            op(&mut entry.docs)?;
        }
        self.bump(collection);
        Ok(())
    }
}

fn not_found(collection: &str, id: &str) -> StoreError {
    StoreError::NotFound {
        collection: collection.to_string(),
        id: id.to_string(),
    }
}

fn parse_document(doc: &Map<String, Value>) -> RequestDocument {
    serde_json::from_value(Value::Object(doc.clone())).unwrap_or_default()
}

impl DocumentStore for MemoryStore {
    fn watch(&self, collection: &str, filter: &StatusFilter) -> BoxStream<'static, Result<Snapshot, StoreError>> {
        let store = self.clone();
        let collection = collection.to_string();
        let filter = filter.clone();
        let mut versions = self.version_channel(&collection).subscribe();
        versions.mark_changed();

        // (receiver, last delivered snapshot, finished)
        stream::unfold(
            (versions, None::<Snapshot>, false),
            move |(mut versions, last, finished)| {
                let store = store.clone();
                let collection = collection.clone();
                let filter = filter.clone();
                async move {
                    if finished {
                        return None;
                    }
                    loop {
                        if versions.changed().await.is_err() {
                            return None;
                        }
                        match store.snapshot(&collection, &filter) {
                            Ok(snapshot) if last.as_ref() == Some(&snapshot) => continue,
                            Ok(snapshot) => {
                                debug!(collection = %collection, size = snapshot.len(), "snapshot");
                                return Some((Ok(snapshot.clone()), (versions, Some(snapshot), false)));
                            }
                            Err(e) => return Some((Err(e), (versions, last, true))),
                        }
                    }
                }
            },
        )
        .boxed()
    }

    fn update_decision<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
        decision: Decision,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let decided_at = serde_json::to_value(RawTimestamp::epoch_now()).unwrap_or(Value::Null);
            self.write(collection, id, |docs| {
                let doc = docs.get_mut(id).ok_or_else(|| not_found(collection, id))?;
                let current = parse_document(doc);
                if !current.status().is_open() {
                    return Err(StoreError::AlreadyDecided {
                        collection: collection.to_string(),
                        id: id.to_string(),
                        status: current.status.unwrap_or_default(),
                    });
                }
                doc.insert("status".into(), Value::String(decision.status.to_string()));
                doc.insert("decisionAt".into(), decided_at);
                doc.insert("decisionBy".into(), Value::String(decision.decided_by));
                Ok(())
            })
        })
    }

    fn delete<'a>(&'a self, collection: &'a str, id: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            self.write(collection, id, |docs| {
                let doc = docs.get(id).ok_or_else(|| not_found(collection, id))?;
                let permission = parse_document(doc).delete_permission(Utc::now());
                if !permission.is_allowed() {
                    return Err(StoreError::Locked {
                        collection: collection.to_string(),
                        id: id.to_string(),
                        permission,
                    });
                }
                docs.remove(id);
                Ok(())
            })
        })
    }
}

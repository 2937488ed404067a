//! Store double whose live queries are fed by the test.

use crate::model::request::{RequestDocument, StatusFilter, StoredDocument};
use crate::store::{Decision, DocumentStore, Snapshot, StoreError};
use futures::channel::mpsc;
use futures::future::BoxFuture;
use futures::stream::{BoxStream, StreamExt};
use std::sync::Mutex;

pub struct Watcher {
    pub collection: String,
    pub filter: StatusFilter,
    pub sender: mpsc::UnboundedSender<Result<Snapshot, StoreError>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    Decision {
        collection: String,
        id: String,
        decision: Decision,
    },
    Delete {
        collection: String,
        id: String,
    },
}

#[derive(Default)]
pub struct ScriptedStore {
    pub watchers: Mutex<Vec<Watcher>>,
    pub writes: Mutex<Vec<Write>>,
    pub fail_writes: Mutex<Option<StoreError>>,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a snapshot to the `index`-th watch call made against `collection`.
    pub fn push(&self, collection: &str, index: usize, snapshot: Snapshot) -> bool {
        self.send(collection, index, Ok(snapshot))
    }

    pub fn fail(&self, collection: &str, index: usize, error: StoreError) -> bool {
        self.send(collection, index, Err(error))
    }

    fn send(&self, collection: &str, index: usize, item: Result<Snapshot, StoreError>) -> bool {
        let watchers = self.watchers.lock().unwrap();
        watchers
            .iter()
            .filter(|w| w.collection == collection)
            .nth(index)
            .map(|w| w.sender.unbounded_send(item).is_ok())
            .unwrap_or(false)
    }

    pub fn watch_count(&self, collection: &str) -> usize {
        self.watchers
            .lock()
            .unwrap()
            .iter()
            .filter(|w| w.collection == collection)
            .count()
    }

    /// Whether the consumer of the `index`-th watch has gone away.
    pub fn is_closed(&self, collection: &str, index: usize) -> bool {
        self.watchers
            .lock()
            .unwrap()
            .iter()
            .filter(|w| w.collection == collection)
            .nth(index)
            .map(|w| w.sender.is_closed())
            .unwrap_or(true)
    }
}

pub fn doc(id: &str, body: serde_json::Value) -> StoredDocument {
    StoredDocument {
        id: id.to_string(),
        body: serde_json::from_value::<RequestDocument>(body).unwrap(),
    }
}

impl DocumentStore for ScriptedStore {
    fn watch(&self, collection: &str, filter: &StatusFilter) -> BoxStream<'static, Result<Snapshot, StoreError>> {
        let (sender, receiver) = mpsc::unbounded();
        self.watchers.lock().unwrap().push(Watcher {
            collection: collection.to_string(),
            filter: filter.clone(),
            sender,
        });
        receiver.boxed()
    }

    fn update_decision<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
        decision: Decision,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            if let Some(e) = self.fail_writes.lock().unwrap().clone() {
                return Err(e);
            }
            self.writes.lock().unwrap().push(Write::Decision {
                collection: collection.to_string(),
                id: id.to_string(),
                decision,
            });
            Ok(())
        })
    }

    fn delete<'a>(&'a self, collection: &'a str, id: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            if let Some(e) = self.fail_writes.lock().unwrap().clone() {
                return Err(e);
            }
            self.writes.lock().unwrap().push(Write::Delete {
                collection: collection.to_string(),
                id: id.to_string(),
            });
            Ok(())
        })
    }
}

pub mod kv;
pub mod memory;
pub mod mysql;
#[cfg(test)]
pub mod scripted;

use crate::model::request::{DeletePermission, RequestStatus, SourceType, StatusFilter, StoredDocument};
use derive_more::{Display, Error};
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use std::collections::HashMap;
use strum::IntoEnumIterator;

#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum StoreError {
    #[display(fmt = "document {}/{} not found", collection, id)]
    NotFound { collection: String, id: String },
    #[display(fmt = "permission denied: {}", message)]
    PermissionDenied { message: String },
    #[display(fmt = "query requires an index: {}", message)]
    MissingIndex { message: String },
    #[display(fmt = "store unavailable: {}", message)]
    Unavailable { message: String },
    #[display(fmt = "unknown collection {}", collection)]
    UnknownCollection { collection: String },
    #[display(fmt = "document {}/{} can no longer be deleted ({:?})", collection, id, permission)]
    Locked {
        collection: String,
        id: String,
        permission: DeletePermission,
    },
    #[display(fmt = "document {}/{} is already {}", collection, id, status)]
    AlreadyDecided {
        collection: String,
        id: String,
        status: String,
    },
}

/// MySQL `ER_KEY_DOES_NOT_EXITS`: a forced index is missing from the table.
const ER_KEY_DOES_NOT_EXIST: u16 = 1176;

/// Maps a database error to the store's error kinds.
pub fn classify_database_error(sqlstate: Option<&str>, number: Option<u16>, message: String) -> StoreError {
    if number == Some(ER_KEY_DOES_NOT_EXIST) {
        return StoreError::MissingIndex { message };
    }
    match sqlstate {
        // SQLSTATE 42000 carries MySQL's access-denied family
        Some("42000") => StoreError::PermissionDenied { message },
        Some("42S02") => StoreError::UnknownCollection { collection: message },
        _ => StoreError::Unavailable { message },
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Database(db_err) => {
                let number = db_err
                    .try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>()
                    .map(|e| e.number());
                classify_database_error(db_err.code().as_deref(), number, db_err.message().to_string())
            }
            other => StoreError::Unavailable {
                message: other.to_string(),
            },
        }
    }
}

/// A full snapshot of the documents matching a live query.
pub type Snapshot = Vec<StoredDocument>;

/// Fields written by an approve or reject. The store assigns `decisionAt` itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub status: RequestStatus,
    pub decided_by: String,
}

/// Capability surface of the remote document store.
///
/// `watch` delivers a full snapshot on every change to a matching document.
/// After yielding an error the stream delivers nothing more.
pub trait DocumentStore: Send + Sync + 'static {
    fn watch(&self, collection: &str, filter: &StatusFilter) -> BoxStream<'static, Result<Snapshot, StoreError>>;

    fn update_decision<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
        decision: Decision,
    ) -> BoxFuture<'a, Result<(), StoreError>>;

    fn delete<'a>(&'a self, collection: &'a str, id: &'a str) -> BoxFuture<'a, Result<(), StoreError>>;
}

/// Collection path per source type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionMap {
    paths: HashMap<SourceType, String>,
}

impl CollectionMap {
    pub fn for_app(app_id: &str) -> Self {
        let paths = SourceType::iter()
            .map(|source| {
                let name = match source {
                    SourceType::Leave => "leave_requests",
                    SourceType::Out => "out_requests",
                };
                (source, format!("/artifacts/{app_id}/public/data/{name}"))
            })
            .collect();
        Self { paths }
    }

    pub fn from_paths(paths: impl IntoIterator<Item = (SourceType, String)>) -> Self {
        Self {
            paths: paths.into_iter().collect(),
        }
    }

    pub fn resolve(&self, source: SourceType) -> Option<&str> {
        self.paths.get(&source).map(String::as_str)
    }

    pub fn source_of(&self, collection: &str) -> Option<SourceType> {
        self.paths
            .iter()
            .find(|(_, path)| path.as_str() == collection)
            .map(|(source, _)| *source)
    }
}

/// Last path segment of a collection path, e.g. `leave_requests`.
pub fn collection_name(collection: &str) -> &str {
    collection.rsplit('/').next().unwrap_or(collection)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_collections_resolve_both_sources() {
        let map = CollectionMap::for_app("demo");
        assert_eq!(
            map.resolve(SourceType::Leave),
            Some("/artifacts/demo/public/data/leave_requests")
        );
        assert_eq!(
            map.source_of("/artifacts/demo/public/data/out_requests"),
            Some(SourceType::Out)
        );
        assert_eq!(collection_name("/artifacts/demo/public/data/out_requests"), "out_requests");
    }

    #[test]
    fn database_errors_classify_by_number_then_sqlstate() {
        // a forced index that is gone reports 1176 under SQLSTATE 42000
        assert!(matches!(
            classify_database_error(Some("42000"), Some(1176), "Key 'idx' doesn't exist".into()),
            StoreError::MissingIndex { .. }
        ));
        assert!(matches!(
            classify_database_error(Some("42000"), Some(1142), "SELECT command denied".into()),
            StoreError::PermissionDenied { .. }
        ));
        assert!(matches!(
            classify_database_error(Some("42S02"), Some(1146), "no such table".into()),
            StoreError::UnknownCollection { .. }
        ));
        assert!(matches!(
            classify_database_error(None, None, "gone away".into()),
            StoreError::Unavailable { .. }
        ));
    }

    #[test]
    fn partial_map_leaves_source_unresolved() {
        let map = CollectionMap::from_paths([(SourceType::Leave, "leave".to_string())]);
        assert_eq!(map.resolve(SourceType::Out), None);
    }
}

use crate::model::action::AdminAction;
use crate::model::request::{DeletePermission, SourceType};
use crate::store::{CollectionMap, Decision, DocumentStore, StoreError};
use derive_more::{Display, Error};
use std::sync::Arc;
use tracing::{error, info, instrument};

#[derive(Debug, Clone, PartialEq, Display, Error)]
pub enum ActionError {
    #[display(fmt = "no collection configured for {}", source_type)]
    UnknownCollection { source_type: SourceType },
    #[display(fmt = "{}", source)]
    Store { source: StoreError },
    #[display(fmt = "invalid action {:?}", action)]
    InvalidAction { action: String },
    #[display(fmt = "an action on {} is already in progress", id)]
    InFlight { id: String },
    #[display(fmt = "request {} can no longer be deleted ({:?})", id, permission)]
    Locked { id: String, permission: DeletePermission },
    #[display(fmt = "request {} is already {}", id, status)]
    AlreadyDecided { id: String, status: String },
}

impl From<StoreError> for ActionError {
    fn from(source: StoreError) -> Self {
        match source {
            StoreError::Locked { id, permission, .. } => ActionError::Locked { id, permission },
            StoreError::AlreadyDecided { id, status, .. } => ActionError::AlreadyDecided { id, status },
            source => ActionError::Store { source },
        }
    }
}

/// Issues one admin mutation against the document store. No retries, no dedup.
#[derive(Clone)]
pub struct ActionExecutor {
    store: Arc<dyn DocumentStore>,
    collections: CollectionMap,
}

impl ActionExecutor {
    pub fn new(store: Arc<dyn DocumentStore>, collections: CollectionMap) -> Self {
        Self { store, collections }
    }

    /// The store refuses decisions on decided requests and deletes past the
    /// decision window. Otherwise the effect shows up only through the next
    /// subscription delivery.
    #[instrument(name = "admin_action", skip(self))]
    pub async fn execute(
        &self,
        id: &str,
        source_type: SourceType,
        action: AdminAction,
        actor: &str,
    ) -> Result<(), ActionError> {
        let collection = self
            .collections
            .resolve(source_type)
            .ok_or(ActionError::UnknownCollection { source_type })?;

        let result = match action.decision_status() {
            Some(status) => {
                self.store
                    .update_decision(
                        collection,
                        id,
                        Decision {
                            status,
                            decided_by: actor.to_string(),
                        },
                    )
                    .await
            }
            None => self.store.delete(collection, id).await,
        };

        match result {
            Ok(()) => {
                info!("action applied");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "action rejected by store");
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::request::RequestStatus;
    use crate::store::scripted::{ScriptedStore, Write};

    fn executor(store: Arc<ScriptedStore>) -> ActionExecutor {
        ActionExecutor::new(
            store,
            CollectionMap::from_paths([(SourceType::Leave, "leave".to_string())]),
        )
    }

    #[actix_web::test]
    async fn approve_writes_status_and_actor() {
        let store = Arc::new(ScriptedStore::new());
        executor(store.clone())
            .execute("r1", SourceType::Leave, AdminAction::Approve, "Admin Daro")
            .await
            .expect("approve");

        assert_eq!(
            store.writes.lock().unwrap().as_slice(),
            &[Write::Decision {
                collection: "leave".into(),
                id: "r1".into(),
                decision: Decision {
                    status: RequestStatus::Approved,
                    decided_by: "Admin Daro".into(),
                },
            }]
        );
    }

    #[actix_web::test]
    async fn reject_and_delete_hit_the_store() {
        let store = Arc::new(ScriptedStore::new());
        let exec = executor(store.clone());
        exec.execute("r1", SourceType::Leave, AdminAction::Reject, "A")
            .await
            .expect("reject");
        exec.execute("r2", SourceType::Leave, AdminAction::Delete, "A")
            .await
            .expect("delete");

        let writes = store.writes.lock().unwrap();
        assert!(matches!(
            &writes[0],
            Write::Decision { decision, .. } if decision.status == RequestStatus::Rejected
        ));
        assert_eq!(
            writes[1],
            Write::Delete {
                collection: "leave".into(),
                id: "r2".into()
            }
        );
    }

    #[actix_web::test]
    async fn unmapped_source_is_an_error() {
        let store = Arc::new(ScriptedStore::new());
        let err = executor(store)
            .execute("r1", SourceType::Out, AdminAction::Approve, "A")
            .await
            .expect_err("unmapped");
        assert_eq!(
            err,
            ActionError::UnknownCollection {
                source_type: SourceType::Out
            }
        );
    }

    #[actix_web::test]
    async fn store_rejection_is_surfaced() {
        let store = Arc::new(ScriptedStore::new());
        *store.fail_writes.lock().unwrap() = Some(StoreError::PermissionDenied {
            message: "rules".into(),
        });
        let err = executor(store)
            .execute("r1", SourceType::Leave, AdminAction::Delete, "A")
            .await
            .expect_err("denied");
        assert!(matches!(
            err,
            ActionError::Store {
                source: StoreError::PermissionDenied { .. }
            }
        ));
    }

    #[actix_web::test]
    async fn store_guard_refusals_become_action_errors() {
        let store = Arc::new(ScriptedStore::new());
        *store.fail_writes.lock().unwrap() = Some(StoreError::Locked {
            collection: "leave".into(),
            id: "r1".into(),
            permission: DeletePermission::Locked,
        });
        let err = executor(store.clone())
            .execute("r1", SourceType::Leave, AdminAction::Delete, "A")
            .await
            .expect_err("locked");
        assert_eq!(
            err,
            ActionError::Locked {
                id: "r1".into(),
                permission: DeletePermission::Locked
            }
        );

        *store.fail_writes.lock().unwrap() = Some(StoreError::AlreadyDecided {
            collection: "leave".into(),
            id: "r1".into(),
            status: "approved".into(),
        });
        let err = executor(store)
            .execute("r1", SourceType::Leave, AdminAction::Reject, "A")
            .await
            .expect_err("decided");
        assert_eq!(
            err,
            ActionError::AlreadyDecided {
                id: "r1".into(),
                status: "approved".into()
            }
        );
    }
}

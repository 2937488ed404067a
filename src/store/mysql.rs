use crate::model::request::{RequestDocument, StatusFilter, StoredDocument, DECISION_WINDOW_MINUTES};
use crate::model::timestamp::RawTimestamp;
use crate::store::{collection_name, Decision, DocumentStore, Snapshot, StoreError};
use chrono::{DateTime, NaiveDateTime, Utc};
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};
use sqlx::{FromRow, MySqlPool};
use std::time::Duration;
use tracing::{debug, error, info};

#[derive(Debug, FromRow)]
struct RequestRow {
    id: String,
    status: Option<String>,
    requested_at: Option<NaiveDateTime>,
    decision_at: Option<NaiveDateTime>,
    decision_by: Option<String>,
    department: Option<String>,
    name: Option<String>,
    user_id: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    duration: Option<String>,
    reason: Option<String>,
    photo: Option<String>,
    return_status: Option<String>,
    returned_at: Option<NaiveDateTime>,
}

impl From<RequestRow> for StoredDocument {
    fn from(row: RequestRow) -> Self {
        let native = |t: Option<NaiveDateTime>| t.map(|t| RawTimestamp::Native(t.and_utc()));
        StoredDocument {
            id: row.id,
            body: RequestDocument {
                status: row.status,
                requested_at: native(row.requested_at),
                decision_at: native(row.decision_at),
                decision_by: row.decision_by,
                department: row.department,
                name: row.name,
                user_id: row.user_id,
                start_date: row.start_date,
                end_date: row.end_date,
                duration: row.duration,
                reason: row.reason,
                photo: row.photo,
                return_status: row.return_status,
                returned_at: native(row.returned_at),
            },
        }
    }
}

const SELECT_COLUMNS: &str = "id, status, requested_at, decision_at, decision_by, department, name, \
     user_id, start_date, end_date, duration, reason, photo, return_status, returned_at";

/// Table behind a collection path. Only plain identifiers are accepted.
fn table_for(collection: &str) -> Result<&str, StoreError> {
    let name = collection_name(collection);
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(name)
    } else {
        Err(StoreError::UnknownCollection {
            collection: collection.to_string(),
        })
    }
}

/// Decisions only land on open requests.
fn decision_sql(table: &str) -> String {
    format!(
        "UPDATE {table} SET status = ?, decision_at = UTC_TIMESTAMP(), decision_by = ? \
         WHERE id = ? AND status IN ('pending', 'editing')"
    )
}

/// Open requests always go; decided ones only inside the decision window.
fn delete_sql(table: &str) -> String {
    format!(
        "DELETE FROM {table} WHERE id = ? AND (status IN ('pending', 'editing') \
         OR (status IN ('approved', 'rejected') AND decision_at > UTC_TIMESTAMP() - INTERVAL ? MINUTE))"
    )
}

/// Why a guarded write touched no row, given the row as it stands now.
fn refusal(
    collection: &str,
    id: &str,
    current: Option<StoredDocument>,
    deleting: bool,
    now: DateTime<Utc>,
) -> StoreError {
    let Some(doc) = current else {
        return StoreError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        };
    };
    if deleting {
        StoreError::Locked {
            collection: collection.to_string(),
            id: id.to_string(),
            permission: doc.body.delete_permission(now),
        }
    } else {
        StoreError::AlreadyDecided {
            collection: collection.to_string(),
            id: id.to_string(),
            status: doc.body.status.unwrap_or_default(),
        }
    }
}

/// MySQL-backed document store. Each collection is a table; live queries poll.
#[derive(Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
    poll_interval: Duration,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool, poll_interval: Duration) -> Self {
        Self { pool, poll_interval }
    }

    /// Create the request tables for the given collections if they are missing.
    pub async fn ensure_schema<'a>(&self, collections: impl IntoIterator<Item = &'a str>) -> Result<(), StoreError> {
        for collection in collections {
            let table = table_for(collection)?;
            let ddl = format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    id            VARCHAR(128) NOT NULL PRIMARY KEY,
                    status        VARCHAR(32)  NULL,
                    requested_at  DATETIME     NULL,
                    decision_at   DATETIME     NULL,
                    decision_by   VARCHAR(255) NULL,
                    department    VARCHAR(255) NULL,
                    name          VARCHAR(255) NULL,
                    user_id       VARCHAR(64)  NULL,
                    start_date    VARCHAR(32)  NULL,
                    end_date      VARCHAR(32)  NULL,
                    duration      VARCHAR(64)  NULL,
                    reason        TEXT         NULL,
                    photo         TEXT         NULL,
                    return_status VARCHAR(64)  NULL,
                    returned_at   DATETIME     NULL,
                    INDEX idx_{table}_status (status)
                )
                "#
            );
            sqlx::query(&ddl).execute(&self.pool).await?;
            info!(table, "request table ready");
        }
        Ok(())
    }

    async fn fetch(pool: &MySqlPool, table: &str, filter: &StatusFilter) -> Result<Snapshot, StoreError> {
        let rows = match filter {
            StatusFilter::All => {
                let sql = format!("SELECT {SELECT_COLUMNS} FROM {table} ORDER BY id");
                sqlx::query_as::<_, RequestRow>(&sql).fetch_all(pool).await?
            }
            StatusFilter::Pending => {
                let sql = format!(
                    "SELECT {SELECT_COLUMNS} FROM {table} FORCE INDEX (idx_{table}_status) \
                     WHERE status IN ('pending', 'editing') ORDER BY id"
                );
                sqlx::query_as::<_, RequestRow>(&sql).fetch_all(pool).await?
            }
            StatusFilter::Exactly(status) => {
                let sql = format!(
                    "SELECT {SELECT_COLUMNS} FROM {table} FORCE INDEX (idx_{table}_status) \
                     WHERE status = ? ORDER BY id"
                );
                sqlx::query_as::<_, RequestRow>(&sql)
                    .bind(status)
                    .fetch_all(pool)
                    .await?
            }
        };
        Ok(rows.into_iter().map(StoredDocument::from).collect())
    }

    async fn find(&self, table: &str, id: &str) -> Result<Option<StoredDocument>, StoreError> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM {table} WHERE id = ?");
        let row = sqlx::query_as::<_, RequestRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(StoredDocument::from))
    }
}

struct PollState {
    pool: MySqlPool,
    table: String,
    filter: StatusFilter,
    interval: Duration,
    last: Option<Snapshot>,
    first: bool,
    finished: bool,
}

impl DocumentStore for MySqlStore {
    fn watch(&self, collection: &str, filter: &StatusFilter) -> BoxStream<'static, Result<Snapshot, StoreError>> {
        let table = match table_for(collection) {
            Ok(table) => table.to_string(),
            Err(e) => return stream::once(async move { Err(e) }).boxed(),
        };

        let state = PollState {
            pool: self.pool.clone(),
            table,
            filter: filter.clone(),
            interval: self.poll_interval,
            last: None,
            first: true,
            finished: false,
        };

        stream::unfold(state, |mut state| async move {
            if state.finished {
                return None;
            }
            loop {
                if !state.first {
                    tokio::time::sleep(state.interval).await;
                }
                state.first = false;

                match Self::fetch(&state.pool, &state.table, &state.filter).await {
                    Ok(snapshot) if state.last.as_ref() == Some(&snapshot) => continue,
                    Ok(snapshot) => {
                        debug!(table = %state.table, size = snapshot.len(), "snapshot changed");
                        state.last = Some(snapshot.clone());
                        return Some((Ok(snapshot), state));
                    }
                    Err(e) => {
                        error!(table = %state.table, error = %e, "live query failed");
                        state.finished = true;
                        return Some((Err(e), state));
                    }
                }
            }
        })
        .boxed()
    }

    fn update_decision<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
        decision: Decision,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let table = table_for(collection)?;
            let result = sqlx::query(&decision_sql(table))
                .bind(decision.status.to_string())
                .bind(&decision.decided_by)
                .bind(id)
                .execute(&self.pool)
                .await?;

            if result.rows_affected() == 0 {
                let current = self.find(table, id).await?;
                return Err(refusal(collection, id, current, false, Utc::now()));
            }
            Ok(())
        })
    }

    fn delete<'a>(&'a self, collection: &'a str, id: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let table = table_for(collection)?;
            let result = sqlx::query(&delete_sql(table))
                .bind(id)
                .bind(DECISION_WINDOW_MINUTES)
                .execute(&self.pool)
                .await?;

            if result.rows_affected() == 0 {
                let current = self.find(table, id).await?;
                return Err(refusal(collection, id, current, true, Utc::now()));
            }
            Ok(())
        })
    }
}

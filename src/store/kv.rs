use crate::model::settings::{Settings, SETTINGS_KEY};
use crate::store::StoreError;
use futures::future::BoxFuture;
use sqlx::MySqlPool;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Persistent string key-value storage for the settings record.
pub trait KeyValueStore: Send + Sync + 'static {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>, StoreError>>;
    fn set<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, Result<(), StoreError>>;
}

#[derive(Clone, Default)]
pub struct MemoryKeyValueStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>, StoreError>> {
        Box::pin(async move {
            let entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
            Ok(entries.get(key).cloned())
        })
    }

    fn set<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
            entries.insert(key.to_string(), value);
            Ok(())
        })
    }
}

/// `admin_settings` table, one row per key.
#[derive(Clone)]
pub struct MySqlKeyValueStore {
    pool: MySqlPool,
}

impl MySqlKeyValueStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS admin_settings (
                setting_key   VARCHAR(191) NOT NULL PRIMARY KEY,
                setting_value TEXT         NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

impl KeyValueStore for MySqlKeyValueStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>, StoreError>> {
        Box::pin(async move {
            let value = sqlx::query_scalar::<_, String>(
                "SELECT setting_value FROM admin_settings WHERE setting_key = ?",
            )
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
            Ok(value)
        })
    }

    fn set<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            sqlx::query(
                r#"
                INSERT INTO admin_settings (setting_key, setting_value)
                VALUES (?, ?)
                ON DUPLICATE KEY UPDATE setting_value = VALUES(setting_value)
                "#,
            )
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
    }
}

/// Load the settings record. Unreadable or corrupted blobs yield the defaults.
pub async fn load_settings(kv: &dyn KeyValueStore) -> Settings {
    let raw = match kv.get(SETTINGS_KEY).await {
        Ok(Some(raw)) => raw,
        Ok(None) => return Settings::default(),
        Err(e) => {
            warn!(error = %e, "settings store unavailable, using defaults");
            return Settings::default();
        }
    };

    match serde_json::from_str::<Settings>(&raw) {
        Ok(settings) => settings,
        Err(e) => {
            debug!(error = %e, "discarding corrupted settings blob");
            Settings::default()
        }
    }
}

pub async fn save_settings(kv: &dyn KeyValueStore, settings: &Settings) -> Result<(), StoreError> {
    let blob = serde_json::to_string(settings).map_err(|e| StoreError::Unavailable {
        message: e.to_string(),
    })?;
    kv.set(SETTINGS_KEY, blob).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::settings::{ApprovedFilterType, DarkMode};

    #[actix_web::test]
    async fn saved_settings_load_back_identically() {
        let kv = MemoryKeyValueStore::new();
        let settings = Settings {
            filter_current_month: true,
            compact_view_approved: true,
            approved_filter_type: ApprovedFilterType::Out,
            filter_by_department: true,
            selected_department: "IT".into(),
            dark_mode: DarkMode::Dark,
            theme: "ocean".into(),
        };
        save_settings(&kv, &settings).await.expect("save");

        // a second handle over the same storage stands in for a fresh process
        let fresh = kv.clone();
        assert_eq!(load_settings(&fresh).await, settings);
    }

    #[actix_web::test]
    async fn corrupted_blob_yields_defaults() {
        let kv = MemoryKeyValueStore::new();
        kv.set(SETTINGS_KEY, "{not json".into()).await.expect("set");
        assert_eq!(load_settings(&kv).await, Settings::default());

        kv.set(SETTINGS_KEY, r#"{"filterCurrentMonth": "yes"}"#.into())
            .await
            .expect("set");
        assert_eq!(load_settings(&kv).await, Settings::default());
    }

    #[actix_web::test]
    async fn absent_blob_yields_defaults() {
        let kv = MemoryKeyValueStore::new();
        assert_eq!(load_settings(&kv).await, Settings::default());
    }
}

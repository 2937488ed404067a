use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer};
use anyhow::Context;
use dotenvy::dotenv;
use std::sync::Arc;

mod api;
mod auth;
mod config;
mod db;
mod docs;
mod engine;
mod model;
mod models;
mod routes;
mod session;
mod store;

use config::{Config, StoreBackend};
use db::init_db;

use crate::docs::ApiDoc;
use crate::model::request::SourceType;
use crate::session::dashboard::SessionDeps;
use crate::session::registry::SessionRegistry;
use crate::store::kv::{KeyValueStore, MemoryKeyValueStore, MySqlKeyValueStore};
use crate::store::memory::MemoryStore;
use crate::store::mysql::MySqlStore;
use crate::store::{CollectionMap, DocumentStore};
use strum::IntoEnumIterator;
use tracing::{info, warn};
use tracing_appender::rolling;
use utoipa::OpenApi; // ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

async fn open_stores(
    config: &Config,
    collections: &CollectionMap,
) -> anyhow::Result<(Arc<dyn DocumentStore>, Arc<dyn KeyValueStore>)> {
    match config.store_backend {
        StoreBackend::Memory => {
            let store = MemoryStore::new();
            if let Some(path) = &config.seed_file {
                let count = store.seed_from_file(path, collections)?;
                info!(documents = count, file = %path.display(), "Seeded memory store");
            }
            let store: Arc<dyn DocumentStore> = Arc::new(store);
            let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
            Ok((store, kv))
        }
        StoreBackend::Mysql => {
            if config.seed_file.is_some() {
                warn!("SEED_FILE is ignored with the mysql backend");
            }
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set")?;
            let pool = init_db(url).await?;

            let store = MySqlStore::new(pool.clone(), config.store_poll_interval);
            store
                .ensure_schema(SourceType::iter().filter_map(|s| collections.resolve(s)))
                .await
                .context("Failed to prepare request tables")?;

            let kv = MySqlKeyValueStore::new(pool);
            kv.ensure_schema()
                .await
                .context("Failed to prepare settings table")?;

            let store: Arc<dyn DocumentStore> = Arc::new(store);
            let kv: Arc<dyn KeyValueStore> = Arc::new(kv);
            Ok((store, kv))
        }
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!(backend = %config.store_backend, app_id = %config.app_id, "Server starting...");

    let collections = CollectionMap::for_app(&config.app_id);
    let (store, kv) = match open_stores(&config, &collections).await {
        Ok(stores) => stores,
        Err(e) => {
            tracing::error!(error = %e, "Initialization failed");
            return Err(e);
        }
    };

    let registry = SessionRegistry::new(
        SessionDeps {
            store,
            kv,
            collections,
            actor: config.admin_name.clone(),
        },
        config.session_idle,
    );

    let server_addr = config.server_addr.clone();
    let config_data = config.clone();

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // wildcard to match JS/CSS files
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(Data::new(registry.clone()))
            .app_data(Data::new(config.clone()))
            // Auth + protected routes with rate limiting
            .configure(|cfg| routes::configure(cfg, config_data.clone()))
    })
    .bind(&server_addr)
    .with_context(|| format!("Failed to bind {server_addr}"))?
    .run()
    .await?;

    Ok(())
}

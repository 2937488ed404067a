use crate::config::Config;
use crate::models::SignInResponse;
use crate::routes;
use crate::session::dashboard::SessionDeps;
use crate::session::registry::SessionRegistry;
use crate::store::kv::MemoryKeyValueStore;
use crate::store::memory::MemoryStore;
use crate::store::CollectionMap;
use crate::model::settings::Settings;
use actix_web::http::StatusCode;
use actix_web::web::Data;
use actix_web::{App, test};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;

const LEAVE: &str = "/artifacts/test/public/data/leave_requests";

fn state(store: &MemoryStore) -> (Config, SessionRegistry) {
    let config = Config::for_tests();
    let registry = SessionRegistry::new(
        SessionDeps {
            store: Arc::new(store.clone()),
            kv: Arc::new(MemoryKeyValueStore::new()),
            collections: CollectionMap::for_app(&config.app_id),
            actor: config.admin_name.clone(),
        },
        config.session_idle,
    );
    (config, registry)
}

fn peer() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 40_000))
}

fn request(method: &str, uri: &str, token: Option<&str>) -> test::TestRequest {
    let req = match method {
        "POST" => test::TestRequest::post(),
        "PUT" => test::TestRequest::put(),
        _ => test::TestRequest::get(),
    }
    .uri(uri)
    .peer_addr(peer());
    match token {
        Some(token) => req.insert_header(("Authorization", format!("Bearer {token}"))),
        None => req,
    }
}

macro_rules! app {
    ($config:expr, $registry:expr) => {{
        let config = $config.clone();
        test::init_service(
            App::new()
                .app_data(Data::new($config.clone()))
                .app_data(Data::new($registry.clone()))
                .configure(move |cfg| routes::configure(cfg, config.clone())),
        )
        .await
    }};
}

macro_rules! sign_in {
    ($app:expr) => {{
        let resp: SignInResponse =
            test::call_and_read_body_json(&$app, request("POST", "/auth/anonymous", None).to_request()).await;
        resp.token
    }};
}

#[actix_web::test]
async fn protected_routes_require_a_token() {
    let store = MemoryStore::new();
    let (config, registry) = state(&store);
    let app = app!(config, registry);

    let resp = test::call_service(&app, request("GET", "/api/view", None).to_request()).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = test::call_service(&app, request("GET", "/api/view", Some("garbage")).to_request()).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn signed_in_admin_starts_on_pending_page() {
    let store = MemoryStore::new();
    let (config, registry) = state(&store);
    let app = app!(config, registry);
    let token = sign_in!(app);

    let view: Value =
        test::call_and_read_body_json(&app, request("GET", "/api/view", Some(&token)).to_request()).await;
    assert_eq!(view["page"], "pending");
    assert_eq!(view["layout"], "full");
}

#[actix_web::test]
async fn page_switch_and_empty_status() {
    let store = MemoryStore::new();
    let (config, registry) = state(&store);
    let app = app!(config, registry);
    let token = sign_in!(app);

    let req = request("PUT", "/api/view", Some(&token))
        .set_json(json!({ "status": "approved" }))
        .to_request();
    let view: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(view["page"], "approved");
    assert_eq!(view["loading"], true);

    let req = request("PUT", "/api/view", Some(&token))
        .set_json(json!({ "status": "" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn settings_patch_is_applied_and_read_back() {
    let store = MemoryStore::new();
    let (config, registry) = state(&store);
    let app = app!(config, registry);
    let token = sign_in!(app);

    let req = request("PUT", "/api/settings", Some(&token))
        .set_json(json!({ "filterByDepartment": true, "selectedDepartment": " IT ", "theme": "ocean" }))
        .to_request();
    let updated: Settings = test::call_and_read_body_json(&app, req).await;
    assert_eq!(updated.selected_department, "IT");
    assert_eq!(updated.theme, "ocean");

    let fetched: Settings =
        test::call_and_read_body_json(&app, request("GET", "/api/settings", Some(&token)).to_request()).await;
    assert_eq!(fetched, updated);
}

#[actix_web::test]
async fn approve_writes_decision_through_the_store() {
    let store = MemoryStore::new();
    store.insert(LEAVE, "A", json!({ "status": "pending", "name": "Sokha" }));
    let (config, registry) = state(&store);
    let app = app!(config, registry);
    let token = sign_in!(app);

    let req = request("POST", "/api/requests/leave/A/approve", Some(&token)).to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["sourceType"], "leave");

    let doc = store.document(LEAVE, "A").expect("document");
    assert_eq!(doc["status"], "approved");
    assert_eq!(doc["decisionBy"], "Admin Daro");
}

#[actix_web::test]
async fn action_errors_map_to_status_codes() {
    let store = MemoryStore::new();
    let (config, registry) = state(&store);
    let app = app!(config, registry);
    let token = sign_in!(app);

    for (uri, status) in [
        ("/api/requests/leave/A/archive", StatusCode::BAD_REQUEST),
        ("/api/requests/holiday/A/approve", StatusCode::BAD_REQUEST),
        ("/api/requests/out/missing/reject", StatusCode::NOT_FOUND),
    ] {
        let resp = test::call_service(&app, request("POST", uri, Some(&token)).to_request()).await;
        assert_eq!(resp.status(), status, "{uri}");
    }
}

#[actix_web::test]
async fn decided_requests_refuse_redecision_and_late_delete() {
    let store = MemoryStore::new();
    let two_hours_ago = chrono::Utc::now().timestamp() - 2 * 60 * 60;
    store.insert(
        LEAVE,
        "done",
        json!({ "status": "approved", "decisionAt": { "seconds": two_hours_ago, "nanoseconds": 0 } }),
    );
    let (config, registry) = state(&store);
    let app = app!(config, registry);
    let token = sign_in!(app);

    for uri in ["/api/requests/leave/done/reject", "/api/requests/leave/done/delete"] {
        let resp = test::call_service(&app, request("POST", uri, Some(&token)).to_request()).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT, "{uri}");
    }

    let doc = store.document(LEAVE, "done").expect("document");
    assert_eq!(doc["status"], "approved");
}

#[actix_web::test]
async fn view_stream_is_server_sent_events() {
    let store = MemoryStore::new();
    let (config, registry) = state(&store);
    let app = app!(config, registry);
    let token = sign_in!(app);

    let resp = test::call_service(&app, request("GET", "/api/view/stream", Some(&token)).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get("content-type").and_then(|v| v.to_str().ok()),
        Some("text/event-stream")
    );
}

#[actix_web::test]
async fn logout_ends_the_session() {
    let store = MemoryStore::new();
    let (config, registry) = state(&store);
    let app = app!(config, registry);
    let token = sign_in!(app);

    let resp = test::call_service(&app, request("POST", "/auth/logout", Some(&token)).to_request()).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = test::call_service(&app, request("GET", "/api/view", Some(&token)).to_request()).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

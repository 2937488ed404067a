use crate::auth::auth::AdminSession;
use crate::session::dashboard::ViewState;
use crate::model::request::StatusFilter;
use actix_web::{HttpResponse, Responder, web};
use futures::stream;
use serde::Deserialize;
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct OpenPage {
    /// `all`, `pending`, `approved`, `rejected` or any other status string
    #[schema(example = "approved")]
    pub status: String,
}

/* =========================
Current view
========================= */
#[utoipa::path(
    get,
    path = "/api/view",
    responses(
        (status = 200, description = "Current dashboard view", body = ViewState),
        (status = 401, description = "Not signed in")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "View"
)]
pub async fn get_view(session: AdminSession) -> impl Responder {
    web::Json(session.view())
}

/* =========================
Switch page
========================= */
#[utoipa::path(
    put,
    path = "/api/view",
    request_body(
        content = OpenPage,
        description = "Status page to open",
        content_type = "application/json"
    ),
    responses(
        (status = 200, description = "Page opened, initial load in progress", body = ViewState),
        (status = 400, description = "Empty status", body = Object, example = json!({
            "error": "status must not be empty"
        })),
        (status = 401, description = "Not signed in")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "View"
)]
pub async fn open_page(session: AdminSession, payload: web::Json<OpenPage>) -> impl Responder {
    let Some(page) = StatusFilter::parse(&payload.status) else {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "status must not be empty"
        }));
    };

    tracing::debug!(uid = session.uid(), status = page.as_str(), "opening page");
    session.0.open_page(page);
    HttpResponse::Ok().json(session.view())
}

/* =========================
Live view (server-sent events)
========================= */
#[utoipa::path(
    get,
    path = "/api/view/stream",
    responses(
        (status = 200, description = "`view` events, one per state change, starting with the current state",
         content_type = "text/event-stream", body = String),
        (status = 401, description = "Not signed in")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "View"
)]
pub async fn stream_view(session: AdminSession) -> impl Responder {
    let rx = session.watch_view();
    let uid = session.uid().to_string();

    let events = stream::unfold((rx, true), move |(mut rx, first)| {
        let uid = uid.clone();
        async move {
            // the sender goes away with the session
            if !first && rx.changed().await.is_err() {
                tracing::debug!(uid, "view stream closed");
                return None;
            }
            let view = rx.borrow_and_update().clone();
            let frame = match serde_json::to_string(&view) {
                Ok(payload) => format!("event: view\ndata: {payload}\n\n"),
                Err(e) => {
                    tracing::error!(error = %e, uid, "Failed to encode view");
                    return None;
                }
            };
            Some((Ok::<_, actix_web::Error>(web::Bytes::from(frame)), (rx, false)))
        }
    });

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .streaming(events)
}

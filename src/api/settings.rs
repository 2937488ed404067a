use crate::auth::auth::AdminSession;
use crate::model::settings::{Settings, SettingsPatch};
use actix_web::{Responder, web};

#[utoipa::path(
    get,
    path = "/api/settings",
    responses(
        (status = 200, description = "Dashboard settings", body = Settings),
        (status = 401, description = "Not signed in")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Settings"
)]
pub async fn get_settings(session: AdminSession) -> impl Responder {
    web::Json(session.settings())
}

/// Partial update. Filtering keys rebuild the live subscription; the compact
/// flag only re-renders.
#[utoipa::path(
    put,
    path = "/api/settings",
    request_body(
        content = SettingsPatch,
        description = "Keys to change; omitted keys keep their value",
        content_type = "application/json"
    ),
    responses(
        (status = 200, description = "Settings after the update", body = Settings),
        (status = 400, description = "Malformed patch"),
        (status = 401, description = "Not signed in")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Settings"
)]
pub async fn update_settings(session: AdminSession, patch: web::Json<SettingsPatch>) -> impl Responder {
    let settings = session.0.update_settings(patch.into_inner()).await;
    web::Json(settings)
}

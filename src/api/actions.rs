use crate::auth::auth::AdminSession;
use crate::engine::executor::ActionError;
use crate::model::action::AdminAction;
use crate::model::request::SourceType;
use crate::store::StoreError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError, web};
use serde_json::json;
use std::str::FromStr;

impl ResponseError for ActionError {
    fn status_code(&self) -> StatusCode {
        match self {
            ActionError::InvalidAction { .. } => StatusCode::BAD_REQUEST,
            ActionError::InFlight { .. } | ActionError::Locked { .. } | ActionError::AlreadyDecided { .. } => {
                StatusCode::CONFLICT
            }
            ActionError::UnknownCollection { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ActionError::Store { source } => match source {
                StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
                StoreError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
                _ => StatusCode::BAD_GATEWAY,
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}

/* =========================
Approve / reject / delete
========================= */
#[utoipa::path(
    post,
    path = "/api/requests/{source_type}/{id}/{action}",
    params(
        ("source_type" = SourceType, Path, description = "Collection the request lives in"),
        ("id" = String, Path, description = "Document id"),
        ("action" = AdminAction, Path, description = "Action to apply")
    ),
    responses(
        (status = 200, description = "Action applied; the view follows on the next delivery", body = Object, example = json!({
            "message": "approve applied",
            "id": "k2Jd9",
            "sourceType": "leave"
        })),
        (status = 400, description = "Unknown source type or action"),
        (status = 401, description = "Not signed in"),
        (status = 403, description = "Store refused the write"),
        (status = 404, description = "No such request"),
        (status = 409, description = "Action already in flight, or delete window closed"),
        (status = 502, description = "Store unavailable")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Requests"
)]
pub async fn perform_action(
    session: AdminSession,
    path: web::Path<(String, String, String)>,
) -> actix_web::Result<HttpResponse> {
    let (source_type, id, action) = path.into_inner();

    let Ok(source_type) = SourceType::from_str(&source_type) else {
        return Ok(HttpResponse::BadRequest().json(json!({
            "error": format!("unknown source type {source_type:?}, expected leave or out")
        })));
    };
    let action = AdminAction::parse(&action).ok_or(ActionError::InvalidAction { action })?;

    session.perform(&id, source_type, action).await?;

    Ok(HttpResponse::Ok().json(json!({
        "message": format!("{action} applied"),
        "id": id,
        "sourceType": source_type,
    })))
}

use crate::{
    auth::jwt::{generate_access_token, verify_token},
    config::Config,
    models::SignInResponse,
    session::registry::SessionRegistry,
};
use actix_web::{HttpRequest, HttpResponse, Responder, web};
use serde_json::json;
use tracing::{error, info, instrument};

/// Anonymous sign-in: a fresh uid, its token and its dashboard session.
#[utoipa::path(
    post,
    path = "/auth/anonymous",
    responses(
        (status = 200, description = "Signed in", body = SignInResponse),
        (status = 429, description = "Too many sign-in attempts"),
        (status = 500, description = "Token could not be issued")
    ),
    tag = "Auth"
)]
#[instrument(name = "auth_anonymous", skip(registry, config))]
pub async fn sign_in_anonymously(
    registry: web::Data<SessionRegistry>,
    config: web::Data<Config>,
) -> impl Responder {
    let session = registry.sign_in().await;

    let (token, _) = match generate_access_token(session.uid(), &config.jwt_secret, config.access_token_ttl) {
        Ok(issued) => issued,
        Err(e) => {
            error!(error = %e, "Failed to issue access token");
            registry.sign_out(session.uid()).await;
            return HttpResponse::InternalServerError().json(json!({"error": "Sign-in failed"}));
        }
    };

    info!(uid = session.uid(), "Anonymous sign-in");

    HttpResponse::Ok().json(SignInResponse {
        token,
        uid: session.uid().to_string(),
        expires_in: config.access_token_ttl,
    })
}

/// Drop the caller's session. Always 204, even for unknown or invalid tokens.
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 204, description = "Session closed")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Auth"
)]
pub async fn logout(
    req: HttpRequest,
    registry: web::Data<SessionRegistry>,
    config: web::Data<Config>,
) -> impl Responder {
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));

    if let Some(claims) = token.and_then(|t| verify_token(t, &config.jwt_secret).ok()) {
        registry.sign_out(&claims.sub).await;
    }

    HttpResponse::NoContent().finish()
}

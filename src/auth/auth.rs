use crate::models::Claims;
use crate::session::dashboard::DashboardSession;
use crate::session::registry::SessionRegistry;
use actix_web::error::{ErrorInternalServerError, ErrorUnauthorized};
use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload, web::Data};
use futures::future::LocalBoxFuture;
use serde_json::json;
use std::sync::Arc;

/// The signed-in admin's dashboard session.
///
/// Needs `auth_middleware` in front of the route; an unknown or evicted session
/// counts as not signed in.
pub struct AdminSession(pub Arc<DashboardSession>);

impl FromRequest for AdminSession {
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let uid = req.extensions().get::<Claims>().map(|c| c.sub.clone());
        let registry = req.app_data::<Data<SessionRegistry>>().cloned();

        Box::pin(async move {
            let registry = registry.ok_or_else(|| ErrorInternalServerError("Session registry missing"))?;
            let uid = uid.ok_or_else(|| ErrorUnauthorized(json!({"error": "Not signed in"})))?;

            match registry.get(&uid).await {
                Some(session) => Ok(AdminSession(session)),
                None => {
                    tracing::info!(uid, "token refers to an expired session");
                    Err(ErrorUnauthorized(json!({"error": "Not signed in"})))
                }
            }
        })
    }
}

impl std::ops::Deref for AdminSession {
    type Target = DashboardSession;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

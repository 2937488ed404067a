use crate::api::view::OpenPage;
use crate::engine::projector::{Layout, RequestCard};
use crate::model::action::{ActionEntry, ActionState, AdminAction};
use crate::model::request::{DeletePermission, RequestStatus, SourceType};
use crate::model::settings::{ApprovedFilterType, DarkMode, Settings, SettingsPatch};
use crate::models::SignInResponse;
use crate::session::dashboard::{SourceErrorView, ViewState};
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Leave Desk API",
        version = "1.0.0",
        description = r#"
## Leave & Out Request Dashboard

Admin dashboard over two live request collections: **leave** requests and
**out** (temporary absence) requests.

### Key Features
- **Live view**
  - Both collections merged into one list, scoped by status page
  - Server-sent events on every change
- **Decisions**
  - Approve, reject, and delete (within 55 minutes of a decision)
- **Settings**
  - Month, department and approved-type filters, compact layout, theme

### Security
Sign in anonymously at `/auth/anonymous` and send the token as
**JWT Bearer authentication** on every `/api` call.

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::auth::handlers::sign_in_anonymously,
        crate::auth::handlers::logout,

        crate::api::view::get_view,
        crate::api::view::open_page,
        crate::api::view::stream_view,

        crate::api::settings::get_settings,
        crate::api::settings::update_settings,

        crate::api::actions::perform_action
    ),
    components(
        schemas(
            SignInResponse,
            OpenPage,
            ViewState,
            SourceErrorView,
            RequestCard,
            Layout,
            SourceType,
            RequestStatus,
            DeletePermission,
            ActionEntry,
            ActionState,
            AdminAction,
            Settings,
            SettingsPatch,
            ApprovedFilterType,
            DarkMode
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Anonymous sign-in"),
        (name = "View", description = "Live dashboard view"),
        (name = "Settings", description = "Dashboard preferences"),
        (name = "Requests", description = "Admin decisions on requests"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_dashboard_routes() {
        let doc = ApiDoc::openapi();
        for path in ["/auth/anonymous", "/api/view", "/api/settings", "/api/requests/{source_type}/{id}/{action}"] {
            assert!(doc.paths.paths.contains_key(path), "{path}");
        }
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }

    #[test]
    fn view_and_settings_responses_reference_their_schemas() {
        let doc = serde_json::to_value(ApiDoc::openapi()).expect("openapi json");
        let schema_ref = |path: &str, method: &str| {
            doc["paths"][path][method]["responses"]["200"]["content"]["application/json"]["schema"]["$ref"].clone()
        };

        assert_eq!(schema_ref("/api/view", "get"), "#/components/schemas/ViewState");
        assert_eq!(schema_ref("/api/view", "put"), "#/components/schemas/ViewState");
        assert_eq!(schema_ref("/api/settings", "get"), "#/components/schemas/Settings");
        assert_eq!(schema_ref("/api/settings", "put"), "#/components/schemas/Settings");
        assert!(doc["components"]["schemas"]["ViewState"].is_object());
    }
}

use crate::{
    api::{actions, settings, view},
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

// Per-route limiter
fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
    let requests_per_min = requests_per_min.max(1);
    let per_ms = (60_000 / requests_per_min as u64).max(1);
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms)
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .unwrap_or_default();
    Governor::new(&cfg)
}

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    let signin_limiter = Arc::new(build_limiter(config.rate_signin_per_min));
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));

    // Public routes
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/anonymous")
                    .wrap(signin_limiter.clone())
                    .route(web::post().to(handlers::sign_in_anonymously)),
            )
            .service(
                web::resource("/logout")
                    .wrap(signin_limiter)
                    .route(web::post().to(handlers::logout)),
            ),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(protected_limiter) // rate limiting
            .service(
                web::resource("/view")
                    .route(web::get().to(view::get_view))
                    .route(web::put().to(view::open_page)),
            )
            .service(web::resource("/view/stream").route(web::get().to(view::stream_view)))
            .service(
                web::resource("/settings")
                    .route(web::get().to(settings::get_settings))
                    .route(web::put().to(settings::update_settings)),
            )
            .service(
                web::resource("/requests/{source_type}/{id}/{action}")
                    .route(web::post().to(actions::perform_action)),
            ),
    );
}

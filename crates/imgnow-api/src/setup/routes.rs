//! Route configuration and setup

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    routing::{get, post, put},
    Router,
};
use imgnow_core::Config;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::constants::{API_PREFIX, UPLOAD_SEGMENT};
use crate::handlers;
use crate::state::AppState;

/// Room for multipart boundaries and part headers on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Setup all application routes
pub fn setup_routes(config: &Config, state: Arc<AppState>) -> Router<()> {
    let cors = setup_cors(config);

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .merge(file_routes())
        .layer(ConcurrencyLimitLayer::new(config.http_concurrency_limit))
        .layer(RequestBodyLimitLayer::new(
            config.max_upload_size_bytes + MULTIPART_OVERHEAD_BYTES,
        ))
        .layer(DefaultBodyLimit::disable())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn file_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            &format!("{}/{}", API_PREFIX, UPLOAD_SEGMENT),
            post(handlers::upload::upload_file),
        )
        .route(
            &format!("{}/{{identifier}}", API_PREFIX),
            get(handlers::files::open_file).post(handlers::files::open_file),
        )
        .route(
            &format!("{}/{{identifier}}/status", API_PREFIX),
            get(handlers::files::file_status),
        )
        .route(
            &format!("{}/{{identifier}}/info", API_PREFIX),
            get(handlers::files::file_info),
        )
        .route(
            &format!("{}/{{identifier}}/settings", API_PREFIX),
            put(handlers::settings::update_settings),
        )
        .route(
            &format!("{}/{{identifier}}/addDownload", API_PREFIX),
            put(handlers::files::add_download),
        )
}

/// Setup CORS configuration
fn setup_cors(config: &Config) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::PUT, Method::OPTIONS];

    if config.cors_origins.iter().any(|o| o == "*") {
        tracing::warn!("CORS configured to allow all origins - not recommended for production");
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| match o.parse() {
                Ok(origin) => Some(origin),
                Err(_) => {
                    tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers(Any)
    }
}

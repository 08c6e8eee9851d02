//! HTTP surface of the plugin.
//!
//! Endpoints:
//! - POST /api/generate - Generate images, answer with Markdown
//! - POST /api/test-settings - Report where each plugin setting was found
//! - GET /manifest.json, GET /api/manifest - Plugin manifest
//! - GET /openapi.json - OpenAPI document
//! - GET /settings - Settings form embedded by the host
//! - GET /health - Health check

mod descriptors;
mod handlers;
mod types;

use axum::{
    body::Body,
    http::{header, HeaderValue, Method, Request, Uri},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use rust_embed::Embed;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::error::PluginError;
use crate::http::create_client;
use crate::upstream::ImageApiClient;

pub use descriptors::{manifest_document, openapi_document, resolve_manifest_base_url};
pub use types::*;

#[derive(Embed)]
#[folder = "static/"]
struct StaticAssets;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub images: ImageApiClient,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, reqwest::Error> {
        Ok(Self {
            config: Arc::new(config),
            images: ImageApiClient::new(create_client()?),
        })
    }
}

/// Create the router with the given state.
pub fn create_router_with_state(state: AppState) -> Router {
    let plugin_routes = Router::new()
        .route(
            "/api/generate",
            post(handlers::generate)
                .options(handlers::preflight)
                .fallback(handlers::method_not_allowed),
        )
        .route(
            "/api/test-settings",
            post(handlers::test_settings)
                .options(handlers::preflight)
                .fallback(handlers::method_not_allowed),
        )
        .layer(middleware::map_response(with_plugin_cors));

    let descriptor_cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    let descriptor_routes = Router::new()
        .route("/manifest.json", get(descriptors::manifest))
        .route("/api/manifest", get(descriptors::manifest))
        .route("/openapi.json", get(descriptors::openapi))
        .layer(descriptor_cors);

    let trace = TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
        tracing::info_span!(
            "request",
            id = %uuid::Uuid::new_v4(),
            method = %request.method(),
            path = %request.uri().path(),
        )
    });

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/settings", get(settings_page))
        .merge(plugin_routes)
        .merge(descriptor_routes)
        .with_state(Arc::new(state))
        .fallback(static_handler)
        .layer(trace)
}

/// CORS headers the chat host expects on every plugin endpoint response.
async fn with_plugin_cors(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );
    response
}

async fn settings_page() -> Response {
    serve_asset("settings.html")
}

/// Serve embedded static files
async fn static_handler(uri: Uri) -> Response {
    serve_asset(uri.path().trim_start_matches('/'))
}

fn serve_asset(path: &str) -> Response {
    match StaticAssets::get(path) {
        Some(content) => {
            let mime = mime_guess::from_path(path)
                .first_or_octet_stream()
                .to_string();
            ([(header::CONTENT_TYPE, mime)], content.data.into_owned()).into_response()
        }
        None => PluginError::NotFound(format!("/{}", path)).into_response(),
    }
}

//! HTTP handlers for the plugin endpoints.

use super::types::*;
use super::AppState;
use crate::error::PluginError;
use crate::markdown::{render_generation, render_settings_report};
use crate::resolver::{EffectiveConfig, GenerationParams, HostSettings, SettingCandidates};
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;
use std::sync::Arc;

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        app: "imagegen-plugin",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Empty answer to `OPTIONS`; CORS headers are added by the router.
pub async fn preflight() -> StatusCode {
    StatusCode::OK
}

pub async fn method_not_allowed() -> PluginError {
    PluginError::MethodNotAllowed
}

/// Parse the raw body, reporting malformed JSON in the plugin error envelope.
fn parse_body(body: &Bytes) -> Result<Value, PluginError> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::warn!(error = %e, "failed to parse request body");
        PluginError::BadRequest("Invalid request body".to_string())
    })
}

fn markdown_response(markdown: String) -> Response {
    ([(header::CONTENT_TYPE, MARKDOWN_CONTENT_TYPE)], markdown).into_response()
}

pub async fn generate(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, PluginError> {
    let body = parse_body(&body)?;
    let host = HostSettings::from_headers(&headers);
    let candidates = SettingCandidates::new(host.as_ref(), &body);

    let generation = &state.config.generation;
    let variant = generation.variant;

    let mut config = EffectiveConfig::resolve(&candidates, &variant.check_order())?;
    let rewritten = state.config.public.rewrite_internal_url(&config.api_url);
    if rewritten != config.api_url {
        tracing::debug!(api_url = %rewritten, "using internal API URL");
        config.api_url = rewritten;
    }

    let params = GenerationParams::from_body(&body)?;

    let urls = state
        .images
        .generate(&config, &params, variant, generation.timeout())
        .await?;

    Ok(markdown_response(render_generation(variant, &params, &urls)))
}

pub async fn test_settings(headers: HeaderMap, body: Bytes) -> Result<Response, PluginError> {
    let body = parse_body(&body)?;
    let host = HostSettings::from_headers(&headers);
    let report = SettingCandidates::new(host.as_ref(), &body).report();

    tracing::info!(
        api_key = report.api_key.is_some(),
        api_url = report.api_url.is_some(),
        model = report.model.is_some(),
        "settings test"
    );

    Ok(markdown_response(render_settings_report(&report)))
}

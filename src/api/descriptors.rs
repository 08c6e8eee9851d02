//! Plugin manifest and OpenAPI document.
//!
//! Both are static apart from the base URL, which comes from configuration or,
//! when allowed, from the request's `Host` header.

use super::AppState;
use crate::config::Config;
use crate::error::PluginError;
use crate::resolver::{
    DEFAULT_DIMENSION, DEFAULT_SAMPLE_STRENGTH, DIMENSION_STEP, MAX_DIMENSION, MAX_SAMPLE_STRENGTH,
    MIN_DIMENSION, MIN_SAMPLE_STRENGTH,
};
use axum::{
    extract::State,
    http::{header, HeaderMap},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

fn header_str<'a>(headers: &'a HeaderMap, name: header::HeaderName) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Base URL advertised in the manifest.
///
/// Order: configured base URL, then the request host in development, then the
/// forwarded host on Vercel. Production deployments without a configured URL
/// are a server configuration error.
pub fn resolve_manifest_base_url(config: &Config, headers: &HeaderMap) -> Result<String, PluginError> {
    let host = header_str(headers, header::HOST);

    let base = if let Some(url) = config.public.configured_base_url() {
        url.to_string()
    } else if config.is_development() {
        let host = host.ok_or(PluginError::BaseUrlUnresolved)?;
        format!("http://{}", host)
    } else if config.runtime.vercel {
        let host = host.ok_or(PluginError::BaseUrlUnresolved)?;
        let proto = headers
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("https");
        format!("{}://{}", proto, host)
    } else {
        tracing::error!("NEXT_PUBLIC_BASE_URL must be configured in production");
        return Err(PluginError::BaseUrlUnresolved);
    };

    Ok(base.trim_end_matches('/').to_string())
}

fn dimension_schema(axis: &str) -> Value {
    json!({
        "type": "number",
        "default": DEFAULT_DIMENSION,
        "minimum": MIN_DIMENSION,
        "maximum": MAX_DIMENSION,
        "multipleOf": DIMENSION_STEP,
        "description": format!(
            "Image {} in pixels, between {} and {}, a multiple of {}",
            axis, MIN_DIMENSION, MAX_DIMENSION, DIMENSION_STEP
        )
    })
}

fn sample_strength_schema() -> Value {
    json!({
        "type": "number",
        "default": DEFAULT_SAMPLE_STRENGTH,
        "minimum": MIN_SAMPLE_STRENGTH,
        "maximum": MAX_SAMPLE_STRENGTH,
        "description": "Level of detail, between 0.1 and 1.0; higher values add more detail"
    })
}

pub fn manifest_document(base_url: &str) -> Value {
    json!({
        "identifier": "image-generator",
        "version": "1.0.0",
        "type": "markdown",
        "api": [
            {
                "url": format!("{}/api/generate", base_url),
                "name": "generateImage",
                "description": "Generate images from a text prompt",
                "parameters": {
                    "type": "object",
                    "required": ["prompt"],
                    "properties": {
                        "prompt": { "type": "string", "description": "Image generation prompt" },
                        "negativePrompt": { "type": "string", "description": "Negative prompt" },
                        "width": dimension_schema("width"),
                        "height": dimension_schema("height"),
                        "sample_strength": sample_strength_schema(),
                        "apiKey": {
                            "type": "string",
                            "description": "API key of the image service, if not set in the plugin settings"
                        },
                        "apiUrl": {
                            "type": "string",
                            "description": "API URL of the image service, if not set in the plugin settings"
                        },
                        "model": {
                            "type": "string",
                            "description": "Model name, if not set in the plugin settings"
                        }
                    }
                }
            },
            {
                "url": format!("{}/api/test-settings", base_url),
                "name": "testSettings",
                "description": "Check that plugin settings reach the plugin",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "apiKey": { "type": "string", "description": "API key to test" },
                        "apiUrl": { "type": "string", "description": "API URL to test" },
                        "model": { "type": "string", "description": "Model name to test" }
                    }
                }
            }
        ],
        "settings": {
            "type": "object",
            "required": ["apiKey", "apiUrl", "model"],
            "properties": {
                "apiKey": {
                    "type": "string",
                    "default": "",
                    "format": "password",
                    "title": "Image service API key",
                    "description": "API key of the image generation service (required)"
                },
                "apiUrl": {
                    "type": "string",
                    "default": "",
                    "format": "uri",
                    "title": "Image service API URL",
                    "description": "Base URL of the image generation service (required), e.g. https://api.example.com"
                },
                "model": {
                    "type": "string",
                    "default": "",
                    "title": "Model",
                    "description": "Model used for image generation (required)"
                }
            }
        },
        "meta": {
            "title": "Image Generator",
            "description": "Generate images with any OpenAI-style image generation API",
            "avatar": "🎨",
            "tags": ["image", "ai", "generation"]
        }
    })
}

pub fn openapi_document(base_url: &str) -> Value {
    json!({
        "openapi": "3.1.0",
        "info": {
            "title": "Image Generation API",
            "description": "Generate images from text prompts",
            "version": "1.0.0"
        },
        "servers": [{ "url": base_url }],
        "paths": {
            "/api/generate": {
                "post": {
                    "summary": "Generate images",
                    "description": "Generate images from a prompt",
                    "operationId": "generateImage",
                    "requestBody": {
                        "required": true,
                        "content": {
                            "application/json": {
                                "schema": {
                                    "type": "object",
                                    "required": ["prompt"],
                                    "properties": {
                                        "prompt": { "type": "string", "description": "Image generation prompt" },
                                        "negativePrompt": {
                                            "type": "string",
                                            "description": "Content that should not appear in the image"
                                        },
                                        "width": dimension_schema("width"),
                                        "height": dimension_schema("height"),
                                        "sample_strength": sample_strength_schema(),
                                        "apiKey": { "type": "string", "description": "API key of the image service" },
                                        "apiUrl": { "type": "string", "description": "API URL of the image service" },
                                        "model": { "type": "string", "description": "Model to draw with" }
                                    }
                                }
                            }
                        }
                    },
                    "responses": {
                        "200": {
                            "description": "Images generated",
                            "content": {
                                "text/plain": {
                                    "schema": {
                                        "type": "string",
                                        "description": "Markdown embedding the generated images"
                                    }
                                }
                            }
                        },
                        "400": { "description": "Invalid request body" },
                        "401": { "description": "Missing or invalid API key" },
                        "422": { "description": "Plugin settings incomplete" },
                        "429": { "description": "Image service rate limit reached" },
                        "500": { "description": "Server or image service error" }
                    }
                }
            }
        },
        "components": { "schemas": {} }
    })
}

pub async fn manifest(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, PluginError> {
    if state.config.runtime.debug {
        tracing::debug!(
            environment = ?state.config.runtime.environment,
            vercel = state.config.runtime.vercel,
            base_url = ?state.config.public.base_url,
            host = ?headers.get(header::HOST),
            "manifest request"
        );
    }

    let base_url = resolve_manifest_base_url(&state.config, &headers)?;
    Ok(Json(manifest_document(&base_url)))
}

pub async fn openapi(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Json<Value> {
    let base_url = match state.config.public.configured_base_url() {
        Some(url) => url.trim_end_matches('/').to_string(),
        None => match header_str(&headers, header::HOST) {
            Some(host) => format!("http://{}", host),
            None => format!("http://{}:{}", state.config.server.host, state.config.server.port),
        },
    };

    Json(openapi_document(&base_url))
}

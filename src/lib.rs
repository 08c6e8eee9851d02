//! Image generation plugin for chat hosts.
//!
//! Features:
//! - Markdown image results from any OpenAI-style image generation API
//! - Layered settings lookup: host header, request parameters, nested settings
//! - Settings diagnostics endpoint
//! - Plugin manifest, OpenAPI document and settings page

pub mod api;
pub mod config;
pub mod error;
pub mod http;
pub mod markdown;
pub mod resolver;
pub mod upstream;

//! Response types of the plugin API.

use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub app: &'static str,
    pub version: &'static str,
}

/// Content type of every Markdown answer.
pub const MARKDOWN_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

//! Markdown rendering for chat-facing responses.

use crate::resolver::{ConfigField, EndpointVariant, GenerationParams, SettingSource, SettingsReport};
use std::fmt::Write;

/// Closes the image row so the chat UI renders it as a table.
pub const TABLE_TRAILER: &str = "|\n|---|---|---|---|";

fn image_embeds(urls: &[String]) -> String {
    urls.iter()
        .enumerate()
        .map(|(i, url)| format!("![Generated image {}]({})", i + 1, url))
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Render generated images with the prompt and final dimensions.
pub fn render_generation(variant: EndpointVariant, params: &GenerationParams, urls: &[String]) -> String {
    let images = image_embeds(urls);

    match variant {
        EndpointVariant::Versioned => format!(
            "Prompt: \"*{}*\" ({}x{}) \n\n| {} {}",
            params.prompt, params.width, params.height, images, TABLE_TRAILER
        ),
        EndpointVariant::Direct => {
            let negative = if params.negative_prompt.is_empty() {
                String::new()
            } else {
                format!("\nNegative prompt: \"{}\"", params.negative_prompt)
            };
            format!(
                "Prompt: \"*{}*\" {} {}x{}\n\n{} {}",
                params.prompt, negative, params.width, params.height, images, TABLE_TRAILER
            )
        }
    }
}

/// Render the diagnostics of the settings-test endpoint. The API key itself is never shown.
pub fn render_settings_report(report: &SettingsReport) -> String {
    let mut out = String::from("\n### Settings test result\n");

    for field in ConfigField::ALL {
        let resolved = report.get(field);
        let heading = match field {
            ConfigField::ApiKey => "API Key",
            ConfigField::ApiUrl => "API URL",
            ConfigField::Model => "Model",
        };
        let status = if resolved.is_some() { "✅ provided" } else { "❌ missing" };
        let source = resolved.map(|r| r.source).unwrap_or(SettingSource::None);

        let _ = write!(out, "\n#### {}\n- Status: {}\n- Source: {}\n", heading, status, source);

        match (field, resolved) {
            (ConfigField::ApiKey, r) => {
                let _ = writeln!(out, "- Length: {}", r.map(|r| r.value.len()).unwrap_or(0));
            }
            (_, Some(r)) => {
                let _ = writeln!(out, "- Value: `{}`", r.value);
            }
            (_, None) => {}
        }
    }

    out
}

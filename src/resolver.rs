//! Request resolution shared by every plugin endpoint.
//!
//! Each of `apiKey`, `apiUrl` and `model` is looked up in three places, first
//! non-blank string wins:
//! 1. plugin settings the host attaches to the request (`X-Lobe-Plugin-Settings`)
//! 2. the same-named top-level field of the JSON body
//! 3. the same-named field of the body's nested `settings` object
//!
//! Generation parameters are defaulted and clamped here as well, so handlers
//! only orchestrate.

use crate::error::PluginError;
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

/// Header carrying the host's plugin settings as a JSON object.
pub const PLUGIN_SETTINGS_HEADER: &str = "x-lobe-plugin-settings";

pub const DEFAULT_DIMENSION: u32 = 1024;
pub const MIN_DIMENSION: u32 = 512;
pub const MAX_DIMENSION: u32 = 1360;
pub const DIMENSION_STEP: u32 = 8;

pub const DEFAULT_SAMPLE_STRENGTH: f64 = 0.5;
pub const MIN_SAMPLE_STRENGTH: f64 = 0.1;
pub const MAX_SAMPLE_STRENGTH: f64 = 1.0;

/// Upstream timeout of the `direct` variant.
pub const DIRECT_TIMEOUT: Duration = Duration::from_secs(55);

/// One of the three configuration values every generation call needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigField {
    ApiKey,
    ApiUrl,
    Model,
}

impl ConfigField {
    pub const ALL: [ConfigField; 3] = [ConfigField::ApiKey, ConfigField::ApiUrl, ConfigField::Model];

    /// JSON key used in bodies, nested settings and host settings.
    pub fn key(&self) -> &'static str {
        match self {
            Self::ApiKey => "apiKey",
            Self::ApiUrl => "apiUrl",
            Self::Model => "model",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::ApiKey => "API key",
            Self::ApiUrl => "API URL",
            Self::Model => "model name",
        }
    }
}

/// Where a resolved value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingSource {
    Sdk,
    Parameter,
    Settings,
    None,
}

impl SettingSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sdk => "sdk",
            Self::Parameter => "parameter",
            Self::Settings => "settings",
            Self::None => "none",
        }
    }
}

impl fmt::Display for SettingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedField {
    pub value: String,
    pub source: SettingSource,
}

/// Plugin settings supplied by the host alongside the request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostSettings(Map<String, Value>);

impl HostSettings {
    /// Read host settings from request headers. Missing or malformed headers yield `None`.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let raw = headers.get(PLUGIN_SETTINGS_HEADER)?;
        match serde_json::from_slice::<Value>(raw.as_bytes()) {
            Ok(Value::Object(map)) => Some(Self(map)),
            Ok(_) | Err(_) => {
                tracing::debug!("ignoring unparsable plugin settings header");
                None
            }
        }
    }

    #[cfg(test)]
    fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// The three candidate sources for one request, in precedence order.
#[derive(Debug, Clone, Copy)]
pub struct SettingCandidates<'a> {
    host: Option<&'a Map<String, Value>>,
    body: Option<&'a Map<String, Value>>,
    nested: Option<&'a Map<String, Value>>,
}

impl<'a> SettingCandidates<'a> {
    pub fn new(host: Option<&'a HostSettings>, body: &'a Value) -> Self {
        Self {
            host: host.map(|h| &h.0),
            body: body.as_object(),
            nested: body.get("settings").and_then(Value::as_object),
        }
    }

    /// Resolve one field; `None` means no source had a non-blank string.
    pub fn resolve(&self, field: ConfigField) -> Option<ResolvedField> {
        let ordered = [
            (self.host, SettingSource::Sdk),
            (self.body, SettingSource::Parameter),
            (self.nested, SettingSource::Settings),
        ];

        ordered.into_iter().find_map(|(map, source)| {
            let value = non_blank(map?, field.key())?;
            tracing::debug!(field = field.key(), %source, "resolved plugin setting");
            Some(ResolvedField { value, source })
        })
    }

    /// Resolve every field without failing, for diagnostics.
    pub fn report(&self) -> SettingsReport {
        SettingsReport {
            api_key: self.resolve(ConfigField::ApiKey),
            api_url: self.resolve(ConfigField::ApiUrl),
            model: self.resolve(ConfigField::Model),
        }
    }
}

fn non_blank(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Resolution outcome of all three fields.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsReport {
    pub api_key: Option<ResolvedField>,
    pub api_url: Option<ResolvedField>,
    pub model: Option<ResolvedField>,
}

impl SettingsReport {
    pub fn get(&self, field: ConfigField) -> Option<&ResolvedField> {
        match field {
            ConfigField::ApiKey => self.api_key.as_ref(),
            ConfigField::ApiUrl => self.api_url.as_ref(),
            ConfigField::Model => self.model.as_ref(),
        }
    }
}

/// Configuration used for one upstream call. Every field is non-empty.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveConfig {
    pub api_key: String,
    pub api_url: String,
    pub model: String,
}

impl EffectiveConfig {
    /// Resolve all fields, failing on the first missing one in `check_order`.
    pub fn resolve(
        candidates: &SettingCandidates<'_>,
        check_order: &[ConfigField; 3],
    ) -> Result<Self, PluginError> {
        let report = candidates.report();

        if let Some(missing) = check_order.iter().find(|f| report.get(**f).is_none()) {
            tracing::warn!(field = missing.key(), "required plugin setting missing");
            return Err(PluginError::SettingsInvalid(*missing));
        }

        let take = |field: Option<ResolvedField>| field.map(|f| f.value).unwrap_or_default();
        Ok(Self {
            api_key: take(report.api_key),
            api_url: take(report.api_url),
            model: take(report.model),
        })
    }
}

/// Upstream calling convention of a generation endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EndpointVariant {
    /// POST to `{apiUrl}/v1/images/generations`, no timeout.
    #[default]
    Versioned,
    /// POST to `apiUrl` itself with a 55 second timeout.
    Direct,
}

impl EndpointVariant {
    pub fn check_order(&self) -> [ConfigField; 3] {
        match self {
            Self::Versioned => [ConfigField::Model, ConfigField::ApiKey, ConfigField::ApiUrl],
            Self::Direct => [ConfigField::ApiKey, ConfigField::ApiUrl, ConfigField::Model],
        }
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        match self {
            Self::Versioned => None,
            Self::Direct => Some(DIRECT_TIMEOUT),
        }
    }

    pub fn upstream_url(&self, api_url: &str) -> String {
        match self {
            Self::Versioned => format!("{}/v1/images/generations", api_url.trim_end_matches('/')),
            Self::Direct => api_url.to_string(),
        }
    }
}

/// Normalized parameters forwarded to the image API.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub prompt: String,
    pub negative_prompt: String,
    pub width: u32,
    pub height: u32,
    pub sample_strength: f64,
}

impl GenerationParams {
    pub fn from_body(body: &Value) -> Result<Self, PluginError> {
        let prompt = body
            .get("prompt")
            .and_then(Value::as_str)
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| PluginError::BadRequest("`prompt` is required".to_string()))?;

        Ok(Self {
            prompt: prompt.to_string(),
            negative_prompt: body
                .get("negativePrompt")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            width: normalize_dimension(body.get("width")),
            height: normalize_dimension(body.get("height")),
            sample_strength: normalize_sample_strength(body.get("sample_strength")),
        })
    }
}

/// Default non-numeric or non-positive sizes, round down to a multiple of 8, then clamp.
pub fn normalize_dimension(value: Option<&Value>) -> u32 {
    let requested = value
        .and_then(Value::as_f64)
        .filter(|w| w.is_finite() && *w > 0.0)
        .unwrap_or(DEFAULT_DIMENSION as f64);

    let step = DIMENSION_STEP as f64;
    let rounded = (requested / step).floor() * step;
    rounded.clamp(MIN_DIMENSION as f64, MAX_DIMENSION as f64) as u32
}

/// Clamp a provided strength. Only an absent field or a value with no numeric
/// reading uses the default; `null`, `false` and blank strings count as 0.
pub fn normalize_sample_strength(value: Option<&Value>) -> f64 {
    let requested = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::Null) => Some(0.0),
        Some(Value::Bool(b)) => Some(if *b { 1.0 } else { 0.0 }),
        Some(Value::String(s)) if s.trim().is_empty() => Some(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match requested.filter(|s| s.is_finite()) {
        Some(s) => s.clamp(MIN_SAMPLE_STRENGTH, MAX_SAMPLE_STRENGTH),
        None => DEFAULT_SAMPLE_STRENGTH,
    }
}

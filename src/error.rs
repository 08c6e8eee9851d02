//! Unified error handling for the plugin.
//!
//! Every failure is reported in the plugin host's error envelope:
//! `{"errorType": <number | name>, "body": <detail>}` with the HTTP status
//! derived from the error type.

use crate::resolver::ConfigField;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;

/// Named error type the host uses for unusable plugin settings.
pub const SETTINGS_INVALID: &str = "PluginSettingsInvalid";

/// Unified error type for plugin operations.
#[derive(Debug, Clone, PartialEq)]
pub enum PluginError {
    /// Request body is not valid JSON or lacks a required field.
    BadRequest(String),
    /// Endpoint does not accept the request method.
    MethodNotAllowed,
    /// A required configuration value was not found in any source.
    SettingsInvalid(ConfigField),
    /// Upstream image API answered with a non-success status.
    Upstream { status: u16, detail: String },
    /// Upstream succeeded but returned no images.
    NoImage,
    /// No route or asset at this path.
    NotFound(String),
    /// Manifest requested without any way to determine the public base URL.
    BaseUrlUnresolved,
    /// Transport failure, timeout or anything unexpected.
    Internal(String),
}

impl fmt::Display for PluginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadRequest(msg) => write!(f, "{}", msg),
            Self::MethodNotAllowed => write!(f, "Method not allowed"),
            Self::SettingsInvalid(field) => write!(
                f,
                "No {} provided. Configure it in the plugin settings or pass `{}` in the request.",
                field.label(),
                field.key()
            ),
            Self::Upstream { detail, .. } => {
                write!(f, "Image generation service error: {}", detail)
            }
            Self::NoImage => write!(f, "The image generation service produced no image"),
            Self::NotFound(path) => write!(f, "Not found: {}", path),
            Self::BaseUrlUnresolved => write!(f, "Server configuration error"),
            Self::Internal(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for PluginError {}

/// `errorType` value of the envelope: a bare status code or a named type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ErrorType {
    Status(u16),
    Named(&'static str),
}

#[derive(Serialize)]
struct ErrorEnvelope {
    #[serde(rename = "errorType")]
    error_type: ErrorType,
    body: serde_json::Value,
}

#[derive(Serialize)]
struct ServerConfigErrorBody {
    error: String,
    details: &'static str,
}

impl PluginError {
    /// Map an upstream failure status onto the codes the host understands.
    pub fn from_upstream(status: u16, detail: impl Into<String>) -> Self {
        let status = match status {
            401 | 403 | 404 | 429 => status,
            _ => 500,
        };
        Self::Upstream {
            status,
            detail: detail.into(),
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::SettingsInvalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            Self::NoImage => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BaseUrlUnresolved => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the envelope's `errorType`.
    pub fn error_type(&self) -> ErrorType {
        match self {
            Self::SettingsInvalid(_) => ErrorType::Named(SETTINGS_INVALID),
            _ => ErrorType::Status(self.status_code().as_u16()),
        }
    }
}

impl IntoResponse for PluginError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if let Self::BaseUrlUnresolved = self {
            let body = ServerConfigErrorBody {
                error: self.to_string(),
                details: "Set NEXT_PUBLIC_BASE_URL to the externally reachable URL of this plugin",
            };
            return (status, Json(body)).into_response();
        }

        let body = match &self {
            Self::SettingsInvalid(_) => serde_json::json!({ "message": self.to_string() }),
            _ => serde_json::Value::String(self.to_string()),
        };

        let envelope = ErrorEnvelope {
            error_type: self.error_type(),
            body,
        };

        (status, Json(envelope)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_passes_through_known_statuses() {
        for code in [401, 403, 404, 429] {
            let err = PluginError::from_upstream(code, "nope");
            assert_eq!(err.status_code().as_u16(), code);
            assert_eq!(err.error_type(), ErrorType::Status(code));
        }
    }

    #[test]
    fn upstream_maps_other_statuses_to_500() {
        for code in [400, 402, 418, 500, 502, 503] {
            let err = PluginError::from_upstream(code, "boom");
            assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    #[test]
    fn upstream_message_embeds_detail() {
        let err = PluginError::from_upstream(429, "rate limited, retry later");
        assert!(err.to_string().contains("rate limited, retry later"));
    }

    #[test]
    fn settings_invalid_is_named_type() {
        let err = PluginError::SettingsInvalid(ConfigField::Model);
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.error_type(), ErrorType::Named("PluginSettingsInvalid"));
        assert!(err.to_string().contains("model"));
    }

    #[test]
    fn error_type_serializes_as_number_or_string() {
        assert_eq!(serde_json::to_value(ErrorType::Status(429)).unwrap(), serde_json::json!(429));
        assert_eq!(
            serde_json::to_value(ErrorType::Named(SETTINGS_INVALID)).unwrap(),
            serde_json::json!("PluginSettingsInvalid")
        );
    }

    #[test]
    fn bad_request_and_method_not_allowed_statuses() {
        assert_eq!(
            PluginError::BadRequest("Invalid request body".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(PluginError::MethodNotAllowed.status_code(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[test]
    fn no_image_is_internal_error() {
        let err = PluginError::NoImage;
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.error_type(), ErrorType::Status(500));
    }

    #[test]
    fn into_response_keeps_status() {
        let response = PluginError::from_upstream(403, "forbidden").into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = PluginError::BaseUrlUnresolved.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn error_implements_std_error() {
        fn assert_error<T: std::error::Error>() {}
        assert_error::<PluginError>();
    }
}

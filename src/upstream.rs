//! Client for the third-party image generation API.
//!
//! Sends one `POST` with bearer auth and returns the generated image URLs.
//! Nothing is retried: every failure is mapped to a [`PluginError`] and
//! reported in the same request cycle.

use crate::error::PluginError;
use crate::resolver::{EffectiveConfig, EndpointVariant, GenerationParams};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Request body understood by the image API.
#[derive(Debug, Serialize)]
pub struct GenerationRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    #[serde(rename = "negativePrompt", skip_serializing_if = "Option::is_none")]
    pub negative_prompt_camel: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<&'a str>,
    pub width: u32,
    pub height: u32,
    pub sample_strength: f64,
}

impl<'a> GenerationRequest<'a> {
    /// Build the body; the variant decides how the negative prompt key is spelled.
    pub fn new(model: &'a str, params: &'a GenerationParams, variant: EndpointVariant) -> Self {
        let negative = params.negative_prompt.as_str();
        let (negative_prompt_camel, negative_prompt) = match variant {
            EndpointVariant::Versioned => (Some(negative), None),
            EndpointVariant::Direct => (None, Some(negative)),
        };

        Self {
            model,
            prompt: &params.prompt,
            negative_prompt_camel,
            negative_prompt,
            width: params.width,
            height: params.height,
            sample_strength: params.sample_strength,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ImageGenResponse {
    #[serde(default)]
    pub data: Option<Vec<GeneratedImage>>,
}

#[derive(Debug, Deserialize)]
pub struct GeneratedImage {
    pub url: String,
}

/// Thin wrapper over the shared HTTP client.
#[derive(Clone)]
pub struct ImageApiClient {
    client: Client,
}

impl ImageApiClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Forward a generation request and return the image URLs, in upstream order.
    pub async fn generate(
        &self,
        config: &EffectiveConfig,
        params: &GenerationParams,
        variant: EndpointVariant,
        timeout: Option<Duration>,
    ) -> Result<Vec<String>, PluginError> {
        let url = variant.upstream_url(&config.api_url);
        let body = GenerationRequest::new(&config.model, params, variant);

        tracing::info!(
            %url,
            model = %config.model,
            width = params.width,
            height = params.height,
            sample_strength = params.sample_strength,
            api_key_len = config.api_key.len(),
            "sending generation request"
        );

        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", config.api_key))
            .json(&body);

        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error body".to_string());
            tracing::error!(status = status.as_u16(), body = %detail, "image API returned an error");
            return Err(PluginError::from_upstream(status.as_u16(), detail));
        }

        // The request timeout also covers the body, so read it before parsing.
        let bytes = response
            .bytes()
            .await
            .map_err(|e| transport_error(&url, e))?;

        let result: ImageGenResponse = serde_json::from_slice(&bytes).map_err(|e| {
            tracing::error!(error = %e, "unexpected image API response");
            PluginError::Internal(format!("Parse error: {}", e))
        })?;

        let urls: Vec<String> = result
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|image| image.url)
            .collect();

        if urls.is_empty() {
            tracing::warn!("image API returned no images");
            return Err(PluginError::NoImage);
        }

        tracing::info!(count = urls.len(), "images generated");
        Ok(urls)
    }
}

/// Failure while sending the request or reading its body.
fn transport_error(url: &str, e: reqwest::Error) -> PluginError {
    if e.is_timeout() {
        tracing::error!(%url, "image generation request timed out");
        PluginError::Internal(format!("Image generation request timed out: {}", e))
    } else {
        tracing::error!(%url, error = %e, "image generation request failed");
        PluginError::Internal(format!("Request failed: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;
    use std::io::Write;

    fn params() -> GenerationParams {
        GenerationParams {
            prompt: "a red fox".to_string(),
            negative_prompt: "low quality".to_string(),
            width: 768,
            height: 512,
            sample_strength: 0.5,
        }
    }

    fn config(api_url: &str) -> EffectiveConfig {
        EffectiveConfig {
            api_key: "sk-test".to_string(),
            api_url: api_url.to_string(),
            model: "flux-dev".to_string(),
        }
    }

    fn client() -> ImageApiClient {
        ImageApiClient::new(crate::http::create_client().unwrap())
    }

    #[test]
    fn versioned_request_uses_camel_case_negative_prompt() {
        let params = params();
        let body = serde_json::to_value(GenerationRequest::new("m", &params, EndpointVariant::Versioned)).unwrap();

        assert_eq!(body["negativePrompt"], "low quality");
        assert!(body.get("negative_prompt").is_none());
        assert_eq!(body["width"], 768);
        assert_eq!(body["sample_strength"], 0.5);
    }

    #[test]
    fn direct_request_uses_snake_case_negative_prompt() {
        let params = params();
        let body = serde_json::to_value(GenerationRequest::new("m", &params, EndpointVariant::Direct)).unwrap();

        assert_eq!(body["negative_prompt"], "low quality");
        assert!(body.get("negativePrompt").is_none());
    }

    #[tokio::test]
    async fn returns_urls_on_success() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("POST", "/v1/images/generations")
            .match_header("authorization", "Bearer sk-test")
            .match_body(Matcher::PartialJson(json!({
                "model": "flux-dev",
                "prompt": "a red fox",
                "width": 768,
                "height": 512
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"data": [{"url": "https://img/1.png"}, {"url": "https://img/2.png"}]}).to_string())
            .create_async()
            .await;

        let urls = client()
            .generate(&config(&server.url()), &params(), EndpointVariant::Versioned, None)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(urls, vec!["https://img/1.png", "https://img/2.png"]);
    }

    #[tokio::test]
    async fn direct_variant_posts_to_api_url() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("POST", "/custom/draw")
            .with_status(200)
            .with_body(json!({"data": [{"url": "https://img/1.png"}]}).to_string())
            .create_async()
            .await;

        let url = format!("{}/custom/draw", server.url());
        let urls = client()
            .generate(&config(&url), &params(), EndpointVariant::Direct, Some(Duration::from_secs(5)))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(urls.len(), 1);
    }

    #[tokio::test]
    async fn maps_upstream_status_and_keeps_body() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("POST", "/v1/images/generations")
            .with_status(429)
            .with_body("quota exhausted")
            .create_async()
            .await;

        let err = client()
            .generate(&config(&server.url()), &params(), EndpointVariant::Versioned, None)
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert_eq!(err, PluginError::Upstream { status: 429, detail: "quota exhausted".to_string() });
    }

    #[tokio::test]
    async fn unknown_upstream_status_becomes_500() {
        let mut server = mockito::Server::new_async().await;

        let _mock = server
            .mock("POST", "/v1/images/generations")
            .with_status(502)
            .with_body("bad gateway")
            .create_async()
            .await;

        let err = client()
            .generate(&config(&server.url()), &params(), EndpointVariant::Versioned, None)
            .await
            .unwrap_err();

        assert_eq!(err.status_code().as_u16(), 500);
    }

    #[tokio::test]
    async fn empty_or_missing_data_is_no_image() {
        let mut server = mockito::Server::new_async().await;

        let _empty = server
            .mock("POST", "/v1/images/generations")
            .with_status(200)
            .with_body(r#"{"data": []}"#)
            .create_async()
            .await;

        let err = client()
            .generate(&config(&server.url()), &params(), EndpointVariant::Versioned, None)
            .await
            .unwrap_err();
        assert_eq!(err, PluginError::NoImage);

        let mut server = mockito::Server::new_async().await;
        let _missing = server
            .mock("POST", "/v1/images/generations")
            .with_status(200)
            .with_body(r#"{"created": 1}"#)
            .create_async()
            .await;

        let err = client()
            .generate(&config(&server.url()), &params(), EndpointVariant::Versioned, None)
            .await
            .unwrap_err();
        assert_eq!(err, PluginError::NoImage);
    }

    #[tokio::test]
    async fn invalid_json_is_internal_error() {
        let mut server = mockito::Server::new_async().await;

        let _mock = server
            .mock("POST", "/v1/images/generations")
            .with_status(200)
            .with_body("<html>oops</html>")
            .create_async()
            .await;

        let err = client()
            .generate(&config(&server.url()), &params(), EndpointVariant::Versioned, None)
            .await
            .unwrap_err();

        assert!(matches!(err, PluginError::Internal(_)));
    }

    #[tokio::test]
    async fn slow_body_is_reported_as_timeout() {
        let mut server = mockito::Server::new_async().await;

        let _mock = server
            .mock("POST", "/draw")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_chunked_body(|w| {
                std::thread::sleep(Duration::from_secs(3));
                w.write_all(br#"{"data": [{"url": "https://img/1.png"}]}"#)
            })
            .create_async()
            .await;

        let url = format!("{}/draw", server.url());
        let err = client()
            .generate(&config(&url), &params(), EndpointVariant::Direct, Some(Duration::from_millis(500)))
            .await
            .unwrap_err();

        match err {
            PluginError::Internal(msg) => {
                assert!(msg.starts_with("Image generation request timed out"), "{}", msg)
            }
            other => panic!("expected timeout error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unreachable_upstream_is_internal_error() {
        let err = client()
            .generate(&config("http://127.0.0.1:1"), &params(), EndpointVariant::Versioned, None)
            .await
            .unwrap_err();

        assert!(matches!(err, PluginError::Internal(_)));
    }
}

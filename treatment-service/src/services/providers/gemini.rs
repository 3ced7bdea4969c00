//! Gemini AI provider implementation.
//!
//! Implements text generation using Google's Gemini `generateContent` API.

use super::{FinishReason, GenerationParams, ProviderError, ProviderResponse, TextProvider};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Header carrying the API key; keeps it out of request URLs.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini provider configuration.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Secret<String>,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

/// Gemini text provider.
pub struct GeminiTextProvider {
    config: GeminiConfig,
    client: Client,
}

impl std::fmt::Debug for GeminiTextProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiTextProvider")
            .field("model", &self.config.model)
            .field("base_url", &self.config.base_url)
            .finish()
    }
}

impl GeminiTextProvider {
    /// Build a provider bound to `config.model`.
    ///
    /// Fails with [`ProviderError::NotConfigured`] for a blank key or when the
    /// HTTP client cannot be constructed.
    pub fn new(config: GeminiConfig) -> Result<Self, ProviderError> {
        if config.api_key.expose_secret().trim().is_empty() {
            return Err(ProviderError::NotConfigured(
                "Gemini API key is empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                ProviderError::NotConfigured(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { config, client })
    }

    /// Build the API URL for the given model method.
    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/models/{}:{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.model,
            method
        )
    }

    /// Build generation config from parameters.
    fn build_generation_config(&self, params: &GenerationParams) -> Option<GenerationConfig> {
        if params.temperature.is_none() && params.top_p.is_none() && params.max_tokens.is_none()
        {
            return None;
        }

        Some(GenerationConfig {
            temperature: params.temperature,
            top_p: params.top_p,
            max_output_tokens: params.max_tokens,
        })
    }
}

// reqwest errors render the request URL; strip it before the text reaches logs.
fn map_send_error(e: reqwest::Error) -> ProviderError {
    let e = e.without_url();
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::NetworkError(e.to_string())
    }
}

#[async_trait]
impl TextProvider for GeminiTextProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<ProviderResponse, ProviderError> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![ContentPart {
                    text: Some(prompt.to_string()),
                }],
            }],
            generation_config: self.build_generation_config(params),
        };

        tracing::debug!(
            model = %self.config.model,
            prompt_len = prompt.len(),
            "Sending request to Gemini API"
        );

        let response = self
            .client
            .post(self.api_url("generateContent"))
            .header(API_KEY_HEADER, self.config.api_key.expose_secret().as_str())
            .json(&request)
            .send()
            .await
            .map_err(map_send_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 {
                return Err(ProviderError::RateLimited);
            }

            if status.as_u16() == 400 {
                return Err(ProviderError::InvalidRequest(error_text));
            }

            return Err(ProviderError::ApiError(format!(
                "Gemini API error {}: {}",
                status, error_text
            )));
        }

        let api_response: GenerateContentResponse = response.json().await.map_err(|e| {
            let e = e.without_url();
            if e.is_timeout() {
                ProviderError::Timeout(e.to_string())
            } else {
                ProviderError::ApiError(format!("Failed to parse response: {}", e))
            }
        })?;

        let candidate = api_response.candidates.first();

        // Join every text part of the first candidate.
        let text = candidate
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .filter(|t| !t.is_empty());

        let finish_reason = candidate
            .map(|c| match c.finish_reason.as_deref() {
                Some("STOP") => FinishReason::Complete,
                Some("MAX_TOKENS") => FinishReason::Length,
                Some("SAFETY") => FinishReason::ContentFilter,
                _ => FinishReason::Complete,
            })
            .unwrap_or(FinishReason::Complete);

        if finish_reason == FinishReason::ContentFilter {
            return Err(ProviderError::ContentFiltered);
        }

        let usage = api_response.usage_metadata.unwrap_or_default();

        Ok(ProviderResponse {
            text,
            input_tokens: usage.prompt_token_count.unwrap_or(0),
            output_tokens: usage.candidates_token_count.unwrap_or(0),
            finish_reason,
        })
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        // Listing models is the cheapest call that exercises the key.
        let url = format!("{}/models", self.config.base_url.trim_end_matches('/'));

        let response = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, self.config.api_key.expose_secret().as_str())
            .send()
            .await
            .map_err(map_send_error)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ProviderError::ApiError(format!(
                "Health check failed: {}",
                response.status()
            )))
        }
    }
}

// ============================================================================
// Gemini API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<ContentPart>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContentPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<i32>,
    candidates_token_count: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MODEL: &str = "gemini-2.0-flash";
    const GENERATE_PATH: &str = "/models/gemini-2.0-flash:generateContent";

    fn provider_for(server: &MockServer, timeout: Duration) -> GeminiTextProvider {
        GeminiTextProvider::new(GeminiConfig {
            api_key: Secret::new("test-key".to_string()),
            model: MODEL.to_string(),
            base_url: server.uri(),
            timeout,
        })
        .unwrap()
    }

    #[test]
    fn blank_key_is_not_configured() {
        let result = GeminiTextProvider::new(GeminiConfig {
            api_key: Secret::new("   ".to_string()),
            model: MODEL.to_string(),
            base_url: "http://localhost".to_string(),
            timeout: Duration::from_secs(1),
        });
        assert!(matches!(result, Err(ProviderError::NotConfigured(_))));
    }

    #[tokio::test]
    async fn generate_returns_candidate_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .and(header(API_KEY_HEADER, "test-key"))
            .and(body_partial_json(json!({
                "contents": [{"role": "user", "parts": [{"text": "Tell a story"}]}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"role": "model", "parts": [{"text": "Once "}, {"text": "upon a time"}]},
                    "finishReason": "STOP"
                }],
                "usageMetadata": {"promptTokenCount": 4, "candidatesTokenCount": 5, "totalTokenCount": 9}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(&server, Duration::from_secs(5));
        let response = provider
            .generate("Tell a story", &GenerationParams::default())
            .await
            .unwrap();

        assert_eq!(response.text.as_deref(), Some("Once upon a time"));
        assert_eq!(response.input_tokens, 4);
        assert_eq!(response.output_tokens, 5);
        assert_eq!(response.finish_reason, FinishReason::Complete);
    }

    #[tokio::test]
    async fn generate_without_candidates_yields_no_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
            .mount(&server)
            .await;

        let provider = provider_for(&server, Duration::from_secs(5));
        let response = provider
            .generate("prompt", &GenerationParams::default())
            .await
            .unwrap();

        assert!(response.text.is_none());
    }

    #[tokio::test]
    async fn rate_limit_maps_to_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota exhausted"))
            .mount(&server)
            .await;

        let provider = provider_for(&server, Duration::from_secs(5));
        let err = provider
            .generate("prompt", &GenerationParams::default())
            .await
            .unwrap_err();

        assert_eq!(err, ProviderError::RateLimited);
    }

    #[tokio::test]
    async fn server_error_maps_to_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(503).set_body_string("backend overloaded"))
            .mount(&server)
            .await;

        let provider = provider_for(&server, Duration::from_secs(5));
        let err = provider
            .generate("prompt", &GenerationParams::default())
            .await
            .unwrap_err();

        match err {
            ProviderError::ApiError(msg) => assert!(msg.contains("backend overloaded")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn safety_block_maps_to_content_filtered() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"finishReason": "SAFETY"}]
            })))
            .mount(&server)
            .await;

        let provider = provider_for(&server, Duration::from_secs(5));
        let err = provider
            .generate("prompt", &GenerationParams::default())
            .await
            .unwrap_err();

        assert_eq!(err, ProviderError::ContentFiltered);
    }

    #[tokio::test]
    async fn malformed_body_maps_to_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let provider = provider_for(&server, Duration::from_secs(5));
        let err = provider
            .generate("prompt", &GenerationParams::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::ApiError(_)));
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(2))
                    .set_body_json(json!({"candidates": []})),
            )
            .mount(&server)
            .await;

        let provider = provider_for(&server, Duration::from_millis(200));
        let err = provider
            .generate("prompt", &GenerationParams::default())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "timeout");
    }

    #[tokio::test]
    async fn health_check_lists_models() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .and(header(API_KEY_HEADER, "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"models": []})))
            .mount(&server)
            .await;

        let provider = provider_for(&server, Duration::from_secs(5));
        assert!(provider.health_check().await.is_ok());
    }

    #[tokio::test]
    async fn api_key_stays_out_of_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
            .mount(&server)
            .await;

        let provider = provider_for(&server, Duration::from_secs(5));
        provider
            .generate("prompt", &GenerationParams::default())
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(!requests[0].url.as_str().contains("test-key"));
    }

    #[tokio::test]
    async fn transport_errors_do_not_contain_api_key() {
        let secret = "SECRETKEY123";
        // Nothing listens on port 9 locally.
        let provider = GeminiTextProvider::new(GeminiConfig {
            api_key: Secret::new(secret.to_string()),
            model: MODEL.to_string(),
            base_url: "http://127.0.0.1:9".to_string(),
            timeout: Duration::from_secs(2),
        })
        .unwrap();

        let err = provider
            .generate("prompt", &GenerationParams::default())
            .await
            .unwrap_err();
        assert!(!err.to_string().contains(secret), "leaked key: {}", err);
        assert!(!format!("{:?}", err).contains(secret));

        let err = provider.health_check().await.unwrap_err();
        assert!(!err.to_string().contains(secret), "leaked key: {}", err);
    }

    #[tokio::test]
    async fn timeout_error_does_not_contain_api_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(2))
                    .set_body_json(json!({"candidates": []})),
            )
            .mount(&server)
            .await;

        let provider = provider_for(&server, Duration::from_millis(200));
        let err = provider
            .generate("prompt", &GenerationParams::default())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "timeout");
        assert!(!err.to_string().contains("test-key"));
    }

    #[tokio::test]
    async fn health_check_rejects_bad_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let provider = provider_for(&server, Duration::from_secs(5));
        assert!(matches!(
            provider.health_check().await,
            Err(ProviderError::ApiError(_))
        ));
    }
}

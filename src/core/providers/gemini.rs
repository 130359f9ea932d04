//! Gemini API provider implementation

use crate::core::provider::{ActiveRequests, Provider, ProviderError, send_generate_request};
use crate::models::gemini::{GenerateContentRequest, GenerateContentResponse};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Provider for the public Gemini API, authenticated by API key
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    active_requests: ActiveRequests,
}

impl GeminiProvider {
    /// Create a new Gemini provider
    ///
    /// # Arguments
    ///
    /// * `api_key` - Gemini API key
    /// * `base_url` - API base URL, e.g. `https://generativelanguage.googleapis.com/v1beta`
    /// * `timeout` - Request timeout in seconds
    pub fn new(api_key: String, base_url: String, timeout: u64) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()
            .map_err(|e| ProviderError::Unexpected(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            active_requests: ActiveRequests::new(),
        })
    }

    /// Get the endpoint URL for the model
    fn get_endpoint_url(&self, model: &str) -> String {
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!("{}/models/{}:generateContent", self.base_url, model)
    }

    async fn send_completion_request(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, ProviderError> {
        let url = self.get_endpoint_url(model);
        debug!("POST {} ({} turns)", url, request.contents.len());

        let builder = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", &self.api_key)
            .json(request);

        send_generate_request(builder).await
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
        request_id: Option<String>,
    ) -> Result<GenerateContentResponse, ProviderError> {
        self.active_requests
            .run(request_id, self.send_completion_request(model, request))
            .await
    }

    async fn cancel_request(&self, request_id: &str) -> bool {
        self.active_requests.cancel(request_id).await
    }

    fn provider_name(&self) -> &str {
        "Gemini API"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::gemini::{Content, Part};
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_request() -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content::user(vec![Part::text("Hello")])],
            generation_config: None,
            safety_settings: vec![],
        }
    }

    #[test]
    fn test_endpoint_url() {
        let provider =
            GeminiProvider::new("k".to_string(), "https://example.test/v1beta/".to_string(), 5)
                .unwrap();
        assert_eq!(
            provider.get_endpoint_url("models/gemini-2.0-flash-exp"),
            "https://example.test/v1beta/models/gemini-2.0-flash-exp:generateContent"
        );
    }

    #[tokio::test]
    async fn test_generate_content_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-test:generateContent"))
            .and(header("x-goog-api-key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"role": "model", "parts": [{"text": "<h1>Hi</h1>"}]},
                    "finishReason": "STOP"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = GeminiProvider::new("secret".to_string(), server.uri(), 5).unwrap();
        let response = provider
            .generate_content("gemini-test", &test_request(), None)
            .await
            .unwrap();
        assert_eq!(response.text().as_deref(), Some("<h1>Hi</h1>"));
    }

    #[tokio::test]
    async fn test_generate_content_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string(
                r#"{"error": {"code": 400, "message": "API key not valid. Please pass a valid API key.", "status": "INVALID_ARGUMENT"}}"#,
            ))
            .mount(&server)
            .await;

        let provider = GeminiProvider::new("bad".to_string(), server.uri(), 5).unwrap();
        let err = provider
            .generate_content("gemini-test", &test_request(), None)
            .await
            .unwrap_err();
        match err {
            ProviderError::BadRequest(message) => assert!(message.contains("GEMINI_API_KEY")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_generate_content_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("RESOURCE_EXHAUSTED"))
            .mount(&server)
            .await;

        let provider = GeminiProvider::new("k".to_string(), server.uri(), 5).unwrap();
        let err = provider
            .generate_content("gemini-test", &test_request(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::RateLimit(_)));
    }

    #[tokio::test]
    async fn test_cancel_in_flight_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"candidates": []}))
                    .set_delay(Duration::from_secs(10)),
            )
            .mount(&server)
            .await;

        let provider =
            std::sync::Arc::new(GeminiProvider::new("k".to_string(), server.uri(), 30).unwrap());
        let runner = provider.clone();
        let handle = tokio::spawn(async move {
            runner
                .generate_content("gemini-test", &test_request(), Some("abc".to_string()))
                .await
        });

        while !provider.cancel_request("abc").await {
            tokio::task::yield_now().await;
        }

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(ProviderError::Cancelled)));
    }
}

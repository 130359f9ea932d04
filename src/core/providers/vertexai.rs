//! Vertex AI provider implementation

use crate::core::provider::{ActiveRequests, Provider, ProviderError, send_generate_request};
use crate::models::gemini::{GenerateContentRequest, GenerateContentResponse};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Vertex AI provider for Google Cloud's Gemini models
pub struct VertexAIProvider {
    client: Client,
    project_id: String,
    location: String,
    access_token: String,
    active_requests: ActiveRequests,
}

impl VertexAIProvider {
    /// Create a new Vertex AI provider
    ///
    /// # Arguments
    ///
    /// * `project_id` - Google Cloud project ID
    /// * `location` - Google Cloud location (e.g., "us-central1")
    /// * `access_token` - Google Cloud access token (from gcloud auth or service account)
    /// * `timeout` - Request timeout in seconds
    pub fn new(
        project_id: String,
        location: String,
        access_token: String,
        timeout: u64,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()
            .map_err(|e| ProviderError::Unexpected(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            project_id,
            location,
            access_token,
            active_requests: ActiveRequests::new(),
        })
    }

    /// Get the endpoint URL for the model
    fn get_endpoint_url(&self, model: &str) -> String {
        format!(
            "https://{}-aiplatform.googleapis.com/v1/projects/{}/locations/{}/publishers/google/models/{}:generateContent",
            self.location, self.project_id, self.location, model
        )
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
            .bearer_auth(&self.access_token)
            .json(request);

        send_generate_request(builder).await
    }
}

#[async_trait]
impl Provider for VertexAIProvider {
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
        "Vertex AI"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url() {
        let provider = VertexAIProvider::new(
            "my-project".to_string(),
            "europe-west4".to_string(),
            "token".to_string(),
            10,
        )
        .unwrap();
        assert_eq!(
            provider.get_endpoint_url("gemini-2.0-flash-exp"),
            "https://europe-west4-aiplatform.googleapis.com/v1/projects/my-project/locations/europe-west4/publishers/google/models/gemini-2.0-flash-exp:generateContent"
        );
    }
}

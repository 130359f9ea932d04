//! Provider abstraction layer for the backends serving Gemini models
//!
//! This module defines the common trait implemented by the Gemini API and
//! Vertex AI providers, plus the pieces they share: error classification,
//! response checks and in-flight request cancellation.

use crate::core::constants::finish;
use crate::models::gemini::{GenerateContentRequest, GenerateContentResponse};
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};

/// Error types for provider operations
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Response blocked by safety filters: {0}")]
    Blocked(String),

    #[error("Model returned an empty response")]
    EmptyResponse,

    #[error("Request cancelled by client")]
    Cancelled,

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

/// Trait for backends that can run `generateContent`
#[async_trait]
pub trait Provider: Send + Sync {
    /// Send one non-streaming `generateContent` request
    ///
    /// When `request_id` is given the call can be aborted with
    /// [`Provider::cancel_request`].
    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
        request_id: Option<String>,
    ) -> Result<GenerateContentResponse, ProviderError>;

    /// Cancel an active request by request_id
    async fn cancel_request(&self, request_id: &str) -> bool;

    /// Get the provider name
    fn provider_name(&self) -> &str;
}

/// Supported provider types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderType {
    Gemini,
    VertexAI,
}

impl ProviderType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "gemini" | "google" | "google-ai" => Some(ProviderType::Gemini),
            "vertexai" | "vertex-ai" | "vertex_ai" => Some(ProviderType::VertexAI),
            _ => None,
        }
    }
}

/// Registry of cancellable in-flight requests
#[derive(Default)]
pub struct ActiveRequests {
    inner: Mutex<HashMap<String, Arc<Notify>>>,
}

impl ActiveRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `fut` unless the request is cancelled first
    pub async fn run<F, T>(&self, request_id: Option<String>, fut: F) -> Result<T, ProviderError>
    where
        F: Future<Output = Result<T, ProviderError>>,
    {
        let Some(id) = request_id else {
            return fut.await;
        };

        let notify = Arc::new(Notify::new());
        self.inner.lock().await.insert(id.clone(), notify.clone());

        let result = tokio::select! {
            result = fut => result,
            _ = notify.notified() => Err(ProviderError::Cancelled),
        };

        // cancel() removes the entry under the same lock, so a missing entry
        // means the caller was already told the request was cancelled
        let still_registered = self.inner.lock().await.remove(&id).is_some();
        if still_registered {
            result
        } else {
            Err(ProviderError::Cancelled)
        }
    }

    /// Cancel the request registered under `request_id`
    ///
    /// Returns `true` only when the matching [`ActiveRequests::run`] is
    /// guaranteed to return [`ProviderError::Cancelled`].
    pub async fn cancel(&self, request_id: &str) -> bool {
        match self.inner.lock().await.remove(request_id) {
            Some(notify) => {
                notify.notify_one();
                true
            }
            None => false,
        }
    }
}

/// Rewrite common Gemini error bodies into actionable messages
pub fn classify_error(error_detail: &str) -> String {
    let error_lower = error_detail.to_lowercase();

    if error_lower.contains("api_key_invalid")
        || error_lower.contains("api key not valid")
        || error_lower.contains("unauthenticated")
        || error_lower.contains("unauthorized")
    {
        return "Invalid API key. Please check your GEMINI_API_KEY configuration.".to_string();
    }

    if error_lower.contains("resource_exhausted")
        || error_lower.contains("quota")
        || error_lower.contains("rate limit")
    {
        return "Rate limit or quota exceeded. Please wait and try again.".to_string();
    }

    if error_lower.contains("user location is not supported")
        || error_lower.contains("failed_precondition")
    {
        return "The Gemini API is not available in your region.".to_string();
    }

    if error_lower.contains("permission_denied") || error_lower.contains("permission") {
        return "Permission denied. Please check the credential's access to this model."
            .to_string();
    }

    if error_lower.contains("model")
        && (error_lower.contains("not found") || error_lower.contains("is not supported"))
    {
        return "Model not found. Please check your GEMINI_MODEL configuration.".to_string();
    }

    error_detail.to_string()
}

/// Map a failed HTTP status and its body onto a [`ProviderError`]
pub fn error_from_status(status: u16, body: &str) -> ProviderError {
    let classified_error = classify_error(body);

    match status {
        401 | 403 => ProviderError::Authentication(classified_error),
        429 => ProviderError::RateLimit(classified_error),
        400 | 404 => ProviderError::BadRequest(classified_error),
        _ => ProviderError::ApiError {
            status,
            message: classified_error,
        },
    }
}

/// Reject responses that carry no usable text
pub fn check_response(
    response: GenerateContentResponse,
) -> Result<GenerateContentResponse, ProviderError> {
    if let Some(reason) = response.block_reason() {
        return Err(ProviderError::Blocked(reason));
    }

    if response.text().is_none() {
        return Err(ProviderError::EmptyResponse);
    }

    if let Some(candidate) = response.candidates.first() {
        match candidate.finish_reason.as_deref() {
            Some(finish::STOP) | None => {}
            Some(finish::MAX_TOKENS) => warn!("Response truncated at max_output_tokens"),
            Some(other) => debug!("Candidate finished with {}", other),
        }
    }

    Ok(response)
}

/// Send a prepared request and decode a `generateContent` response
pub async fn send_generate_request(
    request: reqwest::RequestBuilder,
) -> Result<GenerateContentResponse, ProviderError> {
    let response = request
        .send()
        .await
        .map_err(|e| ProviderError::Unexpected(e.to_string()))?;

    let status = response.status();

    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(error_from_status(status.as_u16(), &error_text));
    }

    let parsed: GenerateContentResponse = response
        .json()
        .await
        .map_err(|e| ProviderError::Unexpected(format!("Failed to parse response: {}", e)))?;

    check_response(parsed)
}

/// Scripted in-memory provider for tests
#[cfg(test)]
pub mod mock {
    use super::*;
    use crate::models::gemini::Content;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    /// Replies with queued texts (or errors) and records every request
    ///
    /// Once the queue is empty it answers `reply N`. With a delay set,
    /// every reply waits that long and can be cancelled meanwhile.
    #[derive(Default)]
    pub struct ScriptedProvider {
        replies: StdMutex<VecDeque<Result<String, ProviderError>>>,
        requests: StdMutex<Vec<GenerateContentRequest>>,
        delay: Option<std::time::Duration>,
        active: ActiveRequests,
    }

    impl ScriptedProvider {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        /// Number of requests received so far
        pub fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        pub fn with_replies<I, S>(replies: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            let provider = Self::new();
            for reply in replies {
                provider.push_reply(Ok(reply.into()));
            }
            provider
        }

        pub fn push_reply(&self, reply: Result<String, ProviderError>) {
            self.replies.lock().unwrap().push_back(reply);
        }

        pub fn requests(&self) -> Vec<GenerateContentRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        async fn generate_content(
            &self,
            _model: &str,
            request: &GenerateContentRequest,
            request_id: Option<String>,
        ) -> Result<GenerateContentResponse, ProviderError> {
            let count = {
                let mut requests = self.requests.lock().unwrap();
                requests.push(request.clone());
                requests.len()
            };

            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(format!("reply {}", count)));

            let delay = self.delay;
            let reply = self
                .active
                .run(request_id, async move {
                    if let Some(delay) = delay {
                        tokio::time::sleep(delay).await;
                    }
                    reply
                })
                .await?;

            Ok(GenerateContentResponse {
                candidates: vec![crate::models::gemini::Candidate {
                    content: Some(Content::model(reply)),
                    finish_reason: Some(finish::STOP.to_string()),
                }],
                prompt_feedback: None,
                usage_metadata: None,
            })
        }

        async fn cancel_request(&self, request_id: &str) -> bool {
            self.active.cancel(request_id).await
        }

        fn provider_name(&self) -> &str {
            "Scripted"
        }
    }
}

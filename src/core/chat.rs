//! Multi-turn chat with a Gemini model
//!
//! Keeps the conversation history client-side and resends it on every
//! call, the way `generateContent` expects multi-turn chats to work.

use crate::core::config::Config;
use crate::core::provider::{Provider, ProviderError};
use crate::core::screenshot::ImageInput;
use crate::models::gemini::{Content, GenerateContentRequest, GenerationConfig, Part, SafetySetting};
use std::sync::Arc;
use tracing::debug;

/// A conversation with one model
#[derive(Clone)]
pub struct ChatSession {
    provider: Arc<dyn Provider>,
    model: String,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
    history: Vec<Content>,
}

impl ChatSession {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        generation_config: GenerationConfig,
        safety_settings: Vec<SafetySetting>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            generation_config,
            safety_settings,
            history: Vec::new(),
        }
    }

    /// Start an empty chat using the configured model and settings
    pub fn from_config(provider: Arc<dyn Provider>, config: &Config) -> Self {
        Self::new(
            provider,
            config.model.clone(),
            config.generation_config(),
            config.safety_settings(),
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn history(&self) -> &[Content] {
        &self.history
    }

    /// Forget every turn
    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// Send a user turn and return the model's text reply
    ///
    /// The image, if any, follows the text in the same turn. On failure
    /// the user turn is dropped again so the history keeps alternating
    /// between user and model.
    pub async fn send_message(
        &mut self,
        text: &str,
        image: Option<&ImageInput>,
        request_id: Option<String>,
    ) -> Result<String, ProviderError> {
        let mut parts = vec![Part::text(text)];
        if let Some(image) = image {
            parts.push(image.to_part());
        }
        self.history.push(Content::user(parts));

        let request = GenerateContentRequest {
            contents: self.history.clone(),
            generation_config: Some(self.generation_config.clone()),
            safety_settings: self.safety_settings.clone(),
        };

        debug!(
            "Sending chat turn {} to {} (prompt {} chars, image: {})",
            self.history.len(),
            self.model,
            text.len(),
            image.is_some()
        );

        let result = self
            .provider
            .generate_content(&self.model, &request, request_id)
            .await
            .and_then(|response| response.text().ok_or(ProviderError::EmptyResponse));

        match result {
            Ok(reply) => {
                self.history.push(Content::model(reply.clone()));
                Ok(reply)
            }
            Err(e) => {
                self.history.pop();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constants::role;
    use crate::core::provider::mock::ScriptedProvider;

    fn chat(provider: Arc<ScriptedProvider>) -> ChatSession {
        ChatSession::new(
            provider,
            "gemini-test",
            GenerationConfig::text(0.7, 0.95, 40, 8192),
            vec![SafetySetting::new("HARM_CATEGORY_HARASSMENT", "BLOCK_NONE")],
        )
    }

    #[tokio::test]
    async fn test_history_grows_with_each_turn() {
        let provider = Arc::new(ScriptedProvider::with_replies(["first", "second"]));
        let mut session = chat(provider.clone());

        assert_eq!(session.send_message("one", None, None).await.unwrap(), "first");
        assert_eq!(session.send_message("two", None, None).await.unwrap(), "second");

        let roles: Vec<_> = session
            .history()
            .iter()
            .map(|c| c.role.clone().unwrap())
            .collect();
        assert_eq!(roles, [role::USER, role::MODEL, role::USER, role::MODEL]);

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].contents.len(), 3);
        assert_eq!(requests[1].contents[1].text(), "first");
        assert_eq!(requests[0].safety_settings.len(), 1);
        assert_eq!(
            requests[0].generation_config.as_ref().unwrap().top_k,
            Some(40)
        );
    }

    #[tokio::test]
    async fn test_failed_turn_is_rolled_back() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_reply(Err(ProviderError::RateLimit("slow down".to_string())));
        let mut session = chat(provider.clone());

        let err = session.send_message("hello", None, None).await.unwrap_err();
        assert!(matches!(err, ProviderError::RateLimit(_)));
        assert!(session.history().is_empty());

        session.send_message("again", None, None).await.unwrap();
        assert_eq!(session.history().len(), 2);
    }

    #[tokio::test]
    async fn test_reset_clears_history() {
        let provider = Arc::new(ScriptedProvider::new());
        let mut session = chat(provider);
        session.send_message("hi", None, None).await.unwrap();
        session.reset();
        assert!(session.history().is_empty());
        assert_eq!(session.model(), "gemini-test");
    }
}

//! Per-browser UI sessions
//!
//! Each browser tab owns one session: the uploaded screenshot, the current
//! HTML, the visible chat history and the model conversation behind it.

use crate::core::chat::ChatSession;
use crate::core::screenshot::ImageInput;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::info;
use uuid::Uuid;

/// One message in the visible chat history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatEntry {
    pub role: String,
    pub text: String,
}

impl ChatEntry {
    pub fn new(role: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            text: text.into(),
        }
    }
}

/// State of one browser session
pub struct UiSession {
    pub id: Uuid,
    pub image: Option<ImageInput>,
    pub refined_html: String,
    pub chat_history: Vec<ChatEntry>,
    /// Model conversation; taken out while a call is running
    pub chat: Option<ChatSession>,
    pub last_access: DateTime<Utc>,
}

impl UiSession {
    fn new(id: Uuid, chat: ChatSession) -> Self {
        Self {
            id,
            image: None,
            refined_html: String::new(),
            chat_history: Vec::new(),
            chat: Some(chat),
            last_access: Utc::now(),
        }
    }

    /// A model call is in flight
    pub fn is_busy(&self) -> bool {
        self.chat.is_none()
    }

    /// Replace the screenshot and start over
    ///
    /// A new screenshot means a new conversation, so the HTML, the chat
    /// history and the model turns are all discarded.
    pub fn set_image(&mut self, image: ImageInput) {
        self.image = Some(image);
        self.refined_html.clear();
        self.chat_history.clear();
        if let Some(chat) = self.chat.as_mut() {
            chat.reset();
        }
    }

    /// Take the model conversation for the duration of a call
    ///
    /// Returns `None` when another call already holds it.
    pub fn begin_call(&mut self) -> Option<ChatSession> {
        self.chat.take()
    }

    /// Hand the model conversation back after a call
    pub fn end_call(&mut self, chat: ChatSession) {
        self.chat = Some(chat);
    }

    /// Request id used for the session's in-flight model call
    pub fn request_id(&self) -> String {
        self.id.to_string()
    }
}

/// In-memory registry of UI sessions
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, Arc<Mutex<UiSession>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session with a fresh model conversation
    pub async fn create(&self, chat: ChatSession) -> Uuid {
        let id = Uuid::new_v4();
        let session = Arc::new(Mutex::new(UiSession::new(id, chat)));
        self.sessions.write().await.insert(id, session);
        info!("Created session {}", id);
        id
    }

    /// Look up a session and mark it as used
    pub async fn get(&self, id: &Uuid) -> Option<Arc<Mutex<UiSession>>> {
        let session = self.sessions.read().await.get(id).cloned()?;
        session.lock().await.last_access = Utc::now();
        Some(session)
    }

    pub async fn remove(&self, id: &Uuid) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop sessions idle for longer than `idle_timeout`
    ///
    /// Sessions with a model call in flight are kept. Returns how many
    /// sessions were removed.
    pub async fn evict_idle(&self, now: DateTime<Utc>, idle_timeout: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let mut expired = Vec::new();

        for (id, session) in sessions.iter() {
            // Locked sessions are in use right now
            if let Ok(session) = session.try_lock() {
                if !session.is_busy() && now - session.last_access > idle_timeout {
                    expired.push(*id);
                }
            }
        }

        for id in &expired {
            sessions.remove(id);
        }

        if !expired.is_empty() {
            info!("Evicted {} idle sessions", expired.len());
        }
        expired.len()
    }
}

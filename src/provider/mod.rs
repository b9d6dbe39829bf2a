//! Provider abstraction over heterogeneous chat-completion backends.
//!
//! Two wire protocols hide behind one trait: the local inference server
//! (Ollama, `message.content`) and the hosted gateway (OpenRouter,
//! `choices[0].message.content`). Each implementation extracts its own wire
//! shape so callers only ever see the reply content string.

pub mod ollama;
pub mod openrouter;

pub use ollama::OllamaChatClient;
pub use openrouter::OpenRouterClient;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::AnnotationError;
use crate::types::{ProviderConfig, ProviderKind};

/// One message in a chat-completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Uniform chat-completion interface over the provider backends.
///
/// `chat` returns the extracted reply content. An empty-but-valid reply is
/// `Ok("")`, never an error; errors carry the raw provider payload.
pub trait ChatClient: Send + Sync {
    fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, AnnotationError>;

    /// Configuration-time connectivity probe; not on the hot path.
    fn test_connection(&self) -> bool;

    /// Models the backend reports as available.
    fn list_models(&self) -> Result<Vec<String>, AnnotationError>;
}

/// Build the concrete client for a stored configuration.
///
/// Validates the fields each backend requires; a missing URL, key, or model
/// is a configuration error and fatal to the whole invocation.
pub fn client_for(
    config: &ProviderConfig,
    timeout_secs: u64,
) -> Result<Box<dyn ChatClient>, AnnotationError> {
    if config.model.trim().is_empty() {
        return Err(AnnotationError::InvalidConfig(
            "no model configured".to_string(),
        ));
    }

    match config.provider {
        ProviderKind::Ollama => {
            let base_url = config
                .base_url
                .as_deref()
                .filter(|u| !u.trim().is_empty())
                .ok_or_else(|| {
                    AnnotationError::InvalidConfig("ollama base URL missing".to_string())
                })?;
            Ok(Box::new(OllamaChatClient::new(base_url, timeout_secs)))
        }
        ProviderKind::OpenRouter => {
            let api_key = config
                .api_key
                .as_deref()
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| {
                    AnnotationError::InvalidConfig("openrouter API key missing".to_string())
                })?;
            Ok(Box::new(OpenRouterClient::new(api_key, timeout_secs)))
        }
    }
}

/// Scripted reply for `MockChatClient`.
#[derive(Debug, Clone)]
pub enum MockReply {
    Content(String),
    TransportError(String),
}

/// Mock chat client for tests — replays a script of replies, then repeats
/// the last one. Transport errors are retryable, matching the real clients.
pub struct MockChatClient {
    script: Mutex<VecDeque<MockReply>>,
    last: Mutex<MockReply>,
    calls: AtomicUsize,
}

impl MockChatClient {
    /// Always reply with the same content.
    pub fn new(response: &str) -> Self {
        Self::with_script(vec![MockReply::Content(response.to_string())])
    }

    pub fn with_script(script: Vec<MockReply>) -> Self {
        let last = script
            .last()
            .cloned()
            .unwrap_or(MockReply::Content(String::new()));
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(last),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `chat` calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ChatClient for MockChatClient {
    fn chat(
        &self,
        _model: &str,
        _messages: &[ChatMessage],
        _temperature: f32,
        _max_tokens: u32,
    ) -> Result<String, AnnotationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = match self.script.lock().unwrap().pop_front() {
            Some(reply) => {
                *self.last.lock().unwrap() = reply.clone();
                reply
            }
            None => self.last.lock().unwrap().clone(),
        };
        match reply {
            MockReply::Content(c) => Ok(c),
            MockReply::TransportError(msg) => Err(AnnotationError::Connection(msg)),
        }
    }

    fn test_connection(&self) -> bool {
        true
    }

    fn list_models(&self) -> Result<Vec<String>, AnnotationError> {
        Ok(vec!["mock".to_string()])
    }
}

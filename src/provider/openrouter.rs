//! Hosted gateway backend speaking the OpenAI-style chat-completions protocol.

use serde::{Deserialize, Serialize};

use super::{ChatClient, ChatMessage};
use crate::error::AnnotationError;

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// HTTP client for the OpenRouter gateway.
pub struct OpenRouterClient {
    api_key: String,
    base_url: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OpenRouterClient {
    pub fn new(api_key: &str, timeout_secs: u64) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            api_key: api_key.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            client,
            timeout_secs,
        }
    }

    /// Point the client at a different gateway root (test servers).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::blocking::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", "https://annolab.local")
            .header("X-Title", "Annolab Annotation Pipeline")
    }

    fn map_send_error(&self, e: reqwest::Error) -> AnnotationError {
        if e.is_connect() {
            AnnotationError::Connection(self.base_url.clone())
        } else if e.is_timeout() {
            AnnotationError::Timeout(self.timeout_secs)
        } else {
            AnnotationError::HttpClient(e.to_string())
        }
    }
}

/// Request body for /chat/completions
#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

/// Response body — the reply lives in `choices[0].message.content`.
#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}

/// Response body from /models
#[derive(Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

impl ChatClient for OpenRouterClient {
    fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, AnnotationError> {
        let body = CompletionRequest {
            model,
            messages,
            temperature,
            max_tokens,
            stream: false,
        };

        let response = self
            .request(reqwest::Method::POST, "/chat/completions")
            .json(&body)
            .send()
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(AnnotationError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: CompletionResponse = response
            .json()
            .map_err(|e| AnnotationError::ResponseParsing(e.to_string()))?;

        // An empty choices list is an empty-but-valid reply.
        Ok(parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default())
    }

    fn test_connection(&self) -> bool {
        match self.request(reqwest::Method::GET, "/auth/key").send() {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    fn list_models(&self) -> Result<Vec<String>, AnnotationError> {
        let response = self
            .request(reqwest::Method::GET, "/models")
            .send()
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(AnnotationError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ModelsResponse = response
            .json()
            .map_err(|e| AnnotationError::ResponseParsing(e.to_string()))?;

        Ok(parsed.data.into_iter().map(|m| m.id).collect())
    }
}

//! Language-model client
//!
//! OpenAI-compatible chat completions used by the object and atmosphere
//! analyzers: label → emotion mapping, scene classification, captioning.
//!
//! The HTTP client is built lazily by [`LlmClient::ensure_ready`], once per
//! process, and only when an API key is configured.

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::debug;

/// Chat completions endpoint
const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Model used for every request
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Language-model client errors
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Language model API key not configured")]
    NotConfigured,

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Empty response")]
    EmptyResponse,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One chat message
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: Value,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: Value::String(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: Value::String(text.into()),
        }
    }

    /// User message carrying a prompt and an inline image
    pub fn user_with_image(text: impl Into<String>, image_data_url: &str) -> Self {
        Self {
            role: "user",
            content: json!([
                { "type": "text", "text": text.into() },
                { "type": "image_url", "image_url": { "url": image_data_url } }
            ]),
        }
    }
}

/// Chat completion request
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Force a JSON object reply
    pub json_mode: bool,
    pub timeout: Duration,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            temperature: 0.2,
            max_tokens: 100,
            json_mode: false,
            timeout: Duration::from_secs(15),
        }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Chat model capability
///
/// Seam between the analyzers and the remote provider; tests substitute
/// scripted replies.
#[async_trait::async_trait]
pub trait ChatModel: Send + Sync {
    /// Return the first choice's message content
    async fn complete(&self, request: ChatRequest) -> Result<String, LlmError>;

    /// True when a key is configured
    fn is_configured(&self) -> bool;
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// OpenAI chat completions client
pub struct LlmClient {
    api_key: Option<String>,
    endpoint: String,
    model: String,
    http_client: OnceCell<reqwest::Client>,
}

impl LlmClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key: api_key.filter(|k| emotabi_common::keys::is_valid_key(k)),
            endpoint: OPENAI_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            http_client: OnceCell::new(),
        }
    }

    /// Override the endpoint (OpenAI-compatible gateways)
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Build the HTTP client on first use
    pub async fn ensure_ready(&self) -> Result<&reqwest::Client, LlmError> {
        if self.api_key.is_none() {
            return Err(LlmError::NotConfigured);
        }

        self.http_client
            .get_or_try_init(|| async {
                debug!("Initializing language model client");
                reqwest::Client::builder()
                    .build()
                    .map_err(|e| LlmError::Network(e.to_string()))
            })
            .await
    }
}

#[async_trait::async_trait]
impl ChatModel for LlmClient {
    async fn complete(&self, request: ChatRequest) -> Result<String, LlmError> {
        let client = self.ensure_ready().await?;
        let api_key = self.api_key.as_deref().ok_or(LlmError::NotConfigured)?;

        let mut body = json!({
            "model": self.model,
            "messages": request.messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });
        if request.json_mode {
            body["response_format"] = json!({ "type": "json_object" });
        }

        let response = client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .timeout(request.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(status.as_u16(), text));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or(LlmError::EmptyResponse)
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Read an image and encode it as a `data:` URL for vision prompts
pub async fn image_data_url(image_path: &Path) -> Result<String, LlmError> {
    let bytes = tokio::fs::read(image_path).await?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    Ok(format!("data:image/jpeg;base64,{}", encoded))
}

#[cfg(test)]
pub mod mock {
    //! Scripted chat model for analyzer tests

    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replies are consumed in order; an exhausted script returns `EmptyResponse`
    pub struct ScriptedChatModel {
        replies: Mutex<VecDeque<Result<String, LlmError>>>,
        pub calls: Mutex<Vec<ChatRequest>>,
        configured: bool,
    }

    impl ScriptedChatModel {
        pub fn new(replies: Vec<Result<String, LlmError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(Vec::new()),
                configured: true,
            }
        }

        pub fn unconfigured() -> Self {
            Self {
                replies: Mutex::new(VecDeque::new()),
                calls: Mutex::new(Vec::new()),
                configured: false,
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait::async_trait]
    impl ChatModel for ScriptedChatModel {
        async fn complete(&self, request: ChatRequest) -> Result<String, LlmError> {
            if !self.configured {
                return Err(LlmError::NotConfigured);
            }
            self.calls.lock().unwrap().push(request);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(LlmError::EmptyResponse))
        }

        fn is_configured(&self) -> bool {
            self.configured
        }
    }
}

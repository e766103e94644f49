use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ChatError, Result};

/// Body of `POST {API_URL}/chat`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub chat_id: String,
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_question: Option<String>,
}

/// Expected reply shape. Only `answer` is required.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    #[serde(default)]
    pub sources: Option<Vec<String>>,
    #[serde(default)]
    pub follow_up: Option<String>,
    #[serde(default)]
    pub follow_up_id: Option<String>,
    #[serde(default)]
    pub original_question: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Anything that can answer a chat request. The session only talks to this.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse>;
}

#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    base_url: String,
}

impl ChatClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn chat_url(&self) -> String {
        format!("{}/chat", self.base_url)
    }
}

#[async_trait]
impl ChatBackend for ChatClient {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let url = self.chat_url();
        debug!(
            url = %url,
            follow_up_to = ?request.follow_up_to,
            "sending chat request"
        );

        let response = self.client.post(&url).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .map(|b| b.error);
            warn!(status = status.as_u16(), detail = ?detail, "chat backend rejected request");
            return Err(ChatError::Status {
                status: status.as_u16(),
                detail,
            });
        }

        let body = response.text().await?;
        let chat_response: ChatResponse = serde_json::from_str(&body).map_err(ChatError::Decode)?;
        debug!(
            sources = chat_response.sources.as_ref().map_or(0, Vec::len),
            has_follow_up = chat_response.follow_up.is_some(),
            "chat response received"
        );
        Ok(chat_response)
    }
}

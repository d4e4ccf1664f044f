//! `OpenAI`-compatible chat/completions responder

use super::ServiceError;
use crate::runtime::Responder;
use crate::transcript::{Speaker, Turn};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Spoken replies stay short
const MAX_REPLY_TOKENS: u32 = 300;

pub struct ChatCompletionsResponder {
    client: Client,
    url: String,
    api_key: Option<String>,
    model: String,
    system_prompt: String,
}

impl ChatCompletionsResponder {
    pub fn new(
        url: String,
        api_key: Option<String>,
        model: String,
        system_prompt: String,
    ) -> Result<Self, ServiceError> {
        // The session runtime enforces the overall reply deadline
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ServiceError::unavailable(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            url,
            api_key,
            model,
            system_prompt,
        })
    }

    fn translate_request<'a>(&'a self, history: &'a [Turn]) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage {
            role: "system",
            content: &self.system_prompt,
        });
        messages.extend(history.iter().map(|turn| ChatMessage {
            role: match turn.speaker {
                Speaker::User => "user",
                Speaker::Assistant => "assistant",
            },
            content: &turn.content,
        }));

        ChatRequest {
            model: &self.model,
            messages,
            max_tokens: MAX_REPLY_TOKENS,
        }
    }

    fn normalize_response(resp: ChatResponse) -> Result<String, ServiceError> {
        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::unknown("No choices in response"))?;

        choice
            .message
            .content
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| ServiceError::unknown("Response contained no text"))
    }
}

#[async_trait]
impl Responder for ChatCompletionsResponder {
    async fn generate(&self, history: &[Turn]) -> Result<String, ServiceError> {
        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&self.translate_request(history));
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ServiceError::unavailable(format!("Request timeout: {e}"))
            } else if e.is_connect() {
                ServiceError::unavailable(format!("Connection failed: {e}"))
            } else {
                ServiceError::unknown(format!("Request failed: {e}"))
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ServiceError::unavailable(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(status_error(status.as_u16(), &body));
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| ServiceError::unknown(format!("Failed to parse response: {e}")))?;

        Self::normalize_response(parsed)
    }
}

fn status_error(status: u16, body: &str) -> ServiceError {
    let Ok(error_resp) = serde_json::from_str::<ErrorResponse>(body) else {
        return ServiceError::unknown(format!("HTTP {status} error: {body}"));
    };
    let message = error_resp.error.message;
    match status {
        401 | 403 => ServiceError::rejected(format!("Authentication failed: {message}")),
        400 => ServiceError::rejected(format!("Invalid request: {message}")),
        429 => ServiceError::unavailable(format!("Rate limit exceeded: {message}")),
        500..=599 => ServiceError::unavailable(format!("Server error: {message}")),
        _ => ServiceError::unknown(format!("HTTP {status}: {message}")),
    }
}

// Wire types

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

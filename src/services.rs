//! Production implementations of the capture, generation and synthesis
//! contracts

mod chat_completions;
mod error;
mod remote_capture;
mod scripted;

pub use chat_completions::ChatCompletionsResponder;
pub use error::{ServiceError, ServiceErrorKind};
pub use remote_capture::RemoteCapture;
pub use scripted::{ScriptedResponder, SimulatedSynthesizer};

use crate::config::ResponderConfig;
use crate::runtime::Responder;
use crate::transcript::Turn;
use async_trait::async_trait;
use std::sync::Arc;

/// Build the configured reply backend, wrapped for logging
pub fn responder_from_config(config: &ResponderConfig) -> Result<Arc<dyn Responder>, ServiceError> {
    let (name, inner): (String, Arc<dyn Responder>) = match config {
        ResponderConfig::Scripted { reply, delay } => (
            "scripted".to_string(),
            Arc::new(ScriptedResponder::new(reply.clone(), *delay)),
        ),
        ResponderConfig::ChatCompletions {
            url,
            api_key,
            model,
            system_prompt,
        } => (
            model.clone(),
            Arc::new(ChatCompletionsResponder::new(
                url.clone(),
                api_key.clone(),
                model.clone(),
                system_prompt.clone(),
            )?),
        ),
    };

    tracing::info!(responder = %name, "Reply backend initialized");
    Ok(Arc::new(LoggingResponder::new(name, inner)))
}

/// Logging wrapper for responders
pub struct LoggingResponder {
    inner: Arc<dyn Responder>,
    name: String,
}

impl LoggingResponder {
    pub fn new(name: impl Into<String>, inner: Arc<dyn Responder>) -> Self {
        Self {
            inner,
            name: name.into(),
        }
    }
}

#[async_trait]
impl Responder for LoggingResponder {
    async fn generate(&self, history: &[Turn]) -> Result<String, ServiceError> {
        let start = std::time::Instant::now();
        let result = self.inner.generate(history).await;
        let duration = start.elapsed();

        match &result {
            Ok(reply) => {
                tracing::info!(
                    responder = %self.name,
                    duration_ms = %duration.as_millis(),
                    turns = history.len(),
                    reply_chars = reply.chars().count(),
                    "Reply generated"
                );
            }
            Err(e) => {
                tracing::error!(
                    responder = %self.name,
                    duration_ms = %duration.as_millis(),
                    kind = %e.kind,
                    error = %e.message,
                    "Reply generation failed"
                );
            }
        }

        result
    }
}

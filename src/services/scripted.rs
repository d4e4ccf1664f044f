//! Simulated backends: a canned responder and client-side speech

use super::ServiceError;
use crate::runtime::{Responder, Synthesizer};
use crate::transcript::Turn;
use async_trait::async_trait;
use std::time::Duration;

/// Answers every turn with the same reply after a fixed delay
pub struct ScriptedResponder {
    reply: String,
    delay: Duration,
}

impl ScriptedResponder {
    pub fn new(reply: impl Into<String>, delay: Duration) -> Self {
        Self {
            reply: reply.into(),
            delay,
        }
    }
}

#[async_trait]
impl Responder for ScriptedResponder {
    async fn generate(&self, _history: &[Turn]) -> Result<String, ServiceError> {
        tokio::time::sleep(self.delay).await;
        Ok(self.reply.clone())
    }
}

/// Speech is played by the browser from the `speak` session event, so the
/// server never learns when playback ends on its own. The fallback timer (or
/// a `speech/finished` call from the client) ends `Speaking`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedSynthesizer;

#[async_trait]
impl Synthesizer for SimulatedSynthesizer {
    async fn speak(&self, text: &str) -> Result<(), ServiceError> {
        tracing::debug!(chars = text.chars().count(), "Speech handed to client");
        Ok(())
    }

    fn reports_completion(&self) -> bool {
        false
    }
}

//! Trait abstractions for the external services
//!
//! These traits enable testing the executor with mock implementations.

use super::Envelope;
use crate::services::ServiceError;
use crate::state_machine::Event;
use crate::transcript::Turn;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Speech capture and recognition
#[async_trait]
pub trait CaptureService: Send + Sync {
    /// Begin capturing. Recognized text and the end of capture are reported
    /// through `sink` for as long as the capture lasts.
    async fn start(&self, sink: CaptureSink) -> Result<(), ServiceError>;

    /// Stop capturing. Must be safe to call when nothing is running.
    async fn stop(&self);
}

/// Reply generation
#[async_trait]
pub trait Responder: Send + Sync {
    /// Produce the assistant's next reply from the conversation so far
    async fn generate(&self, history: &[Turn]) -> Result<String, ServiceError>;
}

/// Speech synthesis / presence animation
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Voice `text`. When `reports_completion` is true the future resolves
    /// once playback has finished.
    async fn speak(&self, text: &str) -> Result<(), ServiceError>;

    /// Whether `speak` resolving means playback finished. When false the
    /// session ends `Speaking` with the configured fallback timer.
    fn reports_completion(&self) -> bool {
        true
    }
}

/// Channel a capture service uses to report back to its session
#[derive(Debug, Clone)]
pub struct CaptureSink {
    capture_id: String,
    events: mpsc::Sender<Envelope>,
}

impl CaptureSink {
    pub(crate) fn new(capture_id: impl Into<String>, events: mpsc::Sender<Envelope>) -> Self {
        Self {
            capture_id: capture_id.into(),
            events,
        }
    }

    pub fn capture_id(&self) -> &str {
        &self.capture_id
    }

    /// Report recognized speech. Returns false once the session has ended.
    pub async fn transcript_chunk(&self, text: impl Into<String>) -> bool {
        self.emit(Event::TranscriptChunk {
            capture_id: self.capture_id.clone(),
            text: text.into(),
        })
        .await
    }

    /// Report that capture ended on its own
    pub async fn stopped(&self) -> bool {
        self.emit(Event::CaptureStopped {
            capture_id: self.capture_id.clone(),
        })
        .await
    }

    async fn emit(&self, event: Event) -> bool {
        self.events.send(Envelope::event(event)).await.is_ok()
    }
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: CaptureService + ?Sized> CaptureService for Arc<T> {
    async fn start(&self, sink: CaptureSink) -> Result<(), ServiceError> {
        (**self).start(sink).await
    }

    async fn stop(&self) {
        (**self).stop().await;
    }
}

#[async_trait]
impl<T: Responder + ?Sized> Responder for Arc<T> {
    async fn generate(&self, history: &[Turn]) -> Result<String, ServiceError> {
        (**self).generate(history).await
    }
}

#[async_trait]
impl<T: Synthesizer + ?Sized> Synthesizer for Arc<T> {
    async fn speak(&self, text: &str) -> Result<(), ServiceError> {
        (**self).speak(text).await
    }

    fn reports_completion(&self) -> bool {
        (**self).reports_completion()
    }
}

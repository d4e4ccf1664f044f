//! Capture performed by the browser
//!
//! The microphone and speech recognizer live client side. Recognized text and
//! the end-of-capture signal arrive over HTTP and are forwarded through the
//! sink of whichever capture is live.

use super::ServiceError;
use crate::runtime::{CaptureService, CaptureSink};
use async_trait::async_trait;
use tokio::sync::Mutex;

#[derive(Default)]
pub struct RemoteCapture {
    active: Mutex<Option<CaptureSink>>,
}

impl RemoteCapture {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(dead_code)] // Used by tests
    pub async fn is_active(&self) -> bool {
        self.active.lock().await.is_some()
    }

    /// Forward recognized speech. Returns false when no capture is live.
    pub async fn push_chunk(&self, text: &str) -> bool {
        let sink = self.active.lock().await.clone();
        match sink {
            Some(sink) => sink.transcript_chunk(text).await,
            None => false,
        }
    }

    /// The client stopped recognizing on its own (silence, permission
    /// revoked). Returns false when no capture is live.
    pub async fn client_stopped(&self) -> bool {
        let sink = self.active.lock().await.take();
        match sink {
            Some(sink) => sink.stopped().await,
            None => false,
        }
    }
}

#[async_trait]
impl CaptureService for RemoteCapture {
    async fn start(&self, sink: CaptureSink) -> Result<(), ServiceError> {
        tracing::debug!(capture_id = %sink.capture_id(), "Remote capture live");
        if let Some(previous) = self.active.lock().await.replace(sink) {
            tracing::warn!(capture_id = %previous.capture_id(), "Replaced a capture that was never stopped");
        }
        Ok(())
    }

    async fn stop(&self) {
        if let Some(sink) = self.active.lock().await.take() {
            tracing::debug!(capture_id = %sink.capture_id(), "Remote capture released");
        }
    }
}

//! Session runtime executor

use super::traits::{CaptureService, CaptureSink, Responder, Synthesizer};
use super::{Envelope, SessionEvent};
use crate::presence::presence_for;
use crate::services::ServiceError;
use crate::state_machine::{transition, ControllerState, Effect, Event, SessionContext};
use crate::transcript::{Transcript, TranscriptStore, Turn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Generic session runtime that can work with any capture, generation and
/// synthesis implementations.
///
/// Owns the controller state and the transcript; it is their only writer.
/// Events are processed one at a time, each to completion.
pub struct SessionRuntime<C, R, S>
where
    C: CaptureService + 'static,
    R: Responder + 'static,
    S: Synthesizer + 'static,
{
    context: SessionContext,
    generation_timeout: Duration,
    state: ControllerState,
    transcript: TranscriptStore,
    capture: Arc<C>,
    responder: Arc<R>,
    synthesizer: Arc<S>,
    event_rx: mpsc::Receiver<Envelope>,
    event_tx: mpsc::Sender<Envelope>,
    state_tx: watch::Sender<ControllerState>,
    broadcast_tx: broadcast::Sender<SessionEvent>,
    /// Token to interrupt an in-flight capture start
    capture_cancel_token: Option<CancellationToken>,
    shutdown: CancellationToken,
}

/// Channels connecting a runtime to its handle
pub struct RuntimeChannels {
    pub event_rx: mpsc::Receiver<Envelope>,
    pub event_tx: mpsc::Sender<Envelope>,
    pub state_tx: watch::Sender<ControllerState>,
    pub broadcast_tx: broadcast::Sender<SessionEvent>,
    pub shutdown: CancellationToken,
}

impl<C, R, S> SessionRuntime<C, R, S>
where
    C: CaptureService + 'static,
    R: Responder + 'static,
    S: Synthesizer + 'static,
{
    pub fn new(
        context: SessionContext,
        generation_timeout: Duration,
        transcript: TranscriptStore,
        services: (C, R, S),
        channels: RuntimeChannels,
    ) -> Self {
        let (capture, responder, synthesizer) = services;
        Self {
            context,
            generation_timeout,
            state: ControllerState::Ready,
            transcript,
            capture: Arc::new(capture),
            responder: Arc::new(responder),
            synthesizer: Arc::new(synthesizer),
            event_rx: channels.event_rx,
            event_tx: channels.event_tx,
            state_tx: channels.state_tx,
            broadcast_tx: channels.broadcast_tx,
            capture_cancel_token: None,
            shutdown: channels.shutdown,
        }
    }

    /// Receiver for transcript snapshots; taken before the runtime is moved
    /// into its task.
    pub fn watch_transcript(&self) -> watch::Receiver<Transcript> {
        self.transcript.subscribe()
    }

    pub async fn run(mut self) {
        let session_id = self.context.session_id.clone();
        tracing::info!(session_id = %session_id, "Starting session runtime");

        loop {
            tokio::select! {
                biased;

                () = self.shutdown.cancelled() => break,

                Some(envelope) = self.event_rx.recv() => {
                    self.process_event(envelope).await;
                }

                else => break,
            }
        }

        // Don't leave a microphone open behind a dead session
        if let ControllerState::Listening { capture_id, .. } = &self.state {
            let capture_id = capture_id.clone();
            self.execute_effect(Effect::StopCapture { capture_id }).await;
        }

        tracing::info!(
            session_id = %session_id,
            turns = self.transcript.len(),
            "Session runtime stopped"
        );
    }

    async fn process_event(&mut self, envelope: Envelope) {
        let Envelope { event, reply } = envelope;
        let event_name = event.name();

        let outcome = match transition(&self.state, &self.context, event) {
            Ok(result) => {
                let old_state = std::mem::replace(&mut self.state, result.new_state);

                for effect in result.effects {
                    self.execute_effect(effect).await;
                }

                if old_state != self.state {
                    self.publish_state(&old_state, event_name);
                }
                Ok(())
            }
            Err(e) => {
                // Rejected input is a no-op, never an error for the session
                tracing::debug!(
                    session_id = %self.context.session_id,
                    state = self.state.name(),
                    event = event_name,
                    reason = %e,
                    "Event rejected"
                );
                Err(e)
            }
        };

        if let Some(reply) = reply {
            let _ = reply.send(outcome);
        }
    }

    fn publish_state(&self, old_state: &ControllerState, event_name: &str) {
        if old_state.name() != self.state.name() {
            tracing::info!(
                session_id = %self.context.session_id,
                from = old_state.name(),
                to = self.state.name(),
                event = event_name,
                "State transition"
            );
        }

        self.state_tx.send_replace(self.state.clone());
        let _ = self.broadcast_tx.send(SessionEvent::StateChanged {
            state: self.state.clone(),
            presence: presence_for(&self.state),
        });
    }

    fn spawn_event<F>(&self, future: F)
    where
        F: std::future::Future<Output = Option<Event>> + Send + 'static,
    {
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            if let Some(event) = future.await {
                let _ = event_tx.send(Envelope::event(event)).await;
            }
        });
    }

    /// Execute an effect. Service calls run in background tasks and report
    /// back as events.
    async fn execute_effect(&mut self, effect: Effect) {
        match effect {
            Effect::AppendTurn { speaker, content } => {
                let turn = self.transcript.append(Turn::new(speaker, content));
                let _ = self.broadcast_tx.send(SessionEvent::TurnAppended { turn });
            }

            Effect::StartCapture { capture_id } => {
                let cancel_token = CancellationToken::new();
                if let Some(previous) = self.capture_cancel_token.replace(cancel_token.clone()) {
                    previous.cancel();
                }

                let capture = self.capture.clone();
                let sink = CaptureSink::new(capture_id.clone(), self.event_tx.clone());

                self.spawn_event(async move {
                    tracing::info!(capture_id = %capture_id, "Starting capture (background)");

                    tokio::select! {
                        biased;

                        () = cancel_token.cancelled() => {
                            tracing::info!(capture_id = %capture_id, "Capture start interrupted");
                            None
                        }

                        result = capture.start(sink) => {
                            match result {
                                Ok(()) => None,
                                Err(error) => Some(Event::CaptureFailed { capture_id, error }),
                            }
                        }
                    }
                });
            }

            Effect::StopCapture { capture_id } => {
                tracing::info!(capture_id = %capture_id, "Stopping capture");
                if let Some(token) = self.capture_cancel_token.take() {
                    token.cancel();
                }
                self.capture.stop().await;
            }

            Effect::RequestReply => {
                let responder = self.responder.clone();
                let history = self.transcript.all();
                let deadline = self.generation_timeout;

                self.spawn_event(async move {
                    tracing::info!(turns = history.len(), "Requesting reply (background)");

                    let event = match tokio::time::timeout(deadline, responder.generate(&history))
                        .await
                    {
                        Ok(Ok(text)) => Event::ReplyReady {
                            reply_id: uuid::Uuid::new_v4().to_string(),
                            text,
                        },
                        Ok(Err(error)) => Event::GenerationFailed { error },
                        Err(_) => Event::GenerationFailed {
                            error: ServiceError::timeout(deadline),
                        },
                    };
                    Some(event)
                });
            }

            Effect::Speak { utterance_id, text } => {
                let _ = self.broadcast_tx.send(SessionEvent::Speak {
                    utterance_id: utterance_id.clone(),
                    text: text.clone(),
                });

                let synthesizer = self.synthesizer.clone();
                let reports_completion = synthesizer.reports_completion();

                self.spawn_event(async move {
                    match synthesizer.speak(&text).await {
                        Ok(()) if reports_completion => Some(Event::SpeechFinished { utterance_id }),
                        // The fallback timer ends this turn
                        Ok(()) => None,
                        Err(error) => Some(Event::SpeechFailed {
                            utterance_id,
                            error,
                        }),
                    }
                });
            }

            Effect::ScheduleSpeechFallback {
                utterance_id,
                delay,
            } => {
                self.spawn_event(async move {
                    tokio::time::sleep(delay).await;
                    Some(Event::SpeechFallbackElapsed { utterance_id })
                });
            }

            Effect::OfferDraft { text } => {
                let _ = self.broadcast_tx.send(SessionEvent::VoiceDraft { text });
            }

            Effect::NotifyFailure { service, error } => {
                tracing::warn!(
                    session_id = %self.context.session_id,
                    service = service.as_str(),
                    kind = %error.kind,
                    error = %error.message,
                    "Service failure"
                );
                let _ = self.broadcast_tx.send(SessionEvent::Notice {
                    service: service.as_str().to_string(),
                    message: error.message,
                });
            }
        }
    }
}

//! Runtime for executing onboarding sessions
//!
//! One `SessionRuntime` task per session owns the controller state and the
//! transcript. Everything else talks to it through a `SessionHandle`.

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::{RuntimeChannels, SessionRuntime};
pub use traits::*;

use crate::config::SessionSettings;
use crate::input::InputSurface;
use crate::presence::{presence_for, PresenceDescriptor};
use crate::services::{RemoteCapture, SimulatedSynthesizer};
use crate::state_machine::{ControllerState, Event, SessionContext, TransitionError};
use crate::transcript::{Transcript, TranscriptStore, Turn};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex, RwLock};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use ts_rs::TS;

/// An event on its way to the runtime, optionally with a reply channel for
/// the transition outcome
#[derive(Debug)]
pub struct Envelope {
    pub event: Event,
    pub reply: Option<oneshot::Sender<Result<(), TransitionError>>>,
}

impl Envelope {
    pub fn event(event: Event) -> Self {
        Self { event, reply: None }
    }
}

/// Events sent to the render layer
#[derive(Debug, Clone, Serialize, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
#[ts(export)]
pub enum SessionEvent {
    TurnAppended {
        turn: Turn,
    },
    StateChanged {
        state: ControllerState,
        presence: PresenceDescriptor,
    },
    /// Captured speech waiting for the user to confirm it
    VoiceDraft {
        text: String,
    },
    /// Voice this reply now
    Speak {
        utterance_id: String,
        text: String,
    },
    /// A service failed; shown next to the input box
    Notice {
        service: String,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Session has ended")]
pub struct SessionClosed;

/// Handle to interact with a running session
#[derive(Clone)]
pub struct SessionHandle {
    session_id: String,
    event_tx: mpsc::Sender<Envelope>,
    state_rx: watch::Receiver<ControllerState>,
    transcript_rx: watch::Receiver<Transcript>,
    broadcast_tx: broadcast::Sender<SessionEvent>,
    shutdown: CancellationToken,
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> ControllerState {
        self.state_rx.borrow().clone()
    }

    pub fn presence(&self) -> PresenceDescriptor {
        presence_for(&self.state_rx.borrow())
    }

    pub fn transcript(&self) -> Transcript {
        self.transcript_rx.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<ControllerState> {
        self.state_rx.clone()
    }

    #[allow(dead_code)] // render layers that poll instead of streaming
    pub fn watch_transcript(&self) -> watch::Receiver<Transcript> {
        self.transcript_rx.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.broadcast_tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.broadcast_tx.receiver_count()
    }

    /// Queue an event without waiting for it to be processed
    pub async fn send(&self, event: Event) -> Result<(), SessionClosed> {
        self.event_tx
            .send(Envelope::event(event))
            .await
            .map_err(|_| SessionClosed)
    }

    /// Queue an event and wait for the transition outcome
    pub async fn dispatch(
        &self,
        event: Event,
    ) -> Result<Result<(), TransitionError>, SessionClosed> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.event_tx
            .send(Envelope {
                event,
                reply: Some(reply_tx),
            })
            .await
            .map_err(|_| SessionClosed)?;
        reply_rx.await.map_err(|_| SessionClosed)
    }

    pub fn close(&self) {
        self.shutdown.cancel();
    }

    pub async fn closed(&self) {
        self.shutdown.cancelled().await;
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled() || self.event_tx.is_closed()
    }
}

/// Seed a transcript with the greeting, spawn the runtime task and return
/// its handle
pub fn spawn_session<C, R, S>(
    session_id: impl Into<String>,
    settings: &SessionSettings,
    capture: C,
    responder: R,
    synthesizer: S,
) -> SessionHandle
where
    C: CaptureService + 'static,
    R: Responder + 'static,
    S: Synthesizer + 'static,
{
    let session_id = session_id.into();
    let context = SessionContext::new(&session_id)
        .with_voice_submit(settings.voice_submit)
        .with_speech_fallback(
            (!synthesizer.reports_completion()).then_some(settings.speaking_fallback),
        )
        .with_error_notice(&settings.error_notice);

    let (event_tx, event_rx) = mpsc::channel(32);
    let (state_tx, state_rx) = watch::channel(ControllerState::Ready);
    let (broadcast_tx, _) = broadcast::channel(128);
    let shutdown = CancellationToken::new();

    let runtime = SessionRuntime::new(
        context,
        settings.generation_timeout,
        TranscriptStore::with_greeting(&settings.greeting),
        (capture, responder, synthesizer),
        RuntimeChannels {
            event_rx,
            event_tx: event_tx.clone(),
            state_tx,
            broadcast_tx: broadcast_tx.clone(),
            shutdown: shutdown.clone(),
        },
    );
    let transcript_rx = runtime.watch_transcript();

    tokio::spawn(runtime.run());

    SessionHandle {
        session_id,
        event_tx,
        state_rx,
        transcript_rx,
        broadcast_tx,
        shutdown,
    }
}

/// A hosted session with its input surface and browser-backed capture
pub struct ManagedSession {
    pub handle: SessionHandle,
    pub input: Mutex<InputSurface>,
    pub capture: Arc<RemoteCapture>,
    last_activity: Mutex<Instant>,
}

impl ManagedSession {
    async fn touch(&self) {
        *self.last_activity.lock().await = Instant::now();
    }

    async fn idle_for(&self) -> Duration {
        self.last_activity.lock().await.elapsed()
    }

    /// Whether a render layer is streaming this session
    fn has_viewers(&self) -> bool {
        // The draft forwarder holds one subscription for the session's lifetime
        self.handle.subscriber_count() > 1
    }
}

/// Manager for all live sessions
pub struct SessionManager {
    settings: SessionSettings,
    responder: Arc<dyn Responder>,
    sessions: RwLock<HashMap<String, Arc<ManagedSession>>>,
}

impl SessionManager {
    pub fn new(settings: SessionSettings, responder: Arc<dyn Responder>) -> Self {
        Self {
            settings,
            responder,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub async fn create(&self) -> Arc<ManagedSession> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let capture = Arc::new(RemoteCapture::new());

        let handle = spawn_session(
            &session_id,
            &self.settings,
            capture.clone(),
            self.responder.clone(),
            SimulatedSynthesizer,
        );

        let session = Arc::new(ManagedSession {
            input: Mutex::new(InputSurface::new(handle.clone())),
            handle,
            capture,
            last_activity: Mutex::new(Instant::now()),
        });

        spawn_draft_forwarder(session.clone());

        self.sessions
            .write()
            .await
            .insert(session_id.clone(), session.clone());
        tracing::info!(session_id = %session_id, "Session created");
        session
    }

    /// Look up a session. Every lookup counts as activity.
    pub async fn get(&self, session_id: &str) -> Option<Arc<ManagedSession>> {
        let session = self.sessions.read().await.get(session_id).cloned()?;
        session.touch().await;
        Some(session)
    }

    /// End a session, discarding its state and transcript. Returns false if
    /// no such session exists.
    pub async fn end(&self, session_id: &str) -> bool {
        let Some(session) = self.sessions.write().await.remove(session_id) else {
            return false;
        };
        session.handle.close();
        tracing::info!(session_id = %session_id, "Session ended");
        true
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// End every session whose runtime has stopped, or that has gone
    /// `idle_timeout` without a lookup while nobody streams it. Returns how
    /// many were ended.
    pub async fn reap_idle(&self) -> usize {
        // Lookups wait on this lock, so nothing is touched mid-sweep
        let mut sessions = self.sessions.write().await;

        let mut expired = Vec::new();
        for (session_id, session) in sessions.iter() {
            if session.handle.is_closed() {
                expired.push(session_id.clone());
                continue;
            }
            let idle = session.idle_for().await;
            if idle >= self.settings.idle_timeout && !session.has_viewers() {
                tracing::info!(
                    session_id = %session_id,
                    idle_secs = idle.as_secs(),
                    "Ending idle session"
                );
                expired.push(session_id.clone());
            }
        }

        for session_id in &expired {
            if let Some(session) = sessions.remove(session_id) {
                session.handle.close();
            }
        }
        expired.len()
    }

    /// Periodically reap idle sessions until the manager is dropped
    pub fn spawn_reaper(self: &Arc<Self>) {
        let manager = Arc::downgrade(self);
        let period = (self.settings.idle_timeout / 4)
            .clamp(Duration::from_secs(1), Duration::from_secs(60));

        tokio::spawn(async move {
            let mut ticks = tokio::time::interval(period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticks.tick().await;

            loop {
                ticks.tick().await;
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                let reaped = manager.reap_idle().await;
                if reaped > 0 {
                    let remaining = manager.len().await;
                    tracing::info!(reaped, remaining, "Reaped sessions");
                }
            }
            tracing::debug!("Session reaper stopped");
        });
    }
}

/// Move confirm-first voice drafts into the session's input surface
fn spawn_draft_forwarder(session: Arc<ManagedSession>) {
    let mut events = session.handle.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = session.handle.closed() => break,
                received = events.recv() => match received {
                    Ok(SessionEvent::VoiceDraft { text }) => {
                        session.input.lock().await.offer_voice_draft(text);
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            session_id = %session.handle.session_id(),
                            skipped,
                            "Draft forwarder lagged"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    });
}

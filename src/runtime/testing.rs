//! Mock implementations for testing
//!
//! These mocks enable integration testing without a browser or a model.

use super::traits::*;
use super::{spawn_session, SessionEvent, SessionHandle};
use crate::config::SessionSettings;
use crate::services::ServiceError;
use crate::state_machine::ControllerState;
use crate::transcript::Turn;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, Notify};

// ============================================================================
// Mock Capture Service
// ============================================================================

/// Capture service driven by the test through `emit_chunk` / `emit_stopped`
#[derive(Default)]
pub struct MockCapture {
    starts: Mutex<Vec<String>>,
    stops: AtomicUsize,
    sink: Mutex<Option<CaptureSink>>,
    start_delay: Option<Duration>,
    start_error: Option<ServiceError>,
}

impl MockCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// `start` takes this long before the capture is live
    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = Some(delay);
        self
    }

    /// `start` fails with this error
    pub fn failing(mut self, error: ServiceError) -> Self {
        self.start_error = Some(error);
        self
    }

    pub fn starts(&self) -> Vec<String> {
        self.starts.lock().unwrap().clone()
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn is_live(&self) -> bool {
        self.sink.lock().unwrap().is_some()
    }

    pub async fn wait_until_live(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.is_live() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    /// Recognize `text` on the live capture
    pub async fn emit_chunk(&self, text: &str) -> bool {
        let sink = self.sink.lock().unwrap().clone();
        match sink {
            Some(sink) => sink.transcript_chunk(text).await,
            None => false,
        }
    }

    /// End the live capture from the service side
    pub async fn emit_stopped(&self) -> bool {
        let sink = self.sink.lock().unwrap().take();
        match sink {
            Some(sink) => sink.stopped().await,
            None => false,
        }
    }
}

#[async_trait]
impl CaptureService for MockCapture {
    async fn start(&self, sink: CaptureSink) -> Result<(), ServiceError> {
        self.starts
            .lock()
            .unwrap()
            .push(sink.capture_id().to_string());

        if let Some(delay) = self.start_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = &self.start_error {
            return Err(error.clone());
        }

        *self.sink.lock().unwrap() = Some(sink);
        Ok(())
    }

    async fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.sink.lock().unwrap().take();
    }
}

// ============================================================================
// Mock Responder
// ============================================================================

/// Responder that returns queued results, then a default reply
pub struct MockResponder {
    results: Mutex<VecDeque<Result<String, ServiceError>>>,
    delay: Option<Duration>,
    /// Record of every history it was asked to answer
    pub histories: Mutex<Vec<Vec<Turn>>>,
}

pub const MOCK_REPLY: &str = "Mock reply";

impl MockResponder {
    pub fn new() -> Self {
        Self {
            results: Mutex::new(VecDeque::new()),
            delay: None,
            histories: Mutex::new(Vec::new()),
        }
    }

    pub fn with_reply(self, text: impl Into<String>) -> Self {
        self.results.lock().unwrap().push_back(Ok(text.into()));
        self
    }

    pub fn with_error(self, error: ServiceError) -> Self {
        self.results.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn recorded_histories(&self) -> Vec<Vec<Turn>> {
        self.histories.lock().unwrap().clone()
    }
}

impl Default for MockResponder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Responder for MockResponder {
    async fn generate(&self, history: &[Turn]) -> Result<String, ServiceError> {
        self.histories.lock().unwrap().push(history.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(MOCK_REPLY.to_string()))
    }
}

// ============================================================================
// Mock Synthesizer
// ============================================================================

/// Synthesizer that records what it was asked to say
pub struct MockSynthesizer {
    spoken: Mutex<Vec<String>>,
    reports_completion: bool,
    /// When set, playback lasts until the notify fires
    hold: Option<Arc<Notify>>,
    error: Option<ServiceError>,
}

impl MockSynthesizer {
    pub fn new() -> Self {
        Self {
            spoken: Mutex::new(Vec::new()),
            reports_completion: true,
            hold: None,
            error: None,
        }
    }

    /// Declare no completion signal, so the fallback timer ends `Speaking`
    pub fn without_completion(mut self) -> Self {
        self.reports_completion = false;
        self
    }

    pub fn held_by(mut self, release: Arc<Notify>) -> Self {
        self.hold = Some(release);
        self
    }

    pub fn failing(mut self, error: ServiceError) -> Self {
        self.error = Some(error);
        self
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

impl Default for MockSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Synthesizer for MockSynthesizer {
    async fn speak(&self, text: &str) -> Result<(), ServiceError> {
        self.spoken.lock().unwrap().push(text.to_string());
        if let Some(release) = &self.hold {
            release.notified().await;
        }
        match &self.error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn reports_completion(&self) -> bool {
        self.reports_completion
    }
}

// ============================================================================
// Test Session Builder
// ============================================================================

/// A running session wired to mocks, with helpers to observe it
pub struct TestSession {
    pub handle: SessionHandle,
    pub events: broadcast::Receiver<SessionEvent>,
    pub capture: Arc<MockCapture>,
    pub responder: Arc<MockResponder>,
    pub synthesizer: Arc<MockSynthesizer>,
}

pub struct TestSessionBuilder {
    settings: SessionSettings,
    capture: MockCapture,
    responder: MockResponder,
    synthesizer: MockSynthesizer,
}

impl TestSession {
    pub fn builder() -> TestSessionBuilder {
        TestSessionBuilder {
            settings: SessionSettings::default(),
            capture: MockCapture::new(),
            responder: MockResponder::new(),
            synthesizer: MockSynthesizer::new(),
        }
    }
}

impl TestSessionBuilder {
    pub fn settings(mut self, settings: SessionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn capture(mut self, capture: MockCapture) -> Self {
        self.capture = capture;
        self
    }

    pub fn responder(mut self, responder: MockResponder) -> Self {
        self.responder = responder;
        self
    }

    pub fn synthesizer(mut self, synthesizer: MockSynthesizer) -> Self {
        self.synthesizer = synthesizer;
        self
    }

    pub fn build(self) -> TestSession {
        let capture = Arc::new(self.capture);
        let responder = Arc::new(self.responder);
        let synthesizer = Arc::new(self.synthesizer);

        let handle = spawn_session(
            "test-session",
            &self.settings,
            capture.clone(),
            responder.clone(),
            synthesizer.clone(),
        );
        let events = handle.subscribe();

        TestSession {
            handle,
            events,
            capture,
            responder,
            synthesizer,
        }
    }
}

impl TestSession {
    /// Wait until the controller is in the named state
    pub async fn wait_for_state(&self, expected: &str, timeout: Duration) -> bool {
        let mut state_rx = self.handle.watch_state();
        let wait = async {
            loop {
                if state_rx.borrow_and_update().name() == expected {
                    return true;
                }
                if state_rx.changed().await.is_err() {
                    return false;
                }
            }
        };
        tokio::time::timeout(timeout, wait).await.unwrap_or(false)
    }

    /// Wait for the next broadcast event matching `predicate`
    pub async fn wait_for_event<F>(&mut self, timeout: Duration, predicate: F) -> Option<SessionEvent>
    where
        F: Fn(&SessionEvent) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            match tokio::time::timeout(Duration::from_millis(50), self.events.recv()).await {
                Ok(Ok(event)) if predicate(&event) => return Some(event),
                Ok(Err(broadcast::error::RecvError::Closed)) => return None,
                _ => continue,
            }
        }
        None
    }

    /// Wait for the next failure notice, returning (service, message)
    pub async fn wait_for_notice(&mut self, timeout: Duration) -> Option<(String, String)> {
        match self
            .wait_for_event(timeout, |e| matches!(e, SessionEvent::Notice { .. }))
            .await
        {
            Some(SessionEvent::Notice { service, message }) => Some((service, message)),
            _ => None,
        }
    }

    /// (speaker, content) pairs of the current transcript
    pub fn turns(&self) -> Vec<(crate::transcript::Speaker, String)> {
        self.handle
            .transcript()
            .iter()
            .map(|turn| (turn.speaker, turn.content.clone()))
            .collect()
    }

    pub fn state(&self) -> ControllerState {
        self.handle.state()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_GREETING;
    use crate::services::ServiceErrorKind;
    use crate::state_machine::{Event, TransitionError, VoiceSubmitPolicy};
    use crate::transcript::Speaker;

    const WAIT: Duration = Duration::from_secs(2);

    fn submit(text: &str) -> Event {
        Event::SubmitText {
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_text_exchange() {
        let mut rt = TestSession::builder()
            .responder(MockResponder::new().with_reply("Hi there"))
            .build();
        assert_eq!(rt.turns(), vec![(Speaker::Assistant, DEFAULT_GREETING.to_string())]);

        assert_eq!(rt.handle.dispatch(submit("Hello")).await, Ok(Ok(())));

        let appended = rt
            .wait_for_event(WAIT, |e| {
                matches!(e, SessionEvent::TurnAppended { turn } if turn.speaker == Speaker::Assistant)
            })
            .await;
        assert!(appended.is_some());
        assert!(rt.wait_for_state("ready", WAIT).await);

        assert_eq!(
            rt.turns(),
            vec![
                (Speaker::Assistant, DEFAULT_GREETING.to_string()),
                (Speaker::User, "Hello".to_string()),
                (Speaker::Assistant, "Hi there".to_string()),
            ]
        );
        assert_eq!(rt.synthesizer.spoken(), vec!["Hi there".to_string()]);

        // The responder saw the greeting and the user's turn
        let histories = rt.responder.recorded_histories();
        assert_eq!(histories.len(), 1);
        assert_eq!(histories[0].len(), 2);
        assert_eq!(histories[0][1].content, "Hello");
    }

    #[tokio::test]
    async fn test_state_changes_are_broadcast_in_order() {
        let mut rt = TestSession::builder().build();
        rt.handle.send(submit("Hello")).await.unwrap();

        let mut seen = Vec::new();
        while seen.last().map(String::as_str) != Some("ready") {
            let Some(SessionEvent::StateChanged { state, presence }) = rt
                .wait_for_event(WAIT, |e| matches!(e, SessionEvent::StateChanged { .. }))
                .await
            else {
                panic!("state changes stopped after {seen:?}");
            };
            assert_eq!(presence, crate::presence::presence_for(&state));
            seen.push(state.name().to_string());
        }
        assert_eq!(seen, vec!["processing", "speaking", "ready"]);
    }

    #[tokio::test]
    async fn test_toggle_twice_without_speech() {
        let rt = TestSession::builder().build();

        assert_eq!(rt.handle.dispatch(Event::toggle_voice()).await, Ok(Ok(())));
        assert!(rt.state().is_listening());
        assert!(rt.capture.wait_until_live(WAIT).await);

        assert_eq!(rt.handle.dispatch(Event::toggle_voice()).await, Ok(Ok(())));
        assert_eq!(rt.state(), ControllerState::Ready);
        assert_eq!(rt.capture.starts().len(), 1);
        assert_eq!(rt.capture.stops(), 1);
        assert_eq!(rt.turns().len(), 1);
    }

    #[tokio::test]
    async fn test_input_rejected_while_assistant_holds_turn() {
        let rt = TestSession::builder()
            .responder(MockResponder::new().with_delay(Duration::from_secs(60)))
            .build();

        rt.handle.dispatch(submit("Hello")).await.unwrap().unwrap();
        assert_eq!(rt.state(), ControllerState::Processing);

        assert!(matches!(
            rt.handle.dispatch(submit("again")).await,
            Ok(Err(TransitionError::StateViolation { .. }))
        ));
        assert!(matches!(
            rt.handle.dispatch(Event::toggle_voice()).await,
            Ok(Err(TransitionError::StateViolation { .. }))
        ));
        assert_eq!(rt.turns().len(), 2);
        assert!(rt.capture.starts().is_empty());
    }

    #[tokio::test]
    async fn test_generation_failure_appends_notice() {
        let mut rt = TestSession::builder()
            .responder(MockResponder::new().with_error(ServiceError::unavailable("model offline")))
            .build();

        rt.handle.dispatch(submit("Hello")).await.unwrap().unwrap();

        let (service, message) = rt.wait_for_notice(WAIT).await.unwrap();
        assert_eq!(service, "generation");
        assert_eq!(message, "model offline");
        assert!(rt.wait_for_state("ready", WAIT).await);

        let turns = rt.turns();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[1], (Speaker::User, "Hello".to_string()));
        assert_eq!(
            turns[2],
            (
                Speaker::Assistant,
                crate::state_machine::state::DEFAULT_ERROR_NOTICE.to_string()
            )
        );
        assert!(rt.synthesizer.spoken().is_empty());
    }

    #[tokio::test]
    async fn test_generation_timeout() {
        let settings = SessionSettings {
            generation_timeout: Duration::from_millis(50),
            ..SessionSettings::default()
        };
        let mut rt = TestSession::builder()
            .settings(settings)
            .responder(MockResponder::new().with_delay(Duration::from_secs(60)))
            .build();

        rt.handle.dispatch(submit("Hello")).await.unwrap().unwrap();

        let (service, message) = rt.wait_for_notice(WAIT).await.unwrap();
        assert_eq!(service, "generation");
        assert_eq!(
            message,
            ServiceError::timeout(Duration::from_millis(50)).message
        );
        assert!(rt.wait_for_state("ready", WAIT).await);
        assert_eq!(rt.turns().len(), 3);
    }

    #[tokio::test]
    async fn test_fallback_timer_ends_speaking() {
        let settings = SessionSettings {
            speaking_fallback: Duration::from_millis(150),
            ..SessionSettings::default()
        };
        let rt = TestSession::builder()
            .settings(settings)
            .synthesizer(MockSynthesizer::new().without_completion())
            .build();

        rt.handle.dispatch(submit("Hello")).await.unwrap().unwrap();
        assert!(rt.wait_for_state("speaking", WAIT).await);

        // Speech returned immediately, but without a completion signal the
        // timer decides
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(matches!(rt.state(), ControllerState::Speaking { .. }));

        assert!(rt.wait_for_state("ready", WAIT).await);
    }

    #[tokio::test]
    async fn test_speaking_lasts_until_playback_finishes() {
        let release = Arc::new(Notify::new());
        let rt = TestSession::builder()
            .synthesizer(MockSynthesizer::new().held_by(release.clone()))
            .build();

        rt.handle.dispatch(submit("Hello")).await.unwrap().unwrap();
        assert!(rt.wait_for_state("speaking", WAIT).await);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(matches!(rt.state(), ControllerState::Speaking { .. }));

        release.notify_one();
        assert!(rt.wait_for_state("ready", WAIT).await);
    }

    #[tokio::test]
    async fn test_synthesis_failure_returns_to_ready() {
        let mut rt = TestSession::builder()
            .synthesizer(MockSynthesizer::new().failing(ServiceError::unknown("no audio device")))
            .build();

        rt.handle.dispatch(submit("Hello")).await.unwrap().unwrap();

        let (service, _) = rt.wait_for_notice(WAIT).await.unwrap();
        assert_eq!(service, "synthesis");
        assert!(rt.wait_for_state("ready", WAIT).await);
        // The reply was already recorded; no extra turn for the failure
        assert_eq!(rt.turns().len(), 3);
    }

    #[tokio::test]
    async fn test_stale_speech_completion_is_ignored() {
        let release = Arc::new(Notify::new());
        let rt = TestSession::builder()
            .synthesizer(MockSynthesizer::new().held_by(release.clone()))
            .build();

        rt.handle.dispatch(submit("Hello")).await.unwrap().unwrap();
        assert!(rt.wait_for_state("speaking", WAIT).await);

        let outcome = rt
            .handle
            .dispatch(Event::SpeechFinished {
                utterance_id: "some-earlier-reply".to_string(),
            })
            .await;
        assert!(matches!(
            outcome,
            Ok(Err(TransitionError::StateViolation { .. }))
        ));
        assert!(matches!(rt.state(), ControllerState::Speaking { .. }));

        release.notify_one();
        assert!(rt.wait_for_state("ready", WAIT).await);
    }

    #[tokio::test]
    async fn test_auto_submit_commits_speech() {
        let settings = SessionSettings {
            voice_submit: VoiceSubmitPolicy::Auto,
            ..SessionSettings::default()
        };
        let rt = TestSession::builder()
            .settings(settings)
            .responder(MockResponder::new().with_reply("Great, tell me more"))
            .build();

        rt.handle.dispatch(Event::toggle_voice()).await.unwrap().unwrap();
        assert!(rt.capture.wait_until_live(WAIT).await);
        assert!(rt.capture.emit_chunk("I run a").await);
        assert!(rt.capture.emit_chunk(" bakery ").await);
        rt.handle.dispatch(Event::toggle_voice()).await.unwrap().unwrap();

        assert!(rt.wait_for_state("ready", WAIT).await);
        let turns = rt.turns();
        assert_eq!(turns[1], (Speaker::User, "I run a bakery".to_string()));
        assert_eq!(turns[2], (Speaker::Assistant, "Great, tell me more".to_string()));
        assert_eq!(rt.capture.stops(), 1);
    }

    #[tokio::test]
    async fn test_capture_ending_on_its_own_commits_speech() {
        let settings = SessionSettings {
            voice_submit: VoiceSubmitPolicy::Auto,
            ..SessionSettings::default()
        };
        let rt = TestSession::builder().settings(settings).build();

        rt.handle.dispatch(Event::toggle_voice()).await.unwrap().unwrap();
        assert!(rt.capture.wait_until_live(WAIT).await);
        assert!(rt.capture.emit_chunk("hello there").await);
        assert!(rt.capture.emit_stopped().await);

        assert!(rt.wait_for_state("ready", WAIT).await);
        assert_eq!(rt.turns()[1], (Speaker::User, "hello there".to_string()));
    }

    #[tokio::test]
    async fn test_confirm_policy_offers_draft() {
        let mut rt = TestSession::builder().build();

        rt.handle.dispatch(Event::toggle_voice()).await.unwrap().unwrap();
        assert!(rt.capture.wait_until_live(WAIT).await);
        assert!(rt.capture.emit_chunk("I sell shoes").await);
        rt.handle.dispatch(Event::toggle_voice()).await.unwrap().unwrap();

        let draft = rt
            .wait_for_event(WAIT, |e| matches!(e, SessionEvent::VoiceDraft { .. }))
            .await;
        assert!(matches!(
            draft,
            Some(SessionEvent::VoiceDraft { text }) if text == "I sell shoes"
        ));
        assert_eq!(rt.state(), ControllerState::Ready);
        assert_eq!(rt.turns().len(), 1);
        assert!(rt.responder.recorded_histories().is_empty());
    }

    #[tokio::test]
    async fn test_capture_start_failure() {
        let mut rt = TestSession::builder()
            .capture(MockCapture::new().failing(ServiceError::rejected("Microphone permission denied")))
            .build();

        rt.handle.dispatch(Event::toggle_voice()).await.unwrap().unwrap();

        let (service, message) = rt.wait_for_notice(WAIT).await.unwrap();
        assert_eq!(service, "capture");
        assert_eq!(message, "Microphone permission denied");
        assert!(rt.wait_for_state("ready", WAIT).await);
        assert_eq!(rt.turns().len(), 1);

        // The session is usable again
        assert_eq!(rt.handle.dispatch(submit("typing instead")).await, Ok(Ok(())));
    }

    #[tokio::test]
    async fn test_stop_during_capture_start() {
        let mut rt = TestSession::builder()
            .capture(MockCapture::new().with_start_delay(Duration::from_secs(60)))
            .build();

        rt.handle.dispatch(Event::toggle_voice()).await.unwrap().unwrap();
        rt.handle.dispatch(Event::toggle_voice()).await.unwrap().unwrap();

        assert_eq!(rt.state(), ControllerState::Ready);
        assert_eq!(rt.capture.stops(), 1);
        assert!(!rt.capture.is_live());
        // An interrupted start is not a failure
        assert!(rt.wait_for_notice(Duration::from_millis(200)).await.is_none());
    }

    #[tokio::test]
    async fn test_open_capture_released_on_close() {
        let rt = TestSession::builder().build();

        rt.handle.dispatch(Event::toggle_voice()).await.unwrap().unwrap();
        assert!(rt.capture.wait_until_live(WAIT).await);

        rt.handle.close();
        let deadline = tokio::time::Instant::now() + WAIT;
        while rt.capture.stops() == 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(rt.capture.stops(), 1);
    }

    #[test]
    fn test_timeout_error_kind() {
        assert_eq!(
            ServiceError::timeout(Duration::from_millis(50)).kind,
            ServiceErrorKind::Timeout
        );
    }
}

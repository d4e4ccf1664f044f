//! Pure state transition function
//!
//! Given the same state, context and event this always yields the same
//! result. All I/O is described by the returned effects and carried out by
//! the runtime.

use super::effect::Service;
use super::state::VoiceSubmitPolicy;
use super::{ControllerState, Effect, Event, SessionContext};
use crate::services::ServiceError;
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: ControllerState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: ControllerState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Reasons an event is not applied. Neither is fatal: the state is left
/// untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Message is empty")]
    EmptyInput,
    #[error("{event} is not accepted while {state}")]
    StateViolation {
        state: &'static str,
        event: &'static str,
    },
}

/// Pure transition function
pub fn transition(
    state: &ControllerState,
    context: &SessionContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        // ============================================================
        // Text input
        // ============================================================
        (ControllerState::Ready, Event::SubmitText { text }) => {
            let content = text.trim();
            if content.is_empty() {
                return Err(TransitionError::EmptyInput);
            }
            Ok(commit_user_turn(content))
        }

        // ============================================================
        // Voice capture
        // ============================================================
        (ControllerState::Ready, Event::ToggleVoice { capture_id }) => Ok(TransitionResult::new(
            ControllerState::Listening {
                capture_id: capture_id.clone(),
                captured: String::new(),
            },
        )
        .with_effect(Effect::StartCapture { capture_id })),

        // User turns the microphone off
        (
            ControllerState::Listening {
                capture_id,
                captured,
            },
            Event::ToggleVoice { .. },
        ) => Ok(finish_capture(context, capture_id, captured)),

        // Capture ended on its own (silence, device released)
        (
            ControllerState::Listening {
                capture_id,
                captured,
            },
            Event::CaptureStopped { capture_id: stopped },
        ) if *capture_id == stopped => Ok(finish_capture(context, capture_id, captured)),

        (
            ControllerState::Listening {
                capture_id,
                captured,
            },
            Event::TranscriptChunk {
                capture_id: chunk_id,
                text,
            },
        ) if *capture_id == chunk_id => Ok(TransitionResult::new(ControllerState::Listening {
            capture_id: capture_id.clone(),
            captured: append_chunk(captured, &text),
        })),

        (
            ControllerState::Listening { capture_id, .. },
            Event::CaptureFailed {
                capture_id: failed,
                error,
            },
        ) if *capture_id == failed => Ok(TransitionResult::new(ControllerState::Ready)
            .with_effect(Effect::StopCapture {
                capture_id: capture_id.clone(),
            })
            .with_effect(Effect::notify_failure(Service::Capture, error))),

        // ============================================================
        // Reply generation
        // ============================================================
        (ControllerState::Processing, Event::ReplyReady { reply_id, text }) => {
            let content = text.trim();
            if content.is_empty() {
                return Ok(generation_failed(
                    context,
                    ServiceError::unknown("Reply was empty"),
                ));
            }

            let result = TransitionResult::new(ControllerState::Speaking {
                utterance_id: reply_id.clone(),
            })
            .with_effect(Effect::append_assistant(content))
            .with_effect(Effect::Speak {
                utterance_id: reply_id.clone(),
                text: content.to_string(),
            });

            Ok(match context.speech_fallback {
                Some(delay) => result.with_effect(Effect::ScheduleSpeechFallback {
                    utterance_id: reply_id,
                    delay,
                }),
                None => result,
            })
        }

        (ControllerState::Processing, Event::GenerationFailed { error }) => {
            Ok(generation_failed(context, error))
        }

        // ============================================================
        // Speaking
        // ============================================================
        (
            ControllerState::Speaking { utterance_id },
            Event::SpeechFinished {
                utterance_id: finished,
            }
            | Event::SpeechFallbackElapsed {
                utterance_id: finished,
            },
        ) if *utterance_id == finished => Ok(TransitionResult::new(ControllerState::Ready)),

        (
            ControllerState::Speaking { utterance_id },
            Event::SpeechFailed {
                utterance_id: failed,
                error,
            },
        ) if *utterance_id == failed => Ok(TransitionResult::new(ControllerState::Ready)
            .with_effect(Effect::notify_failure(Service::Synthesis, error))),

        // ============================================================
        // Everything else: wrong state, or a stale capture/utterance
        // ============================================================
        (state, event) => Err(TransitionError::StateViolation {
            state: state.name(),
            event: event.name(),
        }),
    }
}

/// Ready/Listening -> Processing: commit the user's words and ask for a reply
fn commit_user_turn(content: &str) -> TransitionResult {
    TransitionResult::new(ControllerState::Processing)
        .with_effect(Effect::append_user(content))
        .with_effect(Effect::RequestReply)
}

/// Leave `Listening` according to the voice submit policy
fn finish_capture(context: &SessionContext, capture_id: &str, captured: &str) -> TransitionResult {
    let stop = Effect::StopCapture {
        capture_id: capture_id.to_string(),
    };
    let text = captured.trim();

    if text.is_empty() {
        return TransitionResult::new(ControllerState::Ready).with_effect(stop);
    }

    match context.voice_submit {
        VoiceSubmitPolicy::Auto => {
            let committed = commit_user_turn(text);
            TransitionResult::new(committed.new_state)
                .with_effect(stop)
                .with_effects(committed.effects)
        }
        VoiceSubmitPolicy::Confirm => TransitionResult::new(ControllerState::Ready)
            .with_effect(stop)
            .with_effect(Effect::OfferDraft {
                text: text.to_string(),
            }),
    }
}

/// Processing -> Ready, keeping the user's turn and explaining what happened
fn generation_failed(context: &SessionContext, error: ServiceError) -> TransitionResult {
    TransitionResult::new(ControllerState::Ready)
        .with_effect(Effect::append_assistant(&context.error_notice))
        .with_effect(Effect::notify_failure(Service::Generation, error))
}

fn append_chunk(captured: &str, chunk: &str) -> String {
    let chunk = chunk.trim();
    match (captured.is_empty(), chunk.is_empty()) {
        (_, true) => captured.to_string(),
        (true, false) => chunk.to_string(),
        (false, false) => format!("{captured} {chunk}"),
    }
}

//! Input surface: the text box, send button and microphone toggle
//!
//! Owns the pending draft and forwards user intent to the controller. It
//! never touches the transcript itself.

use crate::runtime::{SessionClosed, SessionHandle};
use crate::state_machine::{ControllerState, Event, TransitionError};
use serde::Serialize;
use thiserror::Error;
use ts_rs::TS;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("Message is empty")]
    Empty,
    #[error("Input is not accepted while {state}")]
    Unavailable { state: &'static str },
    #[error("Session has ended")]
    SessionClosed,
}

impl From<TransitionError> for InputError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::EmptyInput => InputError::Empty,
            TransitionError::StateViolation { state, .. } => InputError::Unavailable { state },
        }
    }
}

impl From<SessionClosed> for InputError {
    fn from(_: SessionClosed) -> Self {
        InputError::SessionClosed
    }
}

/// Which controls are enabled, mirroring the input box, send button and
/// microphone button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
#[allow(clippy::struct_excessive_bools)]
pub struct Controls {
    pub text_enabled: bool,
    pub send_enabled: bool,
    pub voice_enabled: bool,
    /// Microphone shown as recording
    pub voice_active: bool,
}

impl Controls {
    pub fn for_state(state: &ControllerState, draft: &str) -> Self {
        let text_enabled = state.accepts_text();
        Self {
            text_enabled,
            send_enabled: text_enabled && !draft.trim().is_empty(),
            voice_enabled: state.accepts_voice_toggle(),
            voice_active: state.is_listening(),
        }
    }
}

pub struct InputSurface {
    handle: SessionHandle,
    draft: String,
}

impl InputSurface {
    pub fn new(handle: SessionHandle) -> Self {
        Self {
            handle,
            draft: String::new(),
        }
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    /// Edit the pending text. The box is read-only unless the controller is
    /// `Ready`.
    pub fn set_draft(&mut self, text: impl Into<String>) -> Result<(), InputError> {
        let state = self.handle.state();
        if !state.accepts_text() {
            return Err(InputError::Unavailable { state: state.name() });
        }
        self.draft = text.into();
        Ok(())
    }

    pub fn controls(&self) -> Controls {
        Controls::for_state(&self.handle.state(), &self.draft)
    }

    /// Submit the draft. It is cleared on acceptance and left intact on
    /// rejection.
    pub async fn submit(&mut self) -> Result<(), InputError> {
        let text = std::mem::take(&mut self.draft);
        match self.dispatch_text(text.clone()).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.draft = text;
                Err(e)
            }
        }
    }

    /// Submit `content` directly; the draft is cleared once it is accepted
    pub async fn submit_text(&mut self, content: impl Into<String>) -> Result<(), InputError> {
        self.dispatch_text(content.into()).await?;
        self.draft.clear();
        Ok(())
    }

    /// Start capture from `Ready`, or stop it from `Listening`
    pub async fn toggle_voice(&mut self) -> Result<(), InputError> {
        let state = self.handle.state();
        if !state.accepts_voice_toggle() {
            return Err(InputError::Unavailable { state: state.name() });
        }
        self.handle.dispatch(Event::toggle_voice()).await??;
        Ok(())
    }

    /// Put captured speech in the draft for the user to confirm
    pub fn offer_voice_draft(&mut self, text: String) {
        if self.draft.trim().is_empty() {
            self.draft = text;
        } else {
            self.draft = format!("{} {text}", self.draft.trim_end());
        }
    }

    async fn dispatch_text(&self, text: String) -> Result<(), InputError> {
        if text.trim().is_empty() {
            return Err(InputError::Empty);
        }
        self.handle.dispatch(Event::SubmitText { text }).await??;
        Ok(())
    }
}

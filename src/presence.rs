//! Presence binding: what the animated avatar should show
//!
//! Pure and total over `ControllerState`; recomputed on every state change.

use crate::state_machine::ControllerState;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Behavioral mode handed to the presence renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum PresenceMode {
    Idle,
    Listening,
    Speaking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Emphasis {
    Normal,
    /// Scaled up and pulsing
    Elevated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PresenceDescriptor {
    pub mode: PresenceMode,
    pub emphasis: Emphasis,
}

impl PresenceDescriptor {
    /// Text for the status pill under the avatar
    pub fn status_label(self) -> &'static str {
        match (self.mode, self.emphasis) {
            (PresenceMode::Speaking, _) => "AI Speaking...",
            (PresenceMode::Listening, _) => "Listening...",
            (PresenceMode::Idle, Emphasis::Elevated) => "Thinking...",
            (PresenceMode::Idle, Emphasis::Normal) => "Ready",
        }
    }
}

/// Map controller state to the presence descriptor
pub fn presence_for(state: &ControllerState) -> PresenceDescriptor {
    let (mode, emphasis) = match state {
        ControllerState::Ready => (PresenceMode::Idle, Emphasis::Normal),
        ControllerState::Listening { .. } => (PresenceMode::Listening, Emphasis::Normal),
        ControllerState::Processing => (PresenceMode::Idle, Emphasis::Elevated),
        ControllerState::Speaking { .. } => (PresenceMode::Speaking, Emphasis::Elevated),
    };
    PresenceDescriptor { mode, emphasis }
}

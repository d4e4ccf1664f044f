//! Turn-taking state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions.

pub mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;


pub use effect::Effect;
pub use event::Event;
pub use state::{ControllerState, SessionContext, VoiceSubmitPolicy};
pub use transition::{transition, TransitionError};

//! Conversation reveal engine
//!
//! Implements the Elm Architecture pattern with pure state transitions:
//! the runtime feeds events in, applies the new state, and executes the
//! returned effects.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::{Effect, Notice};
pub use event::Event;
pub use state::{ConvContext, ConversationView, EngineState, Session};
pub use transition::{transition, Ignored, TransitionError, ValidationError};

//! Operator keyboard control
//!
//! A local alternative to speech: one key press, one directive.

mod keys;
mod listener;

pub use keys::KeyCommand;
pub use listener::{KeyboardError, KeyboardListener};

//! Session state machine
//!
//! Owns the conversational mode and the idle clock, and decides what the
//! action library runs next:
//! - SLEEPING: only a wake phrase is acted upon
//! - AWAKE: commands run one at a time, latest wins
//! - AUTONOMOUS(kind): a sensor-driven routine runs until stopped
//! - SHUTTING_DOWN: terminal, the robot is brought to rest

mod machine;
mod state;

pub use machine::SessionController;
pub use state::Mode;

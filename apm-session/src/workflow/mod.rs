//! Session workflow: pure step sequencing plus the async driver that runs it

pub mod driver;
pub mod state_machine;

pub use driver::{session_events, spawn_session, DriverError, Reply, SessionDeps, SessionHandle};
pub use state_machine::{Effect, Input, Outcome, SessionView, StateMachine, Transition};

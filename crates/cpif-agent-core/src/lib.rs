//! Sans-IO session translation logic.
//!
//! Nothing in this crate performs I/O or reads the clock: callers pass in
//! decoded directives and the current instant, and receive the rule calls and
//! responses to execute.

pub mod counter_pool;
pub mod directory;
pub mod handler;
pub mod liveness;
pub mod rules;
pub mod types;

pub use counter_pool::CounterPool;
pub use directory::SessionDirectory;
pub use handler::{ProtocolHandler, Transaction};
pub use liveness::{LivenessAction, LivenessMonitor};
pub use rules::RuleCall;
pub use types::{SessionKey, SessionRecord};

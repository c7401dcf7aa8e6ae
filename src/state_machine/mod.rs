mod job;
mod state;

pub use job::{AuditRecord, Requestor, UpdateUi, WorkReport};
pub use state::{JobState, StateMachine, Terminal, TransitionError};

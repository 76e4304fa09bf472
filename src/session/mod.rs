pub mod manager;
pub mod state;
pub mod supervisor;

pub use manager::{SessionBuilder, SessionHandle, SessionManager};
pub use state::{SessionState, SessionStats, SubmitOutcome};
pub use supervisor::{Completion, SessionCommand, SessionSupervisor};

//! Repetition controller - phases, per-repetition error tracking, session commit

pub mod repetition;
pub mod state;

pub use repetition::{ErrorTally, RepetitionController, SessionSummary};
pub use state::{Phase, RepProgress, RepState};

//! cbam-workflow: lifecycle orchestration
//!
//! The mutating stages of the declaration lifecycle. Every operation here
//! is a short-lived unit of work: load through the versioned store, check
//! the state machine, write conditionally on the revision token, audit,
//! publish.

pub mod change_control;
pub mod lifecycle;
pub mod recalculation;
pub mod verification;

pub use change_control::ChangeControl;
pub use lifecycle::{EntryPatch, LifecycleManager};
pub use recalculation::RecalculationController;
pub use verification::VerificationMachine;

//! cbam-core: shared foundation of the CBAM declaration lifecycle engine
//!
//! Data model, unified errors, the versioned typed store, the audit trail,
//! the event notifier, the calculation-function contract and the
//! authorization capability. The lifecycle logic itself lives in the
//! workflow, policy, registry, reporting and ledger crates.

pub mod audit;
pub mod auth;
pub mod calc;
pub mod certificate;
pub mod config;
pub mod entry;
pub mod error;
pub mod events;
pub mod issue;
pub mod report;
pub mod requests;
pub mod store;
pub mod telemetry;
pub mod verifier;
pub mod version;

pub use error::{CbamError, Result};

//! cbam-registry: versioned regulatory constants
//!
//! Phase-in factors and default-value markups change over time; this crate
//! owns the active-version bookkeeping and the admin-gated activation
//! protocol.

pub mod registry;

pub use registry::VersionRegistry;

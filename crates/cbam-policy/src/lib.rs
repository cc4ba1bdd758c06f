//! cbam-policy: validation rule evaluator
//!
//! Stateless scoring of an entry against the fixed rule set. Issues are
//! classified blocking or advisory, each carrying its regulation citation,
//! and the caller writes the outcome back onto the entry.

pub mod benchmark;
pub mod evaluator;
pub mod rules;

pub use benchmark::Benchmark;
pub use evaluator::{evaluate, Evaluation};

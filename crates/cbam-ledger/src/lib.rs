//! cbam-ledger: compliance certificate accounting
//!
//! Purchases, FIFO surrender of a submitted report's obligation with
//! record splitting, and the expiry sweep. Both spending operations are
//! gated on an explicit confirmation flag; insufficient coverage is a
//! structured denial carrying the exact shortfall, never an opaque error.

pub mod certificates;

pub use certificates::{CertificateLedger, PurchaseOutcome, SurrenderOutcome};

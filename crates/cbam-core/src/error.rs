//! Unified error model
//!
//! Infrastructure and protocol failures live here. Business-rule outcomes
//! (validation verdicts, surrender shortfalls, denied approvals) are
//! structured result types in their owning crates, not errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CbamError {
    /// A referenced record does not exist. Never silently defaulted.
    #[error("NOTFOUND/{entity}: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A state machine rejected the requested move.
    #[error("TRANSITION/{from} -> {to}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    /// Optimistic-lock failure. Always retryable.
    #[error("CONFLICT/{entity} {id}: expected revision {expected}, found {found}")]
    Conflict {
        entity: &'static str,
        id: String,
        expected: u64,
        found: u64,
    },

    /// A gated action was attempted without the required capability.
    #[error("AUTH/{actor}: not permitted to {action}")]
    AuthorizationDenied { actor: String, action: String },

    /// Calculation function error or timeout. Nothing was persisted.
    #[error("UPSTREAM/{0}")]
    Upstream(String),

    /// Audit sink failure surfaced in transactional audit mode.
    #[error("AUDIT/{0}")]
    Audit(String),

    /// A hard business rejection that carries a single reason.
    #[error("REJECTED/{0}")]
    Rejected(String),

    #[error("SERIALIZE/{0}")]
    Serialize(String),
}

impl CbamError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        CbamError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn invalid_transition(
        from: impl ToString,
        to: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        CbamError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the caller may retry the same operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CbamError::Conflict { .. } | CbamError::Upstream(_))
    }
}

pub type Result<T> = std::result::Result<T, CbamError>;

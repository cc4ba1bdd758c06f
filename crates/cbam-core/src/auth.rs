//! Authorization capability
//!
//! Gated actions (version activation, recalculation approval, change
//! request approval) check an injected capability instead of comparing
//! role strings inline, so the policy can be swapped without touching
//! workflow logic.

use crate::error::{CbamError, Result};
use std::collections::HashSet;

pub trait Authorizer: Send + Sync {
    fn is_admin(&self, actor: &str) -> bool;

    /// Convenience: error out unless `actor` holds the admin capability.
    fn require_admin(&self, actor: &str, action: &str) -> Result<()> {
        if self.is_admin(actor) {
            Ok(())
        } else {
            Err(CbamError::AuthorizationDenied {
                actor: actor.to_string(),
                action: action.to_string(),
            })
        }
    }
}

/// Fixed admin roster.
pub struct StaticRoles {
    admins: HashSet<String>,
}

impl StaticRoles {
    pub fn new() -> Self {
        Self {
            admins: HashSet::new(),
        }
    }

    pub fn with_admin(mut self, actor: impl Into<String>) -> Self {
        self.admins.insert(actor.into());
        self
    }
}

impl Default for StaticRoles {
    fn default() -> Self {
        Self::new()
    }
}

impl Authorizer for StaticRoles {
    fn is_admin(&self, actor: &str) -> bool {
        self.admins.contains(actor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_roles() {
        let auth = StaticRoles::new().with_admin("admin@acme");
        assert!(auth.is_admin("admin@acme"));
        assert!(!auth.is_admin("ops@acme"));

        assert!(auth.require_admin("admin@acme", "activate version").is_ok());
        let err = auth
            .require_admin("ops@acme", "activate version")
            .unwrap_err();
        assert!(matches!(err, CbamError::AuthorizationDenied { .. }));
    }
}

//! Regulatory version registry
//!
//! Exactly one version is active at any time. Activation flips a
//! single-row pointer with one conditional write, so readers never observe
//! two active versions or none. When no version has ever been activated a
//! hard-coded fallback is returned, marked and logged as such.

use cbam_core::audit::AuditTrail;
use cbam_core::auth::Authorizer;
use cbam_core::error::{CbamError, Result};
use cbam_core::events::{DomainEvent, Notifier};
use cbam_core::store::Repository;
use cbam_core::version::{
    ActiveVersionPointer, RegulatoryVersion, VersionStatus,
};
use chrono::Utc;
use once_cell::sync::Lazy;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Transitional-period factors from Reg. 2023/956 Annex; used only until
/// an administrator activates a real version.
static FALLBACK_VERSION: Lazy<RegulatoryVersion> = Lazy::new(|| {
    let mut factors = BTreeMap::new();
    factors.insert(2026, 0.025);
    factors.insert(2027, 0.05);
    factors.insert(2028, 0.10);
    factors.insert(2029, 0.225);
    factors.insert(2030, 0.4875);
    factors.insert(2031, 0.61);
    factors.insert(2032, 0.735);
    factors.insert(2033, 0.86);
    factors.insert(2034, 1.0);

    let mut markups = BTreeMap::new();
    markups.insert(2026, 0.1);

    RegulatoryVersion {
        id: "fallback".to_string(),
        name: "built-in fallback (Annex phase-in schedule)".to_string(),
        status: VersionStatus::Active,
        phase_in_factors: factors,
        default_markups: markups,
        is_fallback: true,
        created_at: Utc::now(),
        activated_at: None,
        revision: 0,
    }
});

pub struct VersionRegistry {
    versions: Arc<dyn Repository<RegulatoryVersion>>,
    pointer: Arc<dyn Repository<ActiveVersionPointer>>,
    audit: Arc<AuditTrail>,
    notifier: Arc<Notifier>,
    auth: Arc<dyn Authorizer>,
}

impl VersionRegistry {
    pub fn new(
        versions: Arc<dyn Repository<RegulatoryVersion>>,
        pointer: Arc<dyn Repository<ActiveVersionPointer>>,
        audit: Arc<AuditTrail>,
        notifier: Arc<Notifier>,
        auth: Arc<dyn Authorizer>,
    ) -> Self {
        Self {
            versions,
            pointer,
            audit,
            notifier,
            auth,
        }
    }

    /// The single active version, or the logged fallback if none exists.
    pub fn current(&self) -> RegulatoryVersion {
        match self.pointer.try_get(ActiveVersionPointer::SINGLETON_ID) {
            Some(pointer) => match self.versions.try_get(&pointer.version_id) {
                Some(version) => version,
                None => {
                    tracing::warn!(
                        version_id = %pointer.version_id,
                        "active pointer names a missing version; serving built-in fallback"
                    );
                    FALLBACK_VERSION.clone()
                }
            },
            None => {
                tracing::warn!("no regulatory version activated; serving built-in fallback");
                FALLBACK_VERSION.clone()
            }
        }
    }

    /// Resolve any version by id, for recalculation targets.
    pub fn get(&self, version_id: &str) -> Result<RegulatoryVersion> {
        self.versions.get(version_id)
    }

    pub fn list(&self) -> Vec<RegulatoryVersion> {
        self.versions.list()
    }

    /// Admin-gated: create a `pending_activation` record.
    pub fn register(
        &self,
        name: impl Into<String>,
        phase_in_factors: BTreeMap<i32, f64>,
        default_markups: BTreeMap<i32, f64>,
        actor: &str,
    ) -> Result<RegulatoryVersion> {
        self.auth.require_admin(actor, "register regulatory version")?;
        let version = self.versions.insert(RegulatoryVersion::pending(
            name,
            phase_in_factors,
            default_markups,
        ))?;
        self.audit.record(
            "regulatory_version",
            &version.id,
            "register",
            actor,
            json!({ "name": version.name }),
        )?;
        Ok(version)
    }

    /// Admin-gated: atomically supersede the prior active version and
    /// activate this one.
    pub fn activate(&self, version_id: &str, actor: &str) -> Result<RegulatoryVersion> {
        self.auth.require_admin(actor, "activate regulatory version")?;

        let mut target = self.versions.get(version_id)?;
        if target.status != VersionStatus::PendingActivation {
            return Err(CbamError::invalid_transition(
                format!("{:?}", target.status),
                "active",
                "only pending_activation versions can be activated",
            ));
        }

        let previous_id = match self.pointer.try_get(ActiveVersionPointer::SINGLETON_ID) {
            // The pointer flip is the atomic step; readers switch versions here.
            Some(existing) => {
                let previous = existing.version_id.clone();
                let mut flipped = ActiveVersionPointer::pointing_at(version_id);
                flipped.revision = existing.revision;
                self.pointer.update(existing.revision, flipped)?;
                Some(previous)
            }
            None => {
                self.pointer
                    .insert(ActiveVersionPointer::pointing_at(version_id))?;
                None
            }
        };

        // Status fields on the version rows are informational; the pointer
        // is authoritative for readers.
        if let Some(previous_id) = previous_id.as_deref() {
            if let Some(mut previous) = self.versions.try_get(previous_id) {
                previous.status = VersionStatus::Superseded;
                let revision = previous.revision;
                self.versions.update(revision, previous)?;
            }
        }

        target.status = VersionStatus::Active;
        target.activated_at = Some(Utc::now());
        let revision = target.revision;
        let target = self.versions.update(revision, target)?;

        self.audit.record(
            "regulatory_version",
            version_id,
            "activate",
            actor,
            json!({ "superseded": previous_id }),
        )?;
        self.notifier.publish(DomainEvent::VersionActivated {
            version_id: version_id.to_string(),
        });
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cbam_core::audit::AuditMode;
    use cbam_core::auth::StaticRoles;
    use cbam_core::store::MemoryLedger;

    fn registry() -> VersionRegistry {
        VersionRegistry::new(
            Arc::new(MemoryLedger::new()),
            Arc::new(MemoryLedger::new()),
            Arc::new(AuditTrail::in_memory(AuditMode::BestEffort)),
            Arc::new(Notifier::new()),
            Arc::new(StaticRoles::new().with_admin("admin@acme")),
        )
    }

    fn tables() -> (BTreeMap<i32, f64>, BTreeMap<i32, f64>) {
        let mut factors = BTreeMap::new();
        factors.insert(2026, 0.03);
        let mut markups = BTreeMap::new();
        markups.insert(2026, 0.12);
        (factors, markups)
    }

    #[test]
    fn test_fallback_when_nothing_active() {
        let registry = registry();
        let current = registry.current();
        assert!(current.is_fallback);
        assert_eq!(current.phase_in_factor(2026), 0.025);
    }

    #[test]
    fn test_register_requires_admin() {
        let registry = registry();
        let (factors, markups) = tables();
        let err = registry
            .register("2027 update", factors, markups, "ops@acme")
            .unwrap_err();
        assert!(matches!(err, CbamError::AuthorizationDenied { .. }));
    }

    #[test]
    fn test_activate_flips_pointer() {
        let registry = registry();
        let (factors, markups) = tables();
        let version = registry
            .register("2027 update", factors, markups, "admin@acme")
            .unwrap();

        let activated = registry.activate(&version.id, "admin@acme").unwrap();
        assert_eq!(activated.status, VersionStatus::Active);

        let current = registry.current();
        assert!(!current.is_fallback);
        assert_eq!(current.id, version.id);
        assert_eq!(current.phase_in_factor(2026), 0.03);
    }

    #[test]
    fn test_activation_supersedes_previous() {
        let registry = registry();
        let (factors, markups) = tables();
        let first = registry
            .register("v1", factors.clone(), markups.clone(), "admin@acme")
            .unwrap();
        registry.activate(&first.id, "admin@acme").unwrap();

        let second = registry
            .register("v2", factors, markups, "admin@acme")
            .unwrap();
        registry.activate(&second.id, "admin@acme").unwrap();

        assert_eq!(registry.current().id, second.id);
        assert_eq!(
            registry.get(&first.id).unwrap().status,
            VersionStatus::Superseded
        );
    }

    #[test]
    fn test_cannot_activate_twice() {
        let registry = registry();
        let (factors, markups) = tables();
        let version = registry
            .register("v1", factors, markups, "admin@acme")
            .unwrap();
        registry.activate(&version.id, "admin@acme").unwrap();

        let err = registry.activate(&version.id, "admin@acme").unwrap_err();
        assert!(matches!(err, CbamError::InvalidTransition { .. }));
    }
}

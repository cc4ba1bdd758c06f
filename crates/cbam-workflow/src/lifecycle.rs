//! Entry lifecycle manager
//!
//! CRUD over the declaration record plus delegation to the external
//! calculation function. The manager persists only what the engine
//! returns; it owns none of the formulas.

use cbam_core::audit::AuditTrail;
use cbam_core::calc::{CalcError, CalcInput, CalculationEngine};
use cbam_core::config::EngineConfig;
use cbam_core::entry::{CalculationMethod, Entry, Precursor, ValidationStatus, VerificationStatus};
use cbam_core::error::{CbamError, Result};
use cbam_core::events::{DomainEvent, Notifier};
use cbam_core::report::Report;
use cbam_core::store::Repository;
use cbam_core::requests::CalculationSnapshot;
use cbam_policy::{evaluate, Benchmark, Evaluation};
use cbam_registry::VersionRegistry;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Fields the update operation may touch. The classification code is
/// deliberately absent: reclassification goes through change control.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntryPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customs_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity_tonnes: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reporting_year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<CalculationMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precursors: Option<Vec<Precursor>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carbon_price_claimed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carbon_price_evidence: Option<String>,
}

pub struct LifecycleManager {
    entries: Arc<dyn Repository<Entry>>,
    reports: Arc<dyn Repository<Report>>,
    snapshots: Arc<dyn Repository<CalculationSnapshot>>,
    registry: Arc<VersionRegistry>,
    engine: Arc<dyn CalculationEngine>,
    audit: Arc<AuditTrail>,
    notifier: Arc<Notifier>,
    config: EngineConfig,
}

impl LifecycleManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        entries: Arc<dyn Repository<Entry>>,
        reports: Arc<dyn Repository<Report>>,
        snapshots: Arc<dyn Repository<CalculationSnapshot>>,
        registry: Arc<VersionRegistry>,
        engine: Arc<dyn CalculationEngine>,
        audit: Arc<AuditTrail>,
        notifier: Arc<Notifier>,
        config: EngineConfig,
    ) -> Self {
        Self {
            entries,
            reports,
            snapshots,
            registry,
            engine,
            audit,
            notifier,
            config,
        }
    }

    /// Create a new declaration in pending state.
    pub fn create(&self, draft: Entry, actor: &str) -> Result<Entry> {
        let mut entry = draft;
        // Lifecycle state always starts from scratch, whatever the caller built.
        entry.validation_status = ValidationStatus::Pending;
        entry.verification_status = VerificationStatus::NotVerified;
        entry.calculation = None;
        entry.calculation_frozen = false;
        entry.reporting_blocked = false;

        let entry = self.entries.insert(entry)?;
        self.audit.record(
            "entry",
            &entry.id,
            "create",
            actor,
            json!({ "cn_code": entry.cn_code, "origin_country": entry.origin_country }),
        )?;
        self.notifier.publish(DomainEvent::EntryCreated {
            entry_id: entry.id.clone(),
        });
        Ok(entry)
    }

    /// Update allowed metadata fields only.
    pub fn update(&self, entry_id: &str, patch: EntryPatch, actor: &str) -> Result<Entry> {
        let mut entry = self.entries.get(entry_id)?;
        let revision = entry.revision;

        if let Some(v) = patch.origin_country {
            entry.origin_country = v;
        }
        if let Some(v) = patch.customs_reference {
            entry.customs_reference = v;
        }
        if let Some(v) = patch.quantity_tonnes {
            entry.quantity_tonnes = v;
        }
        if let Some(v) = patch.import_date {
            entry.import_date = v;
        }
        if let Some(v) = patch.reporting_year {
            entry.reporting_year = v;
        }
        if let Some(v) = patch.method {
            entry.method = v;
        }
        if let Some(v) = patch.precursors {
            entry.precursors = v;
        }
        if let Some(v) = patch.carbon_price_claimed {
            entry.carbon_price_claimed = v;
        }
        if let Some(v) = patch.carbon_price_evidence {
            entry.carbon_price_evidence = Some(v);
        }
        entry.touch();

        let entry = self.entries.update(revision, entry)?;
        self.audit
            .record("entry", entry_id, "update", actor, json!({}))?;
        self.notifier.publish(DomainEvent::EntryUpdated {
            entry_id: entry_id.to_string(),
        });
        Ok(entry)
    }

    /// Delete an entry. Rejected while any submitted report references it.
    pub fn delete(&self, entry_id: &str, actor: &str) -> Result<()> {
        let entry = self.entries.get(entry_id)?;

        let referencing = self
            .reports
            .list()
            .into_iter()
            .find(|r| r.is_submitted() && r.references_entry(entry_id));
        if let Some(report) = referencing {
            return Err(CbamError::Rejected(format!(
                "entry {} is referenced by submitted report {}",
                entry_id, report.id
            )));
        }

        self.entries.delete(entry_id, entry.revision)?;
        self.audit
            .record("entry", entry_id, "delete", actor, json!({}))?;
        self.notifier.publish(DomainEvent::EntryDeleted {
            entry_id: entry_id.to_string(),
        });
        Ok(())
    }

    /// Store a foreign-key reference to an external record. The referenced
    /// record is never mutated.
    pub fn link_reference(&self, entry_id: &str, external_ref: &str, actor: &str) -> Result<Entry> {
        let mut entry = self.entries.get(entry_id)?;
        let revision = entry.revision;
        entry.linked_references.push(external_ref.to_string());
        entry.touch();
        let entry = self.entries.update(revision, entry)?;
        self.audit.record(
            "entry",
            entry_id,
            "link_reference",
            actor,
            json!({ "external_ref": external_ref }),
        )?;
        Ok(entry)
    }

    /// Run the external calculation function against the active regulatory
    /// version and persist the returned numeric fields. On engine failure
    /// or timeout nothing is written; the entry keeps its prior state.
    pub fn calculate(&self, entry_id: &str, actor: &str) -> Result<Entry> {
        let mut entry = self.entries.get(entry_id)?;
        if entry.calculation_frozen {
            return Err(CbamError::Rejected(format!(
                "entry {} is frozen pending change control; calculation refused",
                entry_id
            )));
        }
        let revision = entry.revision;

        let version = self.registry.current();
        let input = CalcInput::from_entry(
            &entry,
            &version,
            self.config.include_precursors,
            self.config.calc_timeout_ms,
        );
        let result = self.engine.calculate(&input).map_err(|err| match err {
            CalcError::Timeout(ms) => {
                CbamError::Upstream(format!("calculation timed out after {}ms", ms))
            }
            CalcError::Failed(msg) => CbamError::Upstream(msg),
        })?;

        // Superseding an existing calculation leaves a history row first.
        if let Some(prior) = entry.calculation.clone() {
            self.snapshots.insert(CalculationSnapshot::capture(
                entry_id,
                prior,
                entry.regulatory_version_id.clone(),
                "recalculated against active regulatory version",
            ))?;
        }

        entry.calculation = Some(result.clone());
        entry.regulatory_version_id = Some(version.id.clone());
        entry.touch();
        let entry = self.entries.update(revision, entry)?;

        self.audit.record(
            "entry",
            entry_id,
            "calculate",
            actor,
            json!({
                "regulatory_version_id": version.id,
                "fallback_version": version.is_fallback,
                "total_embedded_emissions": result.total_embedded_emissions,
                "certificates_required": result.certificates_required,
            }),
        )?;
        self.notifier.publish(DomainEvent::EntryCalculated {
            entry_id: entry_id.to_string(),
        });
        Ok(entry)
    }

    /// Evaluate the rule set and persist the outcome on the entry.
    pub fn validate(
        &self,
        entry_id: &str,
        benchmark: Option<&Benchmark>,
        actor: &str,
    ) -> Result<Evaluation> {
        let mut entry = self.entries.get(entry_id)?;
        let revision = entry.revision;

        let evaluation = evaluate(&entry, benchmark, &self.config);
        evaluation.apply_to(&mut entry);
        self.entries.update(revision, entry)?;

        self.audit.record(
            "entry",
            entry_id,
            "validate",
            actor,
            json!({
                "status": evaluation.status,
                "blocking": evaluation.blocking_issues.len(),
                "warnings": evaluation.warnings.len(),
                "compliance_score": evaluation.compliance_score,
            }),
        )?;
        self.notifier.publish(DomainEvent::EntryValidated {
            entry_id: entry_id.to_string(),
            status: format!("{:?}", evaluation.status).to_lowercase(),
        });
        Ok(evaluation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cbam_core::audit::AuditMode;
    use cbam_core::auth::StaticRoles;
    use cbam_core::calc::ReferenceEngine;
    use cbam_core::report::{Declarant, ReportingPeriod, ReportStatus};
    use cbam_core::store::MemoryLedger;
    use cbam_core::version::ActiveVersionPointer;
    use cbam_core::version::RegulatoryVersion;

    struct Fixture {
        entries: Arc<MemoryLedger<Entry>>,
        reports: Arc<MemoryLedger<Report>>,
        snapshots: Arc<MemoryLedger<CalculationSnapshot>>,
        audit: Arc<AuditTrail>,
        manager: LifecycleManager,
    }

    fn fixture() -> Fixture {
        let entries = Arc::new(MemoryLedger::new());
        let reports = Arc::new(MemoryLedger::new());
        let snapshots = Arc::new(MemoryLedger::new());
        let audit = Arc::new(AuditTrail::in_memory(AuditMode::BestEffort));
        let notifier = Arc::new(Notifier::new());
        let versions: Arc<MemoryLedger<RegulatoryVersion>> = Arc::new(MemoryLedger::new());
        let pointer: Arc<MemoryLedger<ActiveVersionPointer>> = Arc::new(MemoryLedger::new());
        let registry = Arc::new(VersionRegistry::new(
            versions,
            pointer,
            audit.clone(),
            notifier.clone(),
            Arc::new(StaticRoles::new().with_admin("admin@acme")),
        ));

        let manager = LifecycleManager::new(
            entries.clone(),
            reports.clone(),
            snapshots.clone(),
            registry,
            Arc::new(ReferenceEngine),
            audit.clone(),
            notifier,
            EngineConfig::default(),
        );

        Fixture {
            entries,
            reports,
            snapshots,
            audit,
            manager,
        }
    }

    fn draft() -> Entry {
        Entry::new(
            "IN",
            "MRN-2026-0001",
            100.0,
            NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
            "72081000",
            2026,
            CalculationMethod::DefaultValues,
        )
    }

    #[test]
    fn test_create_resets_lifecycle_state() {
        let fx = fixture();
        let mut tampered = draft();
        tampered.validation_status = ValidationStatus::Pass;
        tampered.calculation_frozen = true;

        let entry = fx.manager.create(tampered, "ops@acme").unwrap();
        assert_eq!(entry.validation_status, ValidationStatus::Pending);
        assert!(!entry.calculation_frozen);
        assert_eq!(entry.revision, 1);
        assert_eq!(fx.audit.trail("entry", &entry.id).len(), 1);
    }

    #[test]
    fn test_update_allowed_fields() {
        let fx = fixture();
        let entry = fx.manager.create(draft(), "ops@acme").unwrap();

        let patch = EntryPatch {
            quantity_tonnes: Some(250.0),
            origin_country: Some("TR".to_string()),
            ..Default::default()
        };
        let updated = fx.manager.update(&entry.id, patch, "ops@acme").unwrap();
        assert_eq!(updated.quantity_tonnes, 250.0);
        assert_eq!(updated.origin_country, "TR");
        // The classification code is untouchable through update.
        assert_eq!(updated.cn_code, "72081000");
    }

    #[test]
    fn test_calculate_persists_engine_output() {
        let fx = fixture();
        let entry = fx.manager.create(draft(), "ops@acme").unwrap();
        let calculated = fx.manager.calculate(&entry.id, "ops@acme").unwrap();

        let calc = calculated.calculation.unwrap();
        assert!(calc.total_embedded_emissions > 0.0);
        assert_eq!(calculated.regulatory_version_id.as_deref(), Some("fallback"));
        // First calculation has nothing to supersede.
        assert!(fx.snapshots.list().is_empty());
    }

    #[test]
    fn test_recalculation_leaves_snapshot() {
        let fx = fixture();
        let entry = fx.manager.create(draft(), "ops@acme").unwrap();
        fx.manager.calculate(&entry.id, "ops@acme").unwrap();
        fx.manager.calculate(&entry.id, "ops@acme").unwrap();

        let snapshots = fx.snapshots.list();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].entry_id, entry.id);
    }

    #[test]
    fn test_frozen_entry_refuses_calculation() {
        let fx = fixture();
        let entry = fx.manager.create(draft(), "ops@acme").unwrap();

        let mut frozen = fx.entries.get(&entry.id).unwrap();
        let revision = frozen.revision;
        frozen.calculation_frozen = true;
        fx.entries.update(revision, frozen).unwrap();

        let err = fx.manager.calculate(&entry.id, "ops@acme").unwrap_err();
        assert!(matches!(err, CbamError::Rejected(_)));
    }

    #[test]
    fn test_validate_writes_back() {
        let fx = fixture();
        let entry = fx.manager.create(draft(), "ops@acme").unwrap();
        let evaluation = fx.manager.validate(&entry.id, None, "ops@acme").unwrap();
        assert_eq!(evaluation.status, ValidationStatus::Pass);
        assert_eq!(evaluation.compliance_score, 100);

        let stored = fx.entries.get(&entry.id).unwrap();
        assert_eq!(stored.validation_status, ValidationStatus::Pass);
        assert_eq!(stored.compliance_score, Some(100));
    }

    #[test]
    fn test_delete_rejected_when_referenced_by_submitted_report() {
        let fx = fixture();
        let entry = fx.manager.create(draft(), "ops@acme").unwrap();

        let mut report = Report::draft(
            ReportingPeriod::new(2026, 1),
            Declarant {
                name: "Acme".to_string(),
                eori: "DE0001".to_string(),
            },
        );
        report.entry_ids.push(entry.id.clone());
        report.status = ReportStatus::Submitted;
        fx.reports.insert(report).unwrap();

        let err = fx.manager.delete(&entry.id, "ops@acme").unwrap_err();
        assert!(matches!(err, CbamError::Rejected(_)));

        // Still present.
        assert!(fx.entries.try_get(&entry.id).is_some());
    }

    #[test]
    fn test_link_reference_stores_fk_only() {
        let fx = fixture();
        let entry = fx.manager.create(draft(), "ops@acme").unwrap();
        let linked = fx
            .manager
            .link_reference(&entry.id, "customs-doc-77", "ops@acme")
            .unwrap();
        assert_eq!(linked.linked_references, vec!["customs-doc-77".to_string()]);
    }
}

//! Change control for classification codes
//!
//! A CN code change never lands directly on an entry. Detection freezes
//! calculation and reporting for the entry and opens a request; impact
//! analysis simulates both codes
//! without persisting anything; only an approved request applies the new
//! code, recalculates and unfreezes. Rejection unfreezes and leaves the
//! entry exactly as it was.

use cbam_core::audit::AuditTrail;
use cbam_core::auth::Authorizer;
use cbam_core::calc::{CalcError, CalcInput, CalculationEngine};
use cbam_core::config::EngineConfig;
use cbam_core::entry::{CalculationResult, Entry};
use cbam_core::error::{CbamError, Result};
use cbam_core::events::{DomainEvent, Notifier};
use cbam_core::requests::{
    CalculationSnapshot, ChangeRequest, ChangeRequestStatus, ImpactAnalysis,
};
use cbam_core::store::Repository;
use cbam_registry::VersionRegistry;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;

pub struct ChangeControl {
    entries: Arc<dyn Repository<Entry>>,
    requests: Arc<dyn Repository<ChangeRequest>>,
    snapshots: Arc<dyn Repository<CalculationSnapshot>>,
    registry: Arc<VersionRegistry>,
    engine: Arc<dyn CalculationEngine>,
    audit: Arc<AuditTrail>,
    notifier: Arc<Notifier>,
    auth: Arc<dyn Authorizer>,
    config: EngineConfig,
}

impl ChangeControl {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        entries: Arc<dyn Repository<Entry>>,
        requests: Arc<dyn Repository<ChangeRequest>>,
        snapshots: Arc<dyn Repository<CalculationSnapshot>>,
        registry: Arc<VersionRegistry>,
        engine: Arc<dyn CalculationEngine>,
        audit: Arc<AuditTrail>,
        notifier: Arc<Notifier>,
        auth: Arc<dyn Authorizer>,
        config: EngineConfig,
    ) -> Self {
        Self {
            entries,
            requests,
            snapshots,
            registry,
            engine,
            audit,
            notifier,
            auth,
            config,
        }
    }

    /// Record a proposed reclassification: freeze calculation and
    /// reporting, open a request. The entry's code is NOT changed here.
    pub fn detect(&self, entry_id: &str, new_cn_code: &str, actor: &str) -> Result<ChangeRequest> {
        let mut entry = self.entries.get(entry_id)?;
        if entry.cn_code == new_cn_code {
            return Err(CbamError::Rejected(format!(
                "entry {} already carries CN code {}",
                entry_id, new_cn_code
            )));
        }
        if let Some(open) = self
            .requests
            .list()
            .into_iter()
            .find(|r| r.entry_id == entry_id && r.is_open())
        {
            return Err(CbamError::Rejected(format!(
                "entry {} already has open change request {}",
                entry_id, open.id
            )));
        }

        let revision = entry.revision;
        entry.calculation_frozen = true;
        entry.reporting_blocked = true;
        entry.touch();
        self.entries.update(revision, entry.clone())?;

        let request = self.requests.insert(ChangeRequest::open(
            entry_id,
            entry.cn_code.clone(),
            new_cn_code,
            actor,
        ))?;
        self.audit.record(
            "change_request",
            &request.id,
            "detect",
            actor,
            json!({
                "entry_id": entry_id,
                "old_cn_code": request.old_cn_code,
                "new_cn_code": request.new_cn_code,
            }),
        )?;
        self.notifier.publish(DomainEvent::ChangeRequestOpened {
            request_id: request.id.clone(),
            entry_id: entry_id.to_string(),
        });
        Ok(request)
    }

    /// Simulate a recalculation under both codes and store the deltas on
    /// the request. Nothing on the entry changes.
    pub fn analyze(&self, request_id: &str, actor: &str) -> Result<ChangeRequest> {
        let mut request = self.requests.get(request_id)?;
        if request.status != ChangeRequestStatus::PendingImpactAnalysis {
            return Err(CbamError::invalid_transition(
                request.status,
                ChangeRequestStatus::ImpactAnalyzed,
                "impact analysis already performed or request closed",
            ));
        }

        let entry = self.entries.get(&request.entry_id)?;
        let version = self.registry.current();
        let before = self.simulate(&entry, &request.old_cn_code, &version)?;
        let after = self.simulate(&entry, &request.new_cn_code, &version)?;

        // The persisted numbers are authoritative for the "before" side
        // when a calculation exists; the simulation covers never-calculated
        // entries.
        let (emissions_before, certificates_before) = match &entry.calculation {
            Some(calc) => (calc.total_embedded_emissions, calc.certificates_required),
            None => (before.total_embedded_emissions, before.certificates_required),
        };

        let certificates_delta =
            after.certificates_required as i64 - certificates_before as i64;
        let impact = ImpactAnalysis {
            emissions_before,
            emissions_after: after.total_embedded_emissions,
            emissions_delta: after.total_embedded_emissions - emissions_before,
            certificates_before,
            certificates_after: after.certificates_required,
            certificates_delta,
            financial_delta: certificates_delta as f64 * self.config.certificate_price_eur,
            benchmark_changed: benchmark_changed(&before, &after),
            analyzed_at: Utc::now(),
        };

        let revision = request.revision;
        request.impact = Some(impact.clone());
        request.status = ChangeRequestStatus::ImpactAnalyzed;
        let request = self.requests.update(revision, request)?;

        self.audit.record(
            "change_request",
            request_id,
            "analyze",
            actor,
            json!({
                "emissions_delta": impact.emissions_delta,
                "certificates_delta": impact.certificates_delta,
                "benchmark_changed": impact.benchmark_changed,
            }),
        )?;
        Ok(request)
    }

    /// Admin-gated execution: snapshot the prior calculation, apply the
    /// new code, recalculate, unfreeze. Requires a non-empty justification.
    pub fn approve(&self, request_id: &str, justification: &str, actor: &str) -> Result<ChangeRequest> {
        self.auth.require_admin(actor, "approve classification change")?;
        if justification.trim().is_empty() {
            return Err(CbamError::Rejected(
                "a classification change approval requires a justification".to_string(),
            ));
        }

        let mut request = self.requests.get(request_id)?;
        if request.status != ChangeRequestStatus::ImpactAnalyzed {
            return Err(CbamError::invalid_transition(
                request.status,
                ChangeRequestStatus::ApprovedAndExecuted,
                "only analyzed requests can be approved",
            ));
        }

        let mut entry = self.entries.get(&request.entry_id)?;
        let entry_revision = entry.revision;

        if let Some(prior) = entry.calculation.clone() {
            self.snapshots.insert(CalculationSnapshot::capture(
                &entry.id,
                prior,
                entry.regulatory_version_id.clone(),
                format!("classification change {}", request.id),
            ))?;
        }

        let version = self.registry.current();
        entry.cn_code = request.new_cn_code.clone();
        let recalculated = self.simulate(&entry, &request.new_cn_code, &version)?;
        entry.calculation = Some(recalculated.clone());
        entry.regulatory_version_id = Some(version.id.clone());
        entry.calculation_frozen = false;
        entry.reporting_blocked = false;
        entry.touch();
        self.entries.update(entry_revision, entry)?;

        let revision = request.revision;
        request.status = ChangeRequestStatus::ApprovedAndExecuted;
        request.justification = Some(justification.to_string());
        request.decided_by = Some(actor.to_string());
        request.decided_at = Some(Utc::now());
        let request = self.requests.update(revision, request)?;

        self.audit.record(
            "change_request",
            request_id,
            "approve",
            actor,
            json!({
                "entry_id": request.entry_id,
                "new_cn_code": request.new_cn_code,
                "certificates_required": recalculated.certificates_required,
            }),
        )?;
        self.notifier.publish(DomainEvent::ChangeRequestDecided {
            request_id: request_id.to_string(),
            approved: true,
        });
        Ok(request)
    }

    /// Close the request without touching the entry's code, and unfreeze.
    pub fn reject(&self, request_id: &str, reason: &str, actor: &str) -> Result<ChangeRequest> {
        self.auth.require_admin(actor, "reject classification change")?;

        let mut request = self.requests.get(request_id)?;
        if !request.is_open() {
            return Err(CbamError::invalid_transition(
                request.status,
                ChangeRequestStatus::Rejected,
                "request already decided",
            ));
        }

        let mut entry = self.entries.get(&request.entry_id)?;
        let entry_revision = entry.revision;
        entry.calculation_frozen = false;
        entry.reporting_blocked = false;
        entry.touch();
        self.entries.update(entry_revision, entry)?;

        let revision = request.revision;
        request.status = ChangeRequestStatus::Rejected;
        request.justification = Some(reason.to_string());
        request.decided_by = Some(actor.to_string());
        request.decided_at = Some(Utc::now());
        let request = self.requests.update(revision, request)?;

        self.audit.record(
            "change_request",
            request_id,
            "reject",
            actor,
            json!({ "entry_id": request.entry_id, "reason": reason }),
        )?;
        self.notifier.publish(DomainEvent::ChangeRequestDecided {
            request_id: request_id.to_string(),
            approved: false,
        });
        Ok(request)
    }

    fn simulate(
        &self,
        entry: &Entry,
        cn_code: &str,
        version: &cbam_core::version::RegulatoryVersion,
    ) -> Result<CalculationResult> {
        let mut input = CalcInput::from_entry(
            entry,
            version,
            self.config.include_precursors,
            self.config.calc_timeout_ms,
        );
        input.cn_code = cn_code.to_string();
        self.engine.calculate(&input).map_err(|err| match err {
            CalcError::Timeout(ms) => {
                CbamError::Upstream(format!("impact simulation timed out after {}ms", ms))
            }
            CalcError::Failed(msg) => CbamError::Upstream(msg),
        })
    }
}

/// Engine-agnostic benchmark comparison: the applicable default value, or
/// failing that the per-tonne intensity, differs between the two codes.
fn benchmark_changed(before: &CalculationResult, after: &CalculationResult) -> bool {
    match (before.default_value_used, after.default_value_used) {
        (Some(a), Some(b)) => (a - b).abs() > f64::EPSILON,
        (None, None) => {
            (before.total_embedded_emissions - after.total_embedded_emissions).abs() > 1e-9
        }
        _ => true,
    }
}

//! Approval-gated batch recalculation
//!
//! Re-runs the calculation function for a set of entries against an
//! explicit target regulatory version. Execution is per-entry isolated:
//! a failing or frozen entry is recorded and skipped, the batch keeps
//! going, and each superseded calculation leaves a snapshot first.

use cbam_core::audit::AuditTrail;
use cbam_core::auth::Authorizer;
use cbam_core::calc::{CalcInput, CalculationEngine};
use cbam_core::config::EngineConfig;
use cbam_core::entry::Entry;
use cbam_core::error::{CbamError, Result};
use cbam_core::events::{DomainEvent, Notifier};
use cbam_core::requests::{
    CalculationSnapshot, EntryRecalcResult, RecalculationRequest, RecalculationStatus,
};
use cbam_core::store::Repository;
use cbam_registry::VersionRegistry;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;

pub struct RecalculationController {
    entries: Arc<dyn Repository<Entry>>,
    requests: Arc<dyn Repository<RecalculationRequest>>,
    snapshots: Arc<dyn Repository<CalculationSnapshot>>,
    registry: Arc<VersionRegistry>,
    engine: Arc<dyn CalculationEngine>,
    audit: Arc<AuditTrail>,
    notifier: Arc<Notifier>,
    auth: Arc<dyn Authorizer>,
    config: EngineConfig,
}

impl RecalculationController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        entries: Arc<dyn Repository<Entry>>,
        requests: Arc<dyn Repository<RecalculationRequest>>,
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

    /// Open a pending request. The target version must exist; the entries
    /// are only resolved at execution time.
    pub fn request(
        &self,
        entry_ids: Vec<String>,
        target_version_id: &str,
        reason: &str,
        actor: &str,
    ) -> Result<RecalculationRequest> {
        if entry_ids.is_empty() {
            return Err(CbamError::Rejected(
                "a recalculation request needs at least one entry".to_string(),
            ));
        }
        self.registry.get(target_version_id)?;

        let request = self.requests.insert(RecalculationRequest::open(
            entry_ids,
            target_version_id,
            reason,
            actor,
        ))?;
        self.audit.record(
            "recalculation_request",
            &request.id,
            "request",
            actor,
            json!({
                "target_version_id": target_version_id,
                "entry_count": request.entry_ids.len(),
                "reason": reason,
            }),
        )?;
        Ok(request)
    }

    pub fn approve(&self, request_id: &str, actor: &str) -> Result<RecalculationRequest> {
        self.auth.require_admin(actor, "approve recalculation")?;

        let mut request = self.requests.get(request_id)?;
        if request.status != RecalculationStatus::PendingApproval {
            return Err(CbamError::invalid_transition(
                request.status,
                RecalculationStatus::Approved,
                "only pending requests can be approved",
            ));
        }
        let revision = request.revision;
        request.status = RecalculationStatus::Approved;
        request.approved_by = Some(actor.to_string());
        let request = self.requests.update(revision, request)?;

        self.audit
            .record("recalculation_request", request_id, "approve", actor, json!({}))?;
        Ok(request)
    }

    pub fn reject(&self, request_id: &str, actor: &str) -> Result<RecalculationRequest> {
        self.auth.require_admin(actor, "reject recalculation")?;

        let mut request = self.requests.get(request_id)?;
        if request.status != RecalculationStatus::PendingApproval {
            return Err(CbamError::invalid_transition(
                request.status,
                RecalculationStatus::Rejected,
                "only pending requests can be rejected",
            ));
        }
        let revision = request.revision;
        request.status = RecalculationStatus::Rejected;
        let request = self.requests.update(revision, request)?;

        self.audit
            .record("recalculation_request", request_id, "reject", actor, json!({}))?;
        Ok(request)
    }

    /// Run the approved batch. Per-entry outcomes land on the request;
    /// the run itself only fails on infrastructure errors.
    pub fn execute(&self, request_id: &str, actor: &str) -> Result<RecalculationRequest> {
        let mut request = self.requests.get(request_id)?;
        if request.status != RecalculationStatus::Approved {
            return Err(CbamError::invalid_transition(
                request.status,
                RecalculationStatus::Executed,
                "only approved requests can be executed",
            ));
        }
        let version = self.registry.get(&request.target_version_id)?;

        let mut results = Vec::with_capacity(request.entry_ids.len());
        for entry_id in &request.entry_ids {
            results.push(match self.recalculate_one(entry_id, &version, &request.id) {
                Ok(()) => EntryRecalcResult {
                    entry_id: entry_id.clone(),
                    ok: true,
                    error: None,
                },
                Err(err) => {
                    tracing::warn!(entry_id = %entry_id, error = %err, "recalculation skipped entry");
                    EntryRecalcResult {
                        entry_id: entry_id.clone(),
                        ok: false,
                        error: Some(err.to_string()),
                    }
                }
            });
        }

        let revision = request.revision;
        request.results = results;
        request.status = RecalculationStatus::Executed;
        request.executed_at = Some(Utc::now());
        let request = self.requests.update(revision, request)?;

        self.audit.record(
            "recalculation_request",
            request_id,
            "execute",
            actor,
            json!({
                "target_version_id": request.target_version_id,
                "succeeded": request.succeeded(),
                "failed": request.failed(),
            }),
        )?;
        self.notifier.publish(DomainEvent::RecalculationExecuted {
            request_id: request_id.to_string(),
            succeeded: request.succeeded(),
            failed: request.failed(),
        });
        Ok(request)
    }

    fn recalculate_one(
        &self,
        entry_id: &str,
        version: &cbam_core::version::RegulatoryVersion,
        request_id: &str,
    ) -> Result<()> {
        let mut entry = self.entries.get(entry_id)?;
        if entry.calculation_frozen {
            return Err(CbamError::Rejected(
                "frozen pending change control".to_string(),
            ));
        }
        let revision = entry.revision;

        let input = CalcInput::from_entry(
            &entry,
            version,
            self.config.include_precursors,
            self.config.calc_timeout_ms,
        );
        let result = self
            .engine
            .calculate(&input)
            .map_err(|err| CbamError::Upstream(err.to_string()))?;

        if let Some(prior) = entry.calculation.clone() {
            self.snapshots.insert(CalculationSnapshot::capture(
                entry_id,
                prior,
                entry.regulatory_version_id.clone(),
                format!("batch recalculation {}", request_id),
            ))?;
        }

        entry.calculation = Some(result);
        entry.regulatory_version_id = Some(version.id.clone());
        entry.touch();
        self.entries.update(revision, entry)?;
        Ok(())
    }
}

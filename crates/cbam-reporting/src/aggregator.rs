//! Quarterly report aggregation
//!
//! Candidate entries are those whose import date falls inside the period.
//! Each candidate either passes every eligibility check and contributes to
//! the totals, or lands in the exclusion list with every reason it failed.
//! Nothing is silently dropped.

use cbam_core::audit::AuditTrail;
use cbam_core::entry::{Entry, ValidationStatus, VerificationStatus};
use cbam_core::error::{CbamError, Result};
use cbam_core::events::{DomainEvent, Notifier};
use cbam_core::report::{Declarant, ExcludedEntry, Report, ReportStatus, ReportingPeriod};
use cbam_core::store::Repository;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;

/// Why a candidate entry cannot be aggregated. Evaluated exhaustively;
/// an excluded entry carries all of its failures, not just the first.
fn exclusion_reasons(entry: &Entry) -> Vec<String> {
    let mut reasons = Vec::new();
    // Mandatory fields are re-checked directly; the stored validation
    // status may predate a later update.
    if entry.origin_country.trim().is_empty() {
        reasons.push("missing origin country".to_string());
    }
    if entry.customs_reference.trim().is_empty() {
        reasons.push("missing customs reference".to_string());
    }
    if entry.quantity_tonnes <= 0.0 {
        reasons.push("non-positive quantity".to_string());
    }
    if entry.calculation.is_none() {
        reasons.push("no calculation result".to_string());
    }
    match entry.validation_status {
        ValidationStatus::Pass | ValidationStatus::Warning => {}
        ValidationStatus::Pending => reasons.push("validation not performed".to_string()),
        ValidationStatus::Blocked => reasons.push("blocking validation issues".to_string()),
    }
    if entry.method.requires_verification()
        && entry.verification_status != VerificationStatus::VerifierSatisfactory
    {
        reasons.push(format!(
            "method {} requires a satisfactory verification, found {}",
            entry.method, entry.verification_status
        ));
    }
    if entry.calculation_frozen {
        reasons.push("frozen pending change control".to_string());
    }
    if entry.reporting_blocked {
        reasons.push("reporting administratively blocked".to_string());
    }
    reasons
}

pub struct ReportAggregator {
    entries: Arc<dyn Repository<Entry>>,
    reports: Arc<dyn Repository<Report>>,
    audit: Arc<AuditTrail>,
    notifier: Arc<Notifier>,
}

impl ReportAggregator {
    pub fn new(
        entries: Arc<dyn Repository<Entry>>,
        reports: Arc<dyn Repository<Report>>,
        audit: Arc<AuditTrail>,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            entries,
            reports,
            audit,
            notifier,
        }
    }

    /// Build and persist a draft report for the period.
    pub fn generate(
        &self,
        period: ReportingPeriod,
        declarant: Declarant,
        actor: &str,
    ) -> Result<Report> {
        if !period.is_valid() {
            return Err(CbamError::Rejected(format!(
                "invalid reporting period {}-Q{}",
                period.year, period.quarter
            )));
        }
        let mut report = Report::draft(period, declarant);

        for entry in self.entries.list() {
            if !period.contains(entry.import_date) {
                continue;
            }
            let reasons = exclusion_reasons(&entry);
            if !reasons.is_empty() {
                report.excluded.push(ExcludedEntry {
                    entry_id: entry.id.clone(),
                    reasons,
                });
                continue;
            }

            // Eligibility guarantees a calculation is present.
            let calc = match &entry.calculation {
                Some(calc) => calc,
                None => continue,
            };
            report.totals.total_quantity_tonnes += entry.quantity_tonnes;
            report.totals.direct_emissions += calc.direct_emissions * entry.quantity_tonnes;
            report.totals.indirect_emissions += calc.indirect_emissions * entry.quantity_tonnes;
            report.totals.total_embedded_emissions += calc.total_embedded_emissions;
            report.totals.chargeable_emissions += calc.chargeable_emissions;
            report.totals.certificates_required += calc.certificates_required;

            *report.by_cn_code.entry(entry.cn_code.clone()).or_insert(0.0) +=
                calc.total_embedded_emissions;
            *report
                .by_country
                .entry(entry.origin_country.clone())
                .or_insert(0.0) += calc.total_embedded_emissions;
            *report.by_method.entry(entry.method.to_string()).or_insert(0.0) +=
                calc.total_embedded_emissions;

            report.entry_ids.push(entry.id.clone());
        }

        let report = self.reports.insert(report)?;
        self.audit.record(
            "report",
            &report.id,
            "generate",
            actor,
            json!({
                "period": report.period.label(),
                "included": report.entry_ids.len(),
                "excluded": report.excluded.len(),
                "certificates_required": report.totals.certificates_required,
            }),
        )?;
        self.notifier.publish(DomainEvent::ReportGenerated {
            report_id: report.id.clone(),
        });
        Ok(report)
    }

    /// Mark a draft as submitted. Empty reports are refused; an already
    /// submitted report cannot be resubmitted.
    pub fn submit(&self, report_id: &str, actor: &str) -> Result<Report> {
        let mut report = self.reports.get(report_id)?;
        if report.status != ReportStatus::Draft {
            return Err(CbamError::invalid_transition(
                "submitted",
                "submitted",
                "report was already submitted",
            ));
        }
        if report.entry_ids.is_empty() {
            return Err(CbamError::Rejected(format!(
                "report {} contains no eligible entries",
                report_id
            )));
        }

        let revision = report.revision;
        report.status = ReportStatus::Submitted;
        report.submitted_at = Some(Utc::now());
        let report = self.reports.update(revision, report)?;

        self.audit.record(
            "report",
            report_id,
            "submit",
            actor,
            json!({ "period": report.period.label() }),
        )?;
        self.notifier.publish(DomainEvent::ReportSubmitted {
            report_id: report_id.to_string(),
        });
        Ok(report)
    }
}

//! Certificate ledger operations
//!
//! Surrender settles a submitted report's whole certificate obligation,
//! consuming active certificates oldest-purchase-first. The walk is
//! all-or-nothing: mutations are staged, committed only once the full
//! obligation is covered, and rolled back if a conditional write loses a
//! race mid-commit. A partially consumed certificate is split so
//! quantities are conserved across the ledger.

use cbam_core::audit::AuditTrail;
use cbam_core::certificate::{Certificate, CertificateStatus};
use cbam_core::config::EngineConfig;
use cbam_core::error::{CbamError, Result};
use cbam_core::events::{DomainEvent, Notifier};
use cbam_core::report::Report;
use cbam_core::store::Repository;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Outcome of a purchase attempt. Spending money requires an explicit
/// confirmation flag; an unconfirmed request is denied, not errored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PurchaseOutcome {
    Granted { certificate: Certificate },
    Denied { reason: String },
}

/// Outcome of a surrender attempt against a submitted report. The
/// required quantity is the report's own obligation, never caller input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SurrenderOutcome {
    Granted {
        report_id: String,
        quantity: u64,
        /// Surrendered records, oldest purchase first
        certificate_ids: Vec<String>,
    },
    Denied {
        reason: String,
    },
    Shortfall {
        required: u64,
        available: u64,
        shortfall: u64,
    },
}

/// One staged conditional write: the record as it will be written, the
/// revision it must still carry, and the pre-image for rollback.
struct StagedWrite {
    expected_revision: u64,
    updated: Certificate,
    original: Certificate,
}

pub struct CertificateLedger {
    certificates: Arc<dyn Repository<Certificate>>,
    reports: Arc<dyn Repository<Report>>,
    audit: Arc<AuditTrail>,
    notifier: Arc<Notifier>,
    config: EngineConfig,
}

impl CertificateLedger {
    pub fn new(
        certificates: Arc<dyn Repository<Certificate>>,
        reports: Arc<dyn Repository<Report>>,
        audit: Arc<AuditTrail>,
        notifier: Arc<Notifier>,
        config: EngineConfig,
    ) -> Self {
        Self {
            certificates,
            reports,
            audit,
            notifier,
            config,
        }
    }

    /// Total quantity currently available for surrender.
    pub fn active_balance(&self) -> u64 {
        self.certificates
            .list()
            .iter()
            .filter(|c| c.is_active())
            .map(|c| c.quantity)
            .sum()
    }

    /// Buy certificates at the quoted unit price. `confirmed` must be
    /// set by the caller; there is no implicit spend.
    pub fn purchase(
        &self,
        quantity: u64,
        price_per_unit: f64,
        confirmed: bool,
        actor: &str,
    ) -> Result<PurchaseOutcome> {
        if !confirmed {
            return Ok(PurchaseOutcome::Denied {
                reason: "purchase requires explicit confirmation".to_string(),
            });
        }
        if quantity == 0 {
            return Ok(PurchaseOutcome::Denied {
                reason: "quantity must be positive".to_string(),
            });
        }
        if price_per_unit <= 0.0 {
            return Ok(PurchaseOutcome::Denied {
                reason: format!("non-positive unit price {}", price_per_unit),
            });
        }

        let certificate = self.certificates.insert(Certificate::purchase(
            quantity,
            price_per_unit,
            self.config.certificate_validity_months,
        ))?;
        self.audit.record(
            "certificate",
            &certificate.id,
            "purchase",
            actor,
            json!({
                "quantity": quantity,
                "price_per_unit": certificate.price_per_unit,
                "expires_at": certificate.expires_at,
            }),
        )?;
        self.notifier.publish(DomainEvent::CertificatesPurchased {
            certificate_id: certificate.id.clone(),
            quantity,
        });
        Ok(PurchaseOutcome::Granted { certificate })
    }

    /// Settle a submitted report's certificate obligation, consuming
    /// active certificates oldest first. Unconfirmed calls are denied;
    /// short holdings deny the whole operation with the exact shortfall;
    /// no record changes on any denial or failure.
    pub fn surrender(&self, report_id: &str, confirmed: bool, actor: &str) -> Result<SurrenderOutcome> {
        let report = self.reports.get(report_id)?;
        if !report.is_submitted() {
            return Err(CbamError::Rejected(format!(
                "report {} is not submitted; certificates can only be surrendered against submitted reports",
                report_id
            )));
        }
        if !confirmed {
            return Ok(SurrenderOutcome::Denied {
                reason: "surrender requires explicit confirmation".to_string(),
            });
        }
        let quantity = report.totals.certificates_required;
        if quantity == 0 {
            return Ok(SurrenderOutcome::Denied {
                reason: format!("report {} carries no certificate obligation", report_id),
            });
        }

        let mut active: Vec<Certificate> = self
            .certificates
            .list()
            .into_iter()
            .filter(|c| c.is_active())
            .collect();
        active.sort_by_key(|c| c.purchased_at);

        let available: u64 = active.iter().map(|c| c.quantity).sum();
        if available < quantity {
            return Ok(SurrenderOutcome::Shortfall {
                required: quantity,
                available,
                shortfall: quantity - available,
            });
        }

        // Stage every mutation first; nothing is written during the walk.
        let mut staged: Vec<StagedWrite> = Vec::new();
        let mut split_child: Option<Certificate> = None;
        let mut consumed_ids = Vec::new();
        let mut remaining = quantity;
        for certificate in active {
            if remaining == 0 {
                break;
            }
            let original = certificate.clone();
            let expected_revision = certificate.revision;
            let mut updated = certificate;
            if updated.quantity <= remaining {
                remaining -= updated.quantity;
                updated.status = CertificateStatus::Surrendered;
                updated.surrendered_for_report_id = Some(report_id.to_string());
                consumed_ids.push(updated.id.clone());
            } else {
                // Split: the original keeps the remainder active, a child
                // record holds the surrendered portion.
                let consumed = remaining;
                remaining = 0;
                updated.quantity -= consumed;
                let child = Certificate {
                    id: uuid::Uuid::new_v4().to_string(),
                    quantity: consumed,
                    price_per_unit: updated.price_per_unit,
                    status: CertificateStatus::Surrendered,
                    purchased_at: updated.purchased_at,
                    expires_at: updated.expires_at,
                    surrendered_for_report_id: Some(report_id.to_string()),
                    split_from: Some(updated.id.clone()),
                    revision: 0,
                };
                consumed_ids.push(child.id.clone());
                split_child = Some(child);
            }
            staged.push(StagedWrite {
                expected_revision,
                updated,
                original,
            });
        }

        self.commit_staged(staged, split_child)?;

        self.audit.record(
            "report",
            report_id,
            "surrender",
            actor,
            json!({ "quantity": quantity, "certificates": consumed_ids }),
        )?;
        self.notifier.publish(DomainEvent::CertificatesSurrendered {
            report_id: report_id.to_string(),
            quantity,
        });
        Ok(SurrenderOutcome::Granted {
            report_id: report_id.to_string(),
            quantity,
            certificate_ids: consumed_ids,
        })
    }

    /// Commit the staged writes. If any conditional write loses its race,
    /// every record already written is restored from its pre-image and the
    /// conflict is surfaced retryable.
    fn commit_staged(
        &self,
        staged: Vec<StagedWrite>,
        split_child: Option<Certificate>,
    ) -> Result<()> {
        let mut written: Vec<(Certificate, u64)> = Vec::new();
        for stage in staged {
            match self
                .certificates
                .update(stage.expected_revision, stage.updated)
            {
                Ok(committed) => written.push((stage.original, committed.revision)),
                Err(err) => {
                    self.restore(written);
                    return Err(err);
                }
            }
        }
        if let Some(child) = split_child {
            if let Err(err) = self.certificates.insert(child) {
                self.restore(written);
                return Err(err);
            }
        }
        Ok(())
    }

    fn restore(&self, written: Vec<(Certificate, u64)>) {
        for (original, revision) in written {
            let id = original.id.clone();
            if let Err(err) = self.certificates.update(revision, original) {
                tracing::error!(
                    certificate_id = %id,
                    error = %err,
                    "surrender rollback failed; ledger needs manual reconciliation"
                );
            }
        }
    }

    /// Expiry sweep: mark every active certificate past its validity
    /// window as expired. Returns the ids that changed.
    pub fn expire_due(&self, now: DateTime<Utc>, actor: &str) -> Result<Vec<String>> {
        let mut expired = Vec::new();
        for mut certificate in self.certificates.list() {
            if certificate.is_active() && certificate.is_expired_by(now) {
                let revision = certificate.revision;
                certificate.status = CertificateStatus::Expired;
                let certificate = self.certificates.update(revision, certificate)?;
                self.audit.record(
                    "certificate",
                    &certificate.id,
                    "expire",
                    actor,
                    json!({ "expired_at": certificate.expires_at }),
                )?;
                expired.push(certificate.id);
            }
        }
        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "expired certificates swept");
        }
        Ok(expired)
    }
}

//! Verification state machine
//!
//! Accredited third-party sign-off protocol:
//!
//! ```text
//! not_verified -> verifier_assigned -> verifier_satisfactory (terminal)
//!                                   -> verifier_unsatisfactory
//!                                         -> correction_required
//!                                               -> verifier_assigned
//! ```
//!
//! The transition table is fixed and exhaustive; anything else is rejected
//! naming the attempted from/to states. Every transition is audited with
//! the previous and new state and the verifier's accreditation identifier.

use cbam_core::audit::AuditTrail;
use cbam_core::entry::{Entry, VerificationOpinion, VerificationStatus};
use cbam_core::error::{CbamError, Result};
use cbam_core::events::{DomainEvent, Notifier};
use cbam_core::store::Repository;
use cbam_core::verifier::Verifier;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;

/// Allowed targets per state. Empty slice means terminal.
pub fn allowed_transitions(from: VerificationStatus) -> &'static [VerificationStatus] {
    use VerificationStatus::*;
    match from {
        NotVerified => &[VerifierAssigned],
        VerifierAssigned => &[VerifierSatisfactory, VerifierUnsatisfactory],
        VerifierSatisfactory => &[],
        VerifierUnsatisfactory => &[CorrectionRequired],
        CorrectionRequired => &[VerifierAssigned],
    }
}

pub fn can_transition(from: VerificationStatus, to: VerificationStatus) -> bool {
    allowed_transitions(from).contains(&to)
}

fn check_transition(from: VerificationStatus, to: VerificationStatus) -> Result<()> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(CbamError::invalid_transition(
            from,
            to,
            "transition is not in the verification table",
        ))
    }
}

pub struct VerificationMachine {
    entries: Arc<dyn Repository<Entry>>,
    verifiers: Arc<dyn Repository<Verifier>>,
    audit: Arc<AuditTrail>,
    notifier: Arc<Notifier>,
}

impl VerificationMachine {
    pub fn new(
        entries: Arc<dyn Repository<Entry>>,
        verifiers: Arc<dyn Repository<Verifier>>,
        audit: Arc<AuditTrail>,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            entries,
            verifiers,
            audit,
            notifier,
        }
    }

    fn eligible_verifier(&self, verifier_id: &str) -> Result<Verifier> {
        let verifier = self.verifiers.get(verifier_id)?;
        verifier
            .eligible_on(Utc::now().date_naive())
            .map_err(CbamError::Rejected)?;
        Ok(verifier)
    }

    fn commit_transition(
        &self,
        mut entry: Entry,
        to: VerificationStatus,
        verifier: Option<&Verifier>,
        actor: &str,
        details: serde_json::Value,
        mutate: impl FnOnce(&mut Entry),
    ) -> Result<Entry> {
        let from = entry.verification_status;
        check_transition(from, to)?;

        let revision = entry.revision;
        entry.verification_status = to;
        mutate(&mut entry);
        entry.touch();
        let entry = self.entries.update(revision, entry)?;

        let accreditation = verifier
            .and_then(|v| v.accreditation_number.clone())
            .unwrap_or_default();
        let mut details = details;
        if let serde_json::Value::Object(map) = &mut details {
            map.insert("previous_state".to_string(), json!(from.to_string()));
            map.insert("new_state".to_string(), json!(to.to_string()));
            map.insert("accreditation_number".to_string(), json!(accreditation));
        }
        self.audit
            .record("entry", &entry.id, "verification_transition", actor, details)?;
        self.notifier.publish(DomainEvent::VerificationChanged {
            entry_id: entry.id.clone(),
            from: from.to_string(),
            to: to.to_string(),
        });
        Ok(entry)
    }

    /// Assign a verifier to a not-yet-verified entry.
    pub fn assign_verifier(&self, entry_id: &str, verifier_id: &str, actor: &str) -> Result<Entry> {
        let entry = self.entries.get(entry_id)?;
        if entry.verification_status != VerificationStatus::NotVerified {
            return Err(CbamError::invalid_transition(
                entry.verification_status,
                VerificationStatus::VerifierAssigned,
                "use reassign_after_correction once a correction was requested",
            ));
        }
        let verifier = self.eligible_verifier(verifier_id)?;
        self.commit_transition(
            entry,
            VerificationStatus::VerifierAssigned,
            Some(&verifier),
            actor,
            json!({ "verifier_id": verifier_id }),
            |e| {
                e.assigned_verifier_id = Some(verifier_id.to_string());
            },
        )
    }

    /// Re-assign after a correction. Only valid once the entry has
    /// actually been modified since the correction was requested;
    /// resubmitting unchanged data is refused.
    pub fn reassign_after_correction(
        &self,
        entry_id: &str,
        verifier_id: &str,
        actor: &str,
    ) -> Result<Entry> {
        let entry = self.entries.get(entry_id)?;
        if entry.verification_status != VerificationStatus::CorrectionRequired {
            return Err(CbamError::invalid_transition(
                entry.verification_status,
                VerificationStatus::VerifierAssigned,
                "no correction is pending on this entry",
            ));
        }
        let requested_at = entry.correction_requested_at.ok_or_else(|| {
            CbamError::Rejected(format!(
                "entry {} has no recorded correction request timestamp",
                entry_id
            ))
        })?;
        if entry.updated_at <= requested_at {
            return Err(CbamError::Rejected(format!(
                "entry {} has not been modified since the correction was requested at {}",
                entry_id, requested_at
            )));
        }
        let verifier = self.eligible_verifier(verifier_id)?;
        self.commit_transition(
            entry,
            VerificationStatus::VerifierAssigned,
            Some(&verifier),
            actor,
            json!({ "verifier_id": verifier_id, "after_correction": true }),
            |e| {
                e.assigned_verifier_id = Some(verifier_id.to_string());
                e.correction_requested_at = None;
            },
        )
    }

    /// Satisfactory opinion from the assigned verifier. Evidence and a
    /// verification report identifier are mandatory; the terminal state is
    /// unreachable without them.
    pub fn submit_satisfactory_opinion(
        &self,
        entry_id: &str,
        verifier_id: &str,
        evidence_refs: Vec<String>,
        report_id: &str,
    ) -> Result<Entry> {
        let entry = self.entries.get(entry_id)?;
        self.ensure_assigned(&entry, verifier_id)?;
        if evidence_refs.is_empty() {
            return Err(CbamError::Rejected(
                "a satisfactory opinion requires at least one evidence reference".to_string(),
            ));
        }
        if report_id.trim().is_empty() {
            return Err(CbamError::Rejected(
                "a satisfactory opinion requires a verification report identifier".to_string(),
            ));
        }

        let verifier = self.verifiers.get(verifier_id)?;
        let opinion = VerificationOpinion {
            verifier_id: verifier_id.to_string(),
            accreditation_number: verifier.accreditation_number.clone().unwrap_or_default(),
            satisfactory: true,
            evidence_refs: evidence_refs.clone(),
            report_id: Some(report_id.to_string()),
            findings: Vec::new(),
            issued_at: Utc::now(),
        };
        self.commit_transition(
            entry,
            VerificationStatus::VerifierSatisfactory,
            Some(&verifier),
            verifier_id,
            json!({ "evidence_refs": evidence_refs, "verification_report_id": report_id }),
            |e| {
                e.verification_opinion = Some(opinion);
            },
        )
    }

    /// Unsatisfactory opinion from the assigned verifier, with documented
    /// findings.
    pub fn submit_unsatisfactory_opinion(
        &self,
        entry_id: &str,
        verifier_id: &str,
        findings: Vec<String>,
    ) -> Result<Entry> {
        let entry = self.entries.get(entry_id)?;
        self.ensure_assigned(&entry, verifier_id)?;
        if findings.is_empty() {
            return Err(CbamError::Rejected(
                "an unsatisfactory opinion requires documented findings".to_string(),
            ));
        }

        let verifier = self.verifiers.get(verifier_id)?;
        let opinion = VerificationOpinion {
            verifier_id: verifier_id.to_string(),
            accreditation_number: verifier.accreditation_number.clone().unwrap_or_default(),
            satisfactory: false,
            evidence_refs: Vec::new(),
            report_id: None,
            findings: findings.clone(),
            issued_at: Utc::now(),
        };
        self.commit_transition(
            entry,
            VerificationStatus::VerifierUnsatisfactory,
            Some(&verifier),
            verifier_id,
            json!({ "findings": findings }),
            |e| {
                e.verification_opinion = Some(opinion);
            },
        )
    }

    /// Move an unsatisfactory entry into the correction cycle.
    pub fn request_correction(&self, entry_id: &str, actor: &str) -> Result<Entry> {
        let entry = self.entries.get(entry_id)?;
        let now = Utc::now();
        self.commit_transition(
            entry,
            VerificationStatus::CorrectionRequired,
            None,
            actor,
            json!({}),
            |e| {
                e.correction_requested_at = Some(now);
            },
        )
    }

    fn ensure_assigned(&self, entry: &Entry, verifier_id: &str) -> Result<()> {
        match entry.assigned_verifier_id.as_deref() {
            Some(assigned) if assigned == verifier_id => Ok(()),
            _ => Err(CbamError::AuthorizationDenied {
                actor: verifier_id.to_string(),
                action: format!("submit an opinion for entry {}", entry.id),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cbam_core::audit::AuditMode;
    use cbam_core::entry::CalculationMethod;
    use cbam_core::store::MemoryLedger;
    use cbam_core::verifier::VerifierStatus;
    use chrono::NaiveDate;

    struct Fixture {
        entries: Arc<MemoryLedger<Entry>>,
        verifiers: Arc<MemoryLedger<Verifier>>,
        audit: Arc<AuditTrail>,
        machine: VerificationMachine,
    }

    fn fixture() -> Fixture {
        let entries = Arc::new(MemoryLedger::new());
        let verifiers = Arc::new(MemoryLedger::new());
        let audit = Arc::new(AuditTrail::in_memory(AuditMode::BestEffort));
        let machine = VerificationMachine::new(
            entries.clone(),
            verifiers.clone(),
            audit.clone(),
            Arc::new(Notifier::new()),
        );
        Fixture {
            entries,
            verifiers,
            audit,
            machine,
        }
    }

    fn seeded_entry(fx: &Fixture) -> Entry {
        fx.entries
            .insert(Entry::new(
                "IN",
                "MRN-2026-0001",
                100.0,
                NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
                "72081000",
                2026,
                CalculationMethod::ActualValues,
            ))
            .unwrap()
    }

    fn seeded_verifier(fx: &Fixture) -> Verifier {
        fx.verifiers
            .insert(Verifier::new(
                "TUV Nord",
                "ACC-DE-0042",
                NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
            ))
            .unwrap()
    }

    #[test]
    fn test_transition_table_is_exhaustive() {
        use VerificationStatus::*;
        let all = [
            NotVerified,
            VerifierAssigned,
            VerifierSatisfactory,
            VerifierUnsatisfactory,
            CorrectionRequired,
        ];
        for from in all {
            for to in all {
                let expected = match (from, to) {
                    (NotVerified, VerifierAssigned) => true,
                    (VerifierAssigned, VerifierSatisfactory) => true,
                    (VerifierAssigned, VerifierUnsatisfactory) => true,
                    (VerifierUnsatisfactory, CorrectionRequired) => true,
                    (CorrectionRequired, VerifierAssigned) => true,
                    _ => false,
                };
                assert_eq!(can_transition(from, to), expected, "{from} -> {to}");
            }
        }
    }

    #[test]
    fn test_full_satisfactory_path() {
        let fx = fixture();
        let entry = seeded_entry(&fx);
        let verifier = seeded_verifier(&fx);

        fx.machine
            .assign_verifier(&entry.id, &verifier.id, "ops@acme")
            .unwrap();
        let signed = fx
            .machine
            .submit_satisfactory_opinion(
                &entry.id,
                &verifier.id,
                vec!["evidence-1".to_string()],
                "VR-2026-017",
            )
            .unwrap();

        assert_eq!(
            signed.verification_status,
            VerificationStatus::VerifierSatisfactory
        );
        let opinion = signed.verification_opinion.unwrap();
        assert!(opinion.satisfactory);
        assert_eq!(opinion.report_id.as_deref(), Some("VR-2026-017"));

        // Terminal: no further transitions.
        let err = fx
            .machine
            .request_correction(&entry.id, "ops@acme")
            .unwrap_err();
        assert!(matches!(err, CbamError::InvalidTransition { .. }));
    }

    #[test]
    fn test_satisfactory_requires_evidence_and_report() {
        let fx = fixture();
        let entry = seeded_entry(&fx);
        let verifier = seeded_verifier(&fx);
        fx.machine
            .assign_verifier(&entry.id, &verifier.id, "ops@acme")
            .unwrap();

        let err = fx
            .machine
            .submit_satisfactory_opinion(&entry.id, &verifier.id, vec![], "VR-1")
            .unwrap_err();
        assert!(matches!(err, CbamError::Rejected(_)));

        let err = fx
            .machine
            .submit_satisfactory_opinion(
                &entry.id,
                &verifier.id,
                vec!["evidence-1".to_string()],
                "  ",
            )
            .unwrap_err();
        assert!(matches!(err, CbamError::Rejected(_)));

        // Both rejections left the state untouched.
        let stored = fx.entries.get(&entry.id).unwrap();
        assert_eq!(
            stored.verification_status,
            VerificationStatus::VerifierAssigned
        );
    }

    #[test]
    fn test_only_assigned_verifier_may_submit() {
        let fx = fixture();
        let entry = seeded_entry(&fx);
        let verifier = seeded_verifier(&fx);
        let other = fx
            .verifiers
            .insert(Verifier::new(
                "Bureau Veritas",
                "ACC-FR-0099",
                NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
            ))
            .unwrap();

        fx.machine
            .assign_verifier(&entry.id, &verifier.id, "ops@acme")
            .unwrap();
        let err = fx
            .machine
            .submit_satisfactory_opinion(
                &entry.id,
                &other.id,
                vec!["evidence-1".to_string()],
                "VR-1",
            )
            .unwrap_err();
        assert!(matches!(err, CbamError::AuthorizationDenied { .. }));
    }

    #[test]
    fn test_assignment_checks_accreditation() {
        let fx = fixture();
        let entry = seeded_entry(&fx);

        let mut suspended = Verifier::new(
            "Shady Cert Co",
            "ACC-XX-0000",
            NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
        );
        suspended.status = VerifierStatus::Suspended;
        let suspended = fx.verifiers.insert(suspended).unwrap();

        let err = fx
            .machine
            .assign_verifier(&entry.id, &suspended.id, "ops@acme")
            .unwrap_err();
        assert!(matches!(err, CbamError::Rejected(_)));
    }

    #[test]
    fn test_correction_cycle_requires_modification() {
        let fx = fixture();
        let entry = seeded_entry(&fx);
        let verifier = seeded_verifier(&fx);

        fx.machine
            .assign_verifier(&entry.id, &verifier.id, "ops@acme")
            .unwrap();
        fx.machine
            .submit_unsatisfactory_opinion(
                &entry.id,
                &verifier.id,
                vec!["emissions source data incomplete".to_string()],
            )
            .unwrap();
        fx.machine
            .request_correction(&entry.id, "ops@acme")
            .unwrap();

        // Unmodified entry: reassignment refused.
        let err = fx
            .machine
            .reassign_after_correction(&entry.id, &verifier.id, "ops@acme")
            .unwrap_err();
        assert!(matches!(err, CbamError::Rejected(_)));

        // Touch the entry, then reassignment goes through.
        let mut modified = fx.entries.get(&entry.id).unwrap();
        let revision = modified.revision;
        modified.quantity_tonnes = 120.0;
        modified.touch();
        fx.entries.update(revision, modified).unwrap();

        let reassigned = fx
            .machine
            .reassign_after_correction(&entry.id, &verifier.id, "ops@acme")
            .unwrap();
        assert_eq!(
            reassigned.verification_status,
            VerificationStatus::VerifierAssigned
        );
        assert!(reassigned.correction_requested_at.is_none());
    }

    #[test]
    fn test_unsatisfactory_requires_findings() {
        let fx = fixture();
        let entry = seeded_entry(&fx);
        let verifier = seeded_verifier(&fx);
        fx.machine
            .assign_verifier(&entry.id, &verifier.id, "ops@acme")
            .unwrap();

        let err = fx
            .machine
            .submit_unsatisfactory_opinion(&entry.id, &verifier.id, vec![])
            .unwrap_err();
        assert!(matches!(err, CbamError::Rejected(_)));
    }

    #[test]
    fn test_transitions_are_audited_with_states() {
        let fx = fixture();
        let entry = seeded_entry(&fx);
        let verifier = seeded_verifier(&fx);
        fx.machine
            .assign_verifier(&entry.id, &verifier.id, "ops@acme")
            .unwrap();

        let trail = fx.audit.trail("entry", &entry.id);
        let last = trail.last().unwrap();
        assert_eq!(last.action, "verification_transition");
        assert_eq!(last.details["previous_state"], "not_verified");
        assert_eq!(last.details["new_state"], "verifier_assigned");
        assert_eq!(last.details["accreditation_number"], "ACC-DE-0042");
    }
}

//! The evaluator
//!
//! Pure function over an entry and an optional benchmark. No blocking
//! issue is ever dropped; the caller persists the whole outcome on the
//! entry.

use crate::benchmark::Benchmark;
use crate::rules;
use cbam_core::config::EngineConfig;
use cbam_core::entry::{Entry, ValidationStatus};
use cbam_core::issue::Issue;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub status: ValidationStatus,
    pub blocking_issues: Vec<Issue>,
    pub warnings: Vec<Issue>,
    /// 0..=100
    pub compliance_score: u32,
    pub rules_applied: u32,
}

impl Evaluation {
    /// Write the outcome back onto the entry (status, issue lists, score).
    pub fn apply_to(&self, entry: &mut Entry) {
        entry.validation_status = self.status;
        entry.blocking_issues = self.blocking_issues.clone();
        entry.warnings = self.warnings.clone();
        entry.compliance_score = Some(self.compliance_score);
        entry.touch();
    }
}

/// Score an entry against the fixed rule set.
pub fn evaluate(entry: &Entry, benchmark: Option<&Benchmark>, config: &EngineConfig) -> Evaluation {
    let mut issues: Vec<Issue> = Vec::new();
    let mut rules_applied: u32 = 0;

    let mut apply = |found: Vec<Issue>| {
        rules_applied += 1;
        issues.extend(found);
    };

    apply(rules::mandatory_fields(entry));
    apply(rules::cn_code_format(entry));
    apply(rules::reporting_year_floor(
        entry,
        config.minimum_reporting_year,
    ));
    apply(rules::method_eligibility(entry));
    apply(rules::carbon_price_evidence(entry));

    if let Some(benchmark) = benchmark {
        apply(rules::materiality_variance(
            entry,
            benchmark,
            config.materiality_threshold,
        ));
    }
    if !entry.precursors.is_empty() {
        apply(rules::precursor_completeness(entry));
    }

    let (blocking_issues, warnings): (Vec<Issue>, Vec<Issue>) =
        issues.into_iter().partition(|issue| issue.is_blocking());

    let status = if !blocking_issues.is_empty() {
        ValidationStatus::Blocked
    } else if !warnings.is_empty() {
        ValidationStatus::Warning
    } else {
        ValidationStatus::Pass
    };

    let compliance_score = score(rules_applied, blocking_issues.len(), warnings.len());

    Evaluation {
        status,
        blocking_issues,
        warnings,
        compliance_score,
        rules_applied,
    }
}

/// `100 × (applied − blocking − 0.5 × warnings) / applied`, floor 0.
fn score(applied: u32, blocking: usize, warnings: usize) -> u32 {
    if applied == 0 {
        return 0;
    }
    let raw = 100.0 * (applied as f64 - blocking as f64 - 0.5 * warnings as f64) / applied as f64;
    raw.max(0.0).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use cbam_core::entry::{CalculationMethod, CalculationResult, Precursor};
    use chrono::NaiveDate;

    fn entry() -> Entry {
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
    fn test_clean_default_entry_scores_100() {
        let evaluation = evaluate(&entry(), None, &EngineConfig::default());
        assert_eq!(evaluation.status, ValidationStatus::Pass);
        assert_eq!(evaluation.compliance_score, 100);
        assert!(evaluation.blocking_issues.is_empty());
        assert!(evaluation.warnings.is_empty());
        assert_eq!(evaluation.rules_applied, 5);
    }

    #[test]
    fn test_blocking_issue_blocks() {
        let mut e = entry();
        e.cn_code = "bad".to_string();
        let evaluation = evaluate(&e, None, &EngineConfig::default());
        assert_eq!(evaluation.status, ValidationStatus::Blocked);
        assert!(evaluation.compliance_score < 100);
        assert_eq!(evaluation.blocking_issues.len(), 1);
    }

    #[test]
    fn test_warning_only_is_warning_status() {
        let mut e = entry();
        e.calculation = Some(CalculationResult {
            direct_emissions: 2.0,
            indirect_emissions: 1.0,
            precursor_emissions: 0.0,
            total_embedded_emissions: 300.0,
            chargeable_emissions: 7.5,
            certificates_required: 8,
            cbam_factor_applied: 0.025,
            free_allocation_adjustment: 292.5,
            production_route: None,
            default_value_used: None,
        });
        let benchmark = Benchmark::new("72081000", 2.0, "defaults 2026");
        let evaluation = evaluate(&e, Some(&benchmark), &EngineConfig::default());
        assert_eq!(evaluation.status, ValidationStatus::Warning);
        assert_eq!(evaluation.warnings.len(), 1);
        // 6 rules applied, one warning: 100 * (6 - 0.5) / 6 ≈ 92
        assert_eq!(evaluation.compliance_score, 92);
    }

    #[test]
    fn test_score_floor_is_zero() {
        assert_eq!(score(2, 5, 0), 0);
        assert_eq!(score(0, 0, 0), 0);
    }

    #[test]
    fn test_apply_to_writes_back() {
        let mut e = entry();
        e.method = CalculationMethod::ActualValues;
        let evaluation = evaluate(&e, None, &EngineConfig::default());
        evaluation.apply_to(&mut e);
        assert_eq!(e.validation_status, ValidationStatus::Blocked);
        assert_eq!(e.blocking_issues.len(), 1);
        assert_eq!(e.compliance_score, Some(evaluation.compliance_score));
    }

    #[test]
    fn test_precursor_family_counts_once() {
        let mut e = entry();
        e.precursors.push(Precursor {
            cn_code: "72071100".to_string(),
            quantity_tonnes: 40.0,
            direct_emissions: Some(76.0),
            reporting_year: 2026,
            evidence_ref: None,
        });
        let evaluation = evaluate(&e, None, &EngineConfig::default());
        assert_eq!(evaluation.rules_applied, 6);
        assert_eq!(evaluation.status, ValidationStatus::Pass);
    }
}

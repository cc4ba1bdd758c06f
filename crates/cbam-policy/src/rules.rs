//! The fixed rule families
//!
//! Each family checks one regulatory concern and yields tagged issues with
//! a citation. Rules never mutate the entry.

use crate::benchmark::Benchmark;
use cbam_core::entry::{Entry, VerificationStatus};
use cbam_core::issue::Issue;
use serde_json::json;

/// Mandatory-field presence. Art. 35(2) Reg. 2023/956.
pub fn mandatory_fields(entry: &Entry) -> Vec<Issue> {
    let mut issues = Vec::new();
    let mut missing = |field: &str| {
        issues.push(
            Issue::blocking(
                "mandatory_fields",
                "Mandatory Field Presence",
                format!("required field '{}' is missing or empty", field),
                "Art. 35(2) Reg. 2023/956",
            )
            .with_location(field),
        );
    };

    if entry.origin_country.trim().is_empty() {
        missing("origin_country");
    }
    if entry.customs_reference.trim().is_empty() {
        missing("customs_reference");
    }
    if entry.cn_code.trim().is_empty() {
        missing("cn_code");
    }
    if entry.quantity_tonnes <= 0.0 {
        issues.push(
            Issue::blocking(
                "mandatory_fields",
                "Mandatory Field Presence",
                format!(
                    "quantity must be positive, got {}",
                    entry.quantity_tonnes
                ),
                "Art. 35(2) Reg. 2023/956",
            )
            .with_location("quantity_tonnes"),
        );
    }
    issues
}

/// Classification code format: 8 digits. Annex I Reg. 2023/956.
pub fn cn_code_format(entry: &Entry) -> Vec<Issue> {
    let code = entry.cn_code.trim();
    if code.is_empty() {
        // Absence is already reported by the mandatory-field rule.
        return Vec::new();
    }
    if code.len() == 8 && code.chars().all(|c| c.is_ascii_digit()) {
        return Vec::new();
    }
    vec![Issue::blocking(
        "cn_code_format",
        "CN Code Format",
        format!("CN code '{}' must be exactly 8 digits", code),
        "Annex I Reg. 2023/956",
    )
    .with_location("cn_code")]
}

/// Reporting-year floor for the definitive regime.
pub fn reporting_year_floor(entry: &Entry, minimum_year: i32) -> Vec<Issue> {
    if entry.reporting_year >= minimum_year {
        return Vec::new();
    }
    vec![Issue::blocking(
        "reporting_year_floor",
        "Reporting Year Floor",
        format!(
            "reporting year {} is before the earliest accepted year {}",
            entry.reporting_year, minimum_year
        ),
        "Art. 32 Reg. 2023/956",
    )
    .with_location("reporting_year")]
}

/// Materiality variance against a supplied benchmark. Exceeding the
/// threshold is advisory, not blocking.
pub fn materiality_variance(
    entry: &Entry,
    benchmark: &Benchmark,
    threshold: f64,
) -> Vec<Issue> {
    let calc = match &entry.calculation {
        Some(calc) => calc,
        None => return Vec::new(),
    };
    if benchmark.specific_emissions <= 0.0 {
        return Vec::new();
    }
    let reported = calc.direct_emissions + calc.indirect_emissions;
    let variance = (reported - benchmark.specific_emissions).abs() / benchmark.specific_emissions;
    if variance <= threshold {
        return Vec::new();
    }
    vec![Issue::warning(
        "materiality_variance",
        "Materiality Variance",
        format!(
            "reported specific emissions {:.4} deviate {:.1}% from benchmark {:.4} (threshold {:.0}%)",
            reported,
            variance * 100.0,
            benchmark.specific_emissions,
            threshold * 100.0
        ),
        "Art. 19 Impl. Reg. 2023/1773",
    )
    .with_context(json!({
        "reported": reported,
        "benchmark": benchmark.specific_emissions,
        "variance": variance,
        "threshold": threshold,
        "benchmark_source": benchmark.source,
    }))]
}

/// Method eligibility: actual-data methods need a satisfactory
/// verification outcome before they count.
pub fn method_eligibility(entry: &Entry) -> Vec<Issue> {
    if !entry.method.requires_verification() {
        return Vec::new();
    }
    if entry.verification_status == VerificationStatus::VerifierSatisfactory {
        return Vec::new();
    }
    vec![Issue::blocking(
        "method_eligibility",
        "Calculation Method Eligibility",
        format!(
            "method '{}' requires a satisfactory verification outcome, current status is '{}'",
            entry.method, entry.verification_status
        ),
        "Art. 8 Reg. 2023/956",
    )
    .with_location("verification_status")]
}

/// Precursor completeness: each precursor must carry emissions data; a
/// year mismatch with the parent needs attached evidence.
pub fn precursor_completeness(entry: &Entry) -> Vec<Issue> {
    let mut issues = Vec::new();
    for (index, precursor) in entry.precursors.iter().enumerate() {
        if precursor.direct_emissions.is_none() {
            issues.push(
                Issue::blocking(
                    "precursor_completeness",
                    "Precursor Completeness",
                    format!(
                        "precursor '{}' carries no emissions data",
                        precursor.cn_code
                    ),
                    "Annex IV Reg. 2023/956",
                )
                .with_location(format!("precursors[{}]", index)),
            );
        }
        if precursor.reporting_year != entry.reporting_year && precursor.evidence_ref.is_none() {
            issues.push(
                Issue::warning(
                    "precursor_completeness",
                    "Precursor Completeness",
                    format!(
                        "precursor '{}' reports year {} while the entry reports {} and no evidence is attached",
                        precursor.cn_code, precursor.reporting_year, entry.reporting_year
                    ),
                    "Annex IV Reg. 2023/956",
                )
                .with_location(format!("precursors[{}]", index)),
            );
        }
    }
    issues
}

/// Carbon-price deduction claims need supporting evidence.
pub fn carbon_price_evidence(entry: &Entry) -> Vec<Issue> {
    if !entry.carbon_price_claimed || entry.carbon_price_evidence.is_some() {
        return Vec::new();
    }
    vec![Issue::blocking(
        "carbon_price_evidence",
        "Carbon Price Deduction Evidence",
        "a carbon price deduction is claimed but no evidence is attached".to_string(),
        "Art. 9 Reg. 2023/956",
    )
    .with_location("carbon_price_evidence")]
}

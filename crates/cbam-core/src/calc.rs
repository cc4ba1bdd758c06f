//! Calculation function contract
//!
//! The emissions formulas themselves are an external pure function. This
//! module fixes its input/output contract and ships a deterministic
//! reference implementation for tests and single-process use. Engines must
//! be idempotent and side-effect-free; callers persist nothing unless the
//! engine returns a complete result.

use crate::entry::{CalculationMethod, CalculationResult, Entry, Precursor};
use crate::version::RegulatoryVersion;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CalcError {
    /// The bounded budget was exceeded; the caller leaves the entry in
    /// its prior state and surfaces a retryable error.
    #[error("CALC/TIMEOUT after {0}ms")]
    Timeout(u64),

    #[error("CALC/{0}")]
    Failed(String),
}

/// Entry snapshot plus resolved regulatory parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalcInput {
    pub entry_id: String,
    pub cn_code: String,
    pub quantity_tonnes: f64,
    pub reporting_year: i32,
    pub method: CalculationMethod,
    pub precursors: Vec<Precursor>,
    pub include_precursors: bool,

    // Regulatory parameters resolved for the reporting year
    pub regulatory_version_id: String,
    pub phase_in_factor: f64,
    pub default_markup: f64,

    /// Bounded execution budget for the engine
    pub timeout_ms: u64,
}

impl CalcInput {
    pub fn from_entry(
        entry: &Entry,
        version: &RegulatoryVersion,
        include_precursors: bool,
        timeout_ms: u64,
    ) -> Self {
        Self {
            entry_id: entry.id.clone(),
            cn_code: entry.cn_code.clone(),
            quantity_tonnes: entry.quantity_tonnes,
            reporting_year: entry.reporting_year,
            method: entry.method,
            precursors: entry.precursors.clone(),
            include_precursors,
            regulatory_version_id: version.id.clone(),
            phase_in_factor: version.phase_in_factor(entry.reporting_year),
            default_markup: version.default_markup(entry.reporting_year),
            timeout_ms,
        }
    }
}

pub trait CalculationEngine: Send + Sync {
    fn calculate(&self, input: &CalcInput) -> std::result::Result<CalculationResult, CalcError>;
}

/// Deterministic in-process engine.
///
/// Specific default values are keyed by CN chapter; the method decides
/// whether the default-value markup applies. Good enough to exercise the
/// lifecycle; production deployments plug in the real external function.
pub struct ReferenceEngine;

impl ReferenceEngine {
    /// Default specific embedded emissions (tCO2e per tonne) by CN chapter.
    pub fn default_specific(cn_code: &str) -> f64 {
        match cn_code.get(0..2) {
            Some("25") => 0.8,  // cement
            Some("27") => 0.9,  // electricity carriers
            Some("28") => 1.5,  // chemicals / hydrogen
            Some("31") => 1.6,  // fertilisers
            Some("72") => 1.9,  // iron and steel
            Some("73") => 2.1,  // iron and steel articles
            Some("76") => 8.6,  // aluminium
            _ => 1.0,
        }
    }

    fn production_route(cn_code: &str) -> Option<String> {
        match cn_code.get(0..2) {
            Some("72") | Some("73") => Some("blast_furnace_bof".to_string()),
            Some("76") => Some("electrolysis".to_string()),
            _ => None,
        }
    }
}

impl CalculationEngine for ReferenceEngine {
    fn calculate(&self, input: &CalcInput) -> std::result::Result<CalculationResult, CalcError> {
        if input.quantity_tonnes <= 0.0 {
            return Err(CalcError::Failed(format!(
                "non-positive quantity {} for entry {}",
                input.quantity_tonnes, input.entry_id
            )));
        }

        let base = Self::default_specific(&input.cn_code);
        let (specific, default_value_used) = match input.method {
            CalculationMethod::DefaultValues => {
                let v = base * (1.0 + input.default_markup);
                (v, Some(v))
            }
            CalculationMethod::ActualValues => (base, None),
            CalculationMethod::Combined => {
                let v = base * (1.0 + input.default_markup / 2.0);
                (v, Some(v))
            }
        };

        let direct = specific * 0.7;
        let indirect = specific * 0.3;

        let precursor_emissions = if input.include_precursors {
            input
                .precursors
                .iter()
                .map(|p| p.direct_emissions.unwrap_or(0.0))
                .sum()
        } else {
            0.0
        };

        let total = specific * input.quantity_tonnes + precursor_emissions;
        let chargeable = total * input.phase_in_factor;
        let free_allocation_adjustment = total - chargeable;

        Ok(CalculationResult {
            direct_emissions: direct,
            indirect_emissions: indirect,
            precursor_emissions,
            total_embedded_emissions: total,
            chargeable_emissions: chargeable,
            certificates_required: chargeable.ceil() as u64,
            cbam_factor_applied: input.phase_in_factor,
            free_allocation_adjustment,
            production_route: Self::production_route(&input.cn_code),
            default_value_used,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn input(cn_code: &str, method: CalculationMethod) -> CalcInput {
        CalcInput {
            entry_id: "e-1".to_string(),
            cn_code: cn_code.to_string(),
            quantity_tonnes: 100.0,
            reporting_year: 2026,
            method,
            precursors: Vec::new(),
            include_precursors: true,
            regulatory_version_id: "v-1".to_string(),
            phase_in_factor: 0.025,
            default_markup: 0.1,
            timeout_ms: 10_000,
        }
    }

    #[test]
    fn test_default_values_apply_markup() {
        let result = ReferenceEngine
            .calculate(&input("72081000", CalculationMethod::DefaultValues))
            .unwrap();
        let expected_specific = 1.9 * 1.1;
        assert!((result.total_embedded_emissions - expected_specific * 100.0).abs() < 1e-9);
        assert_eq!(result.default_value_used, Some(expected_specific));
        assert_eq!(result.cbam_factor_applied, 0.025);
    }

    #[test]
    fn test_actual_values_skip_markup() {
        let result = ReferenceEngine
            .calculate(&input("72081000", CalculationMethod::ActualValues))
            .unwrap();
        assert!(result.default_value_used.is_none());
        assert!((result.total_embedded_emissions - 190.0).abs() < 1e-9);
    }

    #[test]
    fn test_certificates_round_up() {
        let result = ReferenceEngine
            .calculate(&input("76061100", CalculationMethod::ActualValues))
            .unwrap();
        // 8.6 * 100 * 0.025 = 21.5 chargeable -> 22 certificates
        assert_eq!(result.certificates_required, 22);
    }

    #[test]
    fn test_chargeable_plus_free_allocation_is_total() {
        let result = ReferenceEngine
            .calculate(&input("25231000", CalculationMethod::DefaultValues))
            .unwrap();
        let recombined = result.chargeable_emissions + result.free_allocation_adjustment;
        assert!((recombined - result.total_embedded_emissions).abs() < 1e-9);
    }

    #[test]
    fn test_precursors_add_in() {
        let mut i = input("72081000", CalculationMethod::ActualValues);
        i.precursors.push(Precursor {
            cn_code: "72071100".to_string(),
            quantity_tonnes: 40.0,
            direct_emissions: Some(76.0),
            reporting_year: 2026,
            evidence_ref: None,
        });
        let with = ReferenceEngine.calculate(&i).unwrap();
        i.include_precursors = false;
        let without = ReferenceEngine.calculate(&i).unwrap();
        assert!((with.total_embedded_emissions - without.total_embedded_emissions - 76.0).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_zero_quantity() {
        let mut i = input("72081000", CalculationMethod::DefaultValues);
        i.quantity_tonnes = 0.0;
        assert!(ReferenceEngine.calculate(&i).is_err());
    }

    #[test]
    fn test_input_from_entry_resolves_year() {
        let mut factors = BTreeMap::new();
        factors.insert(2026, 0.025);
        let mut markups = BTreeMap::new();
        markups.insert(2026, 0.1);
        let version = RegulatoryVersion::pending("v", factors, markups);

        let entry = Entry::new(
            "IN",
            "MRN-1",
            100.0,
            chrono::NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            "72081000",
            2026,
            CalculationMethod::DefaultValues,
        );
        let calc_input = CalcInput::from_entry(&entry, &version, true, 5_000);
        assert_eq!(calc_input.phase_in_factor, 0.025);
        assert_eq!(calc_input.default_markup, 0.1);
        assert_eq!(calc_input.timeout_ms, 5_000);
    }
}

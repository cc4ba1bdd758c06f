//! The core declaration record
//!
//! One `Entry` declares the embedded emissions of one imported good. It is
//! created pending, then mutated by the calculation, validation,
//! verification, change-control and recalculation stages, each through the
//! versioned store's conditional writes.

use crate::issue::Issue;
use crate::store::VersionedRecord;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How the embedded emissions were (or will be) determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationMethod {
    DefaultValues,
    ActualValues,
    Combined,
}

impl CalculationMethod {
    /// Actual-data methods only count once an accredited verifier has
    /// signed the figures off.
    pub fn requires_verification(&self) -> bool {
        matches!(
            self,
            CalculationMethod::ActualValues | CalculationMethod::Combined
        )
    }
}

impl fmt::Display for CalculationMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CalculationMethod::DefaultValues => write!(f, "default_values"),
            CalculationMethod::ActualValues => write!(f, "actual_values"),
            CalculationMethod::Combined => write!(f, "combined"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Pending,
    Pass,
    Warning,
    Blocked,
}

/// Verification protocol states. The transition table lives in the
/// workflow crate; this enum is the persisted status field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    NotVerified,
    VerifierAssigned,
    VerifierSatisfactory,
    VerifierUnsatisfactory,
    CorrectionRequired,
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            VerificationStatus::NotVerified => "not_verified",
            VerificationStatus::VerifierAssigned => "verifier_assigned",
            VerificationStatus::VerifierSatisfactory => "verifier_satisfactory",
            VerificationStatus::VerifierUnsatisfactory => "verifier_unsatisfactory",
            VerificationStatus::CorrectionRequired => "correction_required",
        };
        write!(f, "{}", s)
    }
}

/// Numeric output of the external calculation function. Persisted as a
/// whole; partial writes never happen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationResult {
    /// Direct specific emissions (tCO2e per tonne)
    pub direct_emissions: f64,
    /// Indirect specific emissions (tCO2e per tonne)
    pub indirect_emissions: f64,
    /// Absolute precursor emissions (tCO2e)
    pub precursor_emissions: f64,
    /// Total embedded emissions for the declared quantity (tCO2e)
    pub total_embedded_emissions: f64,
    /// Chargeable share after the phase-in factor (tCO2e)
    pub chargeable_emissions: f64,
    /// Certificates owed for this entry, rounded up
    pub certificates_required: u64,
    /// Phase-in factor that was applied
    pub cbam_factor_applied: f64,
    /// Emissions forgiven under free allocation
    pub free_allocation_adjustment: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub production_route: Option<String>,
    /// Default specific value used, when the default-values method applied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value_used: Option<f64>,
}

/// An input good consumed in producing the declared good.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Precursor {
    pub cn_code: String,
    pub quantity_tonnes: f64,
    /// Embedded emissions of the precursor (tCO2e); mandatory for a
    /// complete declaration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direct_emissions: Option<f64>,
    pub reporting_year: i32,
    /// Evidence reference excusing a year mismatch with the parent entry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence_ref: Option<String>,
}

/// Verifier opinion captured on the entry at sign-off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationOpinion {
    pub verifier_id: String,
    pub accreditation_number: String,
    pub satisfactory: bool,
    /// Evidence references; non-empty for satisfactory opinions
    #[serde(default)]
    pub evidence_refs: Vec<String>,
    /// Verification report identifier; required for satisfactory opinions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_id: Option<String>,
    /// Documented findings; required for unsatisfactory opinions
    #[serde(default)]
    pub findings: Vec<String>,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,

    // Import metadata
    pub origin_country: String,
    pub customs_reference: String,
    pub quantity_tonnes: f64,
    pub import_date: NaiveDate,

    /// Combined Nomenclature classification code (8 digits)
    pub cn_code: String,
    pub reporting_year: i32,
    pub method: CalculationMethod,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub calculation: Option<CalculationResult>,
    #[serde(default)]
    pub precursors: Vec<Precursor>,

    /// Whether a carbon price already paid abroad is claimed as deduction
    #[serde(default)]
    pub carbon_price_claimed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carbon_price_evidence: Option<String>,

    pub validation_status: ValidationStatus,
    #[serde(default)]
    pub blocking_issues: Vec<Issue>,
    #[serde(default)]
    pub warnings: Vec<Issue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compliance_score: Option<u32>,

    pub verification_status: VerificationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_verifier_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_opinion: Option<VerificationOpinion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correction_requested_at: Option<DateTime<Utc>>,

    /// Regulatory version the current calculation was produced under
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regulatory_version_id: Option<String>,

    /// While true the entry must not be recalculated or aggregated until
    /// an approved or rejected change request clears it.
    #[serde(default)]
    pub calculation_frozen: bool,
    #[serde(default)]
    pub reporting_blocked: bool,

    /// Foreign-key references to external records (never dereferenced)
    #[serde(default)]
    pub linked_references: Vec<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub revision: u64,
}

impl Entry {
    /// New pending entry from import metadata.
    pub fn new(
        origin_country: impl Into<String>,
        customs_reference: impl Into<String>,
        quantity_tonnes: f64,
        import_date: NaiveDate,
        cn_code: impl Into<String>,
        reporting_year: i32,
        method: CalculationMethod,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            origin_country: origin_country.into(),
            customs_reference: customs_reference.into(),
            quantity_tonnes,
            import_date,
            cn_code: cn_code.into(),
            reporting_year,
            method,
            calculation: None,
            precursors: Vec::new(),
            carbon_price_claimed: false,
            carbon_price_evidence: None,
            validation_status: ValidationStatus::Pending,
            blocking_issues: Vec::new(),
            warnings: Vec::new(),
            compliance_score: None,
            verification_status: VerificationStatus::NotVerified,
            assigned_verifier_id: None,
            verification_opinion: None,
            correction_requested_at: None,
            regulatory_version_id: None,
            calculation_frozen: false,
            reporting_blocked: false,
            linked_references: Vec::new(),
            created_at: now,
            updated_at: now,
            revision: 0,
        }
    }

    pub fn with_precursor(mut self, precursor: Precursor) -> Self {
        self.precursors.push(precursor);
        self
    }

    pub fn with_carbon_price_claim(mut self, evidence: Option<String>) -> Self {
        self.carbon_price_claimed = true;
        self.carbon_price_evidence = evidence;
        self
    }

    /// Whether the calculation step has produced results.
    pub fn has_emissions(&self) -> bool {
        self.calculation.is_some()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl VersionedRecord for Entry {
    const ENTITY: &'static str = "entry";

    fn id(&self) -> &str {
        &self.id
    }
    fn revision(&self) -> u64 {
        self.revision
    }
    fn set_revision(&mut self, revision: u64) {
        self.revision = revision;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry() -> Entry {
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
    fn test_new_entry_is_pending() {
        let entry = sample_entry();
        assert_eq!(entry.validation_status, ValidationStatus::Pending);
        assert_eq!(entry.verification_status, VerificationStatus::NotVerified);
        assert!(!entry.calculation_frozen);
        assert!(entry.calculation.is_none());
    }

    #[test]
    fn test_method_verification_requirement() {
        assert!(!CalculationMethod::DefaultValues.requires_verification());
        assert!(CalculationMethod::ActualValues.requires_verification());
        assert!(CalculationMethod::Combined.requires_verification());
    }

    #[test]
    fn test_entry_round_trip() {
        let entry = sample_entry().with_precursor(Precursor {
            cn_code: "72071100".to_string(),
            quantity_tonnes: 40.0,
            direct_emissions: Some(76.0),
            reporting_year: 2026,
            evidence_ref: None,
        });

        let json = serde_json::to_string(&entry).unwrap();
        let parsed: Entry = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, entry);
    }

    #[test]
    fn test_status_serde_names() {
        let json = serde_json::to_string(&VerificationStatus::VerifierSatisfactory).unwrap();
        assert_eq!(json, "\"verifier_satisfactory\"");
        let json = serde_json::to_string(&CalculationMethod::DefaultValues).unwrap();
        assert_eq!(json, "\"default_values\"");
    }
}

//! Engine configuration

use crate::audit::AuditMode;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Audit write durability policy
    #[serde(default = "default_audit_mode")]
    pub audit_mode: AuditMode,

    /// Budget for one external calculation call (ms)
    #[serde(rename = "calcTimeoutMs", default = "default_calc_timeout_ms")]
    pub calc_timeout_ms: u64,

    /// Certificate validity window from purchase
    #[serde(rename = "certificateValidityMonths", default = "default_validity_months")]
    pub certificate_validity_months: u32,

    /// Certificate price used for financial impact estimates (EUR)
    #[serde(rename = "certificatePriceEur", default = "default_certificate_price")]
    pub certificate_price_eur: f64,

    /// Materiality variance threshold against a benchmark
    #[serde(rename = "materialityThreshold", default = "default_materiality")]
    pub materiality_threshold: f64,

    /// Earliest reporting year the definitive regime accepts
    #[serde(rename = "minimumReportingYear", default = "default_min_year")]
    pub minimum_reporting_year: i32,

    /// Whether precursor emissions are included in calculations
    #[serde(rename = "includePrecursors", default = "default_true")]
    pub include_precursors: bool,
}

fn default_audit_mode() -> AuditMode {
    AuditMode::BestEffort
}
fn default_calc_timeout_ms() -> u64 {
    10_000
}
fn default_validity_months() -> u32 {
    24
}
fn default_certificate_price() -> f64 {
    80.0
}
fn default_materiality() -> f64 {
    0.05
}
fn default_min_year() -> i32 {
    2026
}
fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            audit_mode: default_audit_mode(),
            calc_timeout_ms: default_calc_timeout_ms(),
            certificate_validity_months: default_validity_months(),
            certificate_price_eur: default_certificate_price(),
            materiality_threshold: default_materiality(),
            minimum_reporting_year: default_min_year(),
            include_precursors: default_true(),
        }
    }
}

impl EngineConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Strict profile: audit writes are transactional.
    pub fn strict() -> Self {
        Self {
            audit_mode: AuditMode::Transactional,
            ..Self::default()
        }
    }
}

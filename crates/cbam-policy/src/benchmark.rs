//! Sectoral benchmark values

use serde::{Deserialize, Serialize};

/// Reference specific emissions for a classification code, supplied by the
/// caller when one is available for the entry's sector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Benchmark {
    pub cn_code: String,
    /// Specific embedded emissions (tCO2e per tonne)
    pub specific_emissions: f64,
    /// Where the benchmark came from (ex: "Commission default values 2026")
    pub source: String,
}

impl Benchmark {
    pub fn new(
        cn_code: impl Into<String>,
        specific_emissions: f64,
        source: impl Into<String>,
    ) -> Self {
        Self {
            cn_code: cn_code.into(),
            specific_emissions,
            source: source.into(),
        }
    }
}

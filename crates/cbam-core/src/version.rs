//! Versioned regulatory constants
//!
//! A regulatory version bundles the year-indexed phase-in factors and
//! default-value markups. Exactly one version is active at a time; the
//! active pointer is a separate single-row record so activation is one
//! conditional write.

use crate::store::VersionedRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionStatus {
    PendingActivation,
    Active,
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegulatoryVersion {
    pub id: String,
    pub name: String,
    pub status: VersionStatus,
    /// Phase-in factor by reporting year (0.0..=1.0)
    pub phase_in_factors: BTreeMap<i32, f64>,
    /// Default-value markup by reporting year
    pub default_markups: BTreeMap<i32, f64>,
    /// True only for the hard-coded fallback, never for a registered row
    #[serde(default)]
    pub is_fallback: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activated_at: Option<DateTime<Utc>>,
    pub revision: u64,
}

impl RegulatoryVersion {
    pub fn pending(
        name: impl Into<String>,
        phase_in_factors: BTreeMap<i32, f64>,
        default_markups: BTreeMap<i32, f64>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            status: VersionStatus::PendingActivation,
            phase_in_factors,
            default_markups,
            is_fallback: false,
            created_at: Utc::now(),
            activated_at: None,
            revision: 0,
        }
    }

    /// Factor for a year; the latest year at or below is used, 1.0 once
    /// past the table.
    pub fn phase_in_factor(&self, year: i32) -> f64 {
        lookup_year(&self.phase_in_factors, year).unwrap_or(1.0)
    }

    /// Markup for a year; 0.0 outside the table.
    pub fn default_markup(&self, year: i32) -> f64 {
        lookup_year(&self.default_markups, year).unwrap_or(0.0)
    }
}

fn lookup_year(table: &BTreeMap<i32, f64>, year: i32) -> Option<f64> {
    table.range(..=year).next_back().map(|(_, v)| *v)
}

impl VersionedRecord for RegulatoryVersion {
    const ENTITY: &'static str = "regulatory_version";

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

/// Single-row pointer naming the currently active version. Flipping it is
/// the atomic step of activation: readers either see the old version or
/// the new one, never both or neither.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveVersionPointer {
    pub id: String,
    pub version_id: String,
    pub flipped_at: DateTime<Utc>,
    pub revision: u64,
}

impl ActiveVersionPointer {
    pub const SINGLETON_ID: &'static str = "active";

    pub fn pointing_at(version_id: impl Into<String>) -> Self {
        Self {
            id: Self::SINGLETON_ID.to_string(),
            version_id: version_id.into(),
            flipped_at: Utc::now(),
            revision: 0,
        }
    }
}

impl VersionedRecord for ActiveVersionPointer {
    const ENTITY: &'static str = "active_version_pointer";

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

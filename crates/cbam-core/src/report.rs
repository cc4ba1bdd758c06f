//! Periodic compliance reports

use crate::store::VersionedRecord;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One reporting quarter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportingPeriod {
    pub year: i32,
    /// 1..=4
    pub quarter: u8,
}

impl ReportingPeriod {
    pub fn new(year: i32, quarter: u8) -> Self {
        Self { year, quarter }
    }

    /// The quarter field also arrives through deserialization, so the
    /// constructor cannot guarantee it; callers gate on this.
    pub fn is_valid(&self) -> bool {
        (1..=4).contains(&self.quarter)
    }

    /// Inclusive start and end dates of the quarter. `None` for an
    /// out-of-range quarter.
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        if !self.is_valid() {
            return None;
        }
        let start_month = (self.quarter as u32 - 1) * 3 + 1;
        let start = NaiveDate::from_ymd_opt(self.year, start_month, 1)?;
        let end = if self.quarter == 4 {
            NaiveDate::from_ymd_opt(self.year, 12, 31)?
        } else {
            NaiveDate::from_ymd_opt(self.year, start_month + 3, 1)?.pred_opt()?
        };
        Some((start, end))
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        match self.date_range() {
            Some((start, end)) => date >= start && date <= end,
            None => false,
        }
    }

    pub fn label(&self) -> String {
        format!("{}-Q{}", self.year, self.quarter)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declarant {
    pub name: String,
    /// EORI number of the reporting declarant
    pub eori: String,
}

/// An entry excluded from a report, with every reason it failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcludedEntry {
    pub entry_id: String,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReportTotals {
    pub total_quantity_tonnes: f64,
    pub direct_emissions: f64,
    pub indirect_emissions: f64,
    pub total_embedded_emissions: f64,
    pub chargeable_emissions: f64,
    /// Rounded up to the nearest whole unit per regulation
    pub certificates_required: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Draft,
    Submitted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: String,
    pub period: ReportingPeriod,
    pub declarant: Declarant,
    /// Eligible entries only
    pub entry_ids: Vec<String>,
    /// Ineligible entries with recorded reasons, never silently dropped
    pub excluded: Vec<ExcludedEntry>,
    pub totals: ReportTotals,
    /// Total embedded emissions keyed by CN code
    pub by_cn_code: BTreeMap<String, f64>,
    /// Total embedded emissions keyed by origin country
    pub by_country: BTreeMap<String, f64>,
    /// Total embedded emissions keyed by calculation method
    pub by_method: BTreeMap<String, f64>,
    pub status: ReportStatus,
    pub generated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
    pub revision: u64,
}

impl Report {
    pub fn draft(period: ReportingPeriod, declarant: Declarant) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            period,
            declarant,
            entry_ids: Vec::new(),
            excluded: Vec::new(),
            totals: ReportTotals::default(),
            by_cn_code: BTreeMap::new(),
            by_country: BTreeMap::new(),
            by_method: BTreeMap::new(),
            status: ReportStatus::Draft,
            generated_at: Utc::now(),
            submitted_at: None,
            revision: 0,
        }
    }

    pub fn is_submitted(&self) -> bool {
        self.status == ReportStatus::Submitted
    }

    pub fn references_entry(&self, entry_id: &str) -> bool {
        self.entry_ids.iter().any(|id| id == entry_id)
    }
}

impl VersionedRecord for Report {
    const ENTITY: &'static str = "report";

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

    #[test]
    fn test_quarter_ranges() {
        let q1 = ReportingPeriod::new(2026, 1);
        let (start, end) = q1.date_range().unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2026, 3, 31).unwrap());

        let q4 = ReportingPeriod::new(2026, 4);
        let (start, end) = q4.date_range().unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2026, 10, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2026, 12, 31).unwrap());
    }

    #[test]
    fn test_out_of_range_quarters_have_no_range() {
        for quarter in [0u8, 5, 9] {
            let period = ReportingPeriod::new(2026, quarter);
            assert!(!period.is_valid());
            assert!(period.date_range().is_none());
            assert!(!period.contains(NaiveDate::from_ymd_opt(2026, 6, 1).unwrap()));
        }
    }

    #[test]
    fn test_period_contains() {
        let q2 = ReportingPeriod::new(2026, 2);
        assert!(q2.contains(NaiveDate::from_ymd_opt(2026, 4, 1).unwrap()));
        assert!(q2.contains(NaiveDate::from_ymd_opt(2026, 6, 30).unwrap()));
        assert!(!q2.contains(NaiveDate::from_ymd_opt(2026, 7, 1).unwrap()));
    }

    #[test]
    fn test_draft_report() {
        let report = Report::draft(
            ReportingPeriod::new(2026, 1),
            Declarant {
                name: "Acme Imports".to_string(),
                eori: "DE123456789".to_string(),
            },
        );
        assert_eq!(report.status, ReportStatus::Draft);
        assert!(!report.is_submitted());
        assert!(report.entry_ids.is_empty());
    }
}

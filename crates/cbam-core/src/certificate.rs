//! Tradable compliance certificates
//!
//! One certificate unit covers one tonne of chargeable emissions. A partial
//! surrender splits the record: the original keeps the remainder, a new
//! surrendered-status record holds the consumed portion, and the quantities
//! always sum to the pre-split total.

use crate::store::VersionedRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateStatus {
    Active,
    Surrendered,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Certificate {
    pub id: String,
    pub quantity: u64,
    pub price_per_unit: f64,
    pub status: CertificateStatus,
    pub purchased_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub surrendered_for_report_id: Option<String>,
    /// Original certificate this record was split from, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub split_from: Option<String>,
    pub revision: u64,
}

impl Certificate {
    pub fn purchase(quantity: u64, price_per_unit: f64, validity_months: u32) -> Self {
        let purchased_at = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            quantity,
            price_per_unit,
            status: CertificateStatus::Active,
            purchased_at,
            expires_at: purchased_at + chrono::Months::new(validity_months),
            surrendered_for_report_id: None,
            split_from: None,
            revision: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == CertificateStatus::Active
    }

    pub fn is_expired_by(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

impl VersionedRecord for Certificate {
    const ENTITY: &'static str = "certificate";

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

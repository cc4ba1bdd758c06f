//! Change-control and recalculation request records

use crate::entry::CalculationResult;
use crate::store::VersionedRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeRequestStatus {
    PendingImpactAnalysis,
    ImpactAnalyzed,
    ApprovedAndExecuted,
    Rejected,
}

impl fmt::Display for ChangeRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            ChangeRequestStatus::PendingImpactAnalysis => "pending_impact_analysis",
            ChangeRequestStatus::ImpactAnalyzed => "impact_analyzed",
            ChangeRequestStatus::ApprovedAndExecuted => "approved_and_executed",
            ChangeRequestStatus::Rejected => "rejected",
        };
        write!(f, "{}", s)
    }
}

/// Simulated recalculation deltas relative to the current persisted values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactAnalysis {
    pub emissions_before: f64,
    pub emissions_after: f64,
    pub emissions_delta: f64,
    pub certificates_before: u64,
    pub certificates_after: u64,
    pub certificates_delta: i64,
    /// Delta priced at the configured certificate price (EUR)
    pub financial_delta: f64,
    /// Whether the applicable benchmark or default value differs
    pub benchmark_changed: bool,
    pub analyzed_at: DateTime<Utc>,
}

/// A classification (CN code) change pending impact analysis and approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRequest {
    pub id: String,
    pub entry_id: String,
    pub old_cn_code: String,
    pub new_cn_code: String,
    pub status: ChangeRequestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub impact: Option<ImpactAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub justification: Option<String>,
    pub requested_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_by: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
    pub revision: u64,
}

impl ChangeRequest {
    pub fn open(
        entry_id: impl Into<String>,
        old_cn_code: impl Into<String>,
        new_cn_code: impl Into<String>,
        requested_by: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            entry_id: entry_id.into(),
            old_cn_code: old_cn_code.into(),
            new_cn_code: new_cn_code.into(),
            status: ChangeRequestStatus::PendingImpactAnalysis,
            impact: None,
            justification: None,
            requested_by: requested_by.into(),
            decided_by: None,
            created_at: Utc::now(),
            decided_at: None,
            revision: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(
            self.status,
            ChangeRequestStatus::PendingImpactAnalysis | ChangeRequestStatus::ImpactAnalyzed
        )
    }
}

impl VersionedRecord for ChangeRequest {
    const ENTITY: &'static str = "change_request";

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

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecalculationStatus {
    PendingApproval,
    Approved,
    Executed,
    Rejected,
}

impl fmt::Display for RecalculationStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            RecalculationStatus::PendingApproval => "pending_approval",
            RecalculationStatus::Approved => "approved",
            RecalculationStatus::Executed => "executed",
            RecalculationStatus::Rejected => "rejected",
        };
        write!(f, "{}", s)
    }
}

/// Per-entry outcome of a batch recalculation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryRecalcResult {
    pub entry_id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Approval-gated batch re-execution against a new regulatory version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecalculationRequest {
    pub id: String,
    pub entry_ids: Vec<String>,
    pub target_version_id: String,
    pub reason: String,
    pub status: RecalculationStatus,
    pub requested_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    #[serde(default)]
    pub results: Vec<EntryRecalcResult>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<DateTime<Utc>>,
    pub revision: u64,
}

impl RecalculationRequest {
    pub fn open(
        entry_ids: Vec<String>,
        target_version_id: impl Into<String>,
        reason: impl Into<String>,
        requested_by: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            entry_ids,
            target_version_id: target_version_id.into(),
            reason: reason.into(),
            status: RecalculationStatus::PendingApproval,
            requested_by: requested_by.into(),
            approved_by: None,
            results: Vec::new(),
            created_at: Utc::now(),
            executed_at: None,
            revision: 0,
        }
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.ok).count()
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| !r.ok).count()
    }
}

impl VersionedRecord for RecalculationRequest {
    const ENTITY: &'static str = "recalculation_request";

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

/// Append-only history row persisted before every supersession of an
/// entry's calculation. The only way back to a prior state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationSnapshot {
    pub id: String,
    pub entry_id: String,
    pub prior: CalculationResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prior_version_id: Option<String>,
    pub reason: String,
    pub taken_at: DateTime<Utc>,
    /// blake3 over the serialized prior values; makes history tamper-evident
    pub content_hash: String,
    pub revision: u64,
}

impl CalculationSnapshot {
    pub fn capture(
        entry_id: impl Into<String>,
        prior: CalculationResult,
        prior_version_id: Option<String>,
        reason: impl Into<String>,
    ) -> Self {
        let payload = serde_json::to_vec(&prior).unwrap_or_default();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            entry_id: entry_id.into(),
            content_hash: format!("blake3:{}", blake3::hash(&payload)),
            prior,
            prior_version_id,
            reason: reason.into(),
            taken_at: Utc::now(),
            revision: 0,
        }
    }
}

impl VersionedRecord for CalculationSnapshot {
    const ENTITY: &'static str = "calculation_snapshot";

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

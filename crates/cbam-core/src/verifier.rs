//! Accredited verifier reference data
//!
//! Read-only from the verification state machine's point of view.

use crate::store::VersionedRecord;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifierStatus {
    Active,
    Suspended,
    Revoked,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verifier {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accreditation_number: Option<String>,
    pub status: VerifierStatus,
    pub accreditation_expires: NaiveDate,
    pub revision: u64,
}

impl Verifier {
    pub fn new(
        name: impl Into<String>,
        accreditation_number: impl Into<String>,
        accreditation_expires: NaiveDate,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            accreditation_number: Some(accreditation_number.into()),
            status: VerifierStatus::Active,
            accreditation_expires,
            revision: 0,
        }
    }

    /// Eligible to take assignments: active, accredited, not expired.
    pub fn eligible_on(&self, date: NaiveDate) -> std::result::Result<(), String> {
        if self.status != VerifierStatus::Active {
            return Err(format!("verifier {} is not active", self.id));
        }
        if self.accreditation_number.is_none() {
            return Err(format!("verifier {} has no accreditation number", self.id));
        }
        if self.accreditation_expires < date {
            return Err(format!(
                "verifier {} accreditation expired on {}",
                self.id, self.accreditation_expires
            ));
        }
        Ok(())
    }
}

impl VersionedRecord for Verifier {
    const ENTITY: &'static str = "verifier";

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

//! Validation issues
//!
//! Issues are produced by the rule evaluator and retained verbatim on the
//! entry for audit. Every issue carries the regulation citation and enough
//! structured detail to be rendered without further lookups.

use serde::{Deserialize, Serialize};

/// A single tagged finding from one validation rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    /// Rule identifier (ex: "mandatory_fields", "materiality_variance")
    pub rule_id: String,

    /// Human-readable rule name
    pub rule_name: String,

    /// What went wrong, with current vs required values inline
    pub message: String,

    /// Regulation citation backing the rule
    pub citation: String,

    pub severity: IssueSeverity,

    /// Field or sub-record the issue points at
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Additional structured context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

impl Issue {
    pub fn blocking(
        rule_id: impl Into<String>,
        rule_name: impl Into<String>,
        message: impl Into<String>,
        citation: impl Into<String>,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            rule_name: rule_name.into(),
            message: message.into(),
            citation: citation.into(),
            severity: IssueSeverity::Blocking,
            location: None,
            context: None,
        }
    }

    pub fn warning(
        rule_id: impl Into<String>,
        rule_name: impl Into<String>,
        message: impl Into<String>,
        citation: impl Into<String>,
    ) -> Self {
        Self {
            severity: IssueSeverity::Warning,
            ..Self::blocking(rule_id, rule_name, message, citation)
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }

    pub fn is_blocking(&self) -> bool {
        self.severity == IssueSeverity::Blocking
    }
}

/// Blocking issues prevent an entry from reaching a reportable state;
/// warnings are advisory only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Warning,
    Blocking,
}

//! Submission payload rendering

use cbam_core::error::{CbamError, Result};
use cbam_core::report::Report;
use serde_json::{json, Value};

/// Render the registry submission payload for a report. Pure projection;
/// the report record itself is the source of truth.
pub fn to_submission_json(report: &Report) -> Result<Value> {
    let totals = serde_json::to_value(&report.totals)
        .map_err(|e| CbamError::Serialize(e.to_string()))?;
    let excluded = serde_json::to_value(&report.excluded)
        .map_err(|e| CbamError::Serialize(e.to_string()))?;

    Ok(json!({
        "report_id": report.id,
        "period": report.period.label(),
        "declarant": {
            "name": report.declarant.name,
            "eori": report.declarant.eori,
        },
        "entries": report.entry_ids,
        "excluded": excluded,
        "totals": totals,
        "breakdowns": {
            "by_cn_code": report.by_cn_code,
            "by_country": report.by_country,
            "by_method": report.by_method,
        },
        "status": report.status,
        "generated_at": report.generated_at,
        "submitted_at": report.submitted_at,
    }))
}

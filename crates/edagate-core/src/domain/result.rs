//! The composite evaluation result handed back to the caller.

use crate::domain::backend::BackendKind;
use crate::domain::bundle::SubmissionId;
use crate::domain::outcome::BackendOutcome;
use crate::domain::score::ScoreBreakdown;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Where a result bundle was stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveLocation {
    /// Local persistent copy; always written.
    pub local_path: PathBuf,

    /// External sink location, when a sink is configured and the upload worked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
}

/// Result of one evaluation run.
///
/// References the design by id and digest, never by value. A resubmission
/// produces a new result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub submission_id: SubmissionId,
    pub bundle_digest: String,
    pub top_module: String,
    pub scores: ScoreBreakdown,
    /// Exactly one outcome per enabled backend.
    pub outcomes: BTreeMap<BackendKind, BackendOutcome>,
    pub archive: Option<ArchiveLocation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl EvaluationResult {
    pub fn enabled_backends(&self) -> Vec<BackendKind> {
        self.outcomes.keys().copied().collect()
    }

    pub fn duration_ms(&self) -> u64 {
        (self.finished_at - self.started_at)
            .num_milliseconds()
            .max(0) as u64
    }

    /// Compact document for the response layer: scores, one summary line per
    /// backend, and the archive reference. Raw reports stay in the archive.
    pub fn to_document(&self) -> Value {
        let backends: serde_json::Map<String, Value> = self
            .outcomes
            .iter()
            .map(|(kind, outcome)| {
                (
                    kind.name().to_string(),
                    json!({
                        "status": outcome.label(),
                        "attempts": outcome.attempts(),
                        "summary": outcome.summary(),
                    }),
                )
            })
            .collect();

        json!({
            "submission_id": self.submission_id,
            "bundle_digest": self.bundle_digest,
            "top_module": self.top_module,
            "functionality_score": self.scores.functionality_score,
            "area_score": self.scores.area_score,
            "delay_score": self.scores.delay_score,
            "power_score": self.scores.power_score,
            "overall_score": self.scores.overall_score,
            "backends": backends,
            "archive": self.archive,
            "warnings": self.warnings,
            "duration_ms": self.duration_ms(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EvaluationResult {
        let started_at = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .expect("parse RFC3339")
            .with_timezone(&Utc);
        let mut outcomes = BTreeMap::new();
        outcomes.insert(
            BackendKind::Openlane,
            BackendOutcome::Timeout {
                elapsed_ms: 3_600_000,
                attempts: 1,
            },
        );
        EvaluationResult {
            submission_id: SubmissionId::new(),
            bundle_digest: "ab".repeat(32),
            top_module: "adder".to_string(),
            scores: ScoreBreakdown {
                functionality_score: 0.0,
                area_score: None,
                delay_score: None,
                power_score: None,
                overall_score: 0.0,
                functionality_sources: vec![],
                ppa_sources: vec![],
            },
            outcomes,
            archive: None,
            warnings: vec![],
            started_at,
            finished_at: started_at + chrono::Duration::milliseconds(1500),
        }
    }

    #[test]
    fn test_document_has_nullable_subscores() {
        let doc = sample().to_document();
        assert!(doc["area_score"].is_null());
        assert!(doc["power_score"].is_null());
        assert_eq!(doc["overall_score"], 0.0);
        assert_eq!(doc["backends"]["openlane"]["status"], "timeout");
        assert_eq!(doc["duration_ms"], 1500);
    }

    #[test]
    fn test_result_serde_roundtrip_keeps_outcome_keys() {
        let result = sample();
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"openlane\""));
        let back: EvaluationResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.enabled_backends(), vec![BackendKind::Openlane]);
    }
}

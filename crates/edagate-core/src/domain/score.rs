//! Normalized sub-scores and the weighted overall score.

use crate::domain::backend::BackendKind;
use serde::{Deserialize, Serialize};

/// Scores for one submission, each in [0, 1].
///
/// `None` means "not evaluated", which is distinct from "evaluated and scored
/// 0".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub functionality_score: f64,
    pub area_score: Option<f64>,
    pub delay_score: Option<f64>,
    pub power_score: Option<f64>,
    pub overall_score: f64,

    /// Simulators the functionality score was derived from.
    pub functionality_sources: Vec<BackendKind>,

    /// Backends the area/delay/power scores were derived from, physical
    /// design first.
    pub ppa_sources: Vec<BackendKind>,
}

impl ScoreBreakdown {
    /// Caller-side functionality gate. The aggregator itself never gates.
    pub fn meets_functionality(&self, threshold: f64) -> bool {
        self.functionality_score >= threshold
    }

    /// Number of sub-scores that contributed to the overall score.
    pub fn evaluated_count(&self) -> usize {
        1 + [self.area_score, self.delay_score, self.power_score]
            .iter()
            .filter(|s| s.is_some())
            .count()
    }
}

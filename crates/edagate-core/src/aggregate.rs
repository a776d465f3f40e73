//! Score aggregation.
//!
//! Pure, total functions from an outcome map to a [`ScoreBreakdown`]:
//! - Functionality comes only from simulators; any non-success simulator
//!   outcome forces it to 0.
//! - Area/delay/power come from the physical-design report, each metric the
//!   report lacks falling back to synthesis, normalized as
//!   `clamp(baseline / measured, 0, 1)`. No measured value means `None`
//!   ("not evaluated"), not 0.
//! - The overall score is a weighted sum over the sub-scores that are present,
//!   with weights renormalized to sum to 1.

use crate::domain::report::clamp_unit;
use crate::domain::{BackendKind, BackendOutcome, ReportMetrics, ScoreBreakdown};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Relative weight of each sub-score before renormalization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub functionality: f64,
    pub area: f64,
    pub delay: f64,
    pub power: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            functionality: 0.5,
            area: 0.15,
            delay: 0.20,
            power: 0.15,
        }
    }
}

impl ScoreWeights {
    /// All weights finite and non-negative, functionality strictly positive.
    pub fn validate(&self) -> Result<(), String> {
        let all = [
            ("functionality", self.functionality),
            ("area", self.area),
            ("delay", self.delay),
            ("power", self.power),
        ];
        for (name, weight) in all {
            if !weight.is_finite() || weight < 0.0 {
                return Err(format!("weight {} must be a non-negative number, got {}", name, weight));
            }
        }
        if self.functionality == 0.0 {
            return Err("functionality weight must be positive".to_string());
        }
        Ok(())
    }
}

/// Reference values a measured metric is normalized against.
///
/// Units must match the report the metric comes from (µm² for placed area,
/// tool units or cell count for synthesis area, ns, mW).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceBaseline {
    pub area: Option<f64>,
    pub delay_ns: Option<f64>,
    pub power_mw: Option<f64>,
}

/// Everything the aggregator needs besides the outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScoringPolicy {
    pub weights: ScoreWeights,
    pub baseline: ReferenceBaseline,
    /// Target clock period, used as the delay baseline when none is configured.
    pub clock_period_ns: Option<f64>,
}

impl ScoringPolicy {
    pub fn new(weights: ScoreWeights, baseline: ReferenceBaseline) -> Self {
        Self {
            weights,
            baseline,
            clock_period_ns: None,
        }
    }

    pub fn with_clock_period(mut self, clock_period_ns: Option<f64>) -> Self {
        self.clock_period_ns = clock_period_ns;
        self
    }

    fn delay_baseline(&self) -> Option<f64> {
        self.baseline.delay_ns.or(self.clock_period_ns)
    }
}

/// Normalize a measured metric against its baseline.
///
/// Lower is better: at or below the baseline scores 1, far above it approaches
/// 0 without reaching it. A measured value of 0 or less (degenerate design)
/// scores 1. Missing or non-finite inputs are not evaluated.
pub fn normalize_against_baseline(baseline: Option<f64>, measured: Option<f64>) -> Option<f64> {
    let baseline = baseline.filter(|b| b.is_finite() && *b > 0.0)?;
    let measured = measured.filter(|m| m.is_finite())?;
    if measured <= 0.0 {
        return Some(1.0);
    }
    Some(clamp_unit(baseline / measured))
}

/// Aggregate the outcomes of every enabled backend into a score breakdown.
///
/// The keys of `outcomes` are the enabled backend set.
pub fn aggregate(
    outcomes: &BTreeMap<BackendKind, BackendOutcome>,
    policy: &ScoringPolicy,
) -> ScoreBreakdown {
    let (functionality_score, functionality_sources) = functionality(outcomes);

    let (ppa, ppa_sources) = ppa_metrics(outcomes);
    let area_score = normalize_against_baseline(policy.baseline.area, ppa.area);
    let delay_score = normalize_against_baseline(policy.delay_baseline(), ppa.delay_ns);
    let power_score = normalize_against_baseline(policy.baseline.power_mw, ppa.power_mw);

    let overall_score = weighted_overall(
        functionality_score,
        area_score,
        delay_score,
        power_score,
        &policy.weights,
    );

    ScoreBreakdown {
        functionality_score,
        area_score,
        delay_score,
        power_score,
        overall_score,
        functionality_sources,
        ppa_sources,
    }
}

/// Minimum functionality across enabled simulators; 0 if any did not succeed
/// or none is enabled.
fn functionality(outcomes: &BTreeMap<BackendKind, BackendOutcome>) -> (f64, Vec<BackendKind>) {
    let simulators: Vec<(BackendKind, &BackendOutcome)> = outcomes
        .iter()
        .filter(|(kind, _)| kind.is_simulator())
        .map(|(kind, outcome)| (*kind, outcome))
        .collect();

    if simulators.is_empty() {
        return (0.0, Vec::new());
    }

    let score = simulators
        .iter()
        .map(|(_, outcome)| {
            outcome
                .report()
                .and_then(|r| r.metrics().functionality)
                .map(clamp_unit)
                .unwrap_or(0.0)
        })
        .fold(1.0_f64, f64::min);

    (score, simulators.into_iter().map(|(kind, _)| kind).collect())
}

/// Each PPA metric from the first successful report that measured it,
/// physical design before synthesis, plus the backends that contributed.
fn ppa_metrics(
    outcomes: &BTreeMap<BackendKind, BackendOutcome>,
) -> (ReportMetrics, Vec<BackendKind>) {
    let mut merged = ReportMetrics::default();
    let mut sources = Vec::new();

    for kind in [BackendKind::Openlane, BackendKind::Yosys] {
        let Some(report) = outcomes.get(&kind).and_then(BackendOutcome::report) else {
            continue;
        };
        let measured = report.metrics();
        let mut contributed = false;
        for (slot, value) in [
            (&mut merged.area, measured.area),
            (&mut merged.delay_ns, measured.delay_ns),
            (&mut merged.power_mw, measured.power_mw),
        ] {
            if slot.is_none() && value.is_some() {
                *slot = value;
                contributed = true;
            }
        }
        if contributed {
            sources.push(kind);
        }
    }

    (merged, sources)
}

/// Weighted sum over present sub-scores, weights renormalized to sum to 1.
pub fn weighted_overall(
    functionality: f64,
    area: Option<f64>,
    delay: Option<f64>,
    power: Option<f64>,
    weights: &ScoreWeights,
) -> f64 {
    let terms = [
        (Some(functionality), weights.functionality),
        (area, weights.area),
        (delay, weights.delay),
        (power, weights.power),
    ];

    let (weighted, total_weight) = terms
        .iter()
        .filter_map(|(score, weight)| score.map(|s| (clamp_unit(s), *weight)))
        .fold((0.0, 0.0), |(sum, total), (score, weight)| {
            (sum + score * weight, total + weight)
        });

    if total_weight <= 0.0 {
        return 0.0;
    }
    clamp_unit(weighted / total_weight)
}

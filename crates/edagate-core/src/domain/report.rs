//! Typed tool reports.
//!
//! Tool services answer with loosely-typed JSON whose layout differs per tool
//! and per tool version. [`ToolReport::from_payload`] is the single place that
//! schema flexibility is tolerated: it maps a payload onto one variant per
//! backend role and keeps the raw payload for archival. Scoring only ever sees
//! [`ReportMetrics`].

use crate::domain::backend::BackendRole;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;

/// Nested objects searched, after the payload root, for metric fields.
const NESTED_SECTIONS: [&str; 4] = ["metrics", "results", "summary", "details"];

/// Errors produced while adapting a payload into a [`ToolReport`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReportError {
    #[error("report payload must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("report is missing required field: {0}")]
    MissingField(&'static str),

    #[error("simulation report carries no assertion counts or functionality score")]
    NoFunctionalityEvidence,
}

/// Outcome of one testbench assertion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssertionResult {
    pub name: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Logic synthesis report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SynthesisReport {
    pub cell_count: Option<u64>,
    /// Estimated area in the tool's units; falls back to cell count for scoring.
    pub area: Option<f64>,
    pub critical_path_ns: Option<f64>,
    pub raw: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
}

/// Simulation report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationReport {
    pub passed_assertions: Option<u64>,
    pub total_assertions: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assertions: Vec<AssertionResult>,
    /// Score computed by the testbench evaluator itself, when it has no counts.
    pub reported_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    pub raw: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
}

impl SimulationReport {
    /// Fraction of passing assertions in [0, 1].
    ///
    /// Zero assertions scores 0.
    pub fn functionality(&self) -> f64 {
        match (self.passed_assertions, self.total_assertions) {
            (Some(_), Some(0)) => 0.0,
            (Some(passed), Some(total)) => clamp_unit(passed as f64 / total as f64),
            _ => self.reported_score.map(clamp_unit).unwrap_or(0.0),
        }
    }
}

/// Physical-design flow report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhysicalDesignReport {
    pub area_um2: Option<f64>,
    pub critical_path_ns: Option<f64>,
    pub power_mw: Option<f64>,
    pub raw: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
}

/// The fields the aggregator consumes, common to every report kind.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReportMetrics {
    pub functionality: Option<f64>,
    pub area: Option<f64>,
    pub delay_ns: Option<f64>,
    pub power_mw: Option<f64>,
}

/// Backend report, one variant per backend role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolReport {
    Synthesis(SynthesisReport),
    Simulation(SimulationReport),
    PhysicalDesign(PhysicalDesignReport),
}

impl ToolReport {
    /// Adapt a raw tool payload into the report shape for `role`.
    pub fn from_payload(
        role: BackendRole,
        payload: Value,
        log: Option<String>,
    ) -> Result<Self, ReportError> {
        if !payload.is_object() {
            return Err(ReportError::NotAnObject(json_type_name(&payload)));
        }

        match role {
            BackendRole::Synthesis => Ok(ToolReport::Synthesis(SynthesisReport {
                cell_count: lookup_u64(
                    &payload,
                    &["cell_count", "num_cells", "number_of_cells", "cells"],
                ),
                area: lookup_f64(&payload, &["area", "chip_area", "estimated_area"]),
                critical_path_ns: lookup_f64(
                    &payload,
                    &["critical_path_ns", "delay_ns", "critical_path", "delay"],
                ),
                raw: payload,
                log,
            })),
            BackendRole::Simulation => adapt_simulation(payload, log).map(ToolReport::Simulation),
            BackendRole::PhysicalDesign => Ok(ToolReport::PhysicalDesign(PhysicalDesignReport {
                area_um2: lookup_f64(
                    &payload,
                    &["area_um2", "die_area_um2", "core_area_um2", "chip_area", "area"],
                ),
                critical_path_ns: lookup_f64(
                    &payload,
                    &["critical_path_ns", "delay_ns", "critical_path", "delay"],
                ),
                power_mw: lookup_f64(&payload, &["power_mw", "total_power_mw", "power"]),
                raw: payload,
                log,
            })),
        }
    }

    pub fn role(&self) -> BackendRole {
        match self {
            ToolReport::Synthesis(_) => BackendRole::Synthesis,
            ToolReport::Simulation(_) => BackendRole::Simulation,
            ToolReport::PhysicalDesign(_) => BackendRole::PhysicalDesign,
        }
    }

    pub fn metrics(&self) -> ReportMetrics {
        match self {
            ToolReport::Synthesis(r) => ReportMetrics {
                functionality: None,
                area: r.area.or(r.cell_count.map(|c| c as f64)),
                delay_ns: r.critical_path_ns,
                power_mw: None,
            },
            ToolReport::Simulation(r) => ReportMetrics {
                functionality: Some(r.functionality()),
                ..ReportMetrics::default()
            },
            ToolReport::PhysicalDesign(r) => ReportMetrics {
                functionality: None,
                area: r.area_um2,
                delay_ns: r.critical_path_ns,
                power_mw: r.power_mw,
            },
        }
    }

    /// The payload exactly as the tool returned it.
    pub fn raw(&self) -> &Value {
        match self {
            ToolReport::Synthesis(r) => &r.raw,
            ToolReport::Simulation(r) => &r.raw,
            ToolReport::PhysicalDesign(r) => &r.raw,
        }
    }

    pub fn log(&self) -> Option<&str> {
        match self {
            ToolReport::Synthesis(r) => r.log.as_deref(),
            ToolReport::Simulation(r) => r.log.as_deref(),
            ToolReport::PhysicalDesign(r) => r.log.as_deref(),
        }
    }
}

fn adapt_simulation(payload: Value, log: Option<String>) -> Result<SimulationReport, ReportError> {
    let output = lookup_str(&payload, &["simulation_output", "output", "stdout"]);
    let mut assertions = lookup(&payload, &["assertions"])
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(parse_assertion).collect::<Vec<_>>())
        .unwrap_or_default();

    let transcript = [output.as_deref(), log.as_deref()];
    if assertions.is_empty() {
        assertions = transcript
            .iter()
            .flatten()
            .flat_map(|text| scan_assertion_lines(text))
            .collect();
    }

    let mut passed = lookup_u64(
        &payload,
        &["passed_assertions", "assertions_passed", "tests_passed", "passed"],
    );
    let mut total = lookup_u64(
        &payload,
        &["total_assertions", "assertions_total", "tests_total", "total"],
    );

    if passed.is_none() && total.is_none() && !assertions.is_empty() {
        total = Some(assertions.len() as u64);
        passed = Some(assertions.iter().filter(|a| a.passed).count() as u64);
    }
    // A bare pass/fail verdict counts as a single assertion.
    if passed.is_none() && total.is_none() {
        if let Some(verdict) = lookup(&payload, &["passed"]).and_then(Value::as_bool) {
            passed = Some(u64::from(verdict));
            total = Some(1);
        }
    }

    match (passed, total) {
        (Some(_), None) => return Err(ReportError::MissingField("total_assertions")),
        (None, Some(_)) => return Err(ReportError::MissingField("passed_assertions")),
        _ => {}
    }

    let reported_score = lookup_f64(&payload, &["functionality_score", "func_score"]).or_else(|| {
        transcript
            .iter()
            .flatten()
            .find_map(|text| scan_func_score(text))
    });

    if passed.is_none() && reported_score.is_none() {
        return Err(ReportError::NoFunctionalityEvidence);
    }

    Ok(SimulationReport {
        passed_assertions: passed,
        total_assertions: total,
        assertions,
        reported_score,
        output,
        raw: payload,
        log,
    })
}

fn parse_assertion(item: &Value) -> Option<AssertionResult> {
    let name = item
        .get("name")
        .or_else(|| item.get("id"))
        .and_then(Value::as_str)?
        .to_string();
    let passed = match item.get("passed") {
        Some(Value::Bool(b)) => *b,
        _ => item
            .get("status")
            .and_then(Value::as_str)
            .map(|s| s.eq_ignore_ascii_case("pass") || s.eq_ignore_ascii_case("passed"))?,
    };
    let message = item
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string);
    Some(AssertionResult {
        name,
        passed,
        message,
    })
}

fn func_score_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"FUNC_SCORE:\s*([0-9]*\.?[0-9]+)").ok())
        .as_ref()
}

fn assertion_line_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^[ \t]*ASSERT(?:ION)?[ \t]+(PASS|FAIL)\b[: \t]*(\S*)").ok())
        .as_ref()
}

/// Parse `FUNC_SCORE: x` from simulator output.
fn scan_func_score(text: &str) -> Option<f64> {
    func_score_re()?
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

/// Parse `ASSERT PASS: name` / `ASSERT FAIL: name` lines.
fn scan_assertion_lines(text: &str) -> Vec<AssertionResult> {
    let Some(re) = assertion_line_re() else {
        return Vec::new();
    };
    re.captures_iter(text)
        .enumerate()
        .map(|(idx, caps)| {
            let name = caps
                .get(2)
                .map(|m| m.as_str())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("assertion_{}", idx + 1));
            AssertionResult {
                name,
                passed: caps.get(1).map(|m| m.as_str() == "PASS").unwrap_or(false),
                message: None,
            }
        })
        .collect()
}

fn lookup<'a>(payload: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    let sections = std::iter::once(payload).chain(
        NESTED_SECTIONS
            .iter()
            .filter_map(|section| payload.get(*section))
            .filter(|v| v.is_object()),
    );
    for section in sections {
        for key in keys {
            match section.get(*key) {
                Some(Value::Null) | None => continue,
                Some(value) => return Some(value),
            }
        }
    }
    None
}

fn lookup_f64(payload: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .find_map(|key| lookup(payload, &[*key]).and_then(value_as_f64))
        .filter(|v| v.is_finite())
}

fn lookup_u64(payload: &Value, keys: &[&str]) -> Option<u64> {
    keys.iter()
        .find_map(|key| lookup(payload, &[*key]).and_then(value_as_u64))
}

fn lookup_str(payload: &Value, keys: &[&str]) -> Option<String> {
    lookup(payload, keys)
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| *f >= 0.0 && f.fract() == 0.0)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub(crate) fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

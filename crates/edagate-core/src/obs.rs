//! Structured lifecycle events for evaluation runs.
//!
//! This module provides:
//! - Submission-scoped tracing spans via the `EvaluationSpan` RAII guard
//! - Emission functions for the run lifecycle: start, per-backend finish,
//!   scoring, archival
//!
//! Events are emitted at `info!` level; sink problems at `warn!`.

use crate::domain::{BackendKind, BackendOutcome, ScoreBreakdown, SubmissionId};
use tracing::{info, warn};

/// RAII guard that enters a submission-scoped span.
///
/// Only for synchronous sections; async code attaches the span with
/// `tracing::Instrument` instead.
pub struct EvaluationSpan {
    _span: tracing::span::EnteredSpan,
}

impl EvaluationSpan {
    pub fn enter(submission_id: SubmissionId) -> Self {
        Self {
            _span: span(submission_id).entered(),
        }
    }
}

/// The span every event of one evaluation is recorded under.
pub fn span(submission_id: SubmissionId) -> tracing::Span {
    tracing::info_span!("edagate.evaluation", submission_id = %submission_id)
}

pub fn emit_evaluation_started(
    submission_id: SubmissionId,
    top_module: &str,
    backends: &[BackendKind],
) {
    let names: Vec<&str> = backends.iter().map(|b| b.name()).collect();
    info!(
        event = "evaluation.started",
        submission_id = %submission_id,
        top_module = %top_module,
        backends = ?names,
    );
}

pub fn emit_backend_finished(submission_id: SubmissionId, kind: BackendKind, outcome: &BackendOutcome) {
    info!(
        event = "backend.finished",
        submission_id = %submission_id,
        backend = %kind,
        status = outcome.label(),
        attempts = outcome.attempts(),
        summary = %outcome.summary(),
    );
}

pub fn emit_evaluation_scored(submission_id: SubmissionId, scores: &ScoreBreakdown, duration_ms: u64) {
    info!(
        event = "evaluation.scored",
        submission_id = %submission_id,
        functionality = scores.functionality_score,
        area = ?scores.area_score,
        delay = ?scores.delay_score,
        power = ?scores.power_score,
        overall = scores.overall_score,
        duration_ms = duration_ms,
    );
}

pub fn emit_archive_written(submission_id: SubmissionId, path: &std::path::Path, bytes: usize) {
    info!(
        event = "archive.written",
        submission_id = %submission_id,
        path = %path.display(),
        bytes = bytes,
    );
}

pub fn emit_archive_sink_failed(submission_id: SubmissionId, error: &dyn std::fmt::Display) {
    warn!(event = "archive.sink_failed", submission_id = %submission_id, error = %error);
}

pub fn emit_archive_failed(submission_id: SubmissionId, error: &dyn std::fmt::Display) {
    warn!(event = "archive.failed", submission_id = %submission_id, error = %error);
}

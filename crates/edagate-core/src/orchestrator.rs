//! Evaluation orchestrator.
//!
//! One run per submission: decide the enabled backends, invoke them
//! concurrently, wait until every one is terminal, aggregate once, archive.
//!
//! Runs are spawned as detached tasks. A caller that stops waiting does not
//! cancel scoring or archival; the result still lands in the results
//! directory.

use crate::aggregate::aggregate;
use crate::archive::{ResultArchiver, ResultSink};
use crate::client::{BackendClient, HealthStatus, ToolService};
use crate::config::GatewayConfig;
use crate::domain::{
    BackendKind, BackendOutcome, DesignBundle, EvaluationOptions, EvaluationResult,
};
use crate::error::GatewayError;
use crate::metrics::METRICS;
use crate::obs;
use crate::registry::{InFlightRegistry, InFlightRun};
use crate::unpack::unpack;
use chrono::Utc;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn, Instrument};

/// Process-wide state shared by every run. Read-only except for the
/// in-flight registry.
pub struct GatewayContext {
    config: GatewayConfig,
    clients: BTreeMap<BackendKind, BackendClient>,
    archiver: ResultArchiver,
    registry: Arc<InFlightRegistry>,
}

impl GatewayContext {
    /// Build a context from one service per backend. A later service for the
    /// same backend replaces an earlier one.
    pub fn new(
        config: GatewayConfig,
        services: Vec<Arc<dyn ToolService>>,
        sink: Option<Arc<dyn ResultSink>>,
    ) -> Self {
        let clients = services
            .into_iter()
            .map(|service| (service.kind(), BackendClient::new(service)))
            .collect();
        let archiver = ResultArchiver::new(config.results_dir.clone(), sink);
        Self {
            config,
            clients,
            archiver,
            registry: Arc::new(InFlightRegistry::new()),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn client(&self, kind: BackendKind) -> Option<&BackendClient> {
        self.clients.get(&kind)
    }

    pub fn archiver(&self) -> &ResultArchiver {
        &self.archiver
    }

    pub fn registry(&self) -> &Arc<InFlightRegistry> {
        &self.registry
    }
}

/// Entry point for evaluations.
#[derive(Clone)]
pub struct Orchestrator {
    ctx: Arc<GatewayContext>,
}

impl Orchestrator {
    pub fn new(ctx: Arc<GatewayContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Arc<GatewayContext> {
        &self.ctx
    }

    /// Unpack `archive` and evaluate it.
    ///
    /// An invalid submission is rejected before any backend is contacted.
    pub async fn submit(&self, archive: Vec<u8>) -> Result<EvaluationResult, GatewayError> {
        let limits = self.ctx.config.limits;
        let bundle = tokio::task::spawn_blocking(move || unpack(&archive, &limits))
            .await
            .map_err(|e| GatewayError::Aborted(e.to_string()))??;
        self.evaluate(bundle).await
    }

    /// Evaluate `bundle` on a detached task and wait for its result.
    pub async fn evaluate(&self, bundle: DesignBundle) -> Result<EvaluationResult, GatewayError> {
        let ctx = Arc::clone(&self.ctx);
        tokio::spawn(Self::run(ctx, bundle))
            .await
            .map_err(|e| GatewayError::Aborted(e.to_string()))
    }

    /// Run one evaluation to completion on the current task.
    pub async fn run(ctx: Arc<GatewayContext>, bundle: DesignBundle) -> EvaluationResult {
        let span = obs::span(bundle.id());
        Self::run_inner(ctx, bundle).instrument(span).await
    }

    async fn run_inner(ctx: Arc<GatewayContext>, bundle: DesignBundle) -> EvaluationResult {
        let started_at = Utc::now();
        let bundle = Arc::new(bundle);
        let submission_id = bundle.id();
        let (enabled, warnings) = Self::enabled_backends(bundle.options());
        for warning in &warnings {
            warn!(%submission_id, "{}", warning);
        }

        METRICS.inc_started();
        obs::emit_evaluation_started(submission_id, bundle.top_module(), &enabled);
        let _guard = ctx.registry.register(InFlightRun {
            submission_id,
            top_module: bundle.top_module().to_string(),
            backends: enabled.clone(),
            started_at,
        });

        let outcomes = Self::invoke_all(&ctx, Arc::clone(&bundle), &enabled).await;

        let policy = ctx.config.scoring_policy(bundle.options());
        let scores = aggregate(&outcomes, &policy);
        let finished_at = Utc::now();

        let mut result = EvaluationResult {
            submission_id,
            bundle_digest: bundle.digest().to_string(),
            top_module: bundle.top_module().to_string(),
            scores,
            outcomes,
            archive: None,
            warnings: warnings.clone(),
            started_at,
            finished_at,
        };
        obs::emit_evaluation_scored(submission_id, &result.scores, result.duration_ms());

        match ctx.archiver.archive(&result).await {
            Ok(receipt) => {
                result.archive = Some(receipt.location);
                result.warnings.extend(receipt.warnings);
            }
            Err(err) => {
                METRICS.inc_archive_failures();
                obs::emit_archive_failed(submission_id, &err);
                result
                    .warnings
                    .push(format!("result archival failed: {}", err));
            }
        }

        METRICS.inc_completed();
        result
    }

    /// One task per enabled backend; returns when all are terminal.
    async fn invoke_all(
        ctx: &Arc<GatewayContext>,
        bundle: Arc<DesignBundle>,
        enabled: &[BackendKind],
    ) -> BTreeMap<BackendKind, BackendOutcome> {
        let submission_id = bundle.id();
        let mut outcomes = BTreeMap::new();
        let mut handles = Vec::new();

        for &kind in enabled {
            let Some(client) = ctx.client(kind).cloned() else {
                let outcome = BackendOutcome::Unavailable {
                    reason: "no client configured".to_string(),
                    attempts: 0,
                };
                obs::emit_backend_finished(submission_id, kind, &outcome);
                outcomes.insert(kind, outcome);
                continue;
            };
            let config = ctx.config.backend_config(kind, bundle.options());
            let bundle = Arc::clone(&bundle);
            let handle = tokio::spawn(
                async move {
                    let outcome = client.invoke(&bundle, &config).await;
                    obs::emit_backend_finished(submission_id, kind, &outcome);
                    outcome
                }
                .in_current_span(),
            );
            handles.push((kind, handle));
        }

        let (kinds, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        for (kind, joined) in kinds.into_iter().zip(join_all(handles).await) {
            let outcome = joined.unwrap_or_else(|err| {
                warn!(backend = %kind, error = %err, "Backend task did not complete");
                BackendOutcome::ToolFailure {
                    kind: "task_panicked".to_string(),
                    message: err.to_string(),
                    exit_code: None,
                    logs: None,
                    attempts: 1,
                }
            });
            outcomes.insert(kind, outcome);
        }
        outcomes
    }

    /// Backends to run for `options`, plus warnings about adjustments.
    ///
    /// `fast_mode` drops the physical-design flow. At least one simulator
    /// always runs: if none is enabled, verilator is added back.
    pub fn enabled_backends(options: &EvaluationOptions) -> (Vec<BackendKind>, Vec<String>) {
        let mut enabled = options.enabled_backends.clone();
        let mut warnings = Vec::new();

        if options.fast_mode && enabled.remove(&BackendKind::Openlane) {
            debug!("fast_mode: skipping openlane");
        }
        if !enabled.iter().any(|k| k.is_simulator()) {
            enabled.insert(BackendKind::Verilator);
            warnings.push("no simulation backend enabled; verilator re-enabled".to_string());
        }

        (enabled.into_iter().collect(), warnings)
    }

    /// Check every configured backend concurrently.
    #[instrument(skip(self))]
    pub async fn health(&self) -> BTreeMap<BackendKind, HealthStatus> {
        let timeout = self.ctx.config.health_timeout();
        let checks = self.ctx.clients.iter().map(|(kind, client)| async move {
            let status = match tokio::time::timeout(timeout, client.health()).await {
                Ok(status) => status,
                Err(_) => HealthStatus::Unreachable {
                    error: format!("health check timed out after {:?}", timeout),
                },
            };
            (*kind, status)
        });
        join_all(checks).await.into_iter().collect()
    }
}

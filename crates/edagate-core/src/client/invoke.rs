//! Deadline and retry policy around a [`ToolService`].

use super::{BackendRequest, HealthStatus, ToolResponse, ToolService, TransportError};
use crate::domain::{BackendKind, BackendOutcome, DesignBundle, ToolReport};
use crate::metrics::METRICS;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

/// Per-invocation policy for one backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendConfig {
    pub kind: BackendKind,

    /// Deadline for the whole invocation, retry included.
    pub timeout: Duration,

    /// Pause before retrying an unreachable service.
    pub retry_delay: Duration,

    /// Retries allowed after a transport failure (0 or 1).
    pub max_retries: u32,
}

impl BackendConfig {
    pub fn new(kind: BackendKind, timeout: Duration) -> Self {
        Self {
            kind,
            timeout,
            retry_delay: Duration::from_secs(2),
            max_retries: 1,
        }
    }
}

/// Invokes one backend and always produces a terminal [`BackendOutcome`].
#[derive(Clone)]
pub struct BackendClient {
    service: Arc<dyn ToolService>,
}

impl BackendClient {
    pub fn new(service: Arc<dyn ToolService>) -> Self {
        Self { service }
    }

    pub fn kind(&self) -> BackendKind {
        self.service.kind()
    }

    pub async fn health(&self) -> HealthStatus {
        self.service.health().await
    }

    /// Run `bundle` through the backend under `config`.
    ///
    /// Never fails: transport problems, tool errors, unusable reports and an
    /// expired deadline all map to an outcome variant. On expiry the pending
    /// request is dropped; the remote job is left to finish on its own.
    #[instrument(skip_all, fields(backend = %config.kind, submission_id = %bundle.id()))]
    pub async fn invoke(&self, bundle: &DesignBundle, config: &BackendConfig) -> BackendOutcome {
        let request = BackendRequest::from_bundle(bundle, config.kind, config.timeout);
        let attempts = AtomicU32::new(0);
        let start = Instant::now();

        let answered =
            tokio::time::timeout(config.timeout, self.attempt(&request, config, &attempts)).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;
        let attempts = attempts.load(Ordering::Relaxed).max(1);

        match answered {
            Ok(Ok(response)) => settle(config.kind, response, attempts, elapsed_ms),
            Ok(Err(err)) => {
                METRICS.inc_unavailable();
                BackendOutcome::Unavailable {
                    reason: err.to_string(),
                    attempts,
                }
            }
            Err(_) => {
                METRICS.inc_timeouts();
                warn!(elapsed_ms, attempts, "Backend deadline expired");
                BackendOutcome::Timeout {
                    elapsed_ms,
                    attempts,
                }
            }
        }
    }

    async fn attempt(
        &self,
        request: &BackendRequest,
        config: &BackendConfig,
        attempts: &AtomicU32,
    ) -> Result<ToolResponse, TransportError> {
        loop {
            let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
            match self.service.submit(request).await {
                Ok(response) => return Ok(response),
                Err(err) if attempt <= config.max_retries => {
                    METRICS.inc_retries();
                    warn!(attempt, error = %err, "Backend unreachable, retrying");
                    tokio::time::sleep(config.retry_delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn settle(
    kind: BackendKind,
    response: ToolResponse,
    attempts: u32,
    elapsed_ms: u64,
) -> BackendOutcome {
    match response {
        ToolResponse::Report { payload, logs } => {
            match ToolReport::from_payload(kind.role(), payload, logs.clone()) {
                Ok(report) => {
                    debug!(elapsed_ms, "Backend report adapted");
                    BackendOutcome::Success {
                        report,
                        attempts,
                        elapsed_ms,
                    }
                }
                Err(err) => {
                    METRICS.inc_tool_failures();
                    BackendOutcome::ToolFailure {
                        kind: "malformed_report".to_string(),
                        message: err.to_string(),
                        exit_code: None,
                        logs,
                        attempts,
                    }
                }
            }
        }
        ToolResponse::Error(err) => {
            METRICS.inc_tool_failures();
            BackendOutcome::ToolFailure {
                kind: err.kind,
                message: err.message,
                exit_code: err.exit_code,
                logs: err.logs,
                attempts,
            }
        }
    }
}

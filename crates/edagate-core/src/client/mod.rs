//! Backend tool-service seam.
//!
//! [`ToolService`] is the transport boundary: one implementation per wire
//! protocol (HTTP in `edagate-backends`, scripted fakes in [`crate::fakes`]).
//! [`BackendClient`] wraps a service with the deadline and retry policy and is
//! the only thing the orchestrator talks to.

mod invoke;

pub use invoke::{BackendClient, BackendConfig};

use crate::domain::{BackendKind, BackendRole, DesignBundle, SourceKind, SubmissionId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// One source file as sent to a tool service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireSource {
    pub name: String,
    pub content: String,
    pub kind: SourceKind,
}

/// Options forwarded to a tool service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_technology: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clock_frequency_mhz: Option<f64>,
    /// Deadline the gateway applies, so the tool can size its own limits.
    pub timeout_secs: u64,
}

/// Request body POSTed to a tool service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendRequest {
    pub submission_id: SubmissionId,
    pub top_module: String,
    pub sources: Vec<WireSource>,
    pub options: WireOptions,
}

impl BackendRequest {
    /// Serialize the subset of `bundle` that `kind` needs.
    ///
    /// Testbenches only go to simulators.
    pub fn from_bundle(bundle: &DesignBundle, kind: BackendKind, timeout: Duration) -> Self {
        let wants_testbench = kind.role() == BackendRole::Simulation;
        let sources = bundle
            .sources()
            .iter()
            .filter(|f| wants_testbench || f.kind != SourceKind::Testbench)
            .map(|f| WireSource {
                name: f.name.clone(),
                content: f.content.clone(),
                kind: f.kind,
            })
            .collect();

        let options = bundle.options();
        Self {
            submission_id: bundle.id(),
            top_module: bundle.top_module().to_string(),
            sources,
            options: WireOptions {
                target_technology: options.target_technology.clone(),
                clock_frequency_mhz: options.clock_frequency_mhz,
                timeout_secs: timeout.as_secs(),
            },
        }
    }
}

/// Tool-level failure reported by a reachable service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolError {
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<String>,
}

/// What a reachable tool service answered.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolResponse {
    /// The tool ran; `payload` is its raw report.
    Report {
        payload: Value,
        logs: Option<String>,
    },
    /// The tool ran and failed.
    Error(ToolError),
}

impl ToolResponse {
    pub fn report(payload: Value) -> Self {
        ToolResponse::Report {
            payload,
            logs: None,
        }
    }

    pub fn error(kind: impl Into<String>, message: impl Into<String>) -> Self {
        ToolResponse::Error(ToolError {
            kind: kind.into(),
            message: message.into(),
            exit_code: None,
            logs: None,
        })
    }
}

/// The service could not be reached or is overloaded. Retryable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("service unreachable: {0}")]
    Unreachable(String),

    #[error("service returned HTTP {0}")]
    Status(u16),
}

/// Result of a health check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy { details: Value },
    Unhealthy { http_status: u16 },
    Unreachable { error: String },
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            HealthStatus::Healthy { .. } => "healthy",
            HealthStatus::Unhealthy { .. } => "unhealthy",
            HealthStatus::Unreachable { .. } => "unreachable",
        }
    }
}

/// Transport to one EDA tool service.
#[async_trait]
pub trait ToolService: Send + Sync {
    /// Which backend this service fronts.
    fn kind(&self) -> BackendKind;

    /// Submit one job and wait for the tool's answer.
    async fn submit(&self, request: &BackendRequest) -> Result<ToolResponse, TransportError>;

    /// Query the service's health endpoint.
    async fn health(&self) -> HealthStatus;
}

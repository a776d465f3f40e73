//! Terminal outcome of invoking one backend for one submission.

use crate::domain::report::ToolReport;
use serde::{Deserialize, Serialize};

/// Terminal outcome of one backend invocation.
///
/// Every variant is final: once produced it never changes for the submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BackendOutcome {
    /// The tool ran and produced a usable report.
    Success {
        report: ToolReport,
        attempts: u32,
        elapsed_ms: u64,
    },

    /// The tool was reached but reported an error. Never retried.
    ToolFailure {
        /// Machine-readable kind (e.g. `tool_error`, `malformed_report`).
        kind: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        logs: Option<String>,
        attempts: u32,
    },

    /// The deadline expired before the tool answered. Never retried.
    Timeout { elapsed_ms: u64, attempts: u32 },

    /// The tool could not be reached (after at most one retry).
    Unavailable { reason: String, attempts: u32 },
}

impl BackendOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, BackendOutcome::Success { .. })
    }

    pub fn report(&self) -> Option<&ToolReport> {
        match self {
            BackendOutcome::Success { report, .. } => Some(report),
            _ => None,
        }
    }

    /// Short status label used in logs and result documents.
    pub fn label(&self) -> &'static str {
        match self {
            BackendOutcome::Success { .. } => "success",
            BackendOutcome::ToolFailure { .. } => "tool_failure",
            BackendOutcome::Timeout { .. } => "timeout",
            BackendOutcome::Unavailable { .. } => "unavailable",
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            BackendOutcome::Success { attempts, .. }
            | BackendOutcome::ToolFailure { attempts, .. }
            | BackendOutcome::Timeout { attempts, .. }
            | BackendOutcome::Unavailable { attempts, .. } => *attempts,
        }
    }

    /// Logs produced by the backend, if any.
    pub fn logs(&self) -> Option<&str> {
        match self {
            BackendOutcome::Success { report, .. } => report.log(),
            BackendOutcome::ToolFailure { logs, .. } => logs.as_deref(),
            _ => None,
        }
    }

    /// One-line human summary.
    pub fn summary(&self) -> String {
        match self {
            BackendOutcome::Success { elapsed_ms, .. } => {
                format!("completed in {} ms", elapsed_ms)
            }
            BackendOutcome::ToolFailure {
                kind,
                message,
                exit_code,
                ..
            } => match exit_code {
                Some(code) => format!("{}: {} (exit code {})", kind, message, code),
                None => format!("{}: {}", kind, message),
            },
            BackendOutcome::Timeout { elapsed_ms, .. } => {
                format!("timed out after {} ms", elapsed_ms)
            }
            BackendOutcome::Unavailable { reason, attempts } => {
                format!("unavailable after {} attempt(s): {}", attempts, reason)
            }
        }
    }
}

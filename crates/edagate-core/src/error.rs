//! Error taxonomy for the gateway.
//!
//! Only [`InvalidSubmission`] aborts an evaluation. Backend-side failures are
//! recorded as [`BackendOutcome`](crate::BackendOutcome) variants and storage
//! problems become warnings on the result.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine-readable reason a submission was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    TooLarge,
    DuplicateFile,
    NotAnArchive,
    UnsafePath,
    NoRtl,
    NoTestbench,
    MissingTopModule,
    InvalidOptions,
    NotUtf8,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::TooLarge => "too_large",
            RejectReason::DuplicateFile => "duplicate_file",
            RejectReason::NotAnArchive => "not_an_archive",
            RejectReason::UnsafePath => "unsafe_path",
            RejectReason::NoRtl => "no_rtl",
            RejectReason::NoTestbench => "no_testbench",
            RejectReason::MissingTopModule => "missing_top_module",
            RejectReason::InvalidOptions => "invalid_options",
            RejectReason::NotUtf8 => "not_utf8",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A malformed, oversized or unsafe submission. Raised before any backend is
/// invoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("invalid submission ({reason}): {detail}")]
pub struct InvalidSubmission {
    pub reason: RejectReason,
    pub detail: String,
}

impl InvalidSubmission {
    pub fn new(reason: RejectReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }
}

/// Errors surfaced to the caller of the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Invalid(#[from] InvalidSubmission),

    #[error("scratch directory error: {0}")]
    Scratch(#[from] std::io::Error),

    #[error("evaluation run aborted: {0}")]
    Aborted(String),
}

impl GatewayError {
    /// The rejection, if this error is an [`InvalidSubmission`].
    pub fn as_invalid(&self) -> Option<&InvalidSubmission> {
        match self {
            GatewayError::Invalid(inner) => Some(inner),
            _ => None,
        }
    }
}

/// Archival or export failure. Never fails the evaluation itself.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("archive packing error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("archive task failed: {0}")]
    Task(String),
}

/// Configuration loading and validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

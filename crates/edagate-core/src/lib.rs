//! EDA Gateway Core
//!
//! Coordinates the evaluation of a hardware design submission:
//! - Unpacks and validates the submitted archive into a [`DesignBundle`]
//! - Fans the bundle out to synthesis, simulation and physical-design tool
//!   services concurrently, each under its own deadline
//! - Folds the backend outcomes into functionality/area/delay/power sub-scores
//!   and a weighted overall score
//! - Archives raw reports, logs and scores into one result bundle

pub mod aggregate;
pub mod archive;
pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod fakes;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod registry;
pub mod telemetry;
pub mod unpack;

pub use aggregate::{aggregate, normalize_against_baseline, ReferenceBaseline, ScoreWeights, ScoringPolicy};
pub use archive::{ArchiveReceipt, ResultArchiver, ResultSink, SinkError};
pub use client::{
    BackendClient, BackendConfig, BackendRequest, HealthStatus, ToolError, ToolResponse,
    ToolService, TransportError,
};
pub use config::{BackendEndpoints, EndpointConfig, GatewayConfig, ScoringConfig, SinkConfig};
pub use domain::{
    ArchiveLocation, BackendKind, BackendOutcome, BackendRole, DesignBundle, EvaluationOptions,
    EvaluationResult, ReportMetrics, ScoreBreakdown, SourceFile, SourceKind, SubmissionId,
    ToolReport,
};
pub use error::{ConfigError, GatewayError, InvalidSubmission, RejectReason, StorageError};
pub use metrics::METRICS;
pub use orchestrator::{GatewayContext, Orchestrator};
pub use registry::{InFlightGuard, InFlightRegistry, InFlightRun};
pub use telemetry::init_tracing;
pub use unpack::{unpack, UnpackLimits};

/// Gateway version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

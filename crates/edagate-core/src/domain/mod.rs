//! Domain model for one design evaluation.

pub mod backend;
pub mod bundle;
pub mod outcome;
pub mod report;
pub mod result;
pub mod score;

pub use backend::{BackendKind, BackendRole, UnknownBackend};
pub use bundle::{DesignBundle, EvaluationOptions, SourceFile, SourceKind, SubmissionId};
pub use outcome::BackendOutcome;
pub use report::{
    AssertionResult, PhysicalDesignReport, ReportError, ReportMetrics, SimulationReport,
    SynthesisReport, ToolReport,
};
pub use result::{ArchiveLocation, EvaluationResult};
pub use score::ScoreBreakdown;

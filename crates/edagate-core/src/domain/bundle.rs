//! The validated, in-memory form of one design submission.

use crate::domain::backend::BackendKind;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Identity of one submission. A resubmission gets a fresh id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionId(pub Uuid);

impl SubmissionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubmissionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role of a file inside the bundle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Synthesizable design source.
    Rtl,

    /// Simulation-only testbench source.
    Testbench,

    /// Include headers, memory images and file lists.
    Auxiliary,
}

/// One file of the submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceFile {
    /// Normalized path relative to the archive root.
    pub name: String,

    pub content: String,

    pub kind: SourceKind,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, content: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            kind,
        }
    }
}

/// Per-submission evaluation options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationOptions {
    /// Target standard-cell technology (e.g. `sky130_fd_sc_hd`).
    pub target_technology: Option<String>,

    /// Target clock frequency in MHz; always positive when set.
    pub clock_frequency_mhz: Option<f64>,

    /// Backends requested by the submitter.
    pub enabled_backends: BTreeSet<BackendKind>,

    /// Per-backend timeout overrides in seconds.
    pub timeout_overrides_secs: BTreeMap<BackendKind, u64>,

    /// Skip the physical-design flow.
    pub fast_mode: bool,

    /// Whether a testbench is required in the submission.
    pub functionality_check: bool,
}

impl Default for EvaluationOptions {
    fn default() -> Self {
        Self {
            target_technology: None,
            clock_frequency_mhz: None,
            enabled_backends: BackendKind::ALL.into_iter().collect(),
            timeout_overrides_secs: BTreeMap::new(),
            fast_mode: false,
            functionality_check: true,
        }
    }
}

impl EvaluationOptions {
    /// Restrict the enabled set to `backends`.
    pub fn with_backends(mut self, backends: impl IntoIterator<Item = BackendKind>) -> Self {
        self.enabled_backends = backends.into_iter().collect();
        self
    }

    pub fn with_timeout_override(mut self, kind: BackendKind, secs: u64) -> Self {
        self.timeout_overrides_secs.insert(kind, secs);
        self
    }

    pub fn timeout_override(&self, kind: BackendKind) -> Option<Duration> {
        self.timeout_overrides_secs
            .get(&kind)
            .map(|secs| Duration::from_secs(*secs))
    }

    /// Clock period in nanoseconds, if a clock frequency was given.
    pub fn clock_period_ns(&self) -> Option<f64> {
        self.clock_frequency_mhz
            .filter(|mhz| mhz.is_finite() && *mhz > 0.0)
            .map(|mhz| 1000.0 / mhz)
    }
}

/// Immutable design bundle owned by exactly one evaluation run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DesignBundle {
    id: SubmissionId,
    top_module: String,
    sources: Vec<SourceFile>,
    options: EvaluationOptions,
    digest: String,
}

impl DesignBundle {
    /// Create a bundle with a fresh submission id.
    pub fn new(
        top_module: impl Into<String>,
        sources: Vec<SourceFile>,
        options: EvaluationOptions,
    ) -> Self {
        let top_module = top_module.into();
        let digest = compute_bundle_digest(&top_module, &sources);
        Self {
            id: SubmissionId::new(),
            top_module,
            sources,
            options,
            digest,
        }
    }

    pub fn id(&self) -> SubmissionId {
        self.id
    }

    pub fn top_module(&self) -> &str {
        &self.top_module
    }

    /// Files in submission order.
    pub fn sources(&self) -> &[SourceFile] {
        &self.sources
    }

    pub fn options(&self) -> &EvaluationOptions {
        &self.options
    }

    /// SHA-256 over the top module and the ordered sources.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn files_of(&self, kind: SourceKind) -> impl Iterator<Item = &SourceFile> {
        self.sources.iter().filter(move |f| f.kind == kind)
    }

    pub fn has_testbench(&self) -> bool {
        self.files_of(SourceKind::Testbench).next().is_some()
    }
}

/// Deterministic digest of the bundle contents. Options are not part of the
/// digest: the same design evaluated with different options is the same design.
fn compute_bundle_digest(top_module: &str, sources: &[SourceFile]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(top_module.as_bytes());
    hasher.update(b"\0");
    for file in sources {
        hasher.update(file.name.as_bytes());
        hasher.update(b"\0");
        hasher.update(format!("{:?}", file.kind).as_bytes());
        hasher.update(b"\0");
        hasher.update(file.content.as_bytes());
        hasher.update(b"\0");
    }
    hex::encode(hasher.finalize())
}

//! Registry of evaluations currently in flight.
//!
//! The only shared mutable state in the gateway. Entries are inserted when a
//! run starts and removed when its [`InFlightGuard`] drops, so a run that
//! panics or is torn down still leaves the registry.

use crate::domain::{BackendKind, SubmissionId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Snapshot of one running evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InFlightRun {
    pub submission_id: SubmissionId,
    pub top_module: String,
    pub backends: Vec<BackendKind>,
    pub started_at: DateTime<Utc>,
}

/// Concurrency-safe map of running evaluations keyed by submission id.
#[derive(Debug, Default)]
pub struct InFlightRegistry {
    runs: Mutex<HashMap<SubmissionId, InFlightRun>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `run` and return the guard that removes it again.
    pub fn register(self: &Arc<Self>, run: InFlightRun) -> InFlightGuard {
        let submission_id = run.submission_id;
        self.lock().insert(submission_id, run);
        InFlightGuard {
            registry: Arc::clone(self),
            submission_id,
        }
    }

    pub fn contains(&self, submission_id: SubmissionId) -> bool {
        self.lock().contains_key(&submission_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Running evaluations, oldest first.
    pub fn snapshot(&self) -> Vec<InFlightRun> {
        let mut runs: Vec<InFlightRun> = self.lock().values().cloned().collect();
        runs.sort_by_key(|r| r.started_at);
        runs
    }

    fn remove(&self, submission_id: SubmissionId) {
        self.lock().remove(&submission_id);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SubmissionId, InFlightRun>> {
        self.runs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Removes its run from the registry on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    registry: Arc<InFlightRegistry>,
    submission_id: SubmissionId,
}

impl InFlightGuard {
    pub fn submission_id(&self) -> SubmissionId {
        self.submission_id
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry.remove(self.submission_id);
    }
}

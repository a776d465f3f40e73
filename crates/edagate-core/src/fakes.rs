//! In-memory fakes for the tool-service and sink traits (testing only)
//!
//! Provides `ScriptedService`, which plays back a fixed sequence of answers,
//! and `MemorySink`, which keeps uploaded archives in a map.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::archive::{ResultSink, SinkError};
use crate::client::{BackendRequest, HealthStatus, ToolResponse, ToolService, TransportError};
use crate::domain::BackendKind;

// ---------------------------------------------------------------------------
// ScriptedService
// ---------------------------------------------------------------------------

/// One scripted answer.
#[derive(Debug, Clone)]
pub enum Step {
    /// Answer immediately.
    Respond(ToolResponse),
    /// Answer after a delay (tokio time, so paused clocks apply).
    RespondAfter(Duration, ToolResponse),
    /// Fail at the transport level.
    Fail(TransportError),
}

/// Tool service answering from a script. The last step repeats once the
/// script is exhausted.
#[derive(Debug)]
pub struct ScriptedService {
    kind: BackendKind,
    steps: Mutex<VecDeque<Step>>,
    calls: AtomicU32,
    requests: Mutex<Vec<BackendRequest>>,
    health: Mutex<HealthStatus>,
}

impl ScriptedService {
    pub fn scripted(kind: BackendKind, steps: Vec<Step>) -> Self {
        Self {
            kind,
            steps: Mutex::new(steps.into()),
            calls: AtomicU32::new(0),
            requests: Mutex::new(Vec::new()),
            health: Mutex::new(HealthStatus::Healthy {
                details: serde_json::json!({ "status": "healthy" }),
            }),
        }
    }

    /// Always answer with `payload` as the report.
    pub fn responding(kind: BackendKind, payload: Value) -> Self {
        Self::scripted(kind, vec![Step::Respond(ToolResponse::report(payload))])
    }

    /// Answer with `payload` after `delay`.
    pub fn delayed(kind: BackendKind, delay: Duration, payload: Value) -> Self {
        Self::scripted(
            kind,
            vec![Step::RespondAfter(delay, ToolResponse::report(payload))],
        )
    }

    /// Always fail at the transport level.
    pub fn unreachable(kind: BackendKind) -> Self {
        Self::scripted(
            kind,
            vec![Step::Fail(TransportError::Unreachable(
                "connection refused".to_string(),
            ))],
        )
    }

    pub fn with_health(self, status: HealthStatus) -> Self {
        *self.health.lock().unwrap_or_else(PoisonError::into_inner) = status;
        self
    }

    /// Number of submit calls so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received, in order.
    pub fn requests(&self) -> Vec<BackendRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn next_step(&self) -> Option<Step> {
        let mut steps = self.steps.lock().unwrap_or_else(PoisonError::into_inner);
        if steps.len() > 1 {
            steps.pop_front()
        } else {
            steps.front().cloned()
        }
    }
}

#[async_trait]
impl ToolService for ScriptedService {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn submit(&self, request: &BackendRequest) -> Result<ToolResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        match self.next_step() {
            Some(Step::Respond(response)) => Ok(response),
            Some(Step::RespondAfter(delay, response)) => {
                tokio::time::sleep(delay).await;
                Ok(response)
            }
            Some(Step::Fail(err)) => Err(err),
            None => Err(TransportError::Unreachable("no scripted answer".to_string())),
        }
    }

    async fn health(&self) -> HealthStatus {
        self.health
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

// ---------------------------------------------------------------------------
// MemorySink
// ---------------------------------------------------------------------------

/// In-memory result sink keyed by object key.
#[derive(Debug, Default)]
pub struct MemorySink {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    failing: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that rejects every upload.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ResultSink for MemorySink {
    async fn upload(&self, key: &str, bytes: Vec<u8>) -> Result<String, SinkError> {
        if self.failing {
            return Err(SinkError::Rejected {
                status: 403,
                body: "AccessDenied".to_string(),
            });
        }
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), bytes);
        Ok(format!("memory://{}", key))
    }
}

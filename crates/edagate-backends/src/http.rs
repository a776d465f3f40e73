//! HTTP tool-service client.
//!
//! Every EDA tool runs behind a small HTTP API: the job is POSTed as JSON to
//! the backend's endpoint and the tool answers with an envelope
//! `{success, results, error_message, error_kind, exit_code, logs}`.

use async_trait::async_trait;
use edagate_core::{
    BackendKind, BackendRequest, EndpointConfig, HealthStatus, ToolError, ToolResponse,
    ToolService, TransportError,
};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("edagate/", env!("CARGO_PKG_VERSION"));

/// Longest error body carried into an outcome message.
const MAX_ERROR_BODY: usize = 2_048;

/// Envelope keys that may carry the tool transcript.
const LOG_KEYS: [&str; 4] = ["logs", "log", "evaluator_log", "stderr"];

/// Tool service reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpToolService {
    kind: BackendKind,
    base_url: String,
    health_timeout: Duration,
    client: reqwest::Client,
}

impl HttpToolService {
    /// Build a client for `kind` at `endpoint`.
    ///
    /// No request timeout is set here; the invocation deadline is owned by
    /// the caller.
    pub fn new(
        kind: BackendKind,
        endpoint: &EndpointConfig,
        health_timeout: Duration,
    ) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            kind,
            base_url: endpoint.url.trim_end_matches('/').to_string(),
            health_timeout,
            client,
        })
    }

    /// URL the job is POSTed to.
    pub fn submit_url(&self) -> String {
        format!("{}{}", self.base_url, self.kind.endpoint())
    }

    pub fn health_url(&self) -> String {
        format!("{}/health", self.base_url)
    }
}

#[async_trait]
impl ToolService for HttpToolService {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn submit(&self, request: &BackendRequest) -> Result<ToolResponse, TransportError> {
        let url = self.submit_url();
        debug!(backend = %self.kind, %url, files = request.sources.len(), "Submitting job");

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| TransportError::Unreachable(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Unreachable(e.to_string()))?;

        interpret_response(status, &body)
    }

    async fn health(&self) -> HealthStatus {
        let sent = self
            .client
            .get(self.health_url())
            .timeout(self.health_timeout)
            .send()
            .await;

        match sent {
            Ok(response) if response.status().is_success() => {
                let details = response.json::<Value>().await.unwrap_or(Value::Null);
                HealthStatus::Healthy { details }
            }
            Ok(response) => HealthStatus::Unhealthy {
                http_status: response.status().as_u16(),
            },
            Err(err) => {
                warn!(backend = %self.kind, error = %err, "Health check failed");
                HealthStatus::Unreachable {
                    error: err.to_string(),
                }
            }
        }
    }
}

/// Map an HTTP answer onto the tool-service contract.
///
/// - 502/503/504: the service is overloaded or restarting (transport, retryable)
/// - any other non-2xx: tool failure `http_<status>`
/// - 2xx with `success: false`: tool failure with the tool's own kind
/// - 2xx otherwise: the report, envelope log fields split off
pub fn interpret_response(status: u16, body: &str) -> Result<ToolResponse, TransportError> {
    if matches!(status, 502..=504) {
        return Err(TransportError::Status(status));
    }
    if !(200..300).contains(&status) {
        return Ok(ToolResponse::Error(ToolError {
            kind: format!("http_{}", status),
            message: truncate(body, MAX_ERROR_BODY),
            exit_code: None,
            logs: None,
        }));
    }

    let mut envelope = match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => map,
        Ok(_) | Err(_) => {
            return Ok(ToolResponse::Error(ToolError {
                kind: "malformed_response".to_string(),
                message: format!("expected a JSON object, got: {}", truncate(body, 256)),
                exit_code: None,
                logs: None,
            }))
        }
    };

    let logs = take_logs(&mut envelope);

    if envelope.get("success").and_then(Value::as_bool) == Some(false) {
        let kind = string_field(&envelope, "error_kind").unwrap_or_else(|| "tool_error".to_string());
        let message = string_field(&envelope, "error_message")
            .unwrap_or_else(|| "tool reported failure".to_string());
        let exit_code = envelope
            .get("exit_code")
            .and_then(Value::as_i64)
            .and_then(|c| i32::try_from(c).ok());
        return Ok(ToolResponse::Error(ToolError {
            kind,
            message,
            exit_code,
            logs,
        }));
    }

    Ok(ToolResponse::Report {
        payload: Value::Object(envelope),
        logs,
    })
}

fn take_logs(envelope: &mut Map<String, Value>) -> Option<String> {
    let mut found = None;
    for key in LOG_KEYS {
        if let Some(value) = envelope.remove(key) {
            if found.is_none() {
                found = match value {
                    Value::String(s) if !s.is_empty() => Some(s),
                    Value::Array(lines) => Some(
                        lines
                            .iter()
                            .filter_map(Value::as_str)
                            .collect::<Vec<_>>()
                            .join("\n"),
                    ),
                    _ => None,
                };
            }
        }
    }
    found
}

fn string_field(envelope: &Map<String, Value>, key: &str) -> Option<String> {
    envelope
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

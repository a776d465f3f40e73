//! EDA Gateway Backends
//!
//! HTTP implementations of the core seams:
//! - [`HttpToolService`]: one per tool API (yosys, verilator, icarus, openlane)
//! - [`HttpSink`]: object-store upload of result archives
//!
//! [`build_context`] wires them into a [`GatewayContext`] from configuration.

pub mod http;
pub mod sink;

pub use http::{interpret_response, HttpToolService};
pub use sink::HttpSink;

use edagate_core::{BackendKind, GatewayConfig, GatewayContext, ResultSink, ToolService};
use std::sync::Arc;

/// Errors building the HTTP adapters.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("failed to build HTTP client for {target}: {source}")]
    Client {
        target: String,
        #[source]
        source: reqwest::Error,
    },
}

pub type Result<T> = std::result::Result<T, BuildError>;

/// One HTTP service per backend, from the configured endpoints.
pub fn services_from_config(config: &GatewayConfig) -> Result<Vec<Arc<dyn ToolService>>> {
    BackendKind::ALL
        .into_iter()
        .map(|kind| {
            HttpToolService::new(kind, config.backends.get(kind), config.health_timeout())
                .map(|service| Arc::new(service) as Arc<dyn ToolService>)
                .map_err(|source| BuildError::Client {
                    target: kind.to_string(),
                    source,
                })
        })
        .collect()
}

/// The configured result sink, if any.
pub fn sink_from_config(config: &GatewayConfig) -> Result<Option<Arc<dyn ResultSink>>> {
    config
        .sink
        .as_ref()
        .map(|sink| {
            HttpSink::new(sink)
                .map(|s| Arc::new(s) as Arc<dyn ResultSink>)
                .map_err(|source| BuildError::Client {
                    target: "sink".to_string(),
                    source,
                })
        })
        .transpose()
}

/// Gateway context backed by the HTTP adapters.
pub fn build_context(config: GatewayConfig) -> Result<Arc<GatewayContext>> {
    let services = services_from_config(&config)?;
    let sink = sink_from_config(&config)?;
    Ok(Arc::new(GatewayContext::new(config, services, sink)))
}

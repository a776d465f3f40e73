//! Gateway configuration.
//!
//! Defaults, overlaid by an optional TOML file, overlaid by environment
//! variables. Validated once at startup; read-only afterwards.

use crate::aggregate::{ReferenceBaseline, ScoreWeights, ScoringPolicy};
use crate::client::BackendConfig;
use crate::domain::{BackendKind, EvaluationOptions};
use crate::error::ConfigError;
use crate::unpack::UnpackLimits;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Where one tool service lives and how long it may take.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub url: String,
    pub timeout_secs: u64,
}

impl EndpointConfig {
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            url: url.into(),
            timeout_secs,
        }
    }
}

/// One endpoint per backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendEndpoints {
    pub yosys: EndpointConfig,
    pub verilator: EndpointConfig,
    pub icarus: EndpointConfig,
    pub openlane: EndpointConfig,
}

impl Default for BackendEndpoints {
    fn default() -> Self {
        Self {
            yosys: EndpointConfig::new("http://yosys-api:8000", 900),
            verilator: EndpointConfig::new("http://verilator-api:8001", 900),
            icarus: EndpointConfig::new("http://icarus-api:8002", 900),
            openlane: EndpointConfig::new("http://openlane-api:8003", 3600),
        }
    }
}

impl BackendEndpoints {
    pub fn get(&self, kind: BackendKind) -> &EndpointConfig {
        match kind {
            BackendKind::Yosys => &self.yosys,
            BackendKind::Verilator => &self.verilator,
            BackendKind::Icarus => &self.icarus,
            BackendKind::Openlane => &self.openlane,
        }
    }

    pub fn get_mut(&mut self, kind: BackendKind) -> &mut EndpointConfig {
        match kind {
            BackendKind::Yosys => &mut self.yosys,
            BackendKind::Verilator => &mut self.verilator,
            BackendKind::Icarus => &mut self.icarus,
            BackendKind::Openlane => &mut self.openlane,
        }
    }
}

/// External object store receiving a copy of each result archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Base URL; archives are PUT to `<url>/eda_results/<submission_id>.zip`.
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: ScoreWeights,
    pub baseline: ReferenceBaseline,
}

/// Top-level gateway configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub backends: BackendEndpoints,
    pub retry_delay_ms: u64,
    pub max_retries: u32,
    pub health_timeout_secs: u64,
    pub results_dir: PathBuf,
    pub sink: Option<SinkConfig>,
    pub limits: UnpackLimits,
    pub scoring: ScoringConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            backends: BackendEndpoints::default(),
            retry_delay_ms: 2_000,
            max_retries: 1,
            health_timeout_secs: 5,
            results_dir: PathBuf::from("results"),
            sink: None,
            limits: UnpackLimits::default(),
            scoring: ScoringConfig::default(),
        }
    }
}

impl GatewayConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load from a TOML file, apply the environment and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let mut config = Self::from_toml_str(&text)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus the environment, validated.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Overlay values from `lookup` (normally `std::env::var`).
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for (kind, var) in [
            (BackendKind::Yosys, "YOSYS_URL"),
            (BackendKind::Verilator, "VERILATOR_URL"),
            (BackendKind::Icarus, "ICARUS_URL"),
            (BackendKind::Openlane, "OPENLANE_URL"),
        ] {
            if let Some(url) = lookup(var).filter(|v| !v.trim().is_empty()) {
                self.backends.get_mut(kind).url = url.trim().to_string();
            }
        }

        if let Some(dir) = lookup("EDAGATE_RESULTS_DIR").filter(|v| !v.is_empty()) {
            self.results_dir = PathBuf::from(dir);
        }

        if let Some(url) = lookup("EDAGATE_SINK_URL").filter(|v| !v.trim().is_empty()) {
            let token = self.sink.take().and_then(|s| s.token);
            self.sink = Some(SinkConfig {
                url: url.trim().to_string(),
                token,
            });
        }
        if let (Some(sink), Some(token)) = (self.sink.as_mut(), lookup("EDAGATE_SINK_TOKEN")) {
            sink.token = Some(token);
        }
    }

    pub fn validate(&self) -> Result<()> {
        for kind in BackendKind::ALL {
            let endpoint = self.backends.get(kind);
            if !(endpoint.url.starts_with("http://") || endpoint.url.starts_with("https://")) {
                return Err(ConfigError::Invalid(format!(
                    "{} url must be http(s), got {:?}",
                    kind, endpoint.url
                )));
            }
            if endpoint.timeout_secs == 0 {
                return Err(ConfigError::Invalid(format!(
                    "{} timeout must be positive",
                    kind
                )));
            }
        }
        if self.max_retries > 1 {
            return Err(ConfigError::Invalid(format!(
                "max_retries must be 0 or 1, got {}",
                self.max_retries
            )));
        }
        if self.health_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "health_timeout_secs must be positive".to_string(),
            ));
        }
        if self.limits.max_archive_bytes == 0
            || self.limits.max_entries == 0
            || self.limits.max_extracted_bytes == 0
        {
            return Err(ConfigError::Invalid("unpack limits must be positive".to_string()));
        }
        self.scoring
            .weights
            .validate()
            .map_err(ConfigError::Invalid)?;

        let baseline = &self.scoring.baseline;
        for (name, value) in [
            ("area", baseline.area),
            ("delay_ns", baseline.delay_ns),
            ("power_mw", baseline.power_mw),
        ] {
            if let Some(v) = value {
                if !v.is_finite() || v <= 0.0 {
                    return Err(ConfigError::Invalid(format!(
                        "baseline {} must be positive, got {}",
                        name, v
                    )));
                }
            }
        }
        Ok(())
    }

    /// Invocation policy for `kind`, honouring the submission's timeout
    /// override.
    pub fn backend_config(&self, kind: BackendKind, options: &EvaluationOptions) -> BackendConfig {
        let timeout = options
            .timeout_override(kind)
            .unwrap_or_else(|| Duration::from_secs(self.backends.get(kind).timeout_secs));
        BackendConfig {
            kind,
            timeout,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            max_retries: self.max_retries,
        }
    }

    pub fn scoring_policy(&self, options: &EvaluationOptions) -> ScoringPolicy {
        ScoringPolicy::new(self.scoring.weights, self.scoring.baseline)
            .with_clock_period(options.clock_period_ns())
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }
}

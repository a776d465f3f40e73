//! Tool backend identities.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What a backend contributes to the score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BackendRole {
    /// Logic synthesis (cell count, estimated area and delay).
    Synthesis,

    /// Behavioral simulation against the testbench (functionality).
    Simulation,

    /// Full ASIC flow (placed-and-routed area, timing, power).
    PhysicalDesign,
}

/// The tool services the gateway knows how to call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Yosys synthesis.
    Yosys,

    /// Verilator simulation (primary simulator).
    Verilator,

    /// Icarus Verilog simulation.
    Icarus,

    /// OpenLane physical-design flow.
    Openlane,
}

impl BackendKind {
    /// Every known backend, in a stable order.
    pub const ALL: [BackendKind; 4] = [
        BackendKind::Yosys,
        BackendKind::Verilator,
        BackendKind::Icarus,
        BackendKind::Openlane,
    ];

    /// Get the backend name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Yosys => "yosys",
            BackendKind::Verilator => "verilator",
            BackendKind::Icarus => "icarus",
            BackendKind::Openlane => "openlane",
        }
    }

    pub fn role(&self) -> BackendRole {
        match self {
            BackendKind::Yosys => BackendRole::Synthesis,
            BackendKind::Verilator | BackendKind::Icarus => BackendRole::Simulation,
            BackendKind::Openlane => BackendRole::PhysicalDesign,
        }
    }

    pub fn is_simulator(&self) -> bool {
        self.role() == BackendRole::Simulation
    }

    /// Request path on the tool service.
    pub fn endpoint(&self) -> &'static str {
        match self {
            BackendKind::Yosys => "/synthesize",
            BackendKind::Verilator => "/simulate_and_evaluate",
            BackendKind::Icarus => "/simulate",
            BackendKind::Openlane => "/run_openlane",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A backend name that does not match any known service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown backend: {0}")]
pub struct UnknownBackend(pub String);

impl FromStr for BackendKind {
    type Err = UnknownBackend;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        BackendKind::ALL
            .into_iter()
            .find(|kind| kind.name() == name)
            .ok_or_else(|| UnknownBackend(s.to_string()))
    }
}

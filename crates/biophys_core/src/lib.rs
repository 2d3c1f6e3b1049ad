#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SynapseId(pub u32);

/// Host integration window an event was delivered in. Bookkeeping only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WindowId(pub u32);

/// Which of the two dynamics contracts drives an instance between events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationMode {
    /// The host integrator reads `derivs` and writes back through `load_state`.
    Derivative,
    /// The host calls `advance` and `implicit_current` over fixed steps.
    SelfAdvance,
}

impl IntegrationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            IntegrationMode::Derivative => "derivative",
            IntegrationMode::SelfAdvance => "self_advance",
        }
    }
}

impl std::fmt::Display for IntegrationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamInfo {
    pub name: &'static str,
    pub label: &'static str,
}

/// Static description of a dynamics model, shared by every instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DynamicsDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub params: &'static [ParamInfo],
    pub state_vars: &'static [&'static str],
    pub deriv_vars: &'static [&'static str],
    pub trace_vars: &'static [&'static str],
}

impl DynamicsDescriptor {
    pub fn state_count(&self) -> usize {
        self.state_vars.len()
    }

    pub fn param_info(&self, name: &str) -> Option<&'static ParamInfo> {
        self.params.iter().find(|info| info.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DynamicsError {
    #[error("{operation} is not available in {mode} mode")]
    ModeMismatch {
        operation: &'static str,
        mode: IntegrationMode,
    },
    #[error("slot count mismatch: expected {expected}, got {got}")]
    SlotCount { expected: usize, got: usize },
    #[error("model {model} has no parameter named {name}")]
    UnknownParam { model: &'static str, name: String },
    #[error("invalid parameter {name}: {message}")]
    InvalidParam {
        name: &'static str,
        message: String,
    },
}

/// Integrable dynamics attached to a compartment.
///
/// Both integration contracts live on the same trait. An instance is built
/// for one [`IntegrationMode`] and rejects the mutating entry point of the
/// other (`advance` vs. `load_state`); read-only queries work in either mode.
pub trait Dynamics: Send + Sync + std::fmt::Debug {
    fn descriptor(&self) -> &'static DynamicsDescriptor;

    fn mode(&self) -> IntegrationMode;

    /// Reset to the rest state before a run.
    fn init(&mut self) -> Result<(), DynamicsError>;

    /// Deliver an event through the host's synapse path.
    fn accept(&mut self, strength: f64, window: WindowId, origin: SynapseId);

    /// Deliver an event tagged with a scheduler start time.
    fn enqueue(&mut self, start_time: f64, strength: f64);

    fn state(&self) -> &[f64];

    /// Write back state values produced by the host integrator.
    fn load_state(&mut self, y: &[f64]) -> Result<(), DynamicsError>;

    fn derivs(&self, t: f64, dydt: &mut [f64]) -> Result<(), DynamicsError>;

    /// Signed membrane current contribution at potential `v`.
    fn current(&self, t: f64, v: f64) -> f64;

    fn advance(&mut self, t: f64, h: f64) -> Result<(), DynamicsError>;

    /// Conductance and equilibrium potential for an implicit integrator.
    fn implicit_current(&self, t: f64) -> (f64, f64);

    fn param(&self, name: &str) -> Option<f64>;

    fn set_param(&mut self, name: &str, value: f64) -> Result<(), DynamicsError>;

    fn validate(&self) -> Result<(), DynamicsError> {
        Ok(())
    }

    fn snapshot_digest(&self) -> [u8; 32];
}

pub fn update_u8(hasher: &mut blake3::Hasher, value: u8) {
    hasher.update(&[value]);
}

pub fn update_u32(hasher: &mut blake3::Hasher, value: u32) {
    hasher.update(&value.to_le_bytes());
}

pub fn update_f64(hasher: &mut blake3::Hasher, value: f64) {
    hasher.update(&value.to_bits().to_le_bytes());
}

pub fn update_str(hasher: &mut blake3::Hasher, value: &str) {
    update_u32(hasher, value.len() as u32);
    hasher.update(value.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARAMS: [ParamInfo; 1] = [ParamInfo {
        name: "tau",
        label: "decay time",
    }];

    const DESCRIPTOR: DynamicsDescriptor = DynamicsDescriptor {
        name: "Decay",
        description: "single exponential decay",
        params: &PARAMS,
        state_vars: &["x"],
        deriv_vars: &["dx/dt"],
        trace_vars: &["x-trace"],
    };

    #[test]
    fn descriptor_lookups() {
        assert_eq!(DESCRIPTOR.state_count(), 1);
        assert_eq!(DESCRIPTOR.param_info("tau").map(|p| p.label), Some("decay time"));
        assert!(DESCRIPTOR.param_info("gmax").is_none());
    }

    #[test]
    fn f64_digest_distinguishes_signed_zero() {
        let mut pos = blake3::Hasher::new();
        update_f64(&mut pos, 0.0);
        let mut neg = blake3::Hasher::new();
        update_f64(&mut neg, -0.0);
        assert_ne!(pos.finalize(), neg.finalize());
    }

    #[test]
    fn mode_error_names_operation_and_mode() {
        let err = DynamicsError::ModeMismatch {
            operation: "advance",
            mode: IntegrationMode::Derivative,
        };
        assert_eq!(err.to_string(), "advance is not available in derivative mode");
    }
}

#![forbid(unsafe_code)]

use biophys_core::{
    update_f64, update_str, update_u8, Dynamics, DynamicsDescriptor, DynamicsError,
    IntegrationMode, ParamInfo, SynapseId, WindowId,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod presets;

pub const MODEL_NAME: &str = "Exp2Syn";
pub const STATE_COUNT: usize = 2;
/// Largest `tau1/tau2` ratio the peak normalization accepts unclamped.
pub const MAX_TAU_RATIO: f64 = 0.9999;

const A: usize = 0;
const B: usize = 1;
const CONFIG_DIGEST_DOMAIN: &str = "BIOPHYS:EXP2SYN:CFG";
const SNAPSHOT_DIGEST_DOMAIN: &str = "BIOPHYS:EXP2SYN:SNAP";

const PARAMS: [ParamInfo; 4] = [
    ParamInfo {
        name: "Gmax",
        label: "maximum conductance",
    },
    ParamInfo {
        name: "Er",
        label: "reversal potential",
    },
    ParamInfo {
        name: "tau1",
        label: "rise time",
    },
    ParamInfo {
        name: "tau2",
        label: "decay time",
    },
];

pub static EXP2SYN_DESCRIPTOR: DynamicsDescriptor = DynamicsDescriptor {
    name: MODEL_NAME,
    description: "Exp2Syn: dual-exponential synapse with unit-peak events",
    params: &PARAMS,
    state_vars: &["A", "B"],
    deriv_vars: &["dA/dt", "dB/dt"],
    trace_vars: &["A-trace", "B-trace"],
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Exp2SynParams {
    #[serde(rename = "Gmax")]
    pub gmax: f64,
    #[serde(rename = "Er")]
    pub er: f64,
    pub tau1: f64,
    pub tau2: f64,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamError {
    #[error("{name} must be finite, got {value}")]
    NotFinite { name: &'static str, value: f64 },
    #[error("{name} must be positive, got {value}")]
    NotPositive { name: &'static str, value: f64 },
}

impl ParamError {
    fn name(&self) -> &'static str {
        match self {
            ParamError::NotFinite { name, .. } | ParamError::NotPositive { name, .. } => name,
        }
    }
}

impl Exp2SynParams {
    pub fn field(&self, name: &str) -> Option<f64> {
        match name {
            "Gmax" => Some(self.gmax),
            "Er" => Some(self.er),
            "tau1" => Some(self.tau1),
            "tau2" => Some(self.tau2),
            _ => None,
        }
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut f64> {
        match name {
            "Gmax" => Some(&mut self.gmax),
            "Er" => Some(&mut self.er),
            "tau1" => Some(&mut self.tau1),
            "tau2" => Some(&mut self.tau2),
            _ => None,
        }
    }

    /// Opt-in sanity check. The numerical paths never call this; a bad value
    /// simply propagates through the floating-point math.
    pub fn validate(&self) -> Result<(), ParamError> {
        if !self.er.is_finite() {
            return Err(ParamError::NotFinite {
                name: "Er",
                value: self.er,
            });
        }
        for (name, value) in [("Gmax", self.gmax), ("tau1", self.tau1), ("tau2", self.tau2)] {
            if !value.is_finite() {
                return Err(ParamError::NotFinite { name, value });
            }
            if value <= 0.0 {
                return Err(ParamError::NotPositive { name, value });
            }
        }
        Ok(())
    }

    pub fn normalization(&self) -> PeakNormalization {
        PeakNormalization::new(self.tau1, self.tau2)
    }

    pub fn config_digest(&self) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(CONFIG_DIGEST_DOMAIN.as_bytes());
        update_str(&mut hasher, MODEL_NAME);
        update_f64(&mut hasher, self.gmax);
        update_f64(&mut hasher, self.er);
        update_f64(&mut hasher, self.tau1);
        update_f64(&mut hasher, self.tau2);
        *hasher.finalize().as_bytes()
    }
}

/// Rise constant used by the peak normalization.
pub fn clamp_tau_rise(tau1: f64, tau2: f64) -> f64 {
    if tau1 / tau2 > MAX_TAU_RATIO {
        MAX_TAU_RATIO * tau2
    } else {
        tau1
    }
}

/// Closed-form peak of the unit impulse response `exp(-t/tau2) - exp(-t/tau1)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakNormalization {
    /// Rise constant after the ratio clamp.
    pub tau1: f64,
    pub tau2: f64,
    pub t_peak: f64,
    /// Impulse response value at `t_peak`.
    pub factor0: f64,
    pub clamped: bool,
}

impl PeakNormalization {
    pub fn new(tau1: f64, tau2: f64) -> Self {
        let tau1_eff = clamp_tau_rise(tau1, tau2);
        let t_peak = (tau1_eff * tau2) / (tau2 - tau1_eff) * (tau2 / tau1_eff).ln();
        let factor0 = -(-t_peak / tau1_eff).exp() + (-t_peak / tau2).exp();
        Self {
            tau1: tau1_eff,
            tau2,
            t_peak,
            factor0,
            clamped: tau1 / tau2 > MAX_TAU_RATIO,
        }
    }

    /// Increment applied to both A and B for an event of `weight`.
    pub fn impulse(&self, weight: f64) -> f64 {
        weight / self.factor0
    }

    /// `B - A` at `t` after a single event of `weight` from rest.
    pub fn response(&self, weight: f64, t: f64) -> f64 {
        self.impulse(weight) * ((-t / self.tau2).exp() - (-t / self.tau1).exp())
    }
}

/// Dual-exponential synapse.
///
/// Conductance is `Gmax * (B - A)`. An event raises A and B by the same
/// amount; A then decays with `tau1` and B with `tau2`.
#[derive(Debug, Clone, PartialEq)]
pub struct Exp2Syn {
    params: Exp2SynParams,
    y: [f64; STATE_COUNT],
    mode: IntegrationMode,
}

impl Exp2Syn {
    pub fn new(params: Exp2SynParams, mode: IntegrationMode) -> Self {
        Self {
            params,
            y: [0.0; STATE_COUNT],
            mode,
        }
    }

    pub fn boxed(mode: IntegrationMode) -> Box<dyn Dynamics> {
        Box::new(Self::new(Exp2SynParams::default(), mode))
    }

    pub fn params(&self) -> &Exp2SynParams {
        &self.params
    }

    pub fn a(&self) -> f64 {
        self.y[A]
    }

    pub fn b(&self) -> f64 {
        self.y[B]
    }

    pub fn conductance(&self) -> f64 {
        self.params.gmax * (self.y[B] - self.y[A])
    }

    pub fn apply_event(&mut self, weight: f64) {
        let norm = self.params.normalization();
        if norm.clamped {
            tracing::trace!(
                tau1 = self.params.tau1,
                tau2 = self.params.tau2,
                tau1_eff = norm.tau1,
                "rise time clamped for peak normalization"
            );
        }
        let factor = norm.impulse(weight);
        self.y[A] += factor;
        self.y[B] += factor;
    }

    pub fn config_digest(&self) -> [u8; 32] {
        self.params.config_digest()
    }
}

impl Default for Exp2SynParams {
    fn default() -> Self {
        Self {
            gmax: 1.0,
            er: 0.0,
            tau1: 0.5,
            tau2: 3.0,
        }
    }
}

impl Dynamics for Exp2Syn {
    fn descriptor(&self) -> &'static DynamicsDescriptor {
        &EXP2SYN_DESCRIPTOR
    }

    fn mode(&self) -> IntegrationMode {
        self.mode
    }

    fn init(&mut self) -> Result<(), DynamicsError> {
        self.y = [0.0; STATE_COUNT];
        Ok(())
    }

    fn accept(&mut self, strength: f64, _window: WindowId, _origin: SynapseId) {
        self.apply_event(strength);
    }

    fn enqueue(&mut self, _start_time: f64, strength: f64) {
        self.apply_event(strength);
    }

    fn state(&self) -> &[f64] {
        &self.y
    }

    fn load_state(&mut self, y: &[f64]) -> Result<(), DynamicsError> {
        if self.mode != IntegrationMode::Derivative {
            return Err(DynamicsError::ModeMismatch {
                operation: "load_state",
                mode: self.mode,
            });
        }
        if y.len() != STATE_COUNT {
            return Err(DynamicsError::SlotCount {
                expected: STATE_COUNT,
                got: y.len(),
            });
        }
        self.y.copy_from_slice(y);
        Ok(())
    }

    fn derivs(&self, _t: f64, dydt: &mut [f64]) -> Result<(), DynamicsError> {
        if dydt.len() != STATE_COUNT {
            return Err(DynamicsError::SlotCount {
                expected: STATE_COUNT,
                got: dydt.len(),
            });
        }
        dydt[A] = -self.y[A] / self.params.tau1;
        dydt[B] = -self.y[B] / self.params.tau2;
        Ok(())
    }

    fn current(&self, _t: f64, v: f64) -> f64 {
        -self.params.gmax * (self.y[B] - self.y[A]) * (v - self.params.er)
    }

    fn advance(&mut self, _t: f64, h: f64) -> Result<(), DynamicsError> {
        if self.mode != IntegrationMode::SelfAdvance {
            return Err(DynamicsError::ModeMismatch {
                operation: "advance",
                mode: self.mode,
            });
        }
        let tau1 = 2.0 * self.params.tau1;
        let tau2 = 2.0 * self.params.tau2;
        self.y[A] *= (tau1 - h) / (tau1 + h);
        self.y[B] *= (tau2 - h) / (tau2 + h);
        Ok(())
    }

    fn implicit_current(&self, _t: f64) -> (f64, f64) {
        (self.conductance(), self.params.er)
    }

    fn param(&self, name: &str) -> Option<f64> {
        self.params.field(name)
    }

    fn set_param(&mut self, name: &str, value: f64) -> Result<(), DynamicsError> {
        let field = self
            .params
            .field_mut(name)
            .ok_or_else(|| DynamicsError::UnknownParam {
                model: MODEL_NAME,
                name: name.to_string(),
            })?;
        *field = value;
        Ok(())
    }

    fn validate(&self) -> Result<(), DynamicsError> {
        self.params
            .validate()
            .map_err(|err| DynamicsError::InvalidParam {
                name: err.name(),
                message: err.to_string(),
            })
    }

    fn snapshot_digest(&self) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(SNAPSHOT_DIGEST_DOMAIN.as_bytes());
        hasher.update(&self.params.config_digest());
        update_u8(&mut hasher, mode_code(self.mode));
        for value in self.y {
            update_f64(&mut hasher, value);
        }
        *hasher.finalize().as_bytes()
    }
}

fn mode_code(mode: IntegrationMode) -> u8 {
    match mode {
        IntegrationMode::Derivative => 0,
        IntegrationMode::SelfAdvance => 1,
    }
}

#[cfg(feature = "registry")]
pub fn register(
    registry: &mut biophys_dynamics_registry::DynamicsRegistry,
) -> Result<(), biophys_dynamics_registry::RegistryError> {
    registry.register(&EXP2SYN_DESCRIPTOR, Exp2Syn::boxed)
}

/// Registry holding every model of this workspace.
#[cfg(feature = "registry")]
pub fn default_registry(
) -> Result<biophys_dynamics_registry::DynamicsRegistry, biophys_dynamics_registry::RegistryError>
{
    let mut registry = biophys_dynamics_registry::DynamicsRegistry::new();
    register(&mut registry)?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_only_fires_above_ratio() {
        assert_eq!(clamp_tau_rise(0.5, 3.0), 0.5);
        assert_eq!(clamp_tau_rise(2.0, 2.0), MAX_TAU_RATIO * 2.0);
        assert_eq!(clamp_tau_rise(5.0, 2.0), MAX_TAU_RATIO * 2.0);
    }

    #[test]
    fn nan_rise_time_is_not_reported_as_clamped() {
        let norm = PeakNormalization::new(f64::NAN, 3.0);
        assert!(!norm.clamped);
        assert!(norm.tau1.is_nan());
        assert!(PeakNormalization::new(3.0, 3.0).clamped);
        assert!(!PeakNormalization::new(0.5, 3.0).clamped);
    }

    #[test]
    fn param_fields_cover_descriptor() {
        let mut params = Exp2SynParams::default();
        for info in EXP2SYN_DESCRIPTOR.params {
            assert!(params.field(info.name).is_some(), "{}", info.name);
            assert!(params.field_mut(info.name).is_some(), "{}", info.name);
        }
        assert!(params.field("gmax").is_none());
    }

    #[test]
    fn validate_rejects_bad_time_constants() {
        let mut params = Exp2SynParams::default();
        assert!(params.validate().is_ok());
        params.tau2 = 0.0;
        assert_eq!(
            params.validate(),
            Err(ParamError::NotPositive {
                name: "tau2",
                value: 0.0
            })
        );
        params.tau2 = 3.0;
        params.er = f64::NAN;
        assert!(matches!(
            params.validate(),
            Err(ParamError::NotFinite { name: "Er", .. })
        ));
    }

    #[test]
    fn config_digest_tracks_params() {
        let base = Exp2SynParams::default();
        let mut other = base;
        other.tau2 = 3.5;
        assert_eq!(base.config_digest(), Exp2SynParams::default().config_digest());
        assert_ne!(base.config_digest(), other.config_digest());
    }

    #[test]
    fn snapshot_digest_tracks_state() {
        let mut syn = Exp2Syn::new(Exp2SynParams::default(), IntegrationMode::SelfAdvance);
        let rest = syn.snapshot_digest();
        syn.apply_event(1.0);
        assert_ne!(rest, syn.snapshot_digest());
        syn.init().expect("init");
        assert_eq!(rest, syn.snapshot_digest());
    }
}

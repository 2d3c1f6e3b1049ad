//! Synapse parameter sets from the dentate gyrus network model
//! (Santhakumar, Aradi & Soltesz 2005), as used by its granule, basket,
//! mossy and HIPP cell builds.
//!
//! Time is in ms, potentials in mV and current in coulomb/ms, so one
//! nanoampere is `1e-6`.

use crate::Exp2SynParams;

pub const NANO_AMP: f64 = 1e-9 * 1e3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SynapsePreset {
    pub name: &'static str,
    pub pathway: &'static str,
    pub params: Exp2SynParams,
}

const fn preset(
    name: &'static str,
    pathway: &'static str,
    gmax: f64,
    tau1: f64,
    tau2: f64,
    er: f64,
) -> SynapsePreset {
    SynapsePreset {
        name,
        pathway,
        params: Exp2SynParams {
            gmax,
            er,
            tau1,
            tau2,
        },
    }
}

const PRESETS: &[SynapsePreset] = &[
    preset("gc_pp", "perforant path to granule distal dendrite", NANO_AMP * 0.02, 1.5, 5.5, 0.0),
    preset("gc_mc", "mossy cell to granule proximal dendrite", NANO_AMP, 1.5, 5.5, 0.0),
    preset("gc_hipp", "HIPP to granule distal dendrite", NANO_AMP, 0.5, 6.0, -70.0),
    preset("gc_bc", "basket to granule soma", NANO_AMP, 0.26, 5.5, -70.0),
    preset("gc_sprout", "sprouted mossy fiber to granule", NANO_AMP, 1.5, 5.5, 0.0),
    preset("bc_pp", "perforant path to basket distal dendrite", NANO_AMP * 0.01, 2.0, 6.3, 0.0),
    preset("bc_gc", "granule to basket proximal dendrite", NANO_AMP, 0.3, 0.6, 0.0),
    preset("bc_mc", "mossy cell to basket apical dendrite", NANO_AMP, 0.9, 3.6, 0.0),
    preset("bc_bc", "basket to basket apical dendrite", NANO_AMP, 0.16, 1.8, -70.0),
    preset("bc_hipp", "HIPP to basket distal dendrite", NANO_AMP, 0.4, 5.8, -70.0),
    preset("mc_pp", "perforant path to mossy distal dendrite", NANO_AMP * 0.005, 1.5, 5.5, 0.0),
    preset("mc_gc", "granule to mossy proximal dendrite", NANO_AMP, 0.5, 6.2, 0.0),
    preset("mc_mc", "mossy to mossy proximal dendrite", NANO_AMP, 0.45, 2.2, 0.0),
    preset("mc_bc", "basket to mossy soma", NANO_AMP, 0.3, 3.3, -70.0),
    preset("mc_hipp", "HIPP to mossy dendrite", NANO_AMP, 0.5, 6.0, -70.0),
    preset("hipp_gc", "granule to HIPP proximal dendrite", NANO_AMP, 0.3, 0.6, 0.0),
    preset("hipp_mc", "mossy to HIPP mid dendrite", NANO_AMP, 0.9, 3.6, 0.0),
];

pub fn presets() -> &'static [SynapsePreset] {
    PRESETS
}

pub fn preset_params(name: &str) -> Option<Exp2SynParams> {
    PRESETS
        .iter()
        .find(|preset| preset.name == name)
        .map(|preset| preset.params)
}

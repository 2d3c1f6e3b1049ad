#![forbid(unsafe_code)]

use biophys_core::{Dynamics, IntegrationMode, SynapseId, WindowId};
use biophys_dynamics_registry::{install, DynamicsSpec};
use biophys_synapses_exp2::{default_registry, presets::preset_params};
use biophys_trace::{trace_digest, write_trace, write_trace_text, TraceRecorder};
use tracing_subscriber::EnvFilter;

const PRESET: &str = "gc_bc";
const DT_MS: f64 = 0.025;
const DURATION_MS: f64 = 30.0;
const TRACE_FILE: &str = "exp2syn_gc_bc.bin";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let registry = install(default_registry()?)?;
    let params = preset_params(PRESET).ok_or("unknown preset")?;
    let spec = DynamicsSpec {
        name: PRESET.to_string(),
        model: "Exp2Syn".to_string(),
        mode: IntegrationMode::SelfAdvance,
        params: [
            ("Gmax".to_string(), params.gmax),
            ("Er".to_string(), params.er),
            ("tau1".to_string(), params.tau1),
            ("tau2".to_string(), params.tau2),
        ]
        .into_iter()
        .collect(),
    };
    let mut syn = registry.build(&spec)?;

    let steps = (DURATION_MS / DT_MS) as usize;
    let mut recorder = TraceRecorder::new(SynapseId(0), syn.descriptor(), steps + 1);
    syn.accept(1.0, WindowId(0), SynapseId(0));
    recorder.record(0.0, &*syn)?;

    let mut peak = (0.0, 0.0);
    for step in 0..steps {
        let t = step as f64 * DT_MS;
        syn.advance(t, DT_MS)?;
        recorder.record(t + DT_MS, &*syn)?;
        let (g, _) = syn.implicit_current(t + DT_MS);
        if g > peak.1 {
            peak = (t + DT_MS, g);
        }
    }

    let expected = params.normalization();
    println!(
        "{PRESET}: peak g={:.4e} at t={:.3} ms (closed form t_peak={:.3} ms, Gmax={:.4e})",
        peak.1, peak.0, expected.t_peak, params.gmax
    );

    let trace = recorder.into_trace_file(params.config_digest());
    write_trace(std::env::temp_dir().join(TRACE_FILE), &trace)?;
    println!("trace digest {:02x?}", &trace_digest(&trace)[..8]);
    write_trace_text(std::io::stdout().lock(), &trace)?;
    Ok(())
}

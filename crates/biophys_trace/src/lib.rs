#![forbid(unsafe_code)]

use biophys_core::{
    update_f64, update_str, update_u32, Dynamics, DynamicsDescriptor, SynapseId,
};
use blake3::Hasher;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use thiserror::Error;

pub const TRACE_VERSION: u32 = 1;
const TRACE_DIGEST_DOMAIN: &str = "BIOPHYS:TRACE:SAMPLES";
const MAX_VARS: usize = 16;
const MAX_LABEL_BYTES: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceHeader {
    pub trace_version: u32,
    pub model_config_digest: [u8; 32],
    pub synapse_id: u32,
    pub var_count: u32,
    pub samples: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TraceSample {
    pub time: f64,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TraceFile {
    pub header: TraceHeader,
    pub labels: Vec<String>,
    pub samples: Vec<TraceSample>,
}

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("trace encoding error: {message}")]
    InvalidFormat { message: String },
    #[error("trace is full: at most {max} samples")]
    TooManySamples { max: usize },
    #[error("trace validation failed: {message}")]
    Validation { message: String },
}

/// Samples the state vector of one dynamics instance, labelled with the
/// model's trace variable names.
#[derive(Debug, Clone)]
pub struct TraceRecorder {
    synapse_id: SynapseId,
    labels: &'static [&'static str],
    samples: Vec<TraceSample>,
    max_samples: usize,
}

impl TraceRecorder {
    pub fn new(
        synapse_id: SynapseId,
        descriptor: &'static DynamicsDescriptor,
        max_samples: usize,
    ) -> Self {
        Self {
            synapse_id,
            labels: descriptor.trace_vars,
            samples: Vec::new(),
            max_samples,
        }
    }

    pub fn synapse_id(&self) -> SynapseId {
        self.synapse_id
    }

    pub fn labels(&self) -> &'static [&'static str] {
        self.labels
    }

    pub fn samples(&self) -> &[TraceSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn record(&mut self, time: f64, dynamics: &dyn Dynamics) -> Result<(), TraceError> {
        if self.samples.len() >= self.max_samples {
            return Err(TraceError::TooManySamples {
                max: self.max_samples,
            });
        }
        let state = dynamics.state();
        if state.len() != self.labels.len() {
            return Err(TraceError::Validation {
                message: format!(
                    "state has {} values but trace has {} labels",
                    state.len(),
                    self.labels.len()
                ),
            });
        }
        self.samples.push(TraceSample {
            time,
            values: state.to_vec(),
        });
        Ok(())
    }

    pub fn column(&self, label: &str) -> Option<Vec<f64>> {
        let index = self.labels.iter().position(|name| *name == label)?;
        Some(self.samples.iter().map(|sample| sample.values[index]).collect())
    }

    pub fn into_trace_file(self, model_config_digest: [u8; 32]) -> TraceFile {
        TraceFile {
            header: TraceHeader {
                trace_version: TRACE_VERSION,
                model_config_digest,
                synapse_id: self.synapse_id.0,
                var_count: self.labels.len() as u32,
                samples: self.samples.len() as u32,
            },
            labels: self.labels.iter().map(|label| label.to_string()).collect(),
            samples: self.samples,
        }
    }
}

pub fn trace_digest(trace: &TraceFile) -> [u8; 32] {
    let mut hasher = Hasher::new();
    hasher.update(TRACE_DIGEST_DOMAIN.as_bytes());
    hasher.update(&trace.header.model_config_digest);
    update_u32(&mut hasher, trace.header.synapse_id);
    for label in &trace.labels {
        update_str(&mut hasher, label);
    }
    for sample in &trace.samples {
        update_f64(&mut hasher, sample.time);
        for value in &sample.values {
            update_f64(&mut hasher, *value);
        }
    }
    *hasher.finalize().as_bytes()
}

pub fn write_trace(path: impl AsRef<Path>, trace: &TraceFile) -> Result<(), TraceError> {
    validate_trace(trace)?;

    let path = path.as_ref();
    let mut file = BufWriter::new(File::create(path)?);
    write_header(&mut file, &trace.header)?;
    for label in &trace.labels {
        write_label(&mut file, label)?;
    }
    for sample in &trace.samples {
        write_sample(&mut file, sample)?;
    }
    file.flush()?;
    tracing::debug!(
        path = %path.display(),
        samples = trace.samples.len(),
        "wrote trace"
    );
    Ok(())
}

pub fn read_trace(path: impl AsRef<Path>) -> Result<TraceFile, TraceError> {
    let path = path.as_ref();
    let mut file = File::open(path)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    let mut cursor = 0usize;

    let header = read_header(&bytes, &mut cursor)?;
    if header.trace_version != TRACE_VERSION {
        return Err(TraceError::InvalidFormat {
            message: format!("unsupported trace version {}", header.trace_version),
        });
    }
    let var_count = header.var_count as usize;
    if var_count > MAX_VARS {
        return Err(TraceError::InvalidFormat {
            message: format!("too many trace variables: {var_count}"),
        });
    }
    let mut labels = Vec::with_capacity(var_count);
    for _ in 0..var_count {
        labels.push(read_label(&bytes, &mut cursor)?);
    }
    let sample_bytes = (var_count + 1) * 8;
    let max_samples = (bytes.len() - cursor) / sample_bytes;
    let mut samples = Vec::with_capacity((header.samples as usize).min(max_samples));
    for _ in 0..header.samples {
        samples.push(read_sample(&bytes, &mut cursor, var_count)?);
    }

    if cursor != bytes.len() {
        return Err(TraceError::InvalidFormat {
            message: "extra bytes at end of trace".to_string(),
        });
    }

    tracing::debug!(path = %path.display(), samples = samples.len(), "read trace");
    Ok(TraceFile {
        header,
        labels,
        samples,
    })
}

/// One `label time value` line per variable per sample.
pub fn write_trace_text(mut writer: impl Write, trace: &TraceFile) -> Result<(), TraceError> {
    validate_trace(trace)?;
    for sample in &trace.samples {
        for (label, value) in trace.labels.iter().zip(sample.values.iter()) {
            writeln!(writer, "{label} {} {}", sample.time, value)?;
        }
    }
    writer.flush()?;
    Ok(())
}

fn validate_trace(trace: &TraceFile) -> Result<(), TraceError> {
    if trace.samples.len() != trace.header.samples as usize {
        return Err(TraceError::Validation {
            message: format!(
                "header samples {} does not match trace samples {}",
                trace.header.samples,
                trace.samples.len()
            ),
        });
    }
    if trace.labels.len() != trace.header.var_count as usize || trace.labels.len() > MAX_VARS {
        return Err(TraceError::Validation {
            message: format!(
                "header var count {} does not match {} labels",
                trace.header.var_count,
                trace.labels.len()
            ),
        });
    }
    if let Some(label) = trace.labels.iter().find(|label| label.len() > MAX_LABEL_BYTES) {
        return Err(TraceError::Validation {
            message: format!("label {label} exceeds {MAX_LABEL_BYTES} bytes"),
        });
    }
    for (idx, sample) in trace.samples.iter().enumerate() {
        if sample.values.len() != trace.labels.len() {
            return Err(TraceError::Validation {
                message: format!(
                    "sample {idx} has {} values, expected {}",
                    sample.values.len(),
                    trace.labels.len()
                ),
            });
        }
    }
    Ok(())
}

fn write_header(mut writer: impl Write, header: &TraceHeader) -> Result<(), TraceError> {
    writer.write_all(&header.trace_version.to_le_bytes())?;
    writer.write_all(&header.model_config_digest)?;
    writer.write_all(&header.synapse_id.to_le_bytes())?;
    writer.write_all(&header.var_count.to_le_bytes())?;
    writer.write_all(&header.samples.to_le_bytes())?;
    Ok(())
}

/// Callers run `validate_trace` first, so the length fits in one byte.
fn write_label(mut writer: impl Write, label: &str) -> Result<(), TraceError> {
    writer.write_all(&[label.len() as u8])?;
    writer.write_all(label.as_bytes())?;
    Ok(())
}

fn write_sample(mut writer: impl Write, sample: &TraceSample) -> Result<(), TraceError> {
    writer.write_all(&sample.time.to_bits().to_le_bytes())?;
    for value in &sample.values {
        writer.write_all(&value.to_bits().to_le_bytes())?;
    }
    Ok(())
}

fn read_header(bytes: &[u8], cursor: &mut usize) -> Result<TraceHeader, TraceError> {
    Ok(TraceHeader {
        trace_version: read_u32(bytes, cursor)?,
        model_config_digest: read_digest(bytes, cursor)?,
        synapse_id: read_u32(bytes, cursor)?,
        var_count: read_u32(bytes, cursor)?,
        samples: read_u32(bytes, cursor)?,
    })
}

fn read_label(bytes: &[u8], cursor: &mut usize) -> Result<String, TraceError> {
    let len = read_slice(bytes, cursor, 1)?[0] as usize;
    if len > MAX_LABEL_BYTES {
        return Err(TraceError::InvalidFormat {
            message: format!("label length {len} exceeds {MAX_LABEL_BYTES}"),
        });
    }
    let raw = read_slice(bytes, cursor, len)?;
    String::from_utf8(raw.to_vec()).map_err(|_| TraceError::InvalidFormat {
        message: "label is not utf-8".to_string(),
    })
}

fn read_sample(
    bytes: &[u8],
    cursor: &mut usize,
    var_count: usize,
) -> Result<TraceSample, TraceError> {
    let time = read_f64(bytes, cursor)?;
    let mut values = Vec::with_capacity(var_count);
    for _ in 0..var_count {
        values.push(read_f64(bytes, cursor)?);
    }
    Ok(TraceSample { time, values })
}

fn read_u32(bytes: &[u8], cursor: &mut usize) -> Result<u32, TraceError> {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(read_slice(bytes, cursor, 4)?);
    Ok(u32::from_le_bytes(buf))
}

fn read_f64(bytes: &[u8], cursor: &mut usize) -> Result<f64, TraceError> {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(read_slice(bytes, cursor, 8)?);
    Ok(f64::from_bits(u64::from_le_bytes(buf)))
}

fn read_digest(bytes: &[u8], cursor: &mut usize) -> Result<[u8; 32], TraceError> {
    let mut out = [0u8; 32];
    out.copy_from_slice(read_slice(bytes, cursor, 32)?);
    Ok(out)
}

fn read_slice<'a>(bytes: &'a [u8], cursor: &mut usize, len: usize) -> Result<&'a [u8], TraceError> {
    let end = cursor
        .checked_add(len)
        .ok_or_else(|| TraceError::InvalidFormat {
            message: "unexpected eof".to_string(),
        })?;
    if end > bytes.len() {
        return Err(TraceError::InvalidFormat {
            message: "unexpected eof".to_string(),
        });
    }
    let slice = &bytes[*cursor..end];
    *cursor = end;
    Ok(slice)
}

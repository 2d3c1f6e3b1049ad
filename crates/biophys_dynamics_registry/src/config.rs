use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use biophys_core::{Dynamics, IntegrationMode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{DynamicsRegistry, RegistryError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DynamicsSpec {
    pub name: String,
    pub model: String,
    pub mode: IntegrationMode,
    #[serde(default)]
    pub params: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DynamicsSetConfig {
    pub version: u32,
    pub dynamics: Vec<DynamicsSpec>,
}

#[derive(Debug)]
pub struct NamedDynamics {
    pub name: String,
    pub dynamics: Box<dyn Dynamics>,
}

impl DynamicsSetConfig {
    pub fn instantiate(
        &self,
        registry: &DynamicsRegistry,
    ) -> Result<Vec<NamedDynamics>, RegistryError> {
        self.dynamics
            .iter()
            .map(|spec| {
                Ok(NamedDynamics {
                    name: spec.name.clone(),
                    dynamics: registry.build(spec)?,
                })
            })
            .collect()
    }
}

pub fn parse_dynamics_set(source: &str) -> Result<DynamicsSetConfig, serde_yaml::Error> {
    serde_yaml::from_str(source)
}

pub fn load_dynamics_set(path: impl AsRef<Path>) -> Result<DynamicsSetConfig, ConfigError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_dynamics_set(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(
        path = %path.display(),
        entries = config.dynamics.len(),
        "loaded dynamics set"
    );
    Ok(config)
}

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use biophys_core::{Dynamics, DynamicsDescriptor, DynamicsError, IntegrationMode};
use once_cell::sync::OnceCell;
use thiserror::Error;

pub mod config;

pub use config::{
    load_dynamics_set, parse_dynamics_set, ConfigError, DynamicsSetConfig, DynamicsSpec,
    NamedDynamics,
};

pub type DynamicsFactory = fn(IntegrationMode) -> Box<dyn Dynamics>;

static GLOBAL_REGISTRY: OnceCell<DynamicsRegistry> = OnceCell::new();

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("model {0} is already registered")]
    Duplicate(&'static str),
    #[error("unknown model {0}")]
    UnknownModel(String),
    #[error("a dynamics registry is already installed")]
    AlreadyInstalled,
    #[error("no dynamics registry installed")]
    NotInstalled,
    #[error("failed to build {instance}: {source}")]
    Build {
        instance: String,
        #[source]
        source: DynamicsError,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct RegistryEntry {
    pub descriptor: &'static DynamicsDescriptor,
    factory: DynamicsFactory,
}

impl RegistryEntry {
    pub fn create(&self, mode: IntegrationMode) -> Box<dyn Dynamics> {
        (self.factory)(mode)
    }
}

/// Model name to factory table. Populated once during setup; entries are
/// never removed.
#[derive(Debug, Clone, Default)]
pub struct DynamicsRegistry {
    entries: BTreeMap<&'static str, RegistryEntry>,
}

impl DynamicsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        descriptor: &'static DynamicsDescriptor,
        factory: DynamicsFactory,
    ) -> Result<(), RegistryError> {
        if self.entries.contains_key(descriptor.name) {
            return Err(RegistryError::Duplicate(descriptor.name));
        }
        self.entries.insert(
            descriptor.name,
            RegistryEntry {
                descriptor,
                factory,
            },
        );
        tracing::debug!(model = descriptor.name, "registered dynamics model");
        Ok(())
    }

    pub fn entry(&self, name: &str) -> Option<&RegistryEntry> {
        self.entries.get(name)
    }

    pub fn descriptor(&self, name: &str) -> Option<&'static DynamicsDescriptor> {
        self.entries.get(name).map(|entry| entry.descriptor)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn create(
        &self,
        name: &str,
        mode: IntegrationMode,
    ) -> Result<Box<dyn Dynamics>, RegistryError> {
        self.entries
            .get(name)
            .map(|entry| entry.create(mode))
            .ok_or_else(|| RegistryError::UnknownModel(name.to_string()))
    }

    /// Create an instance from a configuration entry, apply its parameters
    /// and validate the result.
    pub fn build(&self, spec: &DynamicsSpec) -> Result<Box<dyn Dynamics>, RegistryError> {
        let mut dynamics = self.create(&spec.model, spec.mode)?;
        let build_err = |source: DynamicsError| RegistryError::Build {
            instance: spec.name.clone(),
            source,
        };
        for (name, value) in &spec.params {
            dynamics.set_param(name, *value).map_err(build_err)?;
        }
        dynamics.validate().map_err(build_err)?;
        dynamics.init().map_err(build_err)?;
        Ok(dynamics)
    }
}

/// Install `registry` as the process-wide registry. Only the first call
/// succeeds.
pub fn install(registry: DynamicsRegistry) -> Result<&'static DynamicsRegistry, RegistryError> {
    let count = registry.len();
    GLOBAL_REGISTRY
        .set(registry)
        .map_err(|_| RegistryError::AlreadyInstalled)?;
    tracing::info!(models = count, "dynamics registry installed");
    global()
}

pub fn global() -> Result<&'static DynamicsRegistry, RegistryError> {
    GLOBAL_REGISTRY.get().ok_or(RegistryError::NotInstalled)
}

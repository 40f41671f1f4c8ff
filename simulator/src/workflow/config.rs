use crate::generator::profile::GeneratorConfig;
use anyhow::Context;
use energycore::DeviceConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Everything the simulator reads from its YAML file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub device: DeviceConfig,
    pub generator: GeneratorConfig,
}

impl SimulatorConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading simulator config {}", path_ref.display()))?;
        let config: SimulatorConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing simulator config {}", path_ref.display()))?;
        config
            .device
            .validate()
            .with_context(|| format!("validating device config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

use log::warn;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use toml::*;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SimConfig {
    /// Cycles after which a run that has not drained is an error.
    pub timeout: u64,
    /// Clock each unit group on its own thread.
    pub parallel: bool,
}

pub trait Config: DeserializeOwned + Default {
    fn from_section(section: Option<&Value>) -> Result<Self, anyhow::Error> {
        match section {
            Some(value) => Ok(value.clone().try_into()?),
            None => {
                warn!("config section not found");
                Ok(Self::default())
            }
        }
    }
}

impl Config for SimConfig {}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            timeout: 10000000,
            parallel: false,
        }
    }
}

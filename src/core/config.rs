//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Auxiliary structure to parse EngineConfig from file
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct EngineConfigRaw {
    /// wall-clock budget for the whole session, in seconds
    pub time_budget: Option<f64>,
    /// penalty charged per violated soft affinity rule
    pub soft_affinity_penalty: Option<f64>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct EngineConfig {
    /// wall-clock budget for the whole session, in seconds
    pub time_budget: f64,
    /// penalty charged per violated soft affinity rule
    pub soft_affinity_penalty: f64,
}

impl EngineConfig {
    /// Creates engine config by reading parameter values from .yaml file
    /// (uses default values if some parameters are absent).
    pub fn from_file(file_name: &str) -> Self {
        let raw: EngineConfigRaw = serde_yaml::from_str(
            &std::fs::read_to_string(file_name).unwrap_or_else(|_| panic!("Can't read file {}", file_name)),
        )
        .unwrap_or_else(|_| panic!("Can't parse YAML from file {}", file_name));

        Self {
            time_budget: raw.time_budget.unwrap_or(14.),
            soft_affinity_penalty: raw.soft_affinity_penalty.unwrap_or(1000.),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            time_budget: 14.,
            soft_affinity_penalty: 1000.,
        }
    }
}

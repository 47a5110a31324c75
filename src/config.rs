use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Result;

const DEFAULT_NAME: &str = "RAME";
const DEFAULT_LEARNING_RATE: f32 = 0.01;
const DEFAULT_MOMENTUM: f32 = 0.9;
const DEFAULT_QUANTUM: f32 = 0.25;
const DEFAULT_DECAY: f32 = 0.;

/// The exported configuration of a `Rame` optimizer.
///
/// Holds the four hyperparameters of the update rule plus the optimizer's
/// `name`, the only field the host side of the contract contributes. The
/// serialized keys are the ones checkpoints are written with: `lr`,
/// `momentum`, `quantum`, `decay` and `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RameConfig {
    pub name: String,
    #[serde(rename = "lr")]
    pub learning_rate: f32,
    pub momentum: f32,
    pub quantum: f32,
    pub decay: f32,
}

impl Default for RameConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            learning_rate: DEFAULT_LEARNING_RATE,
            momentum: DEFAULT_MOMENTUM,
            quantum: DEFAULT_QUANTUM,
            decay: DEFAULT_DECAY,
        }
    }
}

impl RameConfig {
    /// Creates a new `RameConfig` with the default name.
    ///
    /// # Arguments
    /// * `learning_rate` - The step size before decay is applied.
    /// * `momentum` - The velocity retention coefficient.
    /// * `quantum` - The exponent that flattens the magnitude of each step.
    /// * `decay` - The learning rate decay coefficient, `0` disables decay.
    ///
    /// # Returns
    /// A new `RameConfig` instance.
    pub fn new(learning_rate: f32, momentum: f32, quantum: f32, decay: f32) -> Self {
        Self {
            learning_rate,
            momentum,
            quantum,
            decay,
            ..Default::default()
        }
    }

    /// Flattens this configuration into a name to value mapping.
    ///
    /// # Returns
    /// A json object with one entry per field.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("name".into(), Value::from(self.name.as_str()));
        map.insert("lr".into(), Value::from(self.learning_rate));
        map.insert("momentum".into(), Value::from(self.momentum));
        map.insert("quantum".into(), Value::from(self.quantum));
        map.insert("decay".into(), Value::from(self.decay));
        map
    }

    /// Serializes this configuration as a json string.
    ///
    /// # Returns
    /// The json string or a `Serde` error.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses a configuration from a json string, missing fields take their default value.
    ///
    /// # Arguments
    /// * `s` - The json source.
    ///
    /// # Returns
    /// The parsed configuration or a `Serde` error.
    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = RameConfig::default();

        assert_eq!(cfg.name, "RAME");
        assert_eq!(cfg.learning_rate, 0.01);
        assert_eq!(cfg.momentum, 0.9);
        assert_eq!(cfg.quantum, 0.25);
        assert_eq!(cfg.decay, 0.);
    }

    #[test]
    fn test_map_uses_checkpoint_keys() {
        let map = RameConfig::new(0.05, 0.8, 0.1, 0.01).to_map();

        assert_eq!(map.len(), 5);
        assert_eq!(map["name"], "RAME");
        assert_eq!(map["lr"].as_f64().unwrap() as f32, 0.05);
        assert_eq!(map["momentum"].as_f64().unwrap() as f32, 0.8);
        assert_eq!(map["quantum"].as_f64().unwrap() as f32, 0.1);
        assert_eq!(map["decay"].as_f64().unwrap() as f32, 0.01);
    }

    #[test]
    fn test_missing_fields_fall_back_to_defaults() {
        let cfg = RameConfig::from_json(r#"{"lr": 0.5, "decay": 0.001}"#).unwrap();

        assert_eq!(cfg.learning_rate, 0.5);
        assert_eq!(cfg.decay, 0.001);
        assert_eq!(cfg.momentum, 0.9);
        assert_eq!(cfg.quantum, 0.25);
        assert_eq!(cfg.name, "RAME");
    }

    #[test]
    fn test_json_round_trip() {
        let cfg = RameConfig::new(0.2, 0.5, 0.3, 0.1);
        let parsed = RameConfig::from_json(&cfg.to_json().unwrap()).unwrap();

        assert_eq!(parsed, cfg);
    }

    #[test]
    fn test_malformed_json_is_rejected() {
        assert!(RameConfig::from_json("{\"lr\": \"fast\"}").is_err());
    }
}

//! Atmosphere configuration
//!
//! The configuration is serializable and can be saved to and loaded from
//! Python pickle files.

use crate::layer::Wind;
use serde::{Deserialize, Serialize};
use serde_pickle as pickle;
use std::{fs::File, path::Path};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to open the configuration file")]
    Io(#[from] std::io::Error),
    #[error("failed to (de)serialize the configuration")]
    Pickle(#[from] pickle::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
type Result<T> = std::result::Result<T, ConfigError>;

/// Turbulence layer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    /// Altitude [m]
    pub altitude: f64,
    /// Fraction of the turbulence in the layer
    pub weight: f64,
    /// Wind speed [m/s]
    #[serde(default)]
    pub wind_speed: f64,
    /// Wind direction [rd]
    #[serde(default)]
    pub wind_direction: f64,
}
impl LayerConfig {
    /// Layer at `altitude` [m] with the fraction `weight` of the turbulence and no wind
    pub fn new(altitude: f64, weight: f64) -> Self {
        Self {
            altitude,
            weight,
            wind_speed: 0f64,
            wind_direction: 0f64,
        }
    }
    /// Sets the wind speed [m/s] and direction [rd]
    pub fn wind(self, speed: f64, direction: f64) -> Self {
        Self {
            wind_speed: speed,
            wind_direction: direction,
            ..self
        }
    }
    pub fn wind_vector(&self) -> Wind {
        Wind::new(self.wind_speed, self.wind_direction)
    }
}

/// Atmosphere configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtmosphereConfig {
    /// Fried parameter [m] at `wavelength`
    pub r0: f64,
    /// Outer scale [m]
    pub outer_scale: f64,
    /// Reference wavelength [m]
    pub wavelength: f64,
    /// Time step [s]
    pub sampling_time: f64,
    /// Random number generator seed
    pub seed: u64,
    pub layers: Vec<LayerConfig>,
}
impl Default for AtmosphereConfig {
    fn default() -> Self {
        Self {
            r0: 0.15,
            outer_scale: 30f64,
            wavelength: 500e-9,
            sampling_time: 1e-3,
            seed: 0,
            layers: vec![LayerConfig::new(0f64, 1f64).wind(10f64, 0f64)],
        }
    }
}
impl AtmosphereConfig {
    /// Loads the configuration from a pickle file
    pub fn from_pickle<P: AsRef<Path>>(path: P) -> Result<Self> {
        log::info!("Loading {:?}...", path.as_ref());
        let mut file = File::open(path)?;
        let config: Self = pickle::from_reader(&mut file, Default::default())?;
        config.check()?;
        Ok(config)
    }
    /// Saves the configuration to a pickle file
    pub fn to_pickle<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut file = File::create(path)?;
        pickle::to_writer(&mut file, self, Default::default())?;
        Ok(())
    }
    /// Checks the consistency of the configuration
    pub fn check(&self) -> Result<()> {
        let positive = |value: f64| value.is_finite() && value > 0f64;
        if !positive(self.r0) {
            return Err(ConfigError::Invalid(format!("r0={}m", self.r0)));
        }
        if !positive(self.outer_scale) {
            return Err(ConfigError::Invalid(format!(
                "outer scale={}m",
                self.outer_scale
            )));
        }
        if !positive(self.wavelength) {
            return Err(ConfigError::Invalid(format!(
                "wavelength={}m",
                self.wavelength
            )));
        }
        if !(self.sampling_time.is_finite() && self.sampling_time >= 0f64) {
            return Err(ConfigError::Invalid(format!(
                "sampling time={}s",
                self.sampling_time
            )));
        }
        if self.layers.is_empty() {
            return Err(ConfigError::Invalid("no turbulence layer".to_string()));
        }
        for (i, layer) in self.layers.iter().enumerate() {
            if !(layer.altitude.is_finite() && layer.altitude >= 0f64) {
                return Err(ConfigError::Invalid(format!(
                    "layer #{i} altitude={}m",
                    layer.altitude
                )));
            }
            if !(layer.weight > 0f64 && layer.weight <= 1f64) {
                return Err(ConfigError::Invalid(format!(
                    "layer #{i} weight={}",
                    layer.weight
                )));
            }
            if !(layer.wind_speed.is_finite() && layer.wind_direction.is_finite()) {
                return Err(ConfigError::Invalid(format!(
                    "layer #{i} wind={:?}",
                    layer.wind_vector()
                )));
            }
        }
        let total: f64 = self.layers.iter().map(|layer| layer.weight).sum();
        if (total - 1f64).abs() > 1e-6 {
            return Err(ConfigError::Invalid(format!(
                "the layer weights sum to {total}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(AtmosphereConfig::default().check().is_ok());
    }

    #[test]
    fn weights() {
        let config = AtmosphereConfig {
            layers: vec![LayerConfig::new(0., 0.5), LayerConfig::new(5e3, 0.4)],
            ..Default::default()
        };
        assert!(matches!(config.check(), Err(ConfigError::Invalid(_))));
        let config = AtmosphereConfig {
            layers: vec![],
            ..Default::default()
        };
        assert!(config.check().is_err());
    }

    #[test]
    fn pickle() {
        let config = AtmosphereConfig {
            seed: 12,
            layers: vec![
                LayerConfig::new(0., 0.7).wind(5.5, 0.1),
                LayerConfig::new(8e3, 0.3).wind(21., -1.),
            ],
            ..Default::default()
        };
        let path = std::env::temp_dir().join("ao-atmosphere_config.pkl");
        config.to_pickle(&path).unwrap();
        let loaded = AtmosphereConfig::from_pickle(&path).unwrap();
        assert_eq!(loaded, config);
        let _ = std::fs::remove_file(path);
    }
}

//! Light sources
//!
//! A [Source] is defined by its direction on the sky, its height (infinite for
//! a star, finite for a laser guide star) and its wavelength.

use serde::{Deserialize, Serialize};
use std::fmt;
use strum_macros::{EnumIter, EnumString};

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("invalid source wavelength: {0}m")]
    Wavelength(f64),
    #[error("invalid source height: {0}m")]
    Height(f64),
    #[error("invalid source direction: zenith={0}rd, azimuth={1}rd")]
    Direction(f64, f64),
    #[error("invalid source sampling: {0}px")]
    Resolution(usize),
}
type Result<T> = std::result::Result<T, SourceError>;

/// Photometric bands
#[derive(EnumIter, EnumString, Clone, Copy, PartialEq, Debug, Serialize, Deserialize)]
pub enum Band {
    V,
    R,
    I,
    J,
    H,
    K,
}
impl Band {
    /// Band central wavelength [m]
    pub fn wavelength(&self) -> f64 {
        use Band::*;
        match self {
            V => 0.55e-6,
            R => 0.64e-6,
            I => 0.79e-6,
            J => 1.215e-6,
            H => 1.654e-6,
            K => 2.179e-6,
        }
    }
}
impl From<Band> for f64 {
    fn from(band: Band) -> Self {
        band.wavelength()
    }
}
impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({:.3}micron)", self, self.wavelength() * 1e6)
    }
}

/// Light source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Zenith angle [rd]
    pub zenith: f64,
    /// Azimuth angle [rd]
    pub azimuth: f64,
    /// Height [m]
    pub height: f64,
    /// Wavelength [m]
    pub wavelength: f64,
    /// Pupil sampling, the telescope resolution if `None`
    pub resolution: Option<usize>,
}
impl Default for Source {
    fn default() -> Self {
        Self {
            zenith: 0f64,
            azimuth: 0f64,
            height: f64::INFINITY,
            wavelength: Band::V.wavelength(),
            resolution: None,
        }
    }
}
impl Source {
    /// On-axis star in the given photometric band
    pub fn new(band: Band) -> Self {
        Self {
            wavelength: band.into(),
            ..Default::default()
        }
    }
    /// Sets the source direction: zenith and azimuth angles [rd]
    pub fn direction_angles(self, zenith: f64, azimuth: f64) -> Self {
        Self {
            zenith,
            azimuth,
            ..self
        }
    }
    /// Sets the source height [m]
    pub fn height(self, height: f64) -> Self {
        Self { height, ..self }
    }
    /// Sets the source wavelength [m]
    pub fn wavelength(self, wavelength: f64) -> Self {
        Self { wavelength, ..self }
    }
    /// Sets the source pupil sampling
    pub fn resolution(self, resolution: usize) -> Self {
        Self {
            resolution: Some(resolution),
            ..self
        }
    }
    /// Direction cosines `tan(z)[cos(a),sin(a)]`
    pub fn direction(&self) -> [f64; 2] {
        let t = self.zenith.tan();
        let (s, c) = self.azimuth.sin_cos();
        [t * c, t * s]
    }
    /// Checks the source parameters
    pub fn check(&self) -> Result<()> {
        if !(self.wavelength.is_finite() && self.wavelength > 0f64) {
            return Err(SourceError::Wavelength(self.wavelength));
        }
        if !(self.height > 0f64) {
            return Err(SourceError::Height(self.height));
        }
        if !(self.zenith.is_finite()
            && self.azimuth.is_finite()
            && self.zenith.abs() < std::f64::consts::FRAC_PI_2)
        {
            return Err(SourceError::Direction(self.zenith, self.azimuth));
        }
        match self.resolution {
            Some(n) if n < 2 => Err(SourceError::Resolution(n)),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn bands() {
        let wavelengths: Vec<f64> = Band::iter().map(|band| band.into()).collect();
        assert_eq!(wavelengths.len(), 6);
        assert!(wavelengths.windows(2).all(|w| w[1] > w[0]));
        assert_eq!(Band::from_str("K").unwrap(), Band::K);
        assert!(Band::from_str("Z").is_err());
    }

    #[test]
    fn direction() {
        let src = Source::new(Band::R)
            .direction_angles(30f64.to_radians(), 90f64.to_radians())
            .height(90e3);
        let [x, y] = src.direction();
        assert!(x.abs() < 1e-15);
        assert!((y - 30f64.to_radians().tan()).abs() < 1e-15);
        assert!(src.check().is_ok());
    }

    #[test]
    fn invalid() {
        assert!(Source::default().wavelength(0.).check().is_err());
        assert!(Source::default().height(-1.).check().is_err());
        assert!(Source::default().height(f64::NAN).check().is_err());
        assert!(Source::default().resolution(1).check().is_err());
        assert!(Source::default().check().is_ok());
    }
}

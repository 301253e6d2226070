//! Telescope pupil
//!
//! The telescope sets the sampling of the turbulence layers: the layer pixel
//! size is the pupil pixel size and the layers are large enough to cover the
//! pupil footprint of every source within the field of view.

use crate::layer::Geometry;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum TelescopeError {
    #[error("the telescope pupil sampling is not set")]
    MissingResolution,
    #[error("the pupil sampling must be at least 2 pixels, found {0}")]
    Resolution(usize),
    #[error("invalid telescope diameter: {0}m")]
    Diameter(f64),
    #[error("invalid field of view: {0}rd")]
    FieldOfView(f64),
    #[error("invalid central obstruction ratio: {0}")]
    Obstruction(f64),
    #[error("invalid layer altitude: {0}m")]
    Altitude(f64),
}
type Result<T> = std::result::Result<T, TelescopeError>;

/// Telescope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Telescope {
    /// Diameter [m]
    pub diameter: f64,
    /// Pupil sampling
    pub resolution: Option<usize>,
    /// Field of view [rd]
    pub field_of_view: f64,
    /// Central obstruction diameter as a fraction of the diameter
    pub obstruction: f64,
}
impl Default for Telescope {
    fn default() -> Self {
        Self {
            diameter: 25.5,
            resolution: None,
            field_of_view: 0f64,
            obstruction: 0f64,
        }
    }
}
impl Telescope {
    /// Telescope of diameter `diameter` [m]
    pub fn new(diameter: f64) -> Self {
        Self {
            diameter,
            ..Default::default()
        }
    }
    /// Sets the pupil sampling
    pub fn resolution(self, resolution: usize) -> Self {
        Self {
            resolution: Some(resolution),
            ..self
        }
    }
    /// Sets the field of view [rd]
    pub fn field_of_view(self, field_of_view: f64) -> Self {
        Self {
            field_of_view,
            ..self
        }
    }
    /// Sets the central obstruction ratio
    pub fn obstruction(self, obstruction: f64) -> Self {
        Self {
            obstruction,
            ..self
        }
    }
    /// Checks the telescope parameters
    pub fn check(&self) -> Result<()> {
        if !(self.diameter.is_finite() && self.diameter > 0f64) {
            return Err(TelescopeError::Diameter(self.diameter));
        }
        match self.resolution {
            None => return Err(TelescopeError::MissingResolution),
            Some(n) if n < 2 => return Err(TelescopeError::Resolution(n)),
            _ => (),
        }
        if !(self.field_of_view >= 0f64 && self.field_of_view < std::f64::consts::PI) {
            return Err(TelescopeError::FieldOfView(self.field_of_view));
        }
        if !(0f64..1f64).contains(&self.obstruction) {
            return Err(TelescopeError::Obstruction(self.obstruction));
        }
        Ok(())
    }
    /// Pupil pixel size [m]
    pub fn pixel_scale(&self) -> Result<f64> {
        let n = self.resolution.ok_or(TelescopeError::MissingResolution)?;
        if n < 2 {
            return Err(TelescopeError::Resolution(n));
        }
        Ok(self.diameter / (n - 1) as f64)
    }
    /// Geometry of a layer at `altitude` [m] covering the field of view
    pub fn layer_geometry(&self, altitude: f64) -> Result<Geometry> {
        self.check()?;
        if !(altitude.is_finite() && altitude >= 0f64) {
            return Err(TelescopeError::Altitude(altitude));
        }
        let pixel_scale = self.pixel_scale()?;
        let extent = self.diameter + 2f64 * altitude * (0.5 * self.field_of_view).tan();
        let n_pixel = 1 + (extent / pixel_scale).round() as usize;
        Ok(Geometry {
            altitude,
            extent: pixel_scale * (n_pixel - 1) as f64,
            n_pixel,
        })
    }
    /// `n` pupil coordinates [m] evenly spaced across the diameter
    pub fn coordinates(&self, n: usize) -> Vec<f64> {
        let r = 0.5 * self.diameter;
        match n {
            0 => vec![],
            1 => vec![0f64],
            _ => (0..n)
                .map(|i| -r + self.diameter * i as f64 / (n - 1) as f64)
                .collect(),
        }
    }
    /// `n`x`n` pupil mask
    pub fn pupil(&self, n: usize) -> DMatrix<bool> {
        let x = self.coordinates(n);
        let r = 0.5 * self.diameter;
        let ri = r * self.obstruction;
        DMatrix::from_fn(n, n, |i, j| {
            let rho = x[j].hypot(x[i]);
            rho <= r && rho >= ri
        })
    }
}

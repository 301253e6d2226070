//! Turbulence layers
//!
//! A [TurbulenceLayer] is a square phase screen at a given altitude, moved
//! across the telescope line-of-sight by the wind (frozen flow).
//! The screen is synthesized once when the layer is created and then, at
//! each time step, translated and extruded (see [extension] and [translation]).

use crate::{
    screen::ScreenSynthesizer,
    spline::SplineError,
    statistics::{CovarianceModel, VonKarman},
};
use nalgebra::DMatrix;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::time::Instant;

pub mod extension;
pub mod translation;

pub use extension::{BorderPredictor, ExtensionError};
pub use translation::StepState;

#[derive(thiserror::Error, Debug)]
pub enum LayerError {
    #[error("layer #{index}: {message}")]
    Configuration { index: usize, message: String },
    #[error("failed to extend the phase screen")]
    Extension(#[from] ExtensionError),
    #[error("failed to resample the phase screen")]
    Spline(#[from] SplineError),
}
type Result<T> = std::result::Result<T, LayerError>;

/// Wind vector
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Wind {
    /// Speed [m/s]
    pub speed: f64,
    /// Direction [rd], counted from the x axis
    pub direction: f64,
}
impl Wind {
    pub fn new(speed: f64, direction: f64) -> Self {
        Self { speed, direction }
    }
    /// Wind velocity `[vx,vy]` [m/s]
    pub fn velocity(&self) -> [f64; 2] {
        if self.speed == 0f64 {
            return [0f64; 2];
        }
        let (s, c) = self.direction.sin_cos();
        [self.speed * c, self.speed * s]
    }
}

/// Layer geometry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    /// Altitude [m]
    pub altitude: f64,
    /// Screen size [m]
    pub extent: f64,
    /// Screen sampling
    pub n_pixel: usize,
}

/// Frozen flow turbulence layer
#[derive(Debug, Clone)]
pub struct TurbulenceLayer {
    index: usize,
    altitude: f64,
    extent: f64,
    n_pixel: usize,
    pixel_scale: f64,
    weight: f64,
    wind: Wind,
    statistics: VonKarman,
    phase: DMatrix<f64>,
    predictor: BorderPredictor,
    state: StepState,
    rng: StdRng,
}
impl TurbulenceLayer {
    /// Creates the layer #`index` and synthesizes its initial phase screen
    ///
    /// `statistics` are the layer own statistics (the weight is already applied
    /// to `r0`) and all the layer random numbers are drawn from `rng`.
    pub fn new(
        index: usize,
        geometry: Geometry,
        weight: f64,
        wind: Wind,
        statistics: VonKarman,
        sampling_time: f64,
        mut rng: StdRng,
    ) -> Result<Self> {
        let Geometry {
            altitude,
            extent,
            n_pixel,
        } = geometry;
        let invalid = |message: String| LayerError::Configuration { index, message };
        if n_pixel < 3 {
            return Err(invalid(format!(
                "the phase screen needs at least 3 pixels, found {n_pixel}"
            )));
        }
        if !(extent.is_finite() && extent > 0f64) {
            return Err(invalid(format!("invalid layer size: {extent}m")));
        }
        if !(altitude.is_finite() && altitude >= 0f64) {
            return Err(invalid(format!("invalid layer altitude: {altitude}m")));
        }
        if !(weight > 0f64 && weight <= 1f64) {
            return Err(invalid(format!("invalid layer weight: {weight}")));
        }
        if !(statistics.r0 > 0f64 && statistics.outer_scale > 0f64) {
            return Err(invalid(format!("invalid turbulence statistics: {statistics:?}")));
        }
        check_wind(index, &wind, sampling_time)?;
        let pixel_scale = extent / (n_pixel - 1) as f64;

        log::info!(
            "layer #{index}: computing initial phase screen (D={extent:.2}m, n={n_pixel}px) ..."
        );
        let now = Instant::now();
        let phase = ScreenSynthesizer::new(n_pixel, pixel_scale).synthesize(&statistics, &mut rng);
        log::info!(
            "layer #{index}: phase screen computed in {}ms",
            now.elapsed().as_millis()
        );
        let predictor = BorderPredictor::new(index, n_pixel, pixel_scale, &statistics)?;
        let state = StepState::new(wind.velocity(), pixel_scale, sampling_time);
        Ok(Self {
            index,
            altitude,
            extent,
            n_pixel,
            pixel_scale,
            weight,
            wind,
            statistics,
            phase,
            predictor,
            state,
            rng,
        })
    }
    pub fn index(&self) -> usize {
        self.index
    }
    /// Altitude [m]
    pub fn altitude(&self) -> f64 {
        self.altitude
    }
    /// Screen size [m]
    pub fn extent(&self) -> f64 {
        self.extent
    }
    pub fn n_pixel(&self) -> usize {
        self.n_pixel
    }
    /// Pixel size [m]
    pub fn pixel_scale(&self) -> f64 {
        self.pixel_scale
    }
    /// Fraction of the turbulence in the layer
    pub fn weight(&self) -> f64 {
        self.weight
    }
    pub fn wind(&self) -> Wind {
        self.wind
    }
    pub fn statistics(&self) -> &VonKarman {
        &self.statistics
    }
    /// Phase screen [rd], rows along y and columns along x
    pub fn phase(&self) -> &DMatrix<f64> {
        &self.phase
    }
    /// Phase variance of the layer statistics [rd²]
    pub fn variance(&self) -> f64 {
        self.statistics.variance()
    }
    pub fn predictor(&self) -> &BorderPredictor {
        &self.predictor
    }
    pub fn state(&self) -> &StepState {
        &self.state
    }
    /// Pixel coordinates [m] centered on the screen, along both x and y
    pub fn coordinates(&self) -> Vec<f64> {
        let c = 0.5 * (self.n_pixel - 1) as f64;
        (0..self.n_pixel)
            .map(|i| (i as f64 - c) * self.pixel_scale)
            .collect()
    }
    /// Changes the wind and restarts the extension cycle
    pub fn set_wind(&mut self, wind: Wind, sampling_time: f64) -> Result<()> {
        check_wind(self.index, &wind, sampling_time)?;
        self.wind = wind;
        self.state = StepState::new(wind.velocity(), self.pixel_scale, sampling_time);
        Ok(())
    }
    /// Changes the turbulence statistics and recomputes the border predictor
    ///
    /// The current phase screen is kept
    pub fn set_statistics(&mut self, statistics: VonKarman) -> Result<()> {
        self.predictor =
            BorderPredictor::new(self.index, self.n_pixel, self.pixel_scale, &statistics)?;
        self.statistics = statistics;
        self.state.restart();
        Ok(())
    }
    /// Random number generator of the layer
    pub(crate) fn rng(&self) -> &StdRng {
        &self.rng
    }
    /// Replaces the layer random number generator
    pub(crate) fn set_rng(&mut self, rng: StdRng) {
        self.rng = rng;
    }
    /// Puts back a saved phase screen and translation state
    pub(crate) fn restore(&mut self, phase: DMatrix<f64>, state: StepState) {
        self.phase = phase;
        self.state = state;
    }
    /// Synthesizes a new phase screen from `rng` and restarts the extension cycle
    pub(crate) fn resynthesize(&mut self, mut rng: StdRng) {
        self.phase = ScreenSynthesizer::new(self.n_pixel, self.pixel_scale)
            .synthesize(&self.statistics, &mut rng);
        self.rng = rng;
        self.state.restart();
    }
}

fn check_wind(index: usize, wind: &Wind, sampling_time: f64) -> Result<()> {
    if !(wind.speed.is_finite() && wind.direction.is_finite()) {
        return Err(LayerError::Configuration {
            index,
            message: format!("invalid wind: {wind:?}"),
        });
    }
    if !(sampling_time.is_finite() && sampling_time >= 0f64) {
        return Err(LayerError::Configuration {
            index,
            message: format!("invalid sampling time: {sampling_time}s"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn geometry(n_pixel: usize) -> Geometry {
        Geometry {
            altitude: 1e3,
            extent: 1.5,
            n_pixel,
        }
    }

    #[test]
    fn new_layer() {
        let vk = VonKarman::new(0.2, 20.);
        let layer = TurbulenceLayer::new(
            2,
            geometry(7),
            0.5,
            Wind::new(10., 0.3),
            vk.layer(0.5),
            1e-3,
            StdRng::seed_from_u64(1),
        )
        .unwrap();
        assert_eq!(layer.phase().shape(), (7, 7));
        assert_eq!(layer.pixel_scale(), 0.25);
        assert_eq!(layer.index(), 2);
        let x = layer.coordinates();
        assert_eq!(x[0], -0.75);
        assert_eq!(x[3], 0.);
        assert_eq!(x[6], 0.75);
        assert!((layer.extent() - layer.pixel_scale() * 6.).abs() < 1e-15);
    }

    #[test]
    fn invalid_layers() {
        let vk = VonKarman::new(0.2, 20.);
        let new = |geometry: Geometry, weight: f64, wind: Wind| {
            TurbulenceLayer::new(
                0,
                geometry,
                weight,
                wind,
                vk,
                1e-3,
                StdRng::seed_from_u64(1),
            )
        };
        assert!(matches!(
            new(geometry(2), 1., Wind::default()),
            Err(LayerError::Configuration { .. })
        ));
        let flat = Geometry {
            extent: 0.,
            ..geometry(5)
        };
        assert!(new(flat, 1., Wind::default()).is_err());
        assert!(new(geometry(5), 0., Wind::default()).is_err());
        assert!(new(geometry(5), 1., Wind::new(f64::NAN, 0.)).is_err());
        assert!(new(geometry(5), 1., Wind::default()).is_ok());
    }

    #[test]
    fn wind_velocity() {
        assert_eq!(Wind::new(1., 0.).velocity(), [1., 0.]);
        assert_eq!(Wind::new(0., 1.2).velocity(), [0., 0.]);
        let [vx, vy] = Wind::new(2., std::f64::consts::FRAC_PI_2).velocity();
        assert!(vx.abs() < 1e-15 && (vy - 2.).abs() < 1e-15);
    }
}

//! Multi-layer wavefront
//!
//! The wavefront of a source is the sum of the phase screens of all the layers
//! sampled along the source line-of-sight.
//! A layer at altitude `h` is seen from the pupil through a footprint shifted
//! by `h tan(z)` in the source direction and, for a source at a finite height
//! `H`, shrunk by the cone effect `1-h/H`.
//! The phase screens are given at the atmosphere reference wavelength and
//! scaled to the source wavelength.

use crate::{
    layer::TurbulenceLayer,
    source::{Source, SourceError},
    spline::{interp2, SplineError},
};
use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum CompositeError {
    #[error("invalid source")]
    Source(#[from] SourceError),
    #[error("the source at {height}m is below layer #{index} at {altitude}m")]
    SourceBelowLayer {
        index: usize,
        altitude: f64,
        height: f64,
    },
    #[error("invalid reference wavelength: {0}m")]
    ReferenceWavelength(f64),
    #[error("failed to sample layer along the line-of-sight")]
    Spline(#[from] SplineError),
}
type Result<T> = std::result::Result<T, CompositeError>;

/// Phase screen of `layer` seen through the `pupil` coordinates [m] by `source`
pub fn line_of_sight(
    layer: &TurbulenceLayer,
    pupil: &[f64],
    source: &Source,
) -> Result<DMatrix<f64>> {
    let altitude = layer.altitude();
    if altitude == 0f64 && layer.n_pixel() == pupil.len() {
        return Ok(layer.phase().clone());
    }
    if source.height <= altitude {
        return Err(CompositeError::SourceBelowLayer {
            index: layer.index(),
            altitude,
            height: source.height,
        });
    }
    let scale = if source.height.is_infinite() {
        1f64
    } else {
        1f64 - altitude / source.height
    };
    let [dx, dy] = source.direction().map(|d| d * altitude);
    let xq: Vec<f64> = pupil.iter().map(|x| x * scale + dx).collect();
    let yq: Vec<f64> = pupil.iter().map(|y| y * scale + dy).collect();
    let knots = layer.coordinates();
    Ok(interp2(&knots, &knots, layer.phase(), &yq, &xq)?)
}

/// Sum of the `layers` phase screens seen by `source` through the `pupil`
/// coordinates [m], scaled from `reference_wavelength` to the source wavelength
pub fn composite(
    layers: &[TurbulenceLayer],
    pupil: &[f64],
    source: &Source,
    reference_wavelength: f64,
) -> Result<DMatrix<f64>> {
    source.check()?;
    if !(reference_wavelength.is_finite() && reference_wavelength > 0f64) {
        return Err(CompositeError::ReferenceWavelength(reference_wavelength));
    }
    let n = pupil.len();
    let screens = layers
        .par_iter()
        .map(|layer| line_of_sight(layer, pupil, source))
        .collect::<Result<Vec<_>>>()?;
    let phase = screens
        .into_iter()
        .fold(DMatrix::<f64>::zeros(n, n), |sum, screen| sum + screen);
    Ok(phase * (reference_wavelength / source.wavelength))
}

/// Wavefront of a source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeWavefront {
    /// Time [s]
    pub time: f64,
    /// Wavelength [m]
    pub wavelength: f64,
    /// Phase [rd]
    pub phase: DMatrix<f64>,
}
impl CompositeWavefront {
    /// Phase values inside the `pupil` mask
    pub fn masked(&self, pupil: &DMatrix<bool>) -> Vec<f64> {
        self.phase
            .iter()
            .zip(pupil.iter())
            .filter_map(|(phase, inside)| inside.then_some(*phase))
            .collect()
    }
    /// Piston removed phase rms inside the `pupil` mask [rd]
    pub fn rms(&self, pupil: &DMatrix<bool>) -> f64 {
        let phase = self.masked(pupil);
        if phase.is_empty() {
            return 0f64;
        }
        let n = phase.len() as f64;
        let mean = phase.iter().sum::<f64>() / n;
        (phase.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / n).sqrt()
    }
    /// Optical path difference [m]
    pub fn opd(&self) -> DMatrix<f64> {
        &self.phase * (0.5 * self.wavelength / std::f64::consts::PI)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        layer::{Geometry, Wind},
        source::Band,
        statistics::VonKarman,
    };
    use rand::{rngs::StdRng, SeedableRng};

    fn layer(altitude: f64, n_pixel: usize, pixel_scale: f64) -> TurbulenceLayer {
        TurbulenceLayer::new(
            0,
            Geometry {
                altitude,
                extent: pixel_scale * (n_pixel - 1) as f64,
                n_pixel,
            },
            1.,
            Wind::default(),
            VonKarman::new(0.2, 10.),
            1e-3,
            StdRng::seed_from_u64(5),
        )
        .unwrap()
    }
    fn pupil(n: usize, pixel_scale: f64) -> Vec<f64> {
        let r = 0.5 * pixel_scale * (n - 1) as f64;
        (0..n).map(|i| -r + i as f64 * pixel_scale).collect()
    }

    #[test]
    fn ground_layer_exact() {
        let ground = layer(0., 9, 0.25);
        let src = Source::default()
            .direction_angles(1e-4, 0.3)
            .height(90e3)
            .wavelength(0.5e-6);
        let phase = composite(std::slice::from_ref(&ground), &pupil(9, 0.25), &src, 0.5e-6).unwrap();
        assert_eq!(&phase, ground.phase());
    }

    #[test]
    fn wavelength_scaling() {
        let layers = vec![layer(0., 9, 0.25), layer(5e3, 13, 0.25)];
        let x = pupil(9, 0.25);
        let src = Source::default().direction_angles(2e-5, 1.);
        let visible = composite(&layers, &x, &src.clone().wavelength(0.5e-6), 0.5e-6).unwrap();
        let ir = composite(&layers, &x, &src.wavelength(1e-6), 0.5e-6).unwrap();
        assert!((visible * 0.5 - ir).abs().max() < 1e-12);
    }

    #[test]
    fn star_footprint() {
        // on-axis star: the central part of the screen
        let high = layer(10e3, 13, 0.25);
        let x = pupil(9, 0.25);
        let src = Source::new(Band::V);
        let phase = line_of_sight(&high, &x, &src).unwrap();
        let center = high.phase().view((2, 2), (9, 9)).clone_owned();
        assert!((&phase - &center).abs().max() < 1e-9);
        // off-axis star: shifted by one pixel along x
        let src = src.direction_angles((0.25f64 / 10e3).atan(), 0.);
        let phase = line_of_sight(&high, &x, &src).unwrap();
        let shifted = high.phase().view((2, 3), (9, 9)).clone_owned();
        assert!((&phase - &shifted).abs().max() < 1e-9);
    }

    #[test]
    fn laser_footprint() {
        let high = layer(10e3, 13, 0.25);
        // the footprint is half the pupil
        let x = pupil(13, 0.25);
        let src = Source::default().height(20e3);
        let phase = line_of_sight(&high, &x, &src).unwrap();
        let knots = high.coordinates();
        let half: Vec<f64> = knots.iter().map(|x| 0.5 * x).collect();
        let expected = interp2(&knots, &knots, high.phase(), &half, &half).unwrap();
        assert!((&phase - &expected).abs().max() < 1e-12);
        // every other pixel of the footprint is a screen pixel
        assert!((phase[(0, 0)] - high.phase()[(3, 3)]).abs() < 1e-9);
        assert!((phase[(6, 12)] - high.phase()[(6, 9)]).abs() < 1e-9);

        let src = Source::default().height(5e3);
        assert!(matches!(
            line_of_sight(&high, &x, &src),
            Err(CompositeError::SourceBelowLayer { .. })
        ));
    }

    #[test]
    fn masked_rms() {
        let wavefront = CompositeWavefront {
            time: 0.,
            wavelength: 1e-6,
            phase: DMatrix::from_fn(3, 3, |i, j| (i + j) as f64),
        };
        let mask = DMatrix::from_fn(3, 3, |i, _| i == 1);
        assert_eq!(wavefront.masked(&mask), vec![1., 2., 3.]);
        assert!((wavefront.rms(&mask) - (2f64 / 3.).sqrt()).abs() < 1e-15);
        assert!((wavefront.opd()[(2, 2)] - 4e-6 / (2. * std::f64::consts::PI)).abs() < 1e-20);
    }
}

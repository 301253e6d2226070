//! Frozen flow translation
//!
//! At each time step, a layer phase screen is moved by the wind displacement
//! `v dt`: `φ(x, t+dt) = φ(x - v dt, t)`.
//! The screen is first extended by one pixel with the [BorderPredictor](super::BorderPredictor)
//! and the extended screen (the anchor) is resampled with cubic splines at the
//! displaced pixel coordinates.
//! Displacements larger than a pixel are applied as a sequence of one pixel
//! extensions and shifts.
//! When the wind moves the screen by less than a pixel per step, the same anchor
//! is reused for `n_shift` steps until the accumulated displacement reaches one pixel.
//! The displacement is accumulated from the time steps actually applied, so the
//! time step may change from one call to the next.

use super::{Result, TurbulenceLayer};
use crate::spline::interp2;
use nalgebra::DMatrix;

/// Relative tolerance on the comparison of displacements with the pixel size
const TOLERANCE: f64 = 1e-9;

/// Translation state of a layer
#[derive(Debug, Clone)]
pub struct StepState {
    count: usize,
    n_shift: usize,
    displacement: [f64; 2],
    anchor: Option<DMatrix<f64>>,
}
impl StepState {
    /// Translation state for a wind `velocity` [m/s], a pixel size `pixel_scale` [m]
    /// and a time step `sampling_time` [s]
    pub fn new(velocity: [f64; 2], pixel_scale: f64, sampling_time: f64) -> Self {
        let n_shift = velocity
            .iter()
            .filter(|v| **v != 0f64)
            .map(|v| (pixel_scale * (1f64 + TOLERANCE) / (v.abs() * sampling_time)).floor())
            .fold(f64::INFINITY, f64::min);
        Self {
            count: 0,
            n_shift: if n_shift.is_finite() && n_shift >= 1f64 {
                n_shift as usize
            } else {
                1
            },
            displacement: [0f64; 2],
            anchor: None,
        }
    }
    /// Number of steps since the last extension
    pub fn count(&self) -> usize {
        self.count
    }
    /// Number of steps between extensions
    pub fn n_shift(&self) -> usize {
        self.n_shift
    }
    /// Displacement `[x,y]` [m] of the screen with respect to the anchor
    pub fn displacement(&self) -> [f64; 2] {
        self.displacement
    }
    /// Forces an extension at the next step
    pub(crate) fn restart(&mut self) {
        self.count = 0;
        self.displacement = [0f64; 2];
        self.anchor = None;
    }
}

impl TurbulenceLayer {
    /// Extended screen coordinates `(c-1)δ`, `c` in `[0,n+1]`
    fn extended_knots(&self) -> Vec<f64> {
        (0..self.n_pixel + 2)
            .map(|c| (c as f64 - 1f64) * self.pixel_scale)
            .collect()
    }
    /// Moves the phase screen with the wind for `dt` seconds
    ///
    /// Returns the updated phase screen; a layer without wind is left untouched
    pub fn advance(&mut self, dt: f64) -> Result<&DMatrix<f64>> {
        let velocity = self.wind.velocity();
        if dt == 0f64 || velocity.iter().all(|v| *v == 0f64) {
            return Ok(&self.phase);
        }
        let delta = self.pixel_scale;
        let exceeds =
            |leap: &[f64; 2]| leap.iter().any(|l| l.abs() > delta * (1f64 + TOLERANCE));

        let motion = velocity.map(|v| v * dt);
        // displacement with respect to the anchor accumulated over the cycle
        let mut leap = if self.state.count > 0 {
            [
                self.state.displacement[0] + motion[0],
                self.state.displacement[1] + motion[1],
            ]
        } else {
            motion
        };
        if self.state.count > 0 && (self.state.anchor.is_none() || exceeds(&leap)) {
            log::debug!(
                "layer #{}: displacement {:?} beyond one pixel, restarting the extension cycle",
                self.index,
                leap
            );
            self.state.count = 0;
            leap = motion;
        }

        let knots = self.extended_knots();
        let interior = &knots[1..=self.n_pixel];
        loop {
            let anchor = match self.state.anchor.take() {
                Some(anchor) if self.state.count > 0 => anchor,
                _ => {
                    log::debug!("layer #{}: extending phase screen", self.index);
                    self.predictor
                        .extend(self.index, &self.phase, &mut self.rng)?
                }
            };
            let step = leap.map(|l| l.signum() * l.abs().min(delta));
            let xq: Vec<f64> = interior.iter().map(|x| x - step[0]).collect();
            let yq: Vec<f64> = interior.iter().map(|y| y - step[1]).collect();
            self.phase = interp2(&knots, &knots, &anchor, &yq, &xq)?;
            self.state.anchor = Some(anchor);
            self.state.displacement = step;
            leap = [leap[0] - step[0], leap[1] - step[1]];
            if leap.iter().all(|l| l.abs() <= delta * TOLERANCE) {
                break;
            }
        }
        self.state.count = (self.state.count + 1) % self.state.n_shift;
        Ok(&self.phase)
    }
}

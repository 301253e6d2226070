//! Turbulence phase statistics
//!
//! The phase statistics are given by a [CovarianceModel]: the phase covariance
//! as a function of the separation between 2 points and the matching power
//! spectrum density.
//! [VonKarman] implements the model for von Kármán turbulence with Fried
//! parameter `r0` and outer scale `L0`.

use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// (24/5 Γ(6/5))^(5/6) Γ(11/6) / (2^(5/6) π^(8/3))
const VK_COVARIANCE: f64 = 0.08583068106228547;
/// (24/5 Γ(6/5))^(5/6) Γ(11/6) Γ(5/6) / (2 π^(8/3))
const VK_VARIANCE: f64 = 0.08631432991183459;
/// (24/5 Γ(6/5))^(5/6) Γ(11/6)² / (2 π^(11/3))
const VK_SPECTRUM: f64 = 0.022895587108555198;

/// Modified Bessel function of the second kind `K_nu(x)`, `x>0`
///
/// Trapezoidal quadrature of `∫_0^∞ exp(-x cosh(t)) cosh(nu t) dt`;
/// the integrand decays doubly exponentially so the rule converges to machine precision.
pub fn bessel_k(nu: f64, x: f64) -> f64 {
    const STEP: f64 = 0.05;
    let t_max = (60f64 / x).max(1f64).acosh() + 1f64;
    let n = (t_max / STEP).ceil() as usize;
    let sum = (1..=n)
        .map(|k| {
            let t = k as f64 * STEP;
            (-x * t.cosh()).exp() * (nu * t).cosh()
        })
        .sum::<f64>();
    STEP * (0.5 * (-x).exp() + sum)
}

/// Phase statistics of a turbulence layer
pub trait CovarianceModel: Send + Sync {
    /// Phase covariance [rd²] between 2 points `rho` meters apart
    fn covariance(&self, rho: f64) -> f64;
    /// Phase power spectrum density [rd²m²] at spatial frequency `f` [1/m]
    fn spectrum(&self, f: f64) -> f64;
    /// Phase variance [rd²]
    fn variance(&self) -> f64 {
        self.covariance(0f64)
    }
    /// Phase structure function [rd²]
    fn structure_function(&self, rho: f64) -> f64 {
        2f64 * (self.variance() - self.covariance(rho))
    }
    /// Covariance matrix between the `(x,y)` points in `a` and in `b`
    ///
    /// If `b` is `None`, returns the auto-covariance matrix of `a`
    fn covariance_matrix(&self, a: &[[f64; 2]], b: Option<&[[f64; 2]]>) -> DMatrix<f64> {
        let b = b.unwrap_or(a);
        let data: Vec<f64> = a
            .par_iter()
            .flat_map_iter(|p| {
                b.iter()
                    .map(move |q| self.covariance((p[0] - q[0]).hypot(p[1] - q[1])))
            })
            .collect();
        DMatrix::from_row_slice(a.len(), b.len(), &data)
    }
}

/// Von Kármán turbulence
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VonKarman {
    /// Fried parameter [m]
    pub r0: f64,
    /// Outer scale [m]
    pub outer_scale: f64,
}
impl VonKarman {
    pub fn new(r0: f64, outer_scale: f64) -> Self {
        Self { r0, outer_scale }
    }
    /// Statistics of a layer carrying the fraction `weight` of the turbulence
    pub fn layer(&self, weight: f64) -> Self {
        Self {
            r0: self.r0 * weight.powf(-3. / 5.),
            ..*self
        }
    }
    /// Statistics with `r0` scaled from `wavelength` to `other_wavelength`
    pub fn at_wavelength(&self, wavelength: f64, other_wavelength: f64) -> Self {
        Self {
            r0: self.r0 * (other_wavelength / wavelength).powf(6. / 5.),
            ..*self
        }
    }
    fn l0r0_ratio(&self) -> f64 {
        (self.outer_scale / self.r0).powf(5. / 3.)
    }
}
impl CovarianceModel for VonKarman {
    fn covariance(&self, rho: f64) -> f64 {
        if rho == 0f64 {
            return self.variance();
        }
        let u = 2f64 * PI * rho / self.outer_scale;
        VK_COVARIANCE * self.l0r0_ratio() * u.powf(5. / 6.) * bessel_k(5. / 6., u)
    }
    fn spectrum(&self, f: f64) -> f64 {
        VK_SPECTRUM
            * self.r0.powf(-5. / 3.)
            * (f * f + self.outer_scale.powi(-2)).powf(-11. / 6.)
    }
    fn variance(&self) -> f64 {
        VK_VARIANCE * self.l0r0_ratio()
    }
}

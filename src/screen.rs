//! Phase screen synthesis
//!
//! A phase screen is a realization of the turbulence phase sampled on a square grid.
//! The screen is the real part of white noise filtered by the square root of the
//! phase power spectrum, computed with an FFT on a grid at least twice as large as
//! the screen to mitigate the periodicity of the discrete transform.
//! The spatial frequencies lower than the FFT sampling are restored by adding a few
//! levels of subharmonics to the screen.

use crate::{
    fft::{fft2, phasor, Direction},
    statistics::CovarianceModel,
};
use nalgebra::{Complex, DMatrix};
use rand::Rng;
use rand_distr::StandardNormal;
use std::f64::consts::PI;

/// Phase screen synthesizer
#[derive(Debug, Clone)]
pub struct ScreenSynthesizer {
    n_pixel: usize,
    pixel_scale: f64,
    n_subharmonic: usize,
}
impl ScreenSynthesizer {
    /// Synthesizer of `n_pixel`x`n_pixel` screens with `pixel_scale` meter pixels
    pub fn new(n_pixel: usize, pixel_scale: f64) -> Self {
        Self {
            n_pixel,
            pixel_scale,
            n_subharmonic: 3,
        }
    }
    /// Sets the number of subharmonic levels (default: 3)
    pub fn subharmonics(self, n_subharmonic: usize) -> Self {
        Self {
            n_subharmonic,
            ..self
        }
    }
    /// Size of the FFT grid
    pub fn fft_size(&self) -> usize {
        (2 * self.n_pixel).next_power_of_two()
    }
    /// Returns a phase screen realization of the turbulence `model`
    ///
    /// All the random numbers are drawn from `rng`, so the same generator state
    /// always gives the same screen
    pub fn synthesize<C, R>(&self, model: &C, rng: &mut R) -> DMatrix<f64>
    where
        C: CovarianceModel + ?Sized,
        R: Rng + ?Sized,
    {
        let n = self.n_pixel;
        let n_fft = self.fft_size();
        let df = 1f64 / (n_fft as f64 * self.pixel_scale);
        let freq = |k: usize| {
            if k < n_fft / 2 {
                k as f64 * df
            } else {
                (k as f64 - n_fft as f64) * df
            }
        };
        let mut spectrum = DMatrix::<Complex<f64>>::from_fn(n_fft, n_fft, |i, j| {
            let re: f64 = rng.sample(StandardNormal);
            let im: f64 = rng.sample(StandardNormal);
            if i == 0 && j == 0 {
                Complex::new(0f64, 0f64)
            } else {
                let amplitude = model.spectrum(freq(i).hypot(freq(j))).sqrt() * df;
                Complex::new(re, im) * amplitude
            }
        });
        fft2(&mut spectrum, Direction::Backward);
        let mut phase = DMatrix::from_fn(n, n, |i, j| spectrum[(i, j)].re);
        if self.n_subharmonic > 0 {
            phase += self.low_frequencies(model, df, rng);
        }
        phase
    }
    /// Subharmonics: 3x3 frequencies on grids with a sampling `df/3^p`
    fn low_frequencies<C, R>(&self, model: &C, df: f64, rng: &mut R) -> DMatrix<f64>
    where
        C: CovarianceModel + ?Sized,
        R: Rng + ?Sized,
    {
        let n = self.n_pixel;
        let mut phase = DMatrix::<f64>::zeros(n, n);
        for p in 1..=self.n_subharmonic {
            let dfp = df / 3f64.powi(p as i32);
            for (a, b) in itertools::iproduct!(-1i32..=1, -1i32..=1) {
                if a == 0 && b == 0 {
                    continue;
                }
                let (fx, fy) = (a as f64 * dfp, b as f64 * dfp);
                let amplitude = model.spectrum(fx.hypot(fy)).sqrt() * dfp;
                let re: f64 = rng.sample(StandardNormal);
                let im: f64 = rng.sample(StandardNormal);
                let c = Complex::new(re, im) * amplitude;
                phase.iter_mut().enumerate().for_each(|(k, phase)| {
                    // column-major: k = i + j*n
                    let (y, x) = (
                        (k % n) as f64 * self.pixel_scale,
                        (k / n) as f64 * self.pixel_scale,
                    );
                    *phase += (c * phasor(2f64 * PI * (fx * x + fy * y))).re;
                });
            }
        }
        let mean = phase.mean();
        phase.add_scalar_mut(-mean);
        phase
    }
}

//! Radix-2 Cooley-Tukey FFT
//!
//! In-place, decimation-in-time transforms on power-of-2 sized complex data.
//! Neither direction is normalized.

use nalgebra::{Complex, DMatrix};
use rayon::prelude::*;
use std::f64::consts::PI;

/// Transform direction
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Direction {
    /// `X_k = Σ x_n exp(-2iπkn/N)`
    Forward,
    /// `x_n = Σ X_k exp(2iπkn/N)`
    Backward,
}
impl Direction {
    fn sign(&self) -> f64 {
        match self {
            Direction::Forward => -1f64,
            Direction::Backward => 1f64,
        }
    }
}

/// Unit phasor `exp(i angle)`
pub fn phasor(angle: f64) -> Complex<f64> {
    let (s, c) = angle.sin_cos();
    Complex::new(c, s)
}

fn bit_reverse_permute(data: &mut [Complex<f64>]) {
    let n = data.len();
    let bits = n.trailing_zeros();
    for i in 0..n {
        let j = i.reverse_bits() >> (usize::BITS - bits);
        if i < j {
            data.swap(i, j);
        }
    }
}

/// 1-D FFT of `data`, whose length must be a power of 2
pub fn fft(data: &mut [Complex<f64>], direction: Direction) {
    let n = data.len();
    assert!(n.is_power_of_two(), "FFT size must be a power of 2");
    if n == 1 {
        return;
    }
    bit_reverse_permute(data);
    let mut stage_len = 2;
    while stage_len <= n {
        let half = stage_len / 2;
        let angle = direction.sign() * 2f64 * PI / stage_len as f64;
        for k in (0..n).step_by(stage_len) {
            for j in 0..half {
                let twiddle = phasor(angle * j as f64);
                let even = data[k + j];
                let odd = twiddle * data[k + j + half];
                data[k + j] = even + odd;
                data[k + j + half] = even - odd;
            }
        }
        stage_len *= 2;
    }
}

/// 2-D FFT of a square matrix with a power-of-2 size
pub fn fft2(data: &mut DMatrix<Complex<f64>>, direction: Direction) {
    let n = data.nrows();
    assert_eq!(n, data.ncols(), "2D FFT expects a square matrix");
    data.as_mut_slice()
        .par_chunks_mut(n)
        .for_each(|column| fft(column, direction));
    data.transpose_mut();
    data.as_mut_slice()
        .par_chunks_mut(n)
        .for_each(|column| fft(column, direction));
    data.transpose_mut();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn modulus(z: Complex<f64>) -> f64 {
        z.norm_sqr().sqrt()
    }

    fn dft(x: &[Complex<f64>], direction: Direction) -> Vec<Complex<f64>> {
        let n = x.len();
        (0..n)
            .map(|k| {
                x.iter()
                    .enumerate()
                    .map(|(m, x)| {
                        let angle = direction.sign() * 2. * PI * (k * m) as f64 / n as f64;
                        x * phasor(angle)
                    })
                    .sum()
            })
            .collect()
    }

    #[test]
    fn matches_dft() {
        let x: Vec<Complex<f64>> = (0..16)
            .map(|i| Complex::new((i as f64).sin(), (0.3 * i as f64).cos()))
            .collect();
        for direction in [Direction::Forward, Direction::Backward] {
            let mut y = x.clone();
            fft(&mut y, direction);
            let z = dft(&x, direction);
            let err = y
                .iter()
                .zip(&z)
                .map(|(y, z)| modulus(y - z))
                .fold(0f64, f64::max);
            assert!(err < 1e-12, "{direction:?}: {err}");
        }
    }

    #[test]
    fn round_trip_2d() {
        let n = 8;
        let x = DMatrix::from_fn(n, n, |i, j| Complex::new((i * j) as f64, i as f64 - j as f64));
        let mut y = x.clone();
        fft2(&mut y, Direction::Forward);
        fft2(&mut y, Direction::Backward);
        y.iter_mut().for_each(|y| *y /= (n * n) as f64);
        let err = x.iter().zip(y.iter()).map(|(x, y)| modulus(x - y)).fold(0f64, f64::max);
        assert!(err < 1e-12);
    }

    #[test]
    fn unit_phasor() {
        assert!(modulus(phasor(0.) - Complex::new(1., 0.)) < 1e-15);
        assert!(modulus(phasor(0.5 * PI) - Complex::new(0., 1.)) < 1e-15);
        assert!(modulus(phasor(-PI) - Complex::new(-1., 0.)) < 1e-15);
        assert!((modulus(phasor(1.234)) - 1.).abs() < 1e-15);
    }

    #[test]
    fn single_mode() {
        let n = 8;
        let mut x = DMatrix::<Complex<f64>>::zeros(n, n);
        x[(1, 2)] = Complex::new(1., 0.);
        fft2(&mut x, Direction::Backward);
        // exp(2iπ(i + 2j)/8)
        for i in 0..n {
            for j in 0..n {
                let expected = phasor(2. * PI * (i + 2 * j) as f64 / n as f64);
                assert!(modulus(x[(i, j)] - expected) < 1e-12);
            }
        }
    }
}

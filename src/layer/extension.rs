//! Phase screen extrusion
//!
//! The [BorderPredictor] extends a `n`x`n` phase screen with a new 1 pixel wide
//! border, the outer ring of the `n+2`x`n+2` enlarged screen.
//! The border `X` is conditioned on the outermost pixel ring `Z` of the screen:
//! `X = A Z + B W` with `A = E[XZᵀ] E[ZZᵀ]⁻¹` the linear predictor of the border,
//! `B` the lower Cholesky factor of the residual covariance `E[XXᵀ] - A E[ZXᵀ]`
//! and `W` a vector of independent standard normal deviates.

use crate::statistics::CovarianceModel;
use nalgebra::{DMatrix, DVector, SymmetricEigen};
use rand::Rng;
use rand_distr::StandardNormal;
use std::time::Instant;

/// Largest negative eigenvalue (relative to the largest one) accepted as round-off
const EIGEN_TOLERANCE: f64 = 1e-10;
/// Smallest diagonal loading (relative to the largest eigenvalue) of a regularized covariance
const JITTER: f64 = 1e-12;

#[derive(thiserror::Error, Debug)]
pub enum ExtensionError {
    #[error(
        "layer #{layer}: {matrix} covariance is not positive definite (condition ~{condition:.3e}), check the turbulence parameters against the pixel scale"
    )]
    NotPositiveDefinite {
        layer: usize,
        matrix: &'static str,
        condition: f64,
    },
    #[error("layer #{layer}: phase screen is {rows}x{cols}, expected {n}x{n}")]
    ScreenSize {
        layer: usize,
        rows: usize,
        cols: usize,
        n: usize,
    },
}
type Result<T> = std::result::Result<T, ExtensionError>;

/// Smallest and largest eigenvalues of a symmetric matrix
fn eigen_extrema(matrix: &DMatrix<f64>) -> (f64, f64) {
    let eigen = SymmetricEigen::new(matrix.clone());
    (eigen.eigenvalues.min(), eigen.eigenvalues.max())
}
/// Ratio of the extreme eigenvalues magnitudes
fn condition(min: f64, max: f64) -> f64 {
    max.abs() / min.abs().max(f64::MIN_POSITIVE)
}

/// Lower Cholesky factor of the residual covariance `bbt`
///
/// Negative eigenvalues down to round-off are absorbed by adding a small
/// multiple of the identity to the matrix
fn residual_factor(layer: usize, bbt: DMatrix<f64>) -> Result<DMatrix<f64>> {
    let bbt = (&bbt + bbt.transpose()) * 0.5;
    if let Some(chol) = bbt.clone().cholesky() {
        return Ok(chol.l());
    }
    let (min, max) = eigen_extrema(&bbt);
    let not_positive_definite = ExtensionError::NotPositiveDefinite {
        layer,
        matrix: "BBt",
        condition: condition(min, max),
    };
    if min < -EIGEN_TOLERANCE * max {
        return Err(not_positive_definite);
    }
    let jitter = 2f64 * min.abs() + JITTER * max;
    log::warn!(
        "layer #{layer}: residual covariance regularized by {jitter:.3e} (eigenvalues in [{min:.3e},{max:.3e}])"
    );
    let n = bbt.nrows();
    (bbt + DMatrix::identity(n, n) * jitter)
        .cholesky()
        .map(|chol| chol.l())
        .ok_or(not_positive_definite)
}

/// Indices `(row, column)` in the `n+2`x`n+2` enlarged screen of the screen
/// outermost ring (inner ring) and of the new border (outer ring), column-major ordered
pub fn rings(n: usize) -> (Vec<(usize, usize)>, Vec<(usize, usize)>) {
    let mut inner = vec![];
    let mut outer = vec![];
    for j in 0..n + 2 {
        for i in 0..n + 2 {
            if i == 0 || j == 0 || i == n + 1 || j == n + 1 {
                outer.push((i, j));
            } else if i == 1 || j == 1 || i == n || j == n {
                inner.push((i, j));
            }
        }
    }
    (inner, outer)
}

/// Border predictor of a phase screen
#[derive(Debug, Clone)]
pub struct BorderPredictor {
    n_pixel: usize,
    inner: Vec<(usize, usize)>,
    outer: Vec<(usize, usize)>,
    a: DMatrix<f64>,
    b: DMatrix<f64>,
}
impl BorderPredictor {
    /// Builds the predictor of the border of the `n_pixel`x`n_pixel` screen of layer #`layer`
    pub fn new<C>(layer: usize, n_pixel: usize, pixel_scale: f64, model: &C) -> Result<Self>
    where
        C: CovarianceModel + ?Sized,
    {
        let now = Instant::now();
        let (inner, outer) = rings(n_pixel);
        let xy = |ij: &[(usize, usize)]| -> Vec<[f64; 2]> {
            ij.iter()
                .map(|&(i, j)| [j as f64 * pixel_scale, i as f64 * pixel_scale])
                .collect()
        };
        let (z, x) = (xy(&inner), xy(&outer));
        let zzt = model.covariance_matrix(&z, None);
        let zxt = model.covariance_matrix(&z, Some(&x));
        let xxt = model.covariance_matrix(&x, None);

        let zzt_chol = zzt.clone().cholesky().ok_or_else(|| {
            let (min, max) = eigen_extrema(&zzt);
            ExtensionError::NotPositiveDefinite {
                layer,
                matrix: "ZZt",
                condition: condition(min, max),
            }
        })?;
        let a = zzt_chol.solve(&zxt).transpose();
        let b = residual_factor(layer, &xxt - &a * &zxt)?;
        log::info!(
            "layer #{layer}: border predictor ({}x{}) computed in {}ms",
            a.nrows(),
            a.ncols(),
            now.elapsed().as_millis()
        );
        Ok(Self {
            n_pixel,
            inner,
            outer,
            a,
            b,
        })
    }
    /// Linear predictor of the border from the screen outermost ring
    pub fn a(&self) -> &DMatrix<f64> {
        &self.a
    }
    /// Lower Cholesky factor of the border residual covariance
    pub fn b(&self) -> &DMatrix<f64> {
        &self.b
    }
    /// Indices of the screen outermost ring in the enlarged screen
    pub fn inner_ring(&self) -> &[(usize, usize)] {
        &self.inner
    }
    /// Indices of the new border in the enlarged screen
    pub fn outer_ring(&self) -> &[(usize, usize)] {
        &self.outer
    }
    pub fn n_pixel(&self) -> usize {
        self.n_pixel
    }
    /// Values of the screen outermost ring
    pub fn interior_values(&self, phase: &DMatrix<f64>) -> DVector<f64> {
        DVector::from_iterator(
            self.inner.len(),
            self.inner.iter().map(|&(i, j)| phase[(i - 1, j - 1)]),
        )
    }
    /// Returns the screen enlarged with a new random border
    ///
    /// The `B` column count standard normal deviates are drawn from `rng`
    pub fn extend<R>(&self, layer: usize, phase: &DMatrix<f64>, rng: &mut R) -> Result<DMatrix<f64>>
    where
        R: Rng + ?Sized,
    {
        let n = self.n_pixel;
        if phase.shape() != (n, n) {
            return Err(ExtensionError::ScreenSize {
                layer,
                rows: phase.nrows(),
                cols: phase.ncols(),
                n,
            });
        }
        let w = DVector::<f64>::from_fn(self.b.ncols(), |_, _| rng.sample(StandardNormal));
        let border = &self.a * self.interior_values(phase) + &self.b * w;
        let mut enlarged = DMatrix::<f64>::zeros(n + 2, n + 2);
        enlarged.view_mut((1, 1), (n, n)).copy_from(phase);
        self.outer
            .iter()
            .zip(border.iter())
            .for_each(|(&ij, &value)| enlarged[ij] = value);
        Ok(enlarged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statistics::VonKarman;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn ring_sizes() {
        let (inner, outer) = rings(5);
        assert_eq!(inner.len(), 16);
        assert_eq!(outer.len(), 24);
        assert!(inner.iter().all(|ij| !outer.contains(ij)));
        assert!(inner.contains(&(1, 1)) && inner.contains(&(5, 3)));
        assert!(!inner.contains(&(2, 2)));
    }

    #[test]
    fn predictor_shapes() {
        let vk = VonKarman::new(0.2, 10.);
        let predictor = BorderPredictor::new(0, 6, 0.1, &vk).unwrap();
        assert_eq!(predictor.a().shape(), (28, 20));
        assert_eq!(predictor.b().shape(), (28, 28));
        // lower triangular
        let b = predictor.b();
        assert!((0..28).all(|i| (i + 1..28).all(|j| b[(i, j)] == 0.)));
    }

    struct Cone;
    impl CovarianceModel for Cone {
        fn covariance(&self, rho: f64) -> f64 {
            1. - rho
        }
        fn spectrum(&self, _f: f64) -> f64 {
            0.
        }
    }

    #[test]
    fn not_positive_definite_screen() {
        match BorderPredictor::new(3, 5, 1., &Cone) {
            Err(ExtensionError::NotPositiveDefinite {
                layer,
                matrix,
                condition,
            }) => {
                assert_eq!(layer, 3);
                assert_eq!(matrix, "ZZt");
                assert!(condition.is_finite() && condition > 0.);
            }
            other => panic!("expected a ZZt error, found {other:?}"),
        }
    }

    #[test]
    fn not_positive_definite_residual() {
        let bbt = DMatrix::from_diagonal(&DVector::from_vec(vec![1., -1., 2.]));
        assert!(matches!(
            residual_factor(1, bbt),
            Err(ExtensionError::NotPositiveDefinite {
                layer: 1,
                matrix: "BBt",
                ..
            })
        ));
    }

    #[test]
    fn round_off_regularization() {
        // rank 1: the plain Cholesky decomposition hits a zero pivot
        let v = DVector::from_vec(vec![1., 2., 3.]);
        let bbt = &v * v.transpose();
        assert!(bbt.clone().cholesky().is_none());
        let b = residual_factor(0, bbt.clone()).unwrap();
        assert!((0..3).all(|i| (i + 1..3).all(|j| b[(i, j)] == 0.)));
        let err = (&b * b.transpose() - &bbt).abs().max();
        assert!(err < 1e-9, "{err}");
    }

    #[test]
    fn extend_keeps_the_screen() {
        let vk = VonKarman::new(0.2, 10.);
        let n = 5;
        let predictor = BorderPredictor::new(0, n, 0.25, &vk).unwrap();
        let phase = DMatrix::from_fn(n, n, |i, j| (i as f64 - j as f64) * 0.1);
        let mut rng = StdRng::seed_from_u64(3);
        let enlarged = predictor.extend(0, &phase, &mut rng).unwrap();
        assert_eq!(enlarged.shape(), (n + 2, n + 2));
        assert_eq!(enlarged.view((1, 1), (n, n)).clone_owned(), phase);
        assert!(predictor
            .extend(0, &DMatrix::zeros(4, 4), &mut rng)
            .is_err());
    }

    #[test]
    fn extension_consistency() {
        // screens drawn from the exact covariance
        let vk = VonKarman::new(0.3, 5.);
        let n = 5;
        let pixel_scale = 0.25;
        let predictor = BorderPredictor::new(0, n, pixel_scale, &vk).unwrap();
        let xy: Vec<[f64; 2]> = (0..n)
            .flat_map(|j| (0..n).map(move |i| [j as f64 * pixel_scale, i as f64 * pixel_scale]))
            .collect();
        let l = vk.covariance_matrix(&xy, None).cholesky().unwrap().l();
        let (inner, outer) = rings(n);
        let to_xy = |ij: &[(usize, usize)]| -> Vec<[f64; 2]> {
            ij.iter()
                .map(|&(i, j)| [j as f64 * pixel_scale, i as f64 * pixel_scale])
                .collect()
        };
        let xxt = vk.covariance_matrix(&to_xy(&outer), None);
        let xzt = vk.covariance_matrix(&to_xy(&outer), Some(&to_xy(&inner)));

        let mut rng = StdRng::seed_from_u64(11);
        let n_trial = 20_000;
        let mut xx = DMatrix::<f64>::zeros(outer.len(), outer.len());
        let mut xz = DMatrix::<f64>::zeros(outer.len(), inner.len());
        for _ in 0..n_trial {
            let w = DVector::<f64>::from_fn(n * n, |_, _| rng.sample(StandardNormal));
            let phase = DMatrix::from_column_slice(n, n, (&l * w).as_slice());
            let enlarged = predictor.extend(0, &phase, &mut rng).unwrap();
            let x = DVector::from_iterator(outer.len(), outer.iter().map(|&ij| enlarged[ij]));
            let z = predictor.interior_values(&phase);
            xx += &x * x.transpose();
            xz += &x * z.transpose();
        }
        xx /= n_trial as f64;
        xz /= n_trial as f64;
        let c0 = vk.variance();
        let xx_err = (&xx - &xxt).abs().max();
        let xz_err = (&xz - &xzt).abs().max();
        assert!(xx_err < 0.06 * c0, "border covariance error: {xx_err} ({c0})");
        assert!(xz_err < 0.06 * c0, "cross-covariance error: {xz_err} ({c0})");
    }
}

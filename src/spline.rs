//! Cubic spline interpolation
//!
//! Not-a-knot cubic splines in 1-D ([CubicSpline]) and their tensor product on
//! separable 2-D grids ([TensorSpline], [interp2]).
//!
//! A spline is linear in the sampled values, so a set of query coordinates
//! along one axis is turned into a weight matrix `W` with `W[(q, k)]` the
//! contribution of knot `k` to query `q`.
//! A field `F` tabulated on the `(y, x)` grid is then interpolated along the
//! last axis first, `F·Wxᵀ`, and along the first axis next, `Wy·(F·Wxᵀ)`.
//!
//! Queries outside the knots are extrapolated with the polynomial of the
//! nearest segment.

use nalgebra::DMatrix;

#[derive(thiserror::Error, Debug)]
pub enum SplineError {
    #[error("a spline needs at least 2 knots, found {0}")]
    TooFewKnots(usize),
    #[error("spline knots must be finite and strictly increasing")]
    NotIncreasing,
    #[error("the number of knots ({knots}) and of values ({values}) do not match")]
    LengthMismatch { knots: usize, values: usize },
    #[error("field is {rows}x{cols} but the grid is {ny}x{nx}")]
    GridMismatch {
        rows: usize,
        cols: usize,
        ny: usize,
        nx: usize,
    },
}
type Result<T> = std::result::Result<T, SplineError>;

fn check_knots(knots: &[f64]) -> Result<()> {
    if knots.len() < 2 {
        return Err(SplineError::TooFewKnots(knots.len()));
    }
    if knots.iter().any(|x| !x.is_finite()) || knots.windows(2).any(|x| x[1] <= x[0]) {
        return Err(SplineError::NotIncreasing);
    }
    Ok(())
}

/// Solves a tridiagonal system with the Thomas algorithm
///
/// `sub[0]` and `sup[n-1]` are ignored
fn solve_tridiagonal(sub: &[f64], diag: &[f64], sup: &[f64], rhs: &[f64]) -> Vec<f64> {
    let n = diag.len();
    let mut c = vec![0f64; n];
    let mut d = vec![0f64; n];
    c[0] = sup[0] / diag[0];
    d[0] = rhs[0] / diag[0];
    for i in 1..n {
        let m = diag[i] - sub[i] * c[i - 1];
        c[i] = if i < n - 1 { sup[i] / m } else { 0f64 };
        d[i] = (rhs[i] - sub[i] * d[i - 1]) / m;
    }
    let mut x = d;
    for i in (0..n - 1).rev() {
        x[i] -= c[i] * x[i + 1];
    }
    x
}

/// Knot derivatives of the not-a-knot cubic spline through `(x, y)`
fn not_a_knot_slopes(x: &[f64], y: &[f64]) -> Vec<f64> {
    let n = x.len();
    let dx: Vec<f64> = x.windows(2).map(|x| x[1] - x[0]).collect();
    let m: Vec<f64> = y
        .windows(2)
        .zip(&dx)
        .map(|(y, h)| (y[1] - y[0]) / h)
        .collect();
    match n {
        2 => vec![m[0]; 2],
        // a single parabola through the 3 points
        3 => solve_tridiagonal(
            &[0f64, dx[1], 1f64],
            &[1f64, 2f64 * (dx[0] + dx[1]), 1f64],
            &[1f64, dx[0], 0f64],
            &[
                2f64 * m[0],
                3f64 * (dx[0] * m[1] + dx[1] * m[0]),
                2f64 * m[1],
            ],
        ),
        _ => {
            let mut sub = vec![0f64; n];
            let mut diag = vec![0f64; n];
            let mut sup = vec![0f64; n];
            let mut rhs = vec![0f64; n];
            for i in 1..n - 1 {
                sub[i] = dx[i];
                diag[i] = 2f64 * (dx[i - 1] + dx[i]);
                sup[i] = dx[i - 1];
                rhs[i] = 3f64 * (dx[i] * m[i - 1] + dx[i - 1] * m[i]);
            }
            // third derivative continuous across the 2nd knot
            let d = x[2] - x[0];
            diag[0] = dx[1];
            sup[0] = d;
            rhs[0] = ((dx[0] + 2f64 * d) * dx[1] * m[0] + dx[0] * dx[0] * m[1]) / d;
            // ... and across the penultimate knot
            let d = x[n - 1] - x[n - 3];
            sub[n - 1] = d;
            diag[n - 1] = dx[n - 3];
            rhs[n - 1] = (dx[n - 2] * dx[n - 2] * m[n - 3]
                + (2f64 * d + dx[n - 2]) * dx[n - 3] * m[n - 2])
                / d;
            solve_tridiagonal(&sub, &diag, &sup, &rhs)
        }
    }
}

/// Index of the spline segment used to evaluate `x`
fn segment(knots: &[f64], x: f64) -> usize {
    knots
        .partition_point(|&k| k <= x)
        .saturating_sub(1)
        .min(knots.len() - 2)
}

/// 1-D not-a-knot cubic spline
#[derive(Debug, Clone)]
pub struct CubicSpline {
    knots: Vec<f64>,
    values: Vec<f64>,
    slopes: Vec<f64>,
}
impl CubicSpline {
    /// Builds the spline through `values` sampled at the strictly increasing `knots`
    pub fn new(knots: &[f64], values: &[f64]) -> Result<Self> {
        check_knots(knots)?;
        if knots.len() != values.len() {
            return Err(SplineError::LengthMismatch {
                knots: knots.len(),
                values: values.len(),
            });
        }
        Ok(Self {
            knots: knots.to_vec(),
            values: values.to_vec(),
            slopes: not_a_knot_slopes(knots, values),
        })
    }
    /// Evaluates the spline at `x`, extrapolating outside the knots
    pub fn eval(&self, x: f64) -> f64 {
        let k = segment(&self.knots, x);
        if x == self.knots[k + 1] {
            return self.values[k + 1];
        }
        let h = self.knots[k + 1] - self.knots[k];
        let t = x - self.knots[k];
        let m = (self.values[k + 1] - self.values[k]) / h;
        let (s0, s1) = (self.slopes[k], self.slopes[k + 1]);
        let c2 = (3f64 * m - 2f64 * s0 - s1) / h;
        let c3 = (s0 + s1 - 2f64 * m) / (h * h);
        self.values[k] + t * (s0 + t * (c2 + t * c3))
    }
    /// Evaluates the spline at each of the points in `x`
    pub fn eval_iter<'a>(&'a self, x: &'a [f64]) -> impl Iterator<Item = f64> + 'a {
        x.iter().map(move |&x| self.eval(x))
    }
}

/// Spline weights mapping the values at `knots` to the values at `queries`
///
/// Column `k` of the returned `queries.len()x knots.len()` matrix is the spline
/// through the `k`th unit vector evaluated at the queries.
pub fn spline_weights(knots: &[f64], queries: &[f64]) -> Result<DMatrix<f64>> {
    check_knots(knots)?;
    let n = knots.len();
    let mut weights = DMatrix::<f64>::zeros(queries.len(), n);
    let mut unit = vec![0f64; n];
    for k in 0..n {
        unit[k] = 1f64;
        let spline = CubicSpline::new(knots, &unit)?;
        weights
            .column_mut(k)
            .iter_mut()
            .zip(spline.eval_iter(queries))
            .for_each(|(w, v)| *w = v);
        unit[k] = 0f64;
    }
    Ok(weights)
}

/// Tensor product of two 1-D cubic splines
///
/// The weights depend only on the grids, so the same interpolator can be
/// applied to any field tabulated on the `(y, x)` grid.
#[derive(Debug, Clone)]
pub struct TensorSpline {
    wy: DMatrix<f64>,
    wx_t: DMatrix<f64>,
}
impl TensorSpline {
    /// Interpolator from the `(y, x)` grid to the `(yq, xq)` grid
    pub fn new(y: &[f64], x: &[f64], yq: &[f64], xq: &[f64]) -> Result<Self> {
        Ok(Self {
            wy: spline_weights(y, yq)?,
            wx_t: spline_weights(x, xq)?.transpose(),
        })
    }
    /// Interpolates `field` (rows along y, columns along x)
    pub fn apply(&self, field: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        let (rows, cols) = field.shape();
        if rows != self.wy.ncols() || cols != self.wx_t.nrows() {
            return Err(SplineError::GridMismatch {
                rows,
                cols,
                ny: self.wy.ncols(),
                nx: self.wx_t.nrows(),
            });
        }
        let along_x = field * &self.wx_t;
        Ok(&self.wy * along_x)
    }
    /// Size of the interpolated field
    pub fn shape(&self) -> (usize, usize) {
        (self.wy.nrows(), self.wx_t.ncols())
    }
}

/// Interpolates `field`, tabulated on the `(y, x)` grid, at the `(yq, xq)` grid
pub fn interp2(
    y: &[f64],
    x: &[f64],
    field: &DMatrix<f64>,
    yq: &[f64],
    xq: &[f64],
) -> Result<DMatrix<f64>> {
    TensorSpline::new(y, x, yq, xq)?.apply(field)
}

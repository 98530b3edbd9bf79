// src/spectral/basis.rs

//! Fourier–Chebyshev basis of the disk.
//!
//! Azimuth is expanded in a Fourier series. Radius is collocated on the
//! Chebyshev–Gauss–Lobatto points of the doubled diameter `[-R, R]` of odd
//! order `N = 2 nr + 1`, so the origin is never a node. A mode of azimuthal
//! wavenumber `k` satisfies `u(-r, phi) = (-1)^k u(r, phi + pi)`, which folds the
//! full collocation matrices onto the `nr + 1` non-negative nodes. Node 0 is the
//! edge `r = R` and carries the boundary row.

use super::{Complex64, Modes, Quadrature};
use crate::config::DomainConfig;
use crate::kernel::{chebyshev_differentiation, chebyshev_interpolate, chebyshev_points, Grid, Matrix};
use crate::meshing::{azimuth_samples, PolarMesh};
use crate::reference::AnalyticField;
use crate::{EngineError, Result};
use ndarray::{Array2, Axis};
use rustfft::{Fft, FftPlanner};
use std::f64::consts::PI;
use std::fmt;
use std::sync::Arc;

struct FftPair {
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

impl FftPair {
    fn plan(planner: &mut FftPlanner<f64>, len: usize) -> Self {
        FftPair {
            forward: planner.plan_fft_forward(len),
            inverse: planner.plan_fft_inverse(len),
        }
    }
}

pub struct DiskBasis {
    nphi: usize,
    nr: usize,
    radius: f64,
    dealias: f64,
    phi: Vec<f64>,
    /// Full collocation points on `[-1, 1]`, descending.
    x: Vec<f64>,
    /// Folded first and second derivative matrices in `x`, even parity then odd.
    d1: [Matrix; 2],
    d2: [Matrix; 2],
    weights: Arc<Grid>,
    fft: FftPair,
    padded_fft: FftPair,
    padded_rows: usize,
}

impl fmt::Debug for DiskBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiskBasis")
            .field("nphi", &self.nphi)
            .field("nr", &self.nr)
            .field("radius", &self.radius)
            .field("dealias", &self.dealias)
            .finish()
    }
}

impl DiskBasis {
    pub fn new(domain: &DomainConfig) -> Result<Self> {
        domain.validate()?;
        let nphi = domain.nphi;
        let nr = domain.nr;
        let order = 2 * nr + 1;

        let (x, d1_full) = chebyshev_differentiation(order);
        let d2_full = &d1_full * &d1_full;
        let d1 = [fold(&d1_full, nr, 1.0), fold(&d1_full, nr, -1.0)];
        let d2 = [fold(&d2_full, nr, 1.0), fold(&d2_full, nr, -1.0)];

        let radial = radial_weights(&x, nr, domain.radius);
        let cell = 2.0 * PI / nphi as f64;
        let weights = Grid::from_shape_fn((nphi, nr + 1), |(_, j)| cell * radial[j]);

        let padded_rows = padded_size(nphi, domain.dealias);
        let mut planner = FftPlanner::new();
        let fft = FftPair::plan(&mut planner, nphi);
        let padded_fft = FftPair::plan(&mut planner, padded_rows);

        Ok(DiskBasis {
            nphi,
            nr,
            radius: domain.radius,
            dealias: domain.dealias,
            phi: azimuth_samples(nphi),
            x,
            d1,
            d2,
            weights: Arc::new(weights),
            fft,
            padded_fft,
            padded_rows,
        })
    }

    pub fn nphi(&self) -> usize {
        self.nphi
    }

    pub fn nr(&self) -> usize {
        self.nr
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn dealias(&self) -> f64 {
        self.dealias
    }

    /// Shape of a grid or modal array: `(nphi, nr + 1)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.nphi, self.nr + 1)
    }

    /// The output mesh at solve resolution. Excludes the edge node.
    pub fn mesh(&self) -> PolarMesh {
        PolarMesh::for_resolution(self.nphi, self.nr, self.radius)
    }

    pub fn azimuths(&self) -> &[f64] {
        &self.phi
    }

    /// Radius of every collocation node, edge first.
    pub fn node_radii(&self) -> Vec<f64> {
        self.x[..=self.nr].iter().map(|x| self.radius * x).collect()
    }

    /// Signed wavenumber of modal row `m`. The Nyquist row reads as `+nphi/2`.
    pub fn wavenumber(&self, m: usize) -> i64 {
        signed_wavenumber(m, self.nphi)
    }

    /// Wavenumber used for azimuthal derivatives, with the Nyquist row dropped.
    pub fn derivative_wavenumber(&self, m: usize) -> f64 {
        if 2 * m == self.nphi {
            0.0
        } else {
            self.wavenumber(m) as f64
        }
    }

    /// `(-1)^k` for the wavenumber of row `m`.
    pub fn parity(&self, m: usize) -> f64 {
        if self.wavenumber(m).rem_euclid(2) == 0 {
            1.0
        } else {
            -1.0
        }
    }

    fn parity_index(&self, m: usize) -> usize {
        usize::from(self.parity(m) < 0.0)
    }

    /// Radial derivative matrix for modal row `m`.
    pub fn radial_derivative(&self, m: usize) -> Matrix {
        &self.d1[self.parity_index(m)] / self.radius
    }

    /// Polar Laplacian `d_rr + d_r / r - k^2 / r^2` for modal row `m`.
    pub fn laplacian(&self, m: usize) -> Matrix {
        let p = self.parity_index(m);
        let k = self.wavenumber(m) as f64;
        let scale = 1.0 / (self.radius * self.radius);
        let size = self.nr + 1;
        let mut lap = Matrix::from_fn(size, size, |i, j| {
            scale * (self.d2[p][(i, j)] + self.d1[p][(i, j)] / self.x[i])
        });
        for i in 0..size {
            lap[(i, i)] -= scale * k * k / (self.x[i] * self.x[i]);
        }
        lap
    }

    /// Samples `field` on the collocation grid, edge node included.
    pub fn evaluate<F>(&self, field: &F) -> Grid
    where
        F: AnalyticField + ?Sized,
    {
        Grid::from_shape_fn(self.shape(), |(k, j)| {
            field.eval(self.phi[k], self.radius * self.x[j], self.radius)
        })
    }

    /// Grid to normalized Fourier coefficients.
    pub fn forward(&self, grid: &Grid) -> Result<Modes> {
        self.check_shape(grid.dim())?;
        let mut modes = grid.mapv(|v| Complex64::new(v, 0.0));
        transform_columns(&mut modes, &self.fft.forward);
        let norm = 1.0 / self.nphi as f64;
        modes.mapv_inplace(|c| c * norm);
        Ok(modes)
    }

    /// Fourier coefficients back to the grid.
    pub fn backward(&self, modes: &Modes) -> Result<Grid> {
        self.check_shape(modes.dim())?;
        let mut data = modes.clone();
        transform_columns(&mut data, &self.fft.inverse);
        Ok(data.mapv(|c| c.re))
    }

    /// Number of azimuth samples used for products.
    pub fn padded_rows(&self) -> usize {
        self.padded_rows
    }

    /// Coefficients to a grid on the padded azimuthal sampling.
    pub fn backward_padded(&self, modes: &Modes) -> Result<Grid> {
        self.check_shape(modes.dim())?;
        let mut data = resize_modes(modes, self.padded_rows);
        transform_columns(&mut data, &self.padded_fft.inverse);
        Ok(data.mapv(|c| c.re))
    }

    /// Padded grid back to coefficients, truncated to the basis resolution.
    pub fn forward_padded(&self, grid: &Grid) -> Result<Modes> {
        if grid.dim() != (self.padded_rows, self.nr + 1) {
            return Err(EngineError::ShapeMismatch {
                expected: (self.padded_rows, self.nr + 1),
                found: grid.dim(),
            });
        }
        let mut data = grid.mapv(|v| Complex64::new(v, 0.0));
        transform_columns(&mut data, &self.padded_fft.forward);
        let norm = 1.0 / self.padded_rows as f64;
        data.mapv_inplace(|c| c * norm);
        Ok(resize_modes(&data, self.nphi))
    }

    /// Radius of every padded grid point, shaped like a padded grid.
    pub fn padded_radii(&self) -> Grid {
        Grid::from_shape_fn((self.padded_rows, self.nr + 1), |(_, j)| {
            self.radius * self.x[j]
        })
    }

    /// Azimuthal derivative in coefficient space.
    pub fn dphi(&self, modes: &Modes) -> Modes {
        let mut out = modes.clone();
        for (m, mut row) in out.axis_iter_mut(Axis(0)).enumerate() {
            let factor = Complex64::new(0.0, self.derivative_wavenumber(m));
            row.mapv_inplace(|c| c * factor);
        }
        out
    }

    /// Radial derivative in coefficient space.
    pub fn dr(&self, modes: &Modes) -> Modes {
        self.apply_rows(modes, |m| self.radial_derivative(m))
    }

    /// Laplacian in coefficient space.
    pub fn lap(&self, modes: &Modes) -> Modes {
        self.apply_rows(modes, |m| self.laplacian(m))
    }

    fn apply_rows<F>(&self, modes: &Modes, operator: F) -> Modes
    where
        F: Fn(usize) -> Matrix,
    {
        let mut out = Modes::zeros(modes.raw_dim());
        for (m, row) in modes.axis_iter(Axis(0)).enumerate() {
            let op = operator(m);
            for i in 0..row.len() {
                let mut acc = Complex64::new(0.0, 0.0);
                for (j, c) in row.iter().enumerate() {
                    acc += *c * op[(i, j)];
                }
                out[[m, i]] = acc;
            }
        }
        out
    }

    /// Integration weights of the collocation grid.
    pub fn weights(&self) -> Arc<Grid> {
        Arc::clone(&self.weights)
    }

    /// Wraps a collocation grid with the integration rule.
    pub fn quadrature(&self, values: Grid) -> Quadrature {
        Quadrature {
            phi: self.phi.clone(),
            r: self.node_radii(),
            radius: self.radius,
            weights: self.weights(),
            values,
        }
    }

    /// Drops the edge node and orders radii ascending, matching [`DiskBasis::mesh`].
    pub fn gather(&self, grid: &Grid) -> Grid {
        let nr = self.nr;
        Grid::from_shape_fn((grid.nrows(), nr), |(k, i)| grid[[k, nr - i]])
    }

    /// Samples the field described by `modes` at `scales` times the basis
    /// resolution, on the mesh of that resolution.
    pub fn resample(&self, modes: &Modes, scales: f64) -> Result<(PolarMesh, Grid)> {
        self.check_shape(modes.dim())?;
        let nphi_out = even_at_least_two((self.nphi as f64 * scales).round() as usize);
        let nr_out = ((self.nr as f64 * scales).round() as usize).max(1);
        if nphi_out == self.nphi && nr_out == self.nr {
            let grid = self.backward(modes)?;
            return Ok((self.mesh(), self.gather(&grid)));
        }

        let order = self.x.len() - 1;
        let targets = chebyshev_points(2 * nr_out + 1);
        let mut radial = Modes::zeros((self.nphi, nr_out));
        let mut re = vec![0.0; order + 1];
        let mut im = vec![0.0; order + 1];
        for m in 0..self.nphi {
            let s = self.parity(m);
            for j in 0..=order {
                let c = if j <= self.nr {
                    modes[[m, j]]
                } else {
                    modes[[m, order - j]] * s
                };
                re[j] = c.re;
                im[j] = c.im;
            }
            for i in 0..nr_out {
                let x = targets[nr_out - i];
                radial[[m, i]] = Complex64::new(
                    chebyshev_interpolate(&self.x, &re, x),
                    chebyshev_interpolate(&self.x, &im, x),
                );
            }
        }

        let mut data = resize_modes(&radial, nphi_out);
        let inverse = FftPlanner::new().plan_fft_inverse(nphi_out);
        transform_columns(&mut data, &inverse);
        let mesh = PolarMesh::for_resolution(nphi_out, nr_out, self.radius);
        Ok((mesh, data.mapv(|c| c.re)))
    }

    fn check_shape(&self, found: (usize, usize)) -> Result<()> {
        if found != self.shape() {
            return Err(EngineError::ShapeMismatch {
                expected: self.shape(),
                found,
            });
        }
        Ok(())
    }
}

/// Keeps rows whose wavenumber resolves on both samplings; the rest are zero.
pub fn resize_modes(modes: &Modes, rows: usize) -> Modes {
    let rows_in = modes.nrows();
    if rows_in == rows {
        return modes.clone();
    }
    let limit = rows_in.min(rows) as i64;
    let mut out = Modes::zeros((rows, modes.ncols()));
    for (m, row) in modes.axis_iter(Axis(0)).enumerate() {
        let k = signed_wavenumber(m, rows_in);
        if 2 * k.abs() < limit {
            let target = k.rem_euclid(rows as i64) as usize;
            out.row_mut(target).assign(&row);
        }
    }
    out
}

fn signed_wavenumber(m: usize, n: usize) -> i64 {
    if 2 * m <= n {
        m as i64
    } else {
        m as i64 - n as i64
    }
}

fn transform_columns(data: &mut Array2<Complex64>, fft: &Arc<dyn Fft<f64>>) {
    let mut buffer = vec![Complex64::new(0.0, 0.0); data.nrows()];
    for mut column in data.axis_iter_mut(Axis(1)) {
        for (b, v) in buffer.iter_mut().zip(column.iter()) {
            *b = *v;
        }
        fft.process(&mut buffer);
        for (v, b) in column.iter_mut().zip(&buffer) {
            *v = *b;
        }
    }
}

fn padded_size(nphi: usize, dealias: f64) -> usize {
    even_at_least_two((nphi as f64 * dealias).round() as usize).max(nphi)
}

fn even_at_least_two(n: usize) -> usize {
    (n + n % 2).max(2)
}

/// `M[i][j] + s M[i][N - j]` restricted to the first `nr + 1` rows and columns.
fn fold(full: &Matrix, nr: usize, parity: f64) -> Matrix {
    let order = full.nrows() - 1;
    Matrix::from_fn(nr + 1, nr + 1, |i, j| {
        full[(i, j)] + parity * full[(i, order - j)]
    })
}

/// `cos(n pi / 2)` without round-off.
fn quarter_turn_cos(n: i64) -> f64 {
    match n.rem_euclid(4) {
        0 => 1.0,
        2 => -1.0,
        _ => 0.0,
    }
}

/// Radial weights `w_j` with `integral(f r dr, 0, R) = sum_j w_j f(R x_j)` for
/// fields of definite parity. Built from Clenshaw–Curtis weights for
/// `integral(g, 0, 1)` on the full grid.
fn radial_weights(x: &[f64], nr: usize, radius: f64) -> Vec<f64> {
    let n = x.len() - 1;
    let half_moments: Vec<f64> = (0..=n as i64)
        .map(|k| {
            if k == 1 {
                0.5
            } else {
                0.5 * ((1.0 - quarter_turn_cos(k + 1)) / (k + 1) as f64
                    - (1.0 - quarter_turn_cos(k - 1)) / (k - 1) as f64)
            }
        })
        .collect();
    let c = |j: usize| if j == 0 || j == n { 2.0 } else { 1.0 };
    let full: Vec<f64> = (0..=n)
        .map(|j| {
            let sum: f64 = (0..=n)
                .map(|k| half_moments[k] / c(k) * (PI * (j * k) as f64 / n as f64).cos())
                .sum();
            2.0 / (n as f64 * c(j)) * sum
        })
        .collect();
    (0..=nr)
        .map(|j| radius * radius * x[j] * (full[j] - full[n - j]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn basis(nphi: usize, nr: usize, radius: f64) -> DiskBasis {
        DiskBasis::new(&DomainConfig::new(nphi, nr).with_radius(radius)).unwrap()
    }

    #[test]
    fn test_area_and_second_moment() {
        for &radius in &[1.0, 2.0] {
            let b = basis(8, 8, radius);
            let ones = b.quadrature(Grid::ones(b.shape()));
            assert_relative_eq!(ones.integrate(), PI * radius * radius, epsilon = 1e-12);
            let r2 = b.quadrature(b.evaluate(&|_: f64, r: f64, _: f64| r * r));
            assert_relative_eq!(r2.integrate(), PI * radius.powi(4) / 2.0, epsilon = 1e-11);
        }
    }

    #[test]
    fn test_transform_round_trip() {
        let b = basis(12, 6, 1.0);
        let grid = b.evaluate(&|phi: f64, r: f64, _: f64| 1.0 + r * phi.cos() + r * r * (2.0 * phi).sin());
        let modes = b.forward(&grid).unwrap();
        assert_relative_eq!(modes[[0, 3]].re, 1.0, epsilon = 1e-13);
        let back = b.backward(&modes).unwrap();
        for (a, c) in grid.iter().zip(back.iter()) {
            assert_relative_eq!(a, c, epsilon = 1e-13);
        }
    }

    #[test]
    fn test_derivatives_of_smooth_field() {
        // x^2 y = r^3 cos^2(phi) sin(phi)
        let b = basis(16, 10, 1.5);
        let f = |phi: f64, r: f64, _: f64| r.powi(3) * phi.cos().powi(2) * phi.sin();
        let modes = b.forward(&b.evaluate(&f)).unwrap();

        let dr = b.backward(&b.dr(&modes)).unwrap();
        let expected_dr = b.evaluate(&|phi: f64, r: f64, _: f64| 3.0 * r * r * phi.cos().powi(2) * phi.sin());
        for (a, c) in dr.iter().zip(expected_dr.iter()) {
            assert_relative_eq!(a, c, epsilon = 1e-10);
        }

        // lap(x^2 y) = 2 y
        let lap = b.backward(&b.lap(&modes)).unwrap();
        let expected_lap = b.evaluate(&|phi: f64, r: f64, _: f64| 2.0 * r * phi.sin());
        for (a, c) in lap.iter().zip(expected_lap.iter()) {
            assert_relative_eq!(a, c, epsilon = 1e-8);
        }

        let dphi = b.backward(&b.dphi(&modes)).unwrap();
        let expected_dphi = b.evaluate(&|phi: f64, r: f64, _: f64| {
            r.powi(3) * (phi.cos().powi(3) - 2.0 * phi.sin().powi(2) * phi.cos())
        });
        for (a, c) in dphi.iter().zip(expected_dphi.iter()) {
            assert_relative_eq!(a, c, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_gather_matches_mesh() {
        let b = basis(4, 5, 2.0);
        let grid = b.evaluate(&|_: f64, r: f64, _: f64| r);
        let gathered = b.gather(&grid);
        let mesh = b.mesh();
        assert_eq!(gathered.dim(), mesh.shape());
        for (j, r) in mesh.r.iter().enumerate() {
            assert_relative_eq!(gathered[[1, j]], *r, epsilon = 1e-14);
        }
    }

    #[test]
    fn test_resample_to_finer_mesh() {
        let b = basis(8, 8, 1.0);
        let f = |phi: f64, r: f64, _: f64| (1.0 - r * r) * (1.0 + r * phi.sin());
        let modes = b.forward(&b.evaluate(&f)).unwrap();
        let (mesh, values) = b.resample(&modes, 1.5).unwrap();
        assert_eq!(mesh.shape(), (12, 12));
        assert_eq!(values.dim(), (12, 12));
        let expected = f.on_mesh(&mesh);
        for (a, c) in values.iter().zip(expected.iter()) {
            assert_relative_eq!(a, c, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_padded_product_is_exact_for_low_modes() {
        let b = DiskBasis::new(&DomainConfig::new(8, 4).with_dealias(1.5)).unwrap();
        assert_eq!(b.padded_rows(), 12);
        let f = |phi: f64, r: f64, _: f64| r * phi.cos();
        let modes = b.forward(&b.evaluate(&f)).unwrap();
        let padded = b.backward_padded(&modes).unwrap();
        let square = padded.mapv(|v| v * v);
        let product = b.backward(&b.forward_padded(&square).unwrap()).unwrap();
        let expected = b.evaluate(&|phi: f64, r: f64, _: f64| (r * phi.cos()).powi(2));
        for (a, c) in product.iter().zip(expected.iter()) {
            assert_relative_eq!(a, c, epsilon = 1e-13);
        }
    }

    #[test]
    fn test_shape_mismatch() {
        let b = basis(8, 4, 1.0);
        let err = b.forward(&Grid::zeros((8, 4))).unwrap_err();
        assert!(matches!(err, EngineError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_resize_keeps_resolved_modes() {
        let mut modes = Modes::zeros((4, 1));
        modes[[1, 0]] = Complex64::new(1.0, 0.0);
        modes[[3, 0]] = Complex64::new(2.0, 0.0);
        modes[[2, 0]] = Complex64::new(5.0, 0.0);
        let padded = resize_modes(&modes, 8);
        assert_eq!(padded[[1, 0]].re, 1.0);
        assert_eq!(padded[[7, 0]].re, 2.0);
        assert_eq!(padded.column(0).iter().filter(|c| c.re == 5.0).count(), 0);
    }
}

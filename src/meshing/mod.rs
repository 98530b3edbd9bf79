// src/meshing/mod.rs

//! Builds the polar sample grid of a disk domain.
//!
//! Azimuth samples are uniform on `[0, 2pi)`. Radius samples are the positive
//! interior Chebyshev–Gauss–Lobatto points of the doubled diameter, which is
//! where the spectral backend collocates its radial unknowns. The edge `r = R`
//! is not part of the mesh.

use crate::config::DomainConfig;
use crate::kernel::{chebyshev_points, Grid};
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, SQRT_2};

/// Azimuth and radius samples of a disk of the given radius.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolarMesh {
    pub phi: Vec<f64>,
    pub r: Vec<f64>,
    pub radius: f64,
}

impl PolarMesh {
    /// Mesh with `nphi` azimuth and `nr` radius samples.
    pub fn for_resolution(nphi: usize, nr: usize, radius: f64) -> Self {
        PolarMesh {
            phi: azimuth_samples(nphi),
            r: radial_samples(nr, radius),
            radius,
        }
    }

    /// `(nphi, nr)`, the shape of every field sampled on this mesh.
    pub fn shape(&self) -> (usize, usize) {
        (self.phi.len(), self.r.len())
    }

    pub fn len(&self) -> usize {
        self.phi.len() * self.r.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Outer product of the two coordinate sequences as `(phi_mesh, r_mesh)`.
    pub fn grid(&self) -> (Grid, Grid) {
        let shape = self.shape();
        let phi_mesh = Grid::from_shape_fn(shape, |(i, _)| self.phi[i]);
        let r_mesh = Grid::from_shape_fn(shape, |(_, j)| self.r[j]);
        (phi_mesh, r_mesh)
    }

    /// Evaluates `f(phi, r)` at every mesh point.
    pub fn map<F>(&self, f: F) -> Grid
    where
        F: Fn(f64, f64) -> f64,
    {
        Grid::from_shape_fn(self.shape(), |(i, j)| f(self.phi[i], self.r[j]))
    }

    /// Cartesian `(x, y)` coordinates of every mesh point.
    pub fn to_cartesian(&self) -> (Grid, Grid) {
        let x = self.map(|phi, r| r * phi.cos());
        let y = self.map(|phi, r| r * phi.sin());
        (x, y)
    }

    /// Mesh points mapped onto the square `[-1, 1]^2` by the elliptical map.
    /// Coordinates are normalized by the disk radius first.
    pub fn to_square(&self) -> (Grid, Grid) {
        let (x, y) = self.to_cartesian();
        let mut sx = Grid::zeros(x.raw_dim());
        let mut sy = Grid::zeros(y.raw_dim());
        for ((idx, &u), &v) in x.indexed_iter().zip(y.iter()) {
            let (a, b) = circle_to_square(u / self.radius, v / self.radius);
            sx[idx] = a;
            sy[idx] = b;
        }
        (sx, sy)
    }
}

/// Uniform azimuth samples `2 pi k / nphi`.
pub fn azimuth_samples(nphi: usize) -> Vec<f64> {
    (0..nphi).map(|k| 2.0 * PI * k as f64 / nphi as f64).collect()
}

/// Ascending radius samples, the `nr` positive interior Chebyshev points of
/// order `2 nr + 1` scaled by `radius`.
pub fn radial_samples(nr: usize, radius: f64) -> Vec<f64> {
    let x = chebyshev_points(2 * nr + 1);
    (1..=nr).rev().map(|j| radius * x[j]).collect()
}

/// Builds the mesh for a domain. Recomputed from scratch on every call.
pub fn build_mesh(domain: &DomainConfig) -> PolarMesh {
    PolarMesh::for_resolution(domain.nphi, domain.nr, domain.radius)
}

/// Elliptical grid mapping from the unit disk to the square `[-1, 1]^2`.
pub fn circle_to_square(u: f64, v: f64) -> (f64, f64) {
    let u2 = u * u;
    let v2 = v * v;
    let two_sqrt2 = 2.0 * SQRT_2;
    let x = 0.5 * (2.0 + u2 - v2 + two_sqrt2 * u).max(0.0).sqrt()
        - 0.5 * (2.0 + u2 - v2 - two_sqrt2 * u).max(0.0).sqrt();
    let y = 0.5 * (2.0 - u2 + v2 + two_sqrt2 * v).max(0.0).sqrt()
        - 0.5 * (2.0 - u2 + v2 - two_sqrt2 * v).max(0.0).sqrt();
    (x, y)
}

/// Inverse of [`circle_to_square`].
pub fn square_to_circle(x: f64, y: f64) -> (f64, f64) {
    let u = x * (1.0 - y * y / 2.0).sqrt();
    let v = y * (1.0 - x * x / 2.0).sqrt();
    (u, v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mesh_shape_and_ordering() {
        let mesh = PolarMesh::for_resolution(8, 5, 2.0);
        assert_eq!(mesh.shape(), (8, 5));
        assert_eq!(mesh.phi[0], 0.0);
        assert_relative_eq!(mesh.phi[2], PI / 2.0, epsilon = 1e-15);
        assert!(mesh.r.windows(2).all(|w| w[0] < w[1]));
        assert!(mesh.r[0] > 0.0);
        assert!(*mesh.r.last().unwrap() < 2.0);
    }

    #[test]
    fn test_mesh_is_deterministic() {
        let domain = DomainConfig::new(16, 12).with_radius(1.5);
        let first = build_mesh(&domain);
        let _other = build_mesh(&domain.clone().with_resolution(32, 4));
        let second = build_mesh(&domain);
        assert_eq!(first, second);
        assert_eq!(first.grid(), second.grid());
    }

    #[test]
    fn test_grid_is_outer_product() {
        let mesh = PolarMesh::for_resolution(4, 3, 1.0);
        let (phi_mesh, r_mesh) = mesh.grid();
        assert_eq!(phi_mesh.dim(), (4, 3));
        for i in 0..4 {
            for j in 0..3 {
                assert_eq!(phi_mesh[[i, j]], mesh.phi[i]);
                assert_eq!(r_mesh[[i, j]], mesh.r[j]);
            }
        }
    }

    #[test]
    fn test_square_map_round_trip() {
        for &(u, v) in &[(0.3, -0.4), (0.0, 0.9), (-0.6, 0.1)] {
            let (x, y) = circle_to_square(u, v);
            assert!(x.abs() <= 1.0 && y.abs() <= 1.0);
            let (u2, v2) = square_to_circle(x, y);
            assert_relative_eq!(u, u2, epsilon = 1e-12);
            assert_relative_eq!(v, v2, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_cartesian_radius() {
        let mesh = PolarMesh::for_resolution(6, 4, 3.0);
        let (x, y) = mesh.to_cartesian();
        for i in 0..6 {
            for j in 0..4 {
                let rr = (x[[i, j]].powi(2) + y[[i, j]].powi(2)).sqrt();
                assert_relative_eq!(rr, mesh.r[j], epsilon = 1e-12);
            }
        }
    }
}

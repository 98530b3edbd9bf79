// src/spectral/tau.rs

//! Edge boundary conditions and the factored radial operators they close.
//!
//! Every boundary-constrained solve in the crate goes through [`ModalOperator`]:
//! the steady Helmholtz problem, the nested Poisson solve that recovers an
//! initial streamfunction, and the implicit half of each time step.

use super::{Complex64, DiskBasis, Modes};
use crate::kernel::{Matrix, Vector};
use crate::{EngineError, Result};
use nalgebra::linalg::LU;
use nalgebra::Dyn;

/// Dirichlet condition `u(R) = value` imposed by replacing the edge row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TauBoundary {
    pub value: f64,
}

impl TauBoundary {
    pub fn dirichlet(value: f64) -> Self {
        TauBoundary { value }
    }

    /// Overwrites the edge row of `operator` with point evaluation at the edge.
    pub fn lift(&self, operator: &mut Matrix) {
        let cols = operator.ncols();
        for j in 0..cols {
            operator[(0, j)] = if j == 0 { 1.0 } else { 0.0 };
        }
    }

    /// Edge value of modal row `m`. A constant only feeds the mean.
    pub fn modal_value(&self, m: usize) -> Complex64 {
        if m == 0 {
            Complex64::new(self.value, 0.0)
        } else {
            Complex64::new(0.0, 0.0)
        }
    }
}

/// `shift + scale * lap` with the edge row closed by a [`TauBoundary`],
/// factored once per distinct `|k|`.
#[derive(Debug)]
pub struct ModalOperator {
    shift: f64,
    scale: f64,
    tau: TauBoundary,
    factors: Vec<LU<f64, Dyn, Dyn>>,
}

impl ModalOperator {
    pub fn new(basis: &DiskBasis, shift: f64, scale: f64, tau: TauBoundary) -> Result<Self> {
        let size = basis.nr() + 1;
        let mut factors = Vec::with_capacity(basis.nphi() / 2 + 1);
        for m in 0..=basis.nphi() / 2 {
            let mut operator = basis.laplacian(m) * scale;
            for i in 0..size {
                operator[(i, i)] += shift;
            }
            tau.lift(&mut operator);
            let lu = operator.lu();
            if !lu.is_invertible() {
                return Err(EngineError::SolverFailed(format!(
                    "radial operator for wavenumber {} is singular",
                    m
                )));
            }
            factors.push(lu);
        }
        Ok(ModalOperator {
            shift,
            scale,
            tau,
            factors,
        })
    }

    pub fn shift(&self) -> f64 {
        self.shift
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Solves `(shift + scale * lap) u = rhs` with the boundary row of `rhs`
    /// replaced by the edge value.
    pub fn solve(&self, basis: &DiskBasis, rhs: &Modes) -> Result<Modes> {
        if rhs.dim() != basis.shape() {
            return Err(EngineError::ShapeMismatch {
                expected: basis.shape(),
                found: rhs.dim(),
            });
        }
        let size = basis.nr() + 1;
        let mut out = Modes::zeros(rhs.raw_dim());
        for m in 0..basis.nphi() {
            let lu = &self.factors[basis.wavenumber(m).unsigned_abs() as usize];
            let edge = self.tau.modal_value(m);
            let mut re = Vector::from_fn(size, |i, _| rhs[[m, i]].re);
            let mut im = Vector::from_fn(size, |i, _| rhs[[m, i]].im);
            re[0] = edge.re;
            im[0] = edge.im;
            let (re, im) = match (lu.solve(&re), lu.solve(&im)) {
                (Some(re), Some(im)) => (re, im),
                _ => {
                    return Err(EngineError::SolverFailed(format!(
                        "radial solve failed for modal row {}",
                        m
                    )))
                }
            };
            for i in 0..size {
                out[[m, i]] = Complex64::new(re[i], im[i]);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DomainConfig;
    use approx::assert_relative_eq;

    #[test]
    fn test_lift_replaces_edge_row() {
        let mut op = Matrix::from_element(3, 3, 2.0);
        TauBoundary::dirichlet(0.0).lift(&mut op);
        assert_eq!(op.row(0).iter().copied().collect::<Vec<_>>(), vec![1.0, 0.0, 0.0]);
        assert_eq!(op[(1, 1)], 2.0);
    }

    #[test]
    fn test_poisson_with_constant_edge_value() {
        // lap(u) = 4 with u(R) = 1 gives u = r^2 + 1 - R^2.
        let basis = DiskBasis::new(&DomainConfig::new(8, 6).with_radius(2.0)).unwrap();
        let op = ModalOperator::new(&basis, 0.0, 1.0, TauBoundary::dirichlet(1.0)).unwrap();
        let rhs = basis.forward(&basis.evaluate(&|_: f64, _: f64, _: f64| 4.0)).unwrap();
        let u = basis.backward(&op.solve(&basis, &rhs).unwrap()).unwrap();
        let expected = basis.evaluate(&|_: f64, r: f64, radius: f64| r * r + 1.0 - radius * radius);
        for (a, c) in u.iter().zip(expected.iter()) {
            assert_relative_eq!(a, c, epsilon = 1e-11);
        }
    }

    #[test]
    fn test_rejects_wrong_shape() {
        let basis = DiskBasis::new(&DomainConfig::new(8, 6)).unwrap();
        let op = ModalOperator::new(&basis, -1.0, 1.0, TauBoundary::dirichlet(0.0)).unwrap();
        let err = op.solve(&basis, &Modes::zeros((4, 7))).unwrap_err();
        assert!(matches!(err, EngineError::ShapeMismatch { .. }));
    }
}

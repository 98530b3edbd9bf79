// src/kernel/mod.rs

//! The numerical kernel of the engine.
//! This module provides the dense types, Chebyshev collocation primitives, grid
//! norms and the least-squares polynomial fit used by the convergence analysis.

use nalgebra::{DMatrix, DVector};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

// Type aliases for clarity throughout the engine.
pub type Matrix = DMatrix<f64>;
pub type Vector = DVector<f64>;

/// Values sampled on a polar grid, azimuth along axis 0 and radius along axis 1.
pub type Grid = Array2<f64>;

/// Chebyshev–Gauss–Lobatto points `cos(pi j / n)` for `j = 0..=n`, descending from 1 to -1.
pub fn chebyshev_points(n: usize) -> Vec<f64> {
    if n == 0 {
        return vec![1.0];
    }
    (0..=n).map(|j| (PI * j as f64 / n as f64).cos()).collect()
}

/// Chebyshev differentiation matrix on the Gauss–Lobatto points of order `n`.
///
/// Off-diagonal entries use the closed form `(c_i / c_j) / (x_i - x_j)`; the
/// diagonal is the negative row sum, which keeps the derivative of a constant
/// at round-off level.
pub fn chebyshev_differentiation(n: usize) -> (Vec<f64>, Matrix) {
    let x = chebyshev_points(n);
    if n == 0 {
        return (x, Matrix::zeros(1, 1));
    }

    let c: Vec<f64> = (0..=n)
        .map(|j| {
            let edge = if j == 0 || j == n { 2.0 } else { 1.0 };
            if j % 2 == 0 {
                edge
            } else {
                -edge
            }
        })
        .collect();

    let mut d = Matrix::zeros(n + 1, n + 1);
    for i in 0..=n {
        for j in 0..=n {
            if i != j {
                d[(i, j)] = (c[i] / c[j]) / (x[i] - x[j]);
            }
        }
    }
    for i in 0..=n {
        let row_sum: f64 = (0..=n).filter(|&j| j != i).map(|j| d[(i, j)]).sum();
        d[(i, i)] = -row_sum;
    }

    (x, d)
}

/// Barycentric interpolation through values sampled on `chebyshev_points(n)`.
pub fn chebyshev_interpolate(nodes: &[f64], values: &[f64], x: f64) -> f64 {
    let n = nodes.len().saturating_sub(1);
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (j, (&node, &value)) in nodes.iter().zip(values).enumerate() {
        let diff = x - node;
        if diff == 0.0 {
            return value;
        }
        let mut weight = if j % 2 == 0 { 1.0 } else { -1.0 };
        if j == 0 || j == n {
            weight *= 0.5;
        }
        numerator += weight * value / diff;
        denominator += weight / diff;
    }
    numerator / denominator
}

/// Euclidean norm of every entry, divided by the square root of the entry count.
pub fn weighted_norm(values: &Grid) -> f64 {
    let count = values.len();
    if count == 0 {
        return 0.0;
    }
    let sum_of_squares: f64 = values.iter().map(|v| v * v).sum();
    sum_of_squares.sqrt() / (count as f64).sqrt()
}

/// A polynomial stored highest degree first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polynomial {
    coefficients: Vec<f64>,
}

impl Polynomial {
    pub fn new(coefficients: Vec<f64>) -> Self {
        Polynomial { coefficients }
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn degree(&self) -> usize {
        self.coefficients.len().saturating_sub(1)
    }

    /// Horner evaluation.
    pub fn eval(&self, x: f64) -> f64 {
        self.coefficients.iter().fold(0.0, |acc, c| acc * x + c)
    }
}

/// Ordinary least-squares polynomial fit of the given degree.
///
/// Returns `None` when the sample lengths differ, when there are not more
/// samples than the degree, or when the design matrix is rank deficient.
pub fn polyfit(x: &[f64], y: &[f64], degree: usize) -> Option<Polynomial> {
    if x.len() != y.len() || x.len() <= degree {
        return None;
    }

    let columns = degree + 1;
    let design = Matrix::from_fn(x.len(), columns, |i, j| x[i].powi((degree - j) as i32));
    let rhs = Vector::from_column_slice(y);

    let svd = design.svd(true, true);
    if svd.rank(1e-12) < columns {
        return None;
    }
    let solution = svd.solve(&rhs, 1e-14).ok()?;
    Some(Polynomial::new(solution.iter().copied().collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_weighted_norm_of_uniform_offset() {
        let computed = Grid::ones((8, 4));
        let reference = Grid::zeros((8, 4));
        let diff = &reference - &computed;
        assert_relative_eq!(weighted_norm(&diff), 1.0, epsilon = 1e-15);
    }

    #[test]
    fn test_weighted_norm_of_single_point() {
        let mut diff = Grid::zeros((8, 4));
        diff[[3, 2]] = 1.0;
        assert_relative_eq!(weighted_norm(&diff), 1.0 / 32f64.sqrt(), epsilon = 1e-15);
    }

    #[test]
    fn test_chebyshev_derivative_of_cubic() {
        let (x, d) = chebyshev_differentiation(6);
        let f = Vector::from_iterator(x.len(), x.iter().map(|v| v.powi(3)));
        let df = &d * &f;
        for (i, v) in x.iter().enumerate() {
            assert_relative_eq!(df[i], 3.0 * v * v, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_chebyshev_interpolation_reproduces_polynomial() {
        let nodes = chebyshev_points(8);
        let values: Vec<f64> = nodes.iter().map(|x| 1.0 - 2.0 * x + x.powi(5)).collect();
        let x = 0.3141;
        assert_relative_eq!(
            chebyshev_interpolate(&nodes, &values, x),
            1.0 - 2.0 * x + x.powi(5),
            epsilon = 1e-13
        );
        assert_eq!(chebyshev_interpolate(&nodes, &values, nodes[3]), values[3]);
    }

    #[test]
    fn test_polyfit_recovers_line() {
        let x = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let y: Vec<f64> = x.iter().map(|v| -0.25 * v + 3.0).collect();
        let poly = polyfit(&x, &y, 1).unwrap();
        assert_eq!(poly.degree(), 1);
        assert_relative_eq!(poly.coefficients()[0], -0.25, epsilon = 1e-12);
        assert_relative_eq!(poly.coefficients()[1], 3.0, epsilon = 1e-12);
        assert_relative_eq!(poly.eval(10.0), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_polyfit_mismatched_lengths() {
        assert!(polyfit(&[1.0, 2.0], &[1.0], 1).is_none());
        assert!(polyfit(&[1.0], &[1.0], 1).is_none());
        assert!(polyfit(&[2.0, 2.0, 2.0], &[1.0, 2.0, 3.0], 1).is_none());
    }
}

// src/reference/mod.rs

//! Analytic profiles on the disk.
//!
//! Profiles serve as forcing, as initial data and as exact references for the
//! comparator. The source profiles are the Helmholtz forcings whose solutions
//! (with `u = 0` at the edge) are the matching plain profiles.

use crate::config::inverse_square;
use crate::kernel::Grid;
use crate::meshing::PolarMesh;
use serde::{Deserialize, Serialize};

/// A scalar function of `(phi, r)` on a disk of radius `radius`.
pub trait AnalyticField {
    fn eval(&self, phi: f64, r: f64, radius: f64) -> f64;

    /// Samples the field on every point of `mesh`.
    fn on_mesh(&self, mesh: &PolarMesh) -> Grid {
        mesh.map(|phi, r| self.eval(phi, r, mesh.radius))
    }
}

impl<F> AnalyticField for F
where
    F: Fn(f64, f64, f64) -> f64,
{
    fn eval(&self, phi: f64, r: f64, radius: f64) -> f64 {
        self(phi, r, radius)
    }
}

/// Named analytic profiles. Radii are scaled by the domain radius, `rho = r / R`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Profile {
    Zero,
    /// `exp(-rho^2 / 2) - exp(-1/2)`, zero at the edge.
    Gaussian,
    /// Helmholtz forcing whose solution is [`Profile::Gaussian`].
    GaussianSource { deformation_radius: Option<f64> },
    /// `A sin(n phi) J_n(a rho)` with `a` the first positive zero of `J_n`.
    BesselMode { order: u32, amplitude: f64 },
    /// Helmholtz forcing whose solution is the matching [`Profile::BesselMode`].
    BesselSource {
        order: u32,
        amplitude: f64,
        deformation_radius: Option<f64>,
    },
    /// `profile` rotated counter-clockwise by `angle`.
    Rotated { profile: Box<Profile>, angle: f64 },
}

impl Profile {
    pub fn rotated(self, angle: f64) -> Profile {
        Profile::Rotated {
            profile: Box::new(self),
            angle,
        }
    }
}

impl AnalyticField for Profile {
    fn eval(&self, phi: f64, r: f64, radius: f64) -> f64 {
        let rho = r / radius;
        match self {
            Profile::Zero => 0.0,
            Profile::Gaussian => gaussian(rho),
            Profile::GaussianSource { deformation_radius } => {
                let bump = (-rho * rho / 2.0).exp();
                (rho * rho - 2.0) * bump / (radius * radius)
                    - inverse_square(*deformation_radius) * gaussian(rho)
            }
            Profile::BesselMode { order, amplitude } => bessel_mode(*order, *amplitude, phi, rho),
            Profile::BesselSource {
                order,
                amplitude,
                deformation_radius,
            } => {
                let a = bessel_j_zero(*order);
                let eigenvalue = a * a / (radius * radius) + inverse_square(*deformation_radius);
                -eigenvalue * bessel_mode(*order, *amplitude, phi, rho)
            }
            Profile::Rotated { profile, angle } => profile.eval(phi - angle, r, radius),
        }
    }
}

fn gaussian(rho: f64) -> f64 {
    (-rho * rho / 2.0).exp() - (-0.5f64).exp()
}

fn bessel_mode(order: u32, amplitude: f64, phi: f64, rho: f64) -> f64 {
    let a = bessel_j_zero(order);
    amplitude * (order as f64 * phi).sin() * bessel_j(order, a * rho)
}

/// Bessel function of the first kind `J_n(x)`.
///
/// Small arguments sum the power series. From `|x| = 8` on the alternating
/// series cancels too badly, so the value comes from Miller's backward
/// recurrence normalised by `J_0 + 2 * sum J_2k = 1`.
pub fn bessel_j(n: u32, x: f64) -> f64 {
    if x.abs() < SERIES_LIMIT {
        return bessel_j_series(n, x);
    }
    let value = bessel_j_backward(n, x.abs());
    if x < 0.0 && n % 2 == 1 {
        -value
    } else {
        value
    }
}

const SERIES_LIMIT: f64 = 8.0;
const RESCALE: f64 = 1e250;

fn bessel_j_series(n: u32, x: f64) -> f64 {
    let half = x / 2.0;
    let mut term = half.powi(n as i32) / factorial(n);
    let mut sum = term;
    let q = -half * half;
    for k in 1..300u32 {
        term *= q / (k as f64 * (k + n) as f64);
        sum += term;
        if term.abs() <= 1e-17 * sum.abs() {
            break;
        }
    }
    sum
}

fn bessel_j_backward(n: u32, x: f64) -> f64 {
    let reach = (n as f64).max(x);
    let mut top = reach as u32 + 30 + (40.0 * reach).sqrt() as u32;
    top += top % 2;
    let (mut above, mut current) = (0.0, 1e-300);
    let (mut norm, mut wanted) = (0.0, 0.0);
    for k in (1..=top).rev() {
        let below = 2.0 * k as f64 / x * current - above;
        above = current;
        current = below;
        let order = k - 1;
        if current.abs() > RESCALE {
            current /= RESCALE;
            above /= RESCALE;
            norm /= RESCALE;
            wanted /= RESCALE;
        }
        if order > 0 && order % 2 == 0 {
            norm += 2.0 * current;
        }
        if order == n {
            wanted = current;
        }
    }
    wanted / (norm + current)
}

/// Derivative `J_n'(x)`.
pub fn bessel_j_prime(n: u32, x: f64) -> f64 {
    if n == 0 {
        -bessel_j(1, x)
    } else {
        0.5 * (bessel_j(n - 1, x) - bessel_j(n + 1, x))
    }
}

/// First positive zero of `J_n`, by Newton iteration from an asymptotic guess.
pub fn bessel_j_zero(n: u32) -> f64 {
    let mut x = if n == 0 {
        2.404_825_557_695_773
    } else {
        let nu = n as f64;
        nu + 1.855_757_1 * nu.cbrt() + 1.033_150 / nu.cbrt()
    };
    for _ in 0..50 {
        let step = bessel_j(n, x) / bessel_j_prime(n, x);
        x -= step;
        if step.abs() < 1e-15 * x {
            break;
        }
    }
    x
}

fn factorial(n: u32) -> f64 {
    (1..=n).fold(1.0, |acc, k| acc * k as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_bessel_values() {
        assert_relative_eq!(bessel_j(0, 0.0), 1.0);
        assert_relative_eq!(bessel_j(1, 1.0), 0.440_050_585_744_933_5, epsilon = 1e-14);
        assert_relative_eq!(bessel_j(3, 2.5), 0.216_600_391_039_113_5, epsilon = 1e-13);
        assert_relative_eq!(bessel_j(2, -1.0), bessel_j(2, 1.0), epsilon = 1e-15);
    }

    #[test]
    fn test_bessel_large_arguments() {
        assert_relative_eq!(bessel_j(0, 30.0), -0.086_367_983_581_040_21, epsilon = 1e-13);
        assert_relative_eq!(bessel_j(5, 25.0), -0.066_007_995_398_422_99, epsilon = 1e-13);
        assert_relative_eq!(bessel_j(1, 50.0), -0.097_511_828_125_175_14, epsilon = 1e-13);
        assert_relative_eq!(bessel_j(1, -50.0), 0.097_511_828_125_175_14, epsilon = 1e-13);
        // both sides of the switch agree
        assert_relative_eq!(bessel_j(3, 8.0), -0.291_132_207_065_952_25, epsilon = 1e-13);
        assert_relative_eq!(
            bessel_j_series(3, 8.0 - 1e-9),
            bessel_j(3, 8.0),
            epsilon = 1e-8
        );
    }

    #[test]
    fn test_bessel_zeros() {
        assert_relative_eq!(bessel_j_zero(0), 2.404_825_557_695_773, epsilon = 1e-12);
        assert_relative_eq!(bessel_j_zero(1), 3.831_705_970_207_512, epsilon = 1e-11);
        assert_relative_eq!(bessel_j_zero(3), 6.380_161_895_923_984, epsilon = 1e-10);
        assert!(bessel_j(3, bessel_j_zero(3)).abs() < 1e-13);
        assert_relative_eq!(bessel_j_zero(20), 25.417_140_814_072_524, epsilon = 1e-10);
    }

    #[test]
    fn test_profiles_vanish_at_edge() {
        let radius = 2.5;
        for profile in [
            Profile::Gaussian,
            Profile::BesselMode {
                order: 3,
                amplitude: 1.0,
            },
        ] {
            for k in 0..8 {
                let phi = 0.7 * k as f64;
                assert!(profile.eval(phi, radius, radius).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_rotation_shifts_azimuth() {
        let mode = Profile::BesselMode {
            order: 2,
            amplitude: 1.0,
        };
        let rotated = mode.clone().rotated(0.3);
        assert_relative_eq!(rotated.eval(1.0, 0.5, 1.0), mode.eval(0.7, 0.5, 1.0));
    }

    #[test]
    fn test_closure_reference() {
        let f = |phi: f64, r: f64, radius: f64| phi + r / radius;
        let mesh = PolarMesh::for_resolution(4, 3, 2.0);
        let values = f.on_mesh(&mesh);
        assert_eq!(values.dim(), (4, 3));
        assert_relative_eq!(values[[1, 2]], mesh.phi[1] + mesh.r[2] / 2.0);
    }
}

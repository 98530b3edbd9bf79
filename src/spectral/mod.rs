// src/spectral/mod.rs

//! The spectral backend boundary.
//!
//! The engine talks to a solver through the traits in this module: a steady
//! solver produces one gathered field, a time stepper advances in increments
//! and reports its stop predicate, iteration and simulation time. A gathered
//! field may carry a [`Quadrature`], the solver's own integration facility.
//!
//! The built-in implementation discretizes the disk with a Fourier series in
//! azimuth and Chebyshev collocation on the doubled diameter in radius.

pub mod basis;
pub mod imex;
pub mod tau;

pub use basis::DiskBasis;
pub use imex::{EvolutionEquation, ImexStepper, StopCondition};
pub use tau::{ModalOperator, TauBoundary};

use crate::kernel::Grid;
use crate::meshing::PolarMesh;
use crate::reference::AnalyticField;
use crate::Result;
use ndarray::Array2;
use std::sync::Arc;

pub use rustfft::num_complex::Complex;

pub type Complex64 = Complex<f64>;

/// Modal coefficients, wavenumber index along axis 0 and radial node along axis 1.
/// Radial node 0 is the edge.
pub type Modes = Array2<Complex64>;

/// Samples and weights of the solver's integration rule over the disk.
#[derive(Debug, Clone)]
pub struct Quadrature {
    pub phi: Vec<f64>,
    /// Radial nodes, edge first.
    pub r: Vec<f64>,
    pub radius: f64,
    pub weights: Arc<Grid>,
    pub values: Grid,
}

impl Quadrature {
    /// Integral of the sampled field over the disk.
    pub fn integrate(&self) -> f64 {
        self.weights
            .iter()
            .zip(self.values.iter())
            .map(|(w, v)| w * v)
            .sum()
    }

    /// `sqrt(integral((field - reference)^2))`.
    pub fn l2_distance<R>(&self, reference: &R) -> f64
    where
        R: AnalyticField + ?Sized,
    {
        let mut total = 0.0;
        for (i, &phi) in self.phi.iter().enumerate() {
            for (j, &r) in self.r.iter().enumerate() {
                let diff = self.values[[i, j]] - reference.eval(phi, r, self.radius);
                total += self.weights[[i, j]] * diff * diff;
            }
        }
        total.max(0.0).sqrt()
    }
}

/// A field gathered into a single process-local array on a mesh.
#[derive(Debug, Clone)]
pub struct GatheredField {
    pub name: String,
    pub mesh: PolarMesh,
    /// Shaped `(nphi, nr)` like `mesh`.
    pub values: Grid,
    pub quadrature: Option<Quadrature>,
}

impl GatheredField {
    pub fn shape(&self) -> (usize, usize) {
        self.values.dim()
    }

    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }
}

/// A problem solved in one call.
pub trait SteadySolver {
    fn solve(&mut self) -> Result<GatheredField>;
}

/// A problem advanced step by step until its stop condition is met.
pub trait TimeStepper {
    /// Advances the state by `dt`.
    fn step(&mut self, dt: f64) -> Result<()>;

    /// Whether the stop condition still allows another step.
    fn proceed(&self) -> bool;

    fn iteration(&self) -> u64;

    fn sim_time(&self) -> f64;

    /// The primary observable at `scales` times the solve resolution.
    fn gather(&self, scales: f64) -> Result<GatheredField>;
}

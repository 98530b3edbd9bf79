// src/spectral/imex.rs

//! IMEX multistep time stepping.
//!
//! A step of order `s` solves
//! `a0 X[n+1] / dt + L X[n+1] = sum_j a_j X[n-j] / dt + sum_j b_j F(X[n-j])`
//! where `L` is the implicit linear part and `F` the explicit tendency. The
//! first steps of a run use the lower orders until enough history exists.

use super::{Complex64, DiskBasis, GatheredField, Modes, TimeStepper};
use crate::config::Timestepper;
use crate::{EngineError, Result};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

/// Coefficients of one SBDF step. `a` and `b` run from the newest history entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SbdfCoefficients {
    pub a0: f64,
    pub a: &'static [f64],
    pub b: &'static [f64],
}

const SBDF1: SbdfCoefficients = SbdfCoefficients {
    a0: 1.0,
    a: &[1.0],
    b: &[1.0],
};

const SBDF2: SbdfCoefficients = SbdfCoefficients {
    a0: 1.5,
    a: &[2.0, -0.5],
    b: &[2.0, -1.0],
};

const SBDF3: SbdfCoefficients = SbdfCoefficients {
    a0: 11.0 / 6.0,
    a: &[3.0, -1.5, 1.0 / 3.0],
    b: &[3.0, -3.0, 1.0],
};

impl Timestepper {
    /// History length the scheme uses once started.
    pub fn steps(&self) -> usize {
        match self {
            Timestepper::Sbdf1 => 1,
            Timestepper::Sbdf2 => 2,
            Timestepper::Sbdf3 => 3,
        }
    }

    /// Coefficients usable with `history` stored steps.
    pub fn coefficients(&self, history: usize) -> SbdfCoefficients {
        match history.min(self.steps()) {
            0 | 1 => SBDF1,
            2 => SBDF2,
            _ => SBDF3,
        }
    }
}

/// The split right-hand side of an evolution equation in coefficient space.
pub trait EvolutionEquation {
    /// Explicit tendency `F(X)`.
    fn explicit(&mut self, basis: &DiskBasis, state: &Modes) -> Result<Modes>;

    /// Solves `(a0 / dt + L) X = rhs`, applying any boundary rows.
    fn implicit_solve(&mut self, basis: &DiskBasis, a0_over_dt: f64, rhs: &Modes) -> Result<Modes>;

    /// The primary observable derived from the state.
    fn observable(&self, basis: &DiskBasis, state: &Modes) -> Result<Modes>;
}

/// Stepping continues while `sim_time < stop_sim_time` and, when set,
/// `iteration < stop_iteration`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopCondition {
    pub sim_time: f64,
    pub iteration: Option<u64>,
}

impl StopCondition {
    pub fn new(sim_time: f64, iteration: Option<u64>) -> Self {
        StopCondition {
            sim_time,
            iteration,
        }
    }

    pub fn proceed(&self, sim_time: f64, iteration: u64) -> bool {
        sim_time < self.sim_time && self.iteration.map_or(true, |max| iteration < max)
    }
}

pub struct ImexStepper<E> {
    basis: Arc<DiskBasis>,
    equation: E,
    variable: String,
    scheme: Timestepper,
    stop: StopCondition,
    /// Newest first.
    states: VecDeque<Modes>,
    tendencies: VecDeque<Modes>,
    iteration: u64,
    sim_time: f64,
}

impl<E: EvolutionEquation> ImexStepper<E> {
    pub fn new(
        basis: Arc<DiskBasis>,
        equation: E,
        variable: impl Into<String>,
        initial: Modes,
        scheme: Timestepper,
        stop: StopCondition,
        initial_time: f64,
    ) -> Result<Self> {
        if initial.dim() != basis.shape() {
            return Err(EngineError::ShapeMismatch {
                expected: basis.shape(),
                found: initial.dim(),
            });
        }
        let mut states = VecDeque::with_capacity(scheme.steps() + 1);
        states.push_front(initial);
        Ok(ImexStepper {
            basis,
            equation,
            variable: variable.into(),
            scheme,
            stop,
            states,
            tendencies: VecDeque::with_capacity(scheme.steps() + 1),
            iteration: 0,
            sim_time: initial_time,
        })
    }

    /// The current state.
    pub fn state(&self) -> &Modes {
        // never empty: `new` seeds it and `step` only truncates after a push
        &self.states[0]
    }

    pub fn equation(&self) -> &E {
        &self.equation
    }
}

impl<E: EvolutionEquation> TimeStepper for ImexStepper<E> {
    fn step(&mut self, dt: f64) -> Result<()> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(EngineError::SolverFailed(format!("invalid timestep {}", dt)));
        }
        let tendency = self.equation.explicit(&self.basis, &self.states[0])?;
        self.tendencies.push_front(tendency);

        let history = self.states.len().min(self.tendencies.len());
        let coeffs = self.scheme.coefficients(history);
        let mut rhs = Modes::zeros(self.basis.shape());
        for (a, state) in coeffs.a.iter().zip(&self.states) {
            rhs.scaled_add(Complex64::new(a / dt, 0.0), state);
        }
        for (b, tendency) in coeffs.b.iter().zip(&self.tendencies) {
            rhs.scaled_add(Complex64::new(*b, 0.0), tendency);
        }

        let next = self
            .equation
            .implicit_solve(&self.basis, coeffs.a0 / dt, &rhs)?;
        if next.iter().any(|c| !(c.re.is_finite() && c.im.is_finite())) {
            return Err(EngineError::SolverFailed(format!(
                "state became non-finite at iteration {}",
                self.iteration + 1
            )));
        }

        let depth = self.scheme.steps();
        self.states.push_front(next);
        self.states.truncate(depth);
        self.tendencies.truncate(depth);
        self.iteration += 1;
        self.sim_time += dt;
        if history < depth {
            debug!(iteration = self.iteration, order = history, "start-up step");
        }
        Ok(())
    }

    fn proceed(&self) -> bool {
        self.stop.proceed(self.sim_time, self.iteration)
    }

    fn iteration(&self) -> u64 {
        self.iteration
    }

    fn sim_time(&self) -> f64 {
        self.sim_time
    }

    fn gather(&self, scales: f64) -> Result<GatheredField> {
        let observable = self.equation.observable(&self.basis, self.state())?;
        let (mesh, values) = self.basis.resample(&observable, scales)?;
        let grid = self.basis.backward(&observable)?;
        Ok(GatheredField {
            name: self.variable.clone(),
            mesh,
            values,
            quadrature: Some(self.basis.quadrature(grid)),
        })
    }
}

// src/solver/vorticity.rs

//! Wind-driven barotropic vorticity (Stommel–Munk) on the disk.
//!
//! ```text
//! dt(zeta) + r0 lap(psi) - nu lap(zeta) = -J(psi, zeta + beta y) + Q
//! lap(psi) = zeta,  psi(R) = 0,  zeta(R) = 0
//! ```
//!
//! Vorticity is the prognostic state. The streamfunction is recovered from it
//! by a Poisson solve whenever it is needed. The nested solve for the initial
//! condition is kept and reused until the vorticity moves on. Friction and viscosity are implicit, the Jacobian and
//! the wind forcing explicit. Since `lap(psi) = zeta` holds at every interior
//! node, the friction term is `r0 zeta` in the implicit operator.

use super::{wrong_family, FieldRole, ProblemBuilder, ProblemFamily, ProblemHandle};
use crate::config::{ExperimentConfig, ProblemConfig, VorticityParams};
use crate::kernel::Grid;
use crate::spectral::{DiskBasis, EvolutionEquation, ImexStepper, ModalOperator, Modes, StopCondition, TauBoundary};
use crate::{EngineError, Result};
use std::f64::consts::PI;
use std::sync::Arc;
use tracing::debug;

pub struct VorticityFamily;

impl ProblemFamily for VorticityFamily {
    fn name(&self) -> &str {
        "vorticity"
    }

    fn build_problem(&self, basis: Arc<DiskBasis>, config: &ExperimentConfig) -> Result<ProblemHandle> {
        let params = match &config.problem {
            ProblemConfig::Vorticity(params) => params,
            _ => return Err(wrong_family(self.name(), config)),
        };
        let time = config.require_time()?;

        let fields = ProblemBuilder::new(self.name())
            .variable("psi")
            .tau(TauBoundary::dirichlet(0.0))
            .forcing(wind_forcing(&basis, params))
            .require(FieldRole::Tau)
            .require(FieldRole::Forcing)
            .assemble()?;

        let mut equation = StommelMunk::new(&basis, params, fields.tau()?, fields.forcing()?)?;

        let zeta = basis.forward(&basis.evaluate(&params.initial_vorticity))?;
        equation.recover_initial(&basis, &zeta)?;
        debug!("initial streamfunction recovered from vorticity");

        let stepper = ImexStepper::new(
            basis,
            equation,
            fields.variable.clone(),
            zeta,
            time.timestepper,
            StopCondition::new(time.stop_sim_time, time.stop_iteration),
            params.initial_time,
        )?;
        Ok(ProblemHandle::evolving(self.name(), fields.variable, Box::new(stepper)))
    }
}

/// `Q = (F pi / (rho0 R H)) sin(pi (r sin(phi) + R q_shift) / R)` on the collocation grid.
pub fn wind_forcing(basis: &DiskBasis, params: &VorticityParams) -> Grid {
    let radius = basis.radius();
    let amplitude = params.wind_stress * PI / (params.rho0 * radius * params.depth);
    let shift = params.q_shift;
    basis.evaluate(&move |phi: f64, r: f64, radius: f64| {
        amplitude * (PI * (r * phi.sin() + radius * shift) / radius).sin()
    })
}

pub struct StommelMunk {
    r0: f64,
    nu: f64,
    tau: TauBoundary,
    forcing: Modes,
    /// `beta y` in coefficient space.
    planetary: Modes,
    poisson: ModalOperator,
    /// Implicit operator and the `a0 / dt` it was factored for.
    implicit: Option<(f64, ModalOperator)>,
    /// Last `(zeta, psi)` pair from the Poisson solve.
    recovered: Option<(Modes, Modes)>,
}

impl StommelMunk {
    pub fn new(basis: &DiskBasis, params: &VorticityParams, tau: TauBoundary, forcing: &Grid) -> Result<Self> {
        let beta = params.beta;
        let planetary = basis.forward(&basis.evaluate(&move |phi: f64, r: f64, _: f64| {
            beta * r * phi.sin()
        }))?;
        Ok(StommelMunk {
            r0: params.r0,
            nu: params.nu,
            tau,
            forcing: basis.forward(forcing)?,
            planetary,
            poisson: ModalOperator::new(basis, 0.0, 1.0, tau)?,
            implicit: None,
            recovered: None,
        })
    }

    /// Solves `lap(psi) = zeta` with `psi(R) = 0`.
    pub fn streamfunction(&self, basis: &DiskBasis, zeta: &Modes) -> Result<Modes> {
        match &self.recovered {
            Some((cached, psi)) if cached == zeta => Ok(psi.clone()),
            _ => self.poisson.solve(basis, zeta),
        }
    }

    /// Solves for the streamfunction of the initial vorticity and keeps it as
    /// the observable until the state changes.
    pub fn recover_initial(&mut self, basis: &DiskBasis, zeta: &Modes) -> Result<()> {
        let psi = self.poisson.solve(basis, zeta)?;
        if psi.iter().any(|c| !(c.re.is_finite() && c.im.is_finite())) {
            return Err(EngineError::SolverFailed(
                "initial streamfunction is not finite".to_string(),
            ));
        }
        self.recovered = Some((zeta.clone(), psi));
        Ok(())
    }

    /// `J(a, b) = (a_r b_phi - a_phi b_r) / r`, evaluated on the padded grid.
    fn jacobian(basis: &DiskBasis, a: &Modes, b: &Modes) -> Result<Modes> {
        let a_r = basis.backward_padded(&basis.dr(a))?;
        let a_phi = basis.backward_padded(&basis.dphi(a))?;
        let b_r = basis.backward_padded(&basis.dr(b))?;
        let b_phi = basis.backward_padded(&basis.dphi(b))?;
        let r = basis.padded_radii();
        let product = (&a_r * &b_phi - &a_phi * &b_r) / &r;
        basis.forward_padded(&product)
    }
}

impl EvolutionEquation for StommelMunk {
    fn explicit(&mut self, basis: &DiskBasis, state: &Modes) -> Result<Modes> {
        let psi = self.streamfunction(basis, state)?;
        let potential = state + &self.planetary;
        let advection = Self::jacobian(basis, &psi, &potential)?;
        Ok(&self.forcing - &advection)
    }

    fn implicit_solve(&mut self, basis: &DiskBasis, a0_over_dt: f64, rhs: &Modes) -> Result<Modes> {
        let shift = a0_over_dt + self.r0;
        let stale = match &self.implicit {
            Some((cached, _)) => *cached != shift,
            None => true,
        };
        if stale {
            debug!(shift, "factoring implicit vorticity operator");
            let operator = ModalOperator::new(basis, shift, -self.nu, self.tau)?;
            self.implicit = Some((shift, operator));
        }
        match &self.implicit {
            Some((_, operator)) => operator.solve(basis, rhs),
            None => Err(EngineError::SolverFailed(
                "implicit vorticity operator unavailable".to_string(),
            )),
        }
    }

    fn observable(&self, basis: &DiskBasis, state: &Modes) -> Result<Modes> {
        self.streamfunction(basis, state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DomainConfig, TimeConfig, Timestepper};
    use crate::reference::Profile;
    use crate::solver::ProblemKind;
    use crate::spectral::TimeStepper;
    use approx::assert_relative_eq;

    fn gyre_config(stop_iteration: u64) -> ExperimentConfig {
        ExperimentConfig::new(
            DomainConfig::new(16, 12).with_radius(2e6).with_dealias(1.5),
            ProblemConfig::Vorticity(VorticityParams {
                initial_vorticity: Profile::BesselMode {
                    order: 2,
                    amplitude: 1e-16,
                },
                ..VorticityParams::default()
            }),
        )
        .with_time(
            TimeConfig::new(3600.0, 1e9)
                .with_stop_iteration(stop_iteration)
                .with_timestepper(Timestepper::Sbdf3),
        )
    }

    #[test]
    fn test_jacobian_of_solid_body_flow() {
        // J(r^2 / 2, x) = -y
        let basis = DiskBasis::new(&DomainConfig::new(8, 6).with_dealias(1.5)).unwrap();
        let a = basis.forward(&basis.evaluate(&|_: f64, r: f64, _: f64| r * r / 2.0)).unwrap();
        let b = basis.forward(&basis.evaluate(&|phi: f64, r: f64, _: f64| r * phi.cos())).unwrap();
        let j = basis.backward(&StommelMunk::jacobian(&basis, &a, &b).unwrap()).unwrap();
        let expected = basis.evaluate(&|phi: f64, r: f64, _: f64| -r * phi.sin());
        for (x, y) in j.iter().zip(expected.iter()) {
            assert_relative_eq!(x, y, epsilon = 1e-11);
        }
    }

    #[test]
    fn test_wind_forcing_amplitude() {
        let params = VorticityParams::default();
        let basis = DiskBasis::new(&DomainConfig::new(8, 6).with_radius(2e6)).unwrap();
        let q = wind_forcing(&basis, &params);
        let amplitude = 0.1 * PI / (1000.0 * 2e6 * 500.0);
        assert!(q.iter().all(|v| v.abs() <= amplitude * (1.0 + 1e-12)));
        // phi = 0 row: sin(pi q_shift)
        assert_relative_eq!(q[[0, 3]], amplitude * (PI * 0.01).sin(), max_relative = 1e-12);
    }

    #[test]
    fn test_gyre_spins_up() {
        let config = gyre_config(20);
        let basis = Arc::new(DiskBasis::new(&config.domain).unwrap());
        let handle = VorticityFamily.build_problem(basis, &config).unwrap();
        assert_eq!(handle.observable, "psi");
        let mut stepper = match handle.kind {
            ProblemKind::Evolving(stepper) => stepper,
            _ => panic!("vorticity must be time-evolving"),
        };
        let initial = stepper.gather(1.0).unwrap();
        while stepper.proceed() {
            stepper.step(3600.0).unwrap();
        }
        assert_eq!(stepper.iteration(), 20);
        let field = stepper.gather(1.0).unwrap();
        assert!(field.is_finite());
        let change = (&field.values - &initial.values)
            .iter()
            .fold(0.0f64, |acc, v| acc.max(v.abs()));
        assert!(change > 0.0);
    }

    #[test]
    fn test_initial_streamfunction_is_kept() {
        let config = gyre_config(1);
        let params = match &config.problem {
            ProblemConfig::Vorticity(params) => params.clone(),
            _ => unreachable!(),
        };
        let basis = DiskBasis::new(&config.domain).unwrap();
        let forcing = wind_forcing(&basis, &params);
        let mut equation =
            StommelMunk::new(&basis, &params, TauBoundary::dirichlet(0.0), &forcing).unwrap();
        let zeta = basis.forward(&basis.evaluate(&params.initial_vorticity)).unwrap();
        equation.recover_initial(&basis, &zeta).unwrap();

        let (cached_zeta, cached_psi) = equation.recovered.clone().unwrap();
        assert_eq!(cached_zeta, zeta);
        assert_eq!(equation.observable(&basis, &zeta).unwrap(), cached_psi);
        assert_eq!(equation.poisson.solve(&basis, &zeta).unwrap(), cached_psi);

        // a different state is solved afresh
        let doubled = zeta.mapv(|c| c * 2.0);
        let psi = equation.observable(&basis, &doubled).unwrap();
        for (a, b) in psi.iter().zip(cached_psi.iter()) {
            assert_relative_eq!(a.re, 2.0 * b.re, epsilon = 1e-30, max_relative = 1e-9);
            assert_relative_eq!(a.im, 2.0 * b.im, epsilon = 1e-30, max_relative = 1e-9);
        }
    }

    #[test]
    fn test_initial_time_is_configurable() {
        let mut config = gyre_config(1);
        if let ProblemConfig::Vorticity(params) = &mut config.problem {
            params.initial_time = 500.0;
        }
        let basis = Arc::new(DiskBasis::new(&config.domain).unwrap());
        let handle = VorticityFamily.build_problem(basis, &config).unwrap();
        match handle.kind {
            ProblemKind::Evolving(stepper) => assert_eq!(stepper.sim_time(), 500.0),
            _ => panic!("vorticity must be time-evolving"),
        }
    }
}

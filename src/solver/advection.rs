// src/solver/advection.rs

//! Rigid rotation of a scalar, `dt(psi) + u . grad(psi) = 0` with `u = r e_phi`.
//!
//! The advection term reduces to `d_phi(psi)`, which is diagonal in Fourier
//! space and is stepped implicitly. There is no boundary condition.

use super::{wrong_family, ProblemBuilder, ProblemFamily, ProblemHandle};
use crate::config::{ExperimentConfig, ProblemConfig};
use crate::spectral::{Complex64, DiskBasis, EvolutionEquation, ImexStepper, Modes, StopCondition};
use crate::Result;
use ndarray::Axis;
use std::sync::Arc;

pub struct AdvectionFamily;

impl ProblemFamily for AdvectionFamily {
    fn name(&self) -> &str {
        "advection"
    }

    fn build_problem(&self, basis: Arc<DiskBasis>, config: &ExperimentConfig) -> Result<ProblemHandle> {
        let params = match &config.problem {
            ProblemConfig::Advection(params) => params,
            _ => return Err(wrong_family(self.name(), config)),
        };
        let time = config.require_time()?;
        let fields = ProblemBuilder::new(self.name()).variable("psi").assemble()?;

        let initial = basis.forward(&basis.evaluate(&params.initial))?;
        let stepper = ImexStepper::new(
            basis,
            RigidRotation,
            fields.variable.clone(),
            initial,
            time.timestepper,
            StopCondition::new(time.stop_sim_time, time.stop_iteration),
            0.0,
        )?;
        Ok(ProblemHandle::evolving(self.name(), fields.variable, Box::new(stepper)))
    }
}

/// Counter-clockwise rotation at unit angular speed.
pub struct RigidRotation;

impl EvolutionEquation for RigidRotation {
    fn explicit(&mut self, basis: &DiskBasis, _state: &Modes) -> Result<Modes> {
        Ok(Modes::zeros(basis.shape()))
    }

    fn implicit_solve(&mut self, basis: &DiskBasis, a0_over_dt: f64, rhs: &Modes) -> Result<Modes> {
        let mut out = rhs.clone();
        for (m, mut row) in out.axis_iter_mut(Axis(0)).enumerate() {
            let denominator = Complex64::new(a0_over_dt, basis.derivative_wavenumber(m));
            row.mapv_inplace(|c| c / denominator);
        }
        Ok(out)
    }

    fn observable(&self, _basis: &DiskBasis, state: &Modes) -> Result<Modes> {
        Ok(state.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AdvectionParams, DomainConfig, TimeConfig, Timestepper};
    use crate::reference::{AnalyticField, Profile};
    use crate::solver::ProblemKind;
    use crate::spectral::TimeStepper;

    #[test]
    fn test_bessel_mode_rotates() {
        let initial = Profile::BesselMode {
            order: 3,
            amplitude: 1.0,
        };
        let config = ExperimentConfig::new(
            DomainConfig::new(16, 12),
            ProblemConfig::Advection(AdvectionParams {
                initial: initial.clone(),
            }),
        )
        .with_time(
            TimeConfig::new(0.01, 10.0)
                .with_stop_iteration(50)
                .with_timestepper(Timestepper::Sbdf3),
        );
        let basis = Arc::new(DiskBasis::new(&config.domain).unwrap());
        let handle = AdvectionFamily.build_problem(basis, &config).unwrap();
        assert_eq!(handle.observable, "psi");
        let mut stepper = match handle.kind {
            ProblemKind::Evolving(stepper) => stepper,
            _ => panic!("advection must be time-evolving"),
        };
        while stepper.proceed() {
            stepper.step(0.01).unwrap();
        }
        assert_eq!(stepper.iteration(), 50);

        let field = stepper.gather(1.0).unwrap();
        let expected = initial.rotated(stepper.sim_time()).on_mesh(&field.mesh);
        let worst = (&field.values - &expected)
            .iter()
            .fold(0.0f64, |acc, v| acc.max(v.abs()));
        assert!(worst < 5e-3, "max error {}", worst);
    }

    #[test]
    fn test_requires_time_configuration() {
        let config = ExperimentConfig::new(
            DomainConfig::new(8, 4),
            ProblemConfig::Advection(AdvectionParams {
                initial: Profile::Gaussian,
            }),
        );
        let basis = Arc::new(DiskBasis::new(&config.domain).unwrap());
        assert!(AdvectionFamily.build_problem(basis, &config).is_err());
    }
}

// src/solver/helmholtz.rs

//! Steady Helmholtz problem `lap(u) - u / Ld^2 = q` with `u = 0` at the edge.

use super::{wrong_family, FieldRole, ProblemBuilder, ProblemFamily, ProblemHandle};
use crate::config::{ExperimentConfig, ProblemConfig};
use crate::spectral::{DiskBasis, GatheredField, ModalOperator, Modes, SteadySolver, TauBoundary};
use crate::Result;
use std::sync::Arc;
use tracing::debug;

pub struct HelmholtzFamily;

impl ProblemFamily for HelmholtzFamily {
    fn name(&self) -> &str {
        "helmholtz"
    }

    fn build_problem(&self, basis: Arc<DiskBasis>, config: &ExperimentConfig) -> Result<ProblemHandle> {
        let params = match &config.problem {
            ProblemConfig::Helmholtz(params) => params,
            _ => return Err(wrong_family(self.name(), config)),
        };

        let fields = ProblemBuilder::new(self.name())
            .variable("u")
            .tau(TauBoundary::dirichlet(0.0))
            .forcing(basis.evaluate(&params.forcing))
            .require(FieldRole::Tau)
            .require(FieldRole::Forcing)
            .assemble()?;

        let operator = ModalOperator::new(&basis, -params.damping(), 1.0, fields.tau()?)?;
        let forcing = basis.forward(fields.forcing()?)?;
        debug!(damping = params.damping(), "helmholtz operator factored");

        let solver = HelmholtzSolver {
            basis,
            operator,
            forcing,
            variable: fields.variable.clone(),
        };
        Ok(ProblemHandle::steady(self.name(), fields.variable, Box::new(solver)))
    }
}

pub struct HelmholtzSolver {
    basis: Arc<DiskBasis>,
    operator: ModalOperator,
    forcing: Modes,
    variable: String,
}

impl SteadySolver for HelmholtzSolver {
    fn solve(&mut self) -> Result<GatheredField> {
        let modes = self.operator.solve(&self.basis, &self.forcing)?;
        let grid = self.basis.backward(&modes)?;
        Ok(GatheredField {
            name: self.variable.clone(),
            mesh: self.basis.mesh(),
            values: self.basis.gather(&grid),
            quadrature: Some(self.basis.quadrature(grid)),
        })
    }
}

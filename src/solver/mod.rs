// src/solver/mod.rs

//! Defines the problem framework: the `ProblemFamily` trait, the builder that
//! checks a problem's registered fields, and the built-in equation families.
//!
//! A family turns an [`ExperimentConfig`] into a [`ProblemHandle`], which is
//! either a steady solver or a time stepper over the shared [`DiskBasis`].

pub mod advection;
pub mod helmholtz;
pub mod vorticity;

pub use advection::AdvectionFamily;
pub use helmholtz::HelmholtzFamily;
pub use vorticity::VorticityFamily;

use crate::config::ExperimentConfig;
use crate::kernel::Grid;
use crate::spectral::{DiskBasis, SteadySolver, TauBoundary, TimeStepper};
use crate::{EngineError, Result};
use std::fmt;
use std::sync::Arc;

/// The common interface for all equation families.
///
/// A family is responsible for translating a configuration into a
/// solver-ready problem on the given basis.
pub trait ProblemFamily {
    /// Returns the unique name the family is registered under.
    fn name(&self) -> &str;

    /// Assembles the problem described by `config`.
    fn build_problem(&self, basis: Arc<DiskBasis>, config: &ExperimentConfig) -> Result<ProblemHandle>;
}

/// Steady or time-evolving solver produced by a family.
pub enum ProblemKind {
    Steady(Box<dyn SteadySolver>),
    Evolving(Box<dyn TimeStepper>),
}

/// An assembled problem and the name of its primary observable.
pub struct ProblemHandle {
    pub family: String,
    pub observable: String,
    pub kind: ProblemKind,
}

impl ProblemHandle {
    pub fn steady(
        family: impl Into<String>,
        observable: impl Into<String>,
        solver: Box<dyn SteadySolver>,
    ) -> Self {
        ProblemHandle {
            family: family.into(),
            observable: observable.into(),
            kind: ProblemKind::Steady(solver),
        }
    }

    pub fn evolving(
        family: impl Into<String>,
        observable: impl Into<String>,
        stepper: Box<dyn TimeStepper>,
    ) -> Self {
        ProblemHandle {
            family: family.into(),
            observable: observable.into(),
            kind: ProblemKind::Evolving(stepper),
        }
    }

    pub fn is_steady(&self) -> bool {
        matches!(self.kind, ProblemKind::Steady(_))
    }
}

impl fmt::Debug for ProblemHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_steady() { "steady" } else { "evolving" };
        f.debug_struct("ProblemHandle")
            .field("family", &self.family)
            .field("observable", &self.observable)
            .field("kind", &kind)
            .finish()
    }
}

/// Auxiliary fields a problem may need registered before assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    Variable,
    Tau,
    Forcing,
}

impl fmt::Display for FieldRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldRole::Variable => write!(f, "variable"),
            FieldRole::Tau => write!(f, "tau"),
            FieldRole::Forcing => write!(f, "forcing"),
        }
    }
}

/// Collects the fields of a problem and checks that every required one was
/// registered. Assembly without them is a programming error in the family.
#[derive(Debug)]
pub struct ProblemBuilder {
    family: String,
    variable: Option<String>,
    tau: Option<TauBoundary>,
    forcing: Option<Grid>,
    required: Vec<FieldRole>,
}

impl ProblemBuilder {
    pub fn new(family: impl Into<String>) -> Self {
        ProblemBuilder {
            family: family.into(),
            variable: None,
            tau: None,
            forcing: None,
            required: vec![FieldRole::Variable],
        }
    }

    pub fn variable(mut self, name: impl Into<String>) -> Self {
        self.variable = Some(name.into());
        self
    }

    pub fn tau(mut self, tau: TauBoundary) -> Self {
        self.tau = Some(tau);
        self
    }

    /// Forcing sampled on the collocation grid.
    pub fn forcing(mut self, forcing: Grid) -> Self {
        self.forcing = Some(forcing);
        self
    }

    pub fn require(mut self, role: FieldRole) -> Self {
        if !self.required.contains(&role) {
            self.required.push(role);
        }
        self
    }

    pub fn assemble(self) -> Result<ProblemFields> {
        for role in &self.required {
            let present = match role {
                FieldRole::Variable => self.variable.is_some(),
                FieldRole::Tau => self.tau.is_some(),
                FieldRole::Forcing => self.forcing.is_some(),
            };
            if !present {
                return Err(missing(&self.family, *role));
            }
        }
        Ok(ProblemFields {
            family: self.family,
            variable: self.variable.unwrap_or_default(),
            tau: self.tau,
            forcing: self.forcing,
        })
    }
}

/// The registered fields of an assembled problem.
#[derive(Debug)]
pub struct ProblemFields {
    pub family: String,
    pub variable: String,
    tau: Option<TauBoundary>,
    forcing: Option<Grid>,
}

impl ProblemFields {
    pub fn tau(&self) -> Result<TauBoundary> {
        self.tau.ok_or_else(|| missing(&self.family, FieldRole::Tau))
    }

    pub fn forcing(&self) -> Result<&Grid> {
        self.forcing
            .as_ref()
            .ok_or_else(|| missing(&self.family, FieldRole::Forcing))
    }
}

fn missing(family: &str, role: FieldRole) -> EngineError {
    EngineError::MissingField {
        problem: family.to_string(),
        field: role.to_string(),
    }
}

/// Error for a family handed a configuration of another family.
pub(crate) fn wrong_family(expected: &str, config: &ExperimentConfig) -> EngineError {
    EngineError::Configuration(format!(
        "family '{}' cannot build a '{}' problem",
        expected,
        config.problem.family()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_reports_missing_tau() {
        let result = ProblemBuilder::new("helmholtz")
            .variable("u")
            .forcing(Grid::zeros((4, 3)))
            .require(FieldRole::Tau)
            .require(FieldRole::Forcing)
            .assemble();
        match result {
            Err(EngineError::MissingField { problem, field }) => {
                assert_eq!(problem, "helmholtz");
                assert_eq!(field, "tau");
            }
            other => panic!("expected MissingField, got {:?}", other),
        }
    }

    #[test]
    fn test_builder_requires_variable() {
        let err = ProblemBuilder::new("custom").assemble().unwrap_err();
        assert!(matches!(err, EngineError::MissingField { ref field, .. } if field == "variable"));
    }

    #[test]
    fn test_assembled_fields() {
        let fields = ProblemBuilder::new("advection")
            .variable("psi")
            .tau(TauBoundary::dirichlet(0.0))
            .assemble()
            .unwrap();
        assert_eq!(fields.variable, "psi");
        assert_eq!(fields.tau().unwrap(), TauBoundary::dirichlet(0.0));
        assert!(matches!(
            fields.forcing(),
            Err(EngineError::MissingField { .. })
        ));
    }
}

// src/compare/mod.rs

//! Compares a solved field against an analytic reference.
//!
//! Two independent scalars are produced: the weighted norm of the pointwise
//! difference on the mesh, and the square root of the integrated squared
//! residual from the solver's own quadrature when the field carries one.

use crate::kernel::{weighted_norm, Grid};
use crate::reference::AnalyticField;
use crate::spectral::{GatheredField, Quadrature};
use crate::{EngineError, Result};

/// Outcome of one comparison. Recomputed on every call.
#[derive(Debug, Clone)]
pub struct Comparison {
    /// The reference sampled on the field's mesh.
    pub reference: Grid,
    /// `reference - computed`.
    pub difference: Grid,
    pub weighted_error: f64,
    pub integral_error: Option<f64>,
}

/// `||reference - computed||_2 / sqrt(nr * nphi)` for two arrays of the same shape.
pub fn naive_error(computed: &Grid, reference: &Grid) -> Result<f64> {
    if computed.dim() != reference.dim() {
        return Err(EngineError::ShapeMismatch {
            expected: reference.dim(),
            found: computed.dim(),
        });
    }
    Ok(weighted_norm(&(reference - computed)))
}

/// `sqrt(integral((computed - reference)^2))` with the solver's quadrature.
pub fn integral_error<R>(quadrature: &Quadrature, reference: &R) -> f64
where
    R: AnalyticField + ?Sized,
{
    quadrature.l2_distance(reference)
}

/// Samples `reference` on the field's mesh and computes both error measures.
pub fn compare<R>(field: &GatheredField, reference: &R) -> Result<Comparison>
where
    R: AnalyticField + ?Sized,
{
    let expected = field.mesh.shape();
    if field.values.dim() != expected {
        return Err(EngineError::ShapeMismatch {
            expected,
            found: field.values.dim(),
        });
    }
    let sampled = reference.on_mesh(&field.mesh);
    let difference = &sampled - &field.values;
    let weighted_error = weighted_norm(&difference);
    let integral_error = field
        .quadrature
        .as_ref()
        .map(|quadrature| integral_error(quadrature, reference));
    Ok(Comparison {
        reference: sampled,
        difference,
        weighted_error,
        integral_error,
    })
}

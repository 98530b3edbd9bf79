// src/sweep/mod.rs

//! Convergence studies.
//!
//! A sweep re-runs one problem at a list of radial resolutions with the
//! azimuthal resolution held at the template's value, then at a list of
//! azimuthal resolutions with the radial resolution held at the template's
//! value. Every candidate gets its own configuration derived from the
//! template, so the two series never influence each other.

use crate::compare::compare;
use crate::config::ExperimentConfig;
use crate::kernel::{polyfit, Polynomial};
use crate::reference::AnalyticField;
use crate::{Engine, EngineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::info;

/// Which scalar error a sweep records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ErrorMetric {
    /// Square root of the integrated squared residual.
    #[default]
    Integral,
    /// Pointwise norm divided by the square root of the sample count.
    Weighted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SweepAxis {
    Radial,
    Azimuthal,
}

impl fmt::Display for SweepAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepAxis::Radial => write!(f, "nr"),
            SweepAxis::Azimuthal => write!(f, "nphi"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConvergencePoint {
    pub nphi: usize,
    pub nr: usize,
    pub error: f64,
    /// Wall time of the run alone.
    pub elapsed: Duration,
}

impl ConvergencePoint {
    pub fn resolution(&self, axis: SweepAxis) -> usize {
        match axis {
            SweepAxis::Radial => self.nr,
            SweepAxis::Azimuthal => self.nphi,
        }
    }
}

/// Points of one sweep in candidate order.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvergenceSeries {
    pub axis: SweepAxis,
    pub points: Vec<ConvergencePoint>,
}

impl ConvergenceSeries {
    pub fn new(axis: SweepAxis) -> Self {
        ConvergenceSeries {
            axis,
            points: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn resolutions(&self) -> Vec<usize> {
        self.points.iter().map(|p| p.resolution(self.axis)).collect()
    }

    pub fn errors(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.error).collect()
    }

    pub fn elapsed_seconds(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.elapsed.as_secs_f64()).collect()
    }

    /// Least-squares fit of `ln(error)` against resolution over the first
    /// `truncation` points, to leave out a saturation plateau.
    pub fn fit(&self, truncation: usize) -> Result<LogLinearFit> {
        let prefix = &self.points[..truncation.min(self.points.len())];
        if prefix.len() < 2 {
            return Err(EngineError::Fit(format!(
                "need at least two points to fit, have {}",
                prefix.len()
            )));
        }
        if let Some(bad) = prefix.iter().find(|p| !(p.error.is_finite() && p.error > 0.0)) {
            return Err(EngineError::Fit(format!(
                "error {} at {} = {} has no logarithm",
                bad.error,
                self.axis,
                bad.resolution(self.axis)
            )));
        }
        let x: Vec<f64> = prefix.iter().map(|p| p.resolution(self.axis) as f64).collect();
        let y: Vec<f64> = prefix.iter().map(|p| p.error.ln()).collect();
        let poly = polyfit(&x, &y, 1)
            .ok_or_else(|| EngineError::Fit("resolutions do not vary".to_string()))?;
        Ok(LogLinearFit {
            slope: poly.coefficients()[0],
            intercept: poly.coefficients()[1],
            points: prefix.len(),
        })
    }
}

/// `error ~ exp(slope * N + intercept)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogLinearFit {
    pub slope: f64,
    pub intercept: f64,
    /// Number of points the fit used.
    pub points: usize,
}

impl LogLinearFit {
    pub fn predict(&self, resolution: f64) -> f64 {
        self.polynomial().eval(resolution).exp()
    }

    /// The fitted line in `ln(error)`, highest degree first.
    pub fn polynomial(&self) -> Polynomial {
        Polynomial::new(vec![self.slope, self.intercept])
    }
}

impl fmt::Display for LogLinearFit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exp({:.4} N {:+.4})", self.slope, self.intercept)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConvergenceStudy {
    pub radial: ConvergenceSeries,
    pub azimuthal: ConvergenceSeries,
}

impl fmt::Display for ConvergenceStudy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for series in [&self.radial, &self.azimuthal] {
            writeln!(f, "{:>6} {:>6} {:>14} {:>12}", "nphi", "nr", "error", "time [s]")?;
            for p in &series.points {
                writeln!(
                    f,
                    "{:>6} {:>6} {:>14.6e} {:>12.6}",
                    p.nphi,
                    p.nr,
                    p.error,
                    p.elapsed.as_secs_f64()
                )?;
            }
        }
        Ok(())
    }
}

/// Candidate resolutions of a convergence study.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceSweep {
    pub nr_candidates: Vec<usize>,
    pub nphi_candidates: Vec<usize>,
    pub metric: ErrorMetric,
}

impl ConvergenceSweep {
    pub fn new(nr_candidates: Vec<usize>, nphi_candidates: Vec<usize>) -> Self {
        ConvergenceSweep {
            nr_candidates,
            nphi_candidates,
            metric: ErrorMetric::default(),
        }
    }

    pub fn with_metric(mut self, metric: ErrorMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Runs both sweeps in order. The first failing run ends the study.
    pub fn run<R>(&self, engine: &mut Engine, template: &ExperimentConfig, reference: &R) -> Result<ConvergenceStudy>
    where
        R: AnalyticField + ?Sized,
    {
        let mut radial = ConvergenceSeries::new(SweepAxis::Radial);
        for &nr in &self.nr_candidates {
            let config = template.with_nr(nr);
            radial.points.push(self.measure(engine, &config, reference)?);
        }

        let mut azimuthal = ConvergenceSeries::new(SweepAxis::Azimuthal);
        for &nphi in &self.nphi_candidates {
            let config = template.with_nphi(nphi);
            azimuthal.points.push(self.measure(engine, &config, reference)?);
        }

        Ok(ConvergenceStudy { radial, azimuthal })
    }

    fn measure<R>(&self, engine: &mut Engine, config: &ExperimentConfig, reference: &R) -> Result<ConvergencePoint>
    where
        R: AnalyticField + ?Sized,
    {
        let start = Instant::now();
        let result = engine.run(config)?;
        let elapsed = start.elapsed();

        let field = result.final_field().ok_or_else(|| {
            EngineError::Configuration("convergence sweeps need an in-memory output policy".to_string())
        })?;
        let comparison = compare(field, reference)?;
        let error = match self.metric {
            ErrorMetric::Weighted => comparison.weighted_error,
            ErrorMetric::Integral => comparison.integral_error.ok_or_else(|| {
                EngineError::Configuration(format!(
                    "family '{}' gives no quadrature for the integral error",
                    config.problem.family()
                ))
            })?,
        };
        info!(
            nphi = config.domain.nphi,
            nr = config.domain.nr,
            error,
            elapsed = elapsed.as_secs_f64(),
            "sweep candidate done"
        );
        Ok(ConvergencePoint {
            nphi: config.domain.nphi,
            nr: config.domain.nr,
            error,
            elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn synthetic(plateau_after: usize) -> ConvergenceSeries {
        let mut series = ConvergenceSeries::new(SweepAxis::Radial);
        let floor = 2.0 * (-0.7f64 * (4 * plateau_after) as f64).exp();
        for i in 1..=10 {
            let n = 4 * i;
            let error = if i <= plateau_after {
                2.0 * (-0.7 * n as f64).exp()
            } else {
                floor
            };
            series.points.push(ConvergencePoint {
                nphi: 16,
                nr: n,
                error,
                elapsed: Duration::from_millis(i as u64),
            });
        }
        series
    }

    #[test]
    fn test_truncated_fit_recovers_decay_rate() {
        let series = synthetic(6);
        let fit = series.fit(6).unwrap();
        assert_eq!(fit.points, 6);
        assert_relative_eq!(fit.slope, -0.7, epsilon = 1e-9);
        assert_relative_eq!(fit.intercept, 2f64.ln(), epsilon = 1e-8);
        assert_relative_eq!(fit.predict(8.0), 2.0 * (-5.6f64).exp(), max_relative = 1e-8);
    }

    #[test]
    fn test_full_fit_is_biased_by_plateau() {
        let series = synthetic(6);
        let fit = series.fit(series.len()).unwrap();
        assert!((fit.slope + 0.7).abs() > 0.1);
        assert_eq!(series.fit(100).unwrap().points, 10);
    }

    #[test]
    fn test_fit_rejects_degenerate_input() {
        let series = synthetic(6);
        assert!(matches!(series.fit(1), Err(EngineError::Fit(_))));
        let mut zero = synthetic(6);
        zero.points[0].error = 0.0;
        assert!(matches!(zero.fit(6), Err(EngineError::Fit(_))));
    }

    #[test]
    fn test_fit_display() {
        let fit = LogLinearFit {
            slope: -0.5,
            intercept: 1.25,
            points: 3,
        };
        assert_eq!(fit.to_string(), "exp(-0.5000 N +1.2500)");
    }

    #[test]
    fn test_study_table_lists_every_point() {
        let study = ConvergenceStudy {
            radial: synthetic(6),
            azimuthal: ConvergenceSeries::new(SweepAxis::Azimuthal),
        };
        let table = study.to_string();
        assert_eq!(table.lines().count(), 1 + 10 + 1);
        assert_eq!(study.radial.resolutions()[2], 12);
    }
}

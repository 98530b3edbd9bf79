// src/playback/mod.rs

//! Time-indexed view over a run's output for plotting and animation.
//!
//! A playback reads from the in-memory series of a local run or from the
//! reconciled folder of a streamed one. Rendering is left to the caller.

use crate::checkpoint::{ReconciledRun, RunState};
use crate::config::OutputPolicy;
use crate::kernel::Grid;
use crate::runner::TimeSeries;
use crate::{EngineError, Result, RunOutcome, RunResult};
use std::path::Path;

/// One snapshot with its coordinate axes.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub time: f64,
    pub phi: Vec<f64>,
    pub r: Vec<f64>,
    /// Shaped `(phi.len(), r.len())`.
    pub values: Grid,
}

#[derive(Debug, Clone)]
pub enum Playback {
    Memory(TimeSeries),
    Disk(ReconciledRun),
}

impl Playback {
    pub fn from_series(series: TimeSeries) -> Self {
        Playback::Memory(series)
    }

    /// Playback of a finished run. Streamed output is reconciled first.
    pub fn from_result(result: &RunResult) -> Result<Self> {
        match &result.outcome {
            RunOutcome::Steady(field) => {
                let mut series = TimeSeries::new(field.name.clone());
                series.push(0, 0.0, field.clone());
                Ok(Playback::Memory(series))
            }
            RunOutcome::Accumulated(series) => Ok(Playback::Memory(series.clone())),
            RunOutcome::Streamed(state) => {
                let root = match result.config.time.as_ref().map(|t| &t.output) {
                    Some(OutputPolicy::Streamed { root, .. }) => root,
                    _ => {
                        return Err(EngineError::Resumption(
                            "streamed outcome without a streamed output policy".to_string(),
                        ))
                    }
                };
                Ok(Playback::Disk(state.reconcile(root)?))
            }
        }
    }

    /// Playback of a run streamed by an earlier process.
    pub fn resume(root: &Path, save_name: &str) -> Result<Self> {
        let state = RunState::load(root, save_name)?;
        Ok(Playback::Disk(state.reconcile(root)?))
    }

    pub fn len(&self) -> usize {
        match self {
            Playback::Memory(series) => series.len(),
            Playback::Disk(run) => run.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn times(&self) -> Vec<f64> {
        match self {
            Playback::Memory(series) => series.times.clone(),
            Playback::Disk(run) => run.times(),
        }
    }

    pub fn frame(&self, k: usize) -> Result<Frame> {
        match self {
            Playback::Memory(series) => {
                let field = series.fields.get(k).ok_or_else(|| out_of_range(k, series.len()))?;
                Ok(Frame {
                    time: series.times[k],
                    phi: field.mesh.phi.clone(),
                    r: field.mesh.r.clone(),
                    values: field.values.clone(),
                })
            }
            Playback::Disk(run) => {
                let (time, values) = run.read_frame(k)?;
                Ok(Frame {
                    time,
                    phi: run.mesh.phi.clone(),
                    r: run.mesh.r.clone(),
                    values,
                })
            }
        }
    }

    /// Frames at normalized times in `[0, 1]`, each picking index
    /// `floor(t * (len - 1))`.
    pub fn at_normalized(&self, times: &[f64]) -> Result<Vec<Frame>> {
        times
            .iter()
            .map(|&t| self.frame(normalized_index(t, self.len())?))
            .collect()
    }

    pub fn frames(&self) -> impl Iterator<Item = Result<Frame>> + '_ {
        (0..self.len()).map(move |k| self.frame(k))
    }
}

/// `floor(t * (len - 1))` for `t` in `[0, 1]`.
pub fn normalized_index(t: f64, len: usize) -> Result<usize> {
    if len == 0 {
        return Err(EngineError::Configuration("no frames to play back".to_string()));
    }
    if !(0.0..=1.0).contains(&t) {
        return Err(EngineError::Configuration(format!(
            "normalized time {} is outside [0, 1]",
            t
        )));
    }
    Ok(((t * (len - 1) as f64).floor() as usize).min(len - 1))
}

fn out_of_range(k: usize, len: usize) -> EngineError {
    EngineError::Configuration(format!("frame {} out of range ({} frames)", k, len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meshing::PolarMesh;
    use crate::spectral::GatheredField;

    fn series(count: usize) -> TimeSeries {
        let mesh = PolarMesh::for_resolution(4, 3, 1.0);
        let mut series = TimeSeries::new("psi");
        for i in 0..count {
            series.push(
                i as u64,
                0.25 * i as f64,
                GatheredField {
                    name: "psi".to_string(),
                    mesh: mesh.clone(),
                    values: Grid::from_elem(mesh.shape(), i as f64),
                    quadrature: None,
                },
            );
        }
        series
    }

    #[test]
    fn test_normalized_index() {
        assert_eq!(normalized_index(0.0, 5).unwrap(), 0);
        assert_eq!(normalized_index(0.5, 5).unwrap(), 2);
        assert_eq!(normalized_index(0.6, 5).unwrap(), 2);
        assert_eq!(normalized_index(1.0, 5).unwrap(), 4);
        assert!(normalized_index(1.5, 5).is_err());
        assert!(normalized_index(0.5, 0).is_err());
    }

    #[test]
    fn test_memory_playback() {
        let playback = Playback::from_series(series(5));
        assert_eq!(playback.len(), 5);
        assert_eq!(playback.times(), vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        let frames = playback.at_normalized(&[0.0, 0.5, 1.0]).unwrap();
        let picked: Vec<f64> = frames.iter().map(|f| f.values[[0, 0]]).collect();
        assert_eq!(picked, vec![0.0, 2.0, 4.0]);
        assert_eq!(frames[1].r.len(), 3);
        assert_eq!(playback.frames().count(), 5);
        assert!(playback.frame(5).is_err());
    }
}

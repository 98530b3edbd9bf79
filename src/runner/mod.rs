// src/runner/mod.rs

//! The stepping loop of time-evolving runs and its two output policies.
//!
//! Both policies save the initial state and then every `save_every`
//! iterations. Local accumulation keeps the snapshots in a [`TimeSeries`];
//! streaming hands them to a [`SnapshotWriter`] and keeps nothing in memory.

use crate::checkpoint::{SetEntry, SnapshotWriter};
use crate::config::TimeConfig;
use crate::meshing::PolarMesh;
use crate::spectral::{GatheredField, TimeStepper};
use crate::{EngineError, Result};
use std::path::Path;
use tracing::info;

/// Iterations between progress log lines.
pub const PROGRESS_CADENCE: u64 = 100;

/// Snapshots of the observable in increasing simulation time.
#[derive(Debug, Clone, Default)]
pub struct TimeSeries {
    pub variable: String,
    pub iterations: Vec<u64>,
    pub times: Vec<f64>,
    pub fields: Vec<GatheredField>,
}

impl TimeSeries {
    pub fn new(variable: impl Into<String>) -> Self {
        TimeSeries {
            variable: variable.into(),
            ..TimeSeries::default()
        }
    }

    pub fn push(&mut self, iteration: u64, sim_time: f64, field: GatheredField) {
        self.iterations.push(iteration);
        self.times.push(sim_time);
        self.fields.push(field);
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn last(&self) -> Option<&GatheredField> {
        self.fields.last()
    }

    /// Mesh of the saved snapshots.
    pub fn mesh(&self) -> Option<&PolarMesh> {
        self.fields.first().map(|f| &f.mesh)
    }
}

/// What a streamed run left on disk.
#[derive(Debug, Clone)]
pub struct StreamSummary {
    pub sets: Vec<SetEntry>,
    pub mesh: Option<PolarMesh>,
    pub writes: usize,
    pub iterations: u64,
    pub final_sim_time: f64,
}

/// Steps until the stop condition and keeps every saved snapshot in memory.
///
/// A failure aborts the loop with [`EngineError::Interrupted`], which carries
/// whatever was accumulated before it.
pub fn accumulate(stepper: &mut dyn TimeStepper, time: &TimeConfig, variable: &str) -> Result<TimeSeries> {
    let mut series = TimeSeries::new(variable);
    let outcome = drive(stepper, time, |iteration, sim_time, field| {
        series.push(iteration, sim_time, field);
        Ok(())
    });
    match outcome {
        Ok(()) => Ok(series),
        Err(source) => Err(EngineError::Interrupted {
            iteration: stepper.iteration(),
            partial: Box::new(series),
            source: Box::new(source),
        }),
    }
}

/// Steps until the stop condition, writing every saved snapshot to
/// `<root>/<save_name>/`.
pub fn stream(
    stepper: &mut dyn TimeStepper,
    time: &TimeConfig,
    root: &Path,
    save_name: &str,
    variable: &str,
    max_writes: usize,
) -> Result<StreamSummary> {
    let mut writer = SnapshotWriter::create(root, save_name, variable, max_writes)?;
    drive(stepper, time, |iteration, sim_time, field| {
        writer.write(iteration, sim_time, &field)
    })?;
    let writes = writer.writes();
    let mesh = writer.mesh().cloned();
    Ok(StreamSummary {
        sets: writer.finish(),
        mesh,
        writes,
        iterations: stepper.iteration(),
        final_sim_time: stepper.sim_time(),
    })
}

fn drive<F>(stepper: &mut dyn TimeStepper, time: &TimeConfig, mut save: F) -> Result<()>
where
    F: FnMut(u64, f64, GatheredField) -> Result<()>,
{
    save(stepper.iteration(), stepper.sim_time(), stepper.gather(time.scales)?)?;
    while stepper.proceed() {
        stepper.step(time.timestep)?;
        let iteration = stepper.iteration();
        if iteration % PROGRESS_CADENCE == 0 {
            info!(
                "Iteration={}, Time={:e}, dt={:e}",
                iteration,
                stepper.sim_time(),
                time.timestep
            );
        }
        if iteration % time.save_every == 0 {
            save(iteration, stepper.sim_time(), stepper.gather(time.scales)?)?;
        }
    }
    info!(
        iterations = stepper.iteration(),
        sim_time = stepper.sim_time(),
        "stepping finished"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::SnapshotSet;
    use crate::kernel::Grid;
    use tempfile::tempdir;

    /// Counts steps; the gathered field is filled with the iteration number.
    struct Counter {
        iteration: u64,
        sim_time: f64,
        stop_iteration: u64,
        fail_at: Option<u64>,
    }

    impl Counter {
        fn new(stop_iteration: u64, fail_at: Option<u64>) -> Self {
            Counter {
                iteration: 0,
                sim_time: 0.0,
                stop_iteration,
                fail_at,
            }
        }
    }

    impl TimeStepper for Counter {
        fn step(&mut self, dt: f64) -> Result<()> {
            if self.fail_at == Some(self.iteration + 1) {
                return Err(EngineError::SolverFailed("step blew up".to_string()));
            }
            self.iteration += 1;
            self.sim_time += dt;
            Ok(())
        }

        fn proceed(&self) -> bool {
            self.iteration < self.stop_iteration
        }

        fn iteration(&self) -> u64 {
            self.iteration
        }

        fn sim_time(&self) -> f64 {
            self.sim_time
        }

        fn gather(&self, _scales: f64) -> Result<GatheredField> {
            let mesh = PolarMesh::for_resolution(4, 2, 1.0);
            Ok(GatheredField {
                name: "q".to_string(),
                values: Grid::from_elem(mesh.shape(), self.iteration as f64),
                mesh,
                quadrature: None,
            })
        }
    }

    #[test]
    fn test_local_cadence_includes_initial_state() {
        let time = TimeConfig::new(0.5, 100.0).with_save_every(3);
        let mut stepper = Counter::new(10, None);
        let series = accumulate(&mut stepper, &time, "q").unwrap();
        assert_eq!(series.iterations, vec![0, 3, 6, 9]);
        assert_eq!(series.times, vec![0.0, 1.5, 3.0, 4.5]);
        assert_eq!(series.last().unwrap().values[[0, 0]], 9.0);
        assert_eq!(series.variable, "q");
    }

    #[test]
    fn test_failure_keeps_partial_series() {
        let time = TimeConfig::new(1.0, 100.0).with_save_every(2);
        let mut stepper = Counter::new(10, Some(5));
        match accumulate(&mut stepper, &time, "q") {
            Err(EngineError::Interrupted {
                iteration,
                partial,
                source,
            }) => {
                assert_eq!(iteration, 4);
                assert_eq!(partial.iterations, vec![0, 2, 4]);
                assert!(matches!(*source, EngineError::SolverFailed(_)));
            }
            other => panic!("expected Interrupted, got {:?}", other.map(|s| s.len())),
        }
    }

    #[test]
    fn test_stream_writes_same_cadence() {
        let dir = tempdir().unwrap();
        let time = TimeConfig::new(1.0, 100.0).with_save_every(4);
        let mut stepper = Counter::new(9, None);
        let summary = stream(&mut stepper, &time, dir.path(), "counter", "q", 2).unwrap();
        assert_eq!(summary.writes, 3);
        assert_eq!(summary.iterations, 9);
        assert_eq!(summary.sets.len(), 2);
        let set = SnapshotSet::load(&dir.path().join("counter").join("counter_s1.jsonl")).unwrap();
        let saved: Vec<u64> = set.writes.iter().map(|w| w.iteration).collect();
        assert_eq!(saved, vec![0, 4]);
    }

    #[test]
    fn test_stream_propagates_failure() {
        let dir = tempdir().unwrap();
        let time = TimeConfig::new(1.0, 100.0);
        let mut stepper = Counter::new(10, Some(3));
        let err = stream(&mut stepper, &time, dir.path(), "counter", "q", 10).unwrap_err();
        assert!(matches!(err, EngineError::SolverFailed(_)));
    }
}

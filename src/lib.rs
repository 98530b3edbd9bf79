pub mod checkpoint;
pub mod compare;
pub mod config;
pub mod kernel;
pub mod meshing;
pub mod playback;
pub mod provenance;
pub mod reference;
pub mod runner;
pub mod solver;
pub mod spectral;
pub mod sweep;

// Re-exporting the types most callers need for easier access.
pub use config::{DomainConfig, ExperimentConfig, OutputPolicy, ProblemConfig, TimeConfig, Timestepper};
pub use kernel::{Grid, Matrix, Vector};
pub use meshing::PolarMesh;
pub use spectral::GatheredField;

use checkpoint::{default_save_name, RunState};
use chrono::Local;
use provenance::ProvenanceChain;
use runner::TimeSeries;
use solver::{ProblemFamily, ProblemKind};
use spectral::DiskBasis;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

// --- Return Types and Errors ---

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Problem '{problem}' has no {field} field registered")]
    MissingField { problem: String, field: String },
    #[error("Plugin not found: {0}")]
    PluginNotFound(String),
    #[error("Solver failed: {0}")]
    SolverFailed(String),
    #[error("Shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },
    #[error("Resumption failed: {0}")]
    Resumption(String),
    #[error("Fit failed: {0}")]
    Fit(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// A time-evolving run stopped early. `partial` holds the snapshots
    /// accumulated before the failure.
    #[error("Run interrupted at iteration {iteration}: {source}")]
    Interrupted {
        iteration: u64,
        partial: Box<TimeSeries>,
        source: Box<EngineError>,
    },
}

pub type Result<T> = std::result::Result<T, EngineError>;

// --- Family Registry ---

/// Equation families available to the engine, looked up by name.
pub struct FamilyRegistry {
    families: Vec<Box<dyn ProblemFamily>>,
}

impl FamilyRegistry {
    /// A registry holding the built-in families.
    pub fn new() -> Self {
        FamilyRegistry {
            families: vec![
                Box::new(solver::HelmholtzFamily),
                Box::new(solver::AdvectionFamily),
                Box::new(solver::VorticityFamily),
            ],
        }
    }

    pub fn empty() -> Self {
        FamilyRegistry {
            families: Vec::new(),
        }
    }

    /// Adds a family, replacing any family registered under the same name.
    pub fn register(&mut self, family: Box<dyn ProblemFamily>) {
        self.families.retain(|f| f.name() != family.name());
        self.families.push(family);
    }

    pub fn get(&self, name: &str) -> Result<&dyn ProblemFamily> {
        self.families
            .iter()
            .find(|f| f.name() == name)
            .map(|f| f.as_ref())
            .ok_or_else(|| EngineError::PluginNotFound(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.families.iter().map(|f| f.name()).collect()
    }
}

impl Default for FamilyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FamilyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

// --- Run Results ---

/// Where the engine is within the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Uninitialized,
    SpaceBuilt,
    ProblemBuilt,
    Solving,
    Stepping,
    Solved,
}

/// What a run produced. Exactly one variant per run, fixed by the family and
/// the output policy.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Steady(GatheredField),
    Accumulated(TimeSeries),
    /// The run record saved next to the snapshot sets.
    Streamed(RunState),
}

#[derive(Debug, Clone)]
pub struct RunResult {
    pub config: ExperimentConfig,
    /// Mesh at the solve resolution.
    pub mesh: PolarMesh,
    pub observable: String,
    pub outcome: RunOutcome,
    /// Wall time of the solve or of the stepping loop alone.
    pub elapsed: Duration,
    pub provenance: ProvenanceChain,
}

impl RunResult {
    /// The steady solution, or the last snapshot of a locally accumulated run.
    pub fn final_field(&self) -> Option<&GatheredField> {
        match &self.outcome {
            RunOutcome::Steady(field) => Some(field),
            RunOutcome::Accumulated(series) => series.last(),
            RunOutcome::Streamed(_) => None,
        }
    }

    pub fn series(&self) -> Option<&TimeSeries> {
        match &self.outcome {
            RunOutcome::Accumulated(series) => Some(series),
            _ => None,
        }
    }

    pub fn run_state(&self) -> Option<&RunState> {
        match &self.outcome {
            RunOutcome::Streamed(state) => Some(state),
            _ => None,
        }
    }
}

// --- Core Engine Facade ---

pub struct Engine {
    registry: FamilyRegistry,
    provenance: ProvenanceChain,
    phase: RunPhase,
}

impl Engine {
    pub fn new() -> Self {
        Self::with_registry(FamilyRegistry::new())
    }

    pub fn with_registry(registry: FamilyRegistry) -> Self {
        Engine {
            registry,
            provenance: ProvenanceChain::new(),
            phase: RunPhase::Uninitialized,
        }
    }

    pub fn registry(&self) -> &FamilyRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut FamilyRegistry {
        &mut self.registry
    }

    /// Phase reached by the latest run. A failed run leaves the phase it
    /// failed in.
    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// The main entry point for running an experiment.
    ///
    /// Builds the space and the problem from scratch, then either solves once
    /// or steps until the stop condition under the configured output policy.
    pub fn run(&mut self, config: &ExperimentConfig) -> Result<RunResult> {
        self.phase = RunPhase::Uninitialized;
        // Records of an earlier failed run do not belong to this one.
        self.provenance.drain();
        config.validate()?;
        let family_name = config.problem.family();
        info!(
            family = family_name,
            nphi = config.domain.nphi,
            nr = config.domain.nr,
            "run started"
        );

        // 1. Build the space
        let basis = Arc::new(DiskBasis::new(&config.domain)?);
        let mesh = meshing::build_mesh(&config.domain);
        self.record(
            "mesh_generation",
            &serde_json::to_vec(&mesh)?,
            serde_json::json!({
                "nphi": config.domain.nphi,
                "nr": config.domain.nr,
                "radius": config.domain.radius,
                "dealias": config.domain.dealias,
            }),
        )?;
        self.phase = RunPhase::SpaceBuilt;

        // 2. Assemble the problem
        let family = self.registry.get(family_name)?;
        let handle = family.build_problem(basis, config)?;
        self.record(
            "problem_assembly",
            &serde_json::to_vec(config)?,
            serde_json::json!({ "family": family_name, "observable": handle.observable }),
        )?;
        self.phase = RunPhase::ProblemBuilt;
        debug!(?handle, "problem assembled");

        // 3. Solve or step
        let observable = handle.observable;
        let start = Instant::now();
        let (outcome, data) = match handle.kind {
            ProblemKind::Steady(mut solver) => {
                self.phase = RunPhase::Solving;
                let field = solver.solve()?;
                if !field.is_finite() {
                    return Err(EngineError::SolverFailed(format!(
                        "{} solution is not finite",
                        family_name
                    )));
                }
                let data = grid_bytes(&field.values);
                (RunOutcome::Steady(field), data)
            }
            ProblemKind::Evolving(mut stepper) => {
                let time = config.require_time()?;
                self.phase = RunPhase::Stepping;
                match &time.output {
                    OutputPolicy::Local => {
                        let series = runner::accumulate(stepper.as_mut(), time, &observable)?;
                        let data = series.last().map(|f| grid_bytes(&f.values)).unwrap_or_default();
                        (RunOutcome::Accumulated(series), data)
                    }
                    OutputPolicy::Streamed {
                        root,
                        save_name,
                        max_writes,
                    } => {
                        let save_name = save_name
                            .clone()
                            .unwrap_or_else(|| default_save_name(family_name));
                        let started_at = Local::now();
                        let summary = runner::stream(
                            stepper.as_mut(),
                            time,
                            root,
                            &save_name,
                            &observable,
                            *max_writes,
                        )?;
                        let data: Vec<u8> = summary
                            .sets
                            .iter()
                            .flat_map(|set| set.sha256.bytes())
                            .collect();
                        let state = RunState {
                            save_name,
                            config: config.clone(),
                            variable: observable.clone(),
                            mesh: summary.mesh.unwrap_or_else(|| mesh.clone()),
                            started_at,
                            finished_at: Some(Local::now()),
                            resumable: true,
                            iterations: summary.iterations,
                            final_sim_time: summary.final_sim_time,
                            sets: summary.sets,
                            provenance: ProvenanceChain::new(),
                        };
                        (RunOutcome::Streamed(state), data)
                    }
                }
            }
        };
        let elapsed = start.elapsed();

        self.record(
            "solver_run",
            &data,
            serde_json::json!({ "family": family_name, "elapsed_s": elapsed.as_secs_f64() }),
        )?;
        let outcome = match outcome {
            RunOutcome::Streamed(mut state) => {
                if let OutputPolicy::Streamed { root, .. } = &config.require_time()?.output {
                    state.provenance = self.provenance.clone();
                    let path = state.save(root)?;
                    info!(path = %path.display(), writes = state.total_writes(), "run record saved");
                }
                RunOutcome::Streamed(state)
            }
            other => other,
        };
        self.phase = RunPhase::Solved;
        info!(
            family = family_name,
            elapsed = elapsed.as_secs_f64(),
            "run finished"
        );

        Ok(RunResult {
            config: config.clone(),
            mesh,
            observable,
            outcome,
            elapsed,
            provenance: self.provenance.drain(),
        })
    }

    fn record(&mut self, event_type: &str, data: &[u8], metadata: serde_json::Value) -> Result<()> {
        self.provenance.add_record(event_type, data, metadata)?;
        debug!(event_type, records = self.provenance.len(), "provenance recorded");
        Ok(())
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

fn grid_bytes(values: &Grid) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

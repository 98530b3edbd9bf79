// src/config/mod.rs

//! Experiment configuration.
//!
//! A configuration is an immutable value for the duration of a run. Resolution
//! changes between runs are made by deriving a new value with the `with_*`
//! methods, never by mutating one that a run is using.

use crate::reference::Profile;
use crate::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default number of snapshots held by one snapshot set file.
pub const DEFAULT_MAX_WRITES: usize = 100;

/// Resolution and geometry of the disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainConfig {
    /// Azimuthal resolution, must be even.
    pub nphi: usize,
    /// Radial resolution.
    pub nr: usize,
    /// Disk radius.
    pub radius: f64,
    /// Oversampling factor for nonlinear products.
    pub dealias: f64,
}

impl DomainConfig {
    pub fn new(nphi: usize, nr: usize) -> Self {
        DomainConfig {
            nphi,
            nr,
            radius: 1.0,
            dealias: 1.0,
        }
    }

    pub fn with_radius(mut self, radius: f64) -> Self {
        self.radius = radius;
        self
    }

    pub fn with_dealias(mut self, dealias: f64) -> Self {
        self.dealias = dealias;
        self
    }

    pub fn with_resolution(mut self, nphi: usize, nr: usize) -> Self {
        self.nphi = nphi;
        self.nr = nr;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.nphi < 2 || self.nphi % 2 != 0 {
            return Err(EngineError::Configuration(format!(
                "azimuthal resolution must be even and at least 2, got {}",
                self.nphi
            )));
        }
        if self.nr < 2 {
            return Err(EngineError::Configuration(format!(
                "radial resolution must be at least 2, got {}",
                self.nr
            )));
        }
        if !(self.radius.is_finite() && self.radius > 0.0) {
            return Err(EngineError::Configuration(format!(
                "domain radius must be positive and finite, got {}",
                self.radius
            )));
        }
        if !(self.dealias.is_finite() && self.dealias >= 1.0) {
            return Err(EngineError::Configuration(format!(
                "dealias factor must be at least 1, got {}",
                self.dealias
            )));
        }
        Ok(())
    }
}

/// IMEX multistep scheme: linear terms implicit, the rest explicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Timestepper {
    Sbdf1,
    #[default]
    Sbdf2,
    Sbdf3,
}

/// Where a time-evolving run puts its snapshots. Chosen once per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputPolicy {
    /// Snapshots accumulate in memory and nothing is written to disk.
    Local,
    /// Snapshots stream to `<root>/<save_name>/` together with a resumable run record.
    Streamed {
        root: PathBuf,
        save_name: Option<String>,
        max_writes: usize,
    },
}

impl OutputPolicy {
    pub fn streamed(root: impl Into<PathBuf>) -> Self {
        OutputPolicy::Streamed {
            root: root.into(),
            save_name: None,
            max_writes: DEFAULT_MAX_WRITES,
        }
    }

    pub fn with_save_name(self, name: impl Into<String>) -> Self {
        match self {
            OutputPolicy::Streamed {
                root, max_writes, ..
            } => OutputPolicy::Streamed {
                root,
                save_name: Some(name.into()),
                max_writes,
            },
            OutputPolicy::Local => OutputPolicy::Local,
        }
    }

    pub fn with_max_writes(self, writes: usize) -> Self {
        match self {
            OutputPolicy::Streamed {
                root, save_name, ..
            } => OutputPolicy::Streamed {
                root,
                save_name,
                max_writes: writes,
            },
            OutputPolicy::Local => OutputPolicy::Local,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, OutputPolicy::Local)
    }
}

/// Stepping parameters of a time-evolving run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeConfig {
    pub timestep: f64,
    pub stop_sim_time: f64,
    pub stop_iteration: Option<u64>,
    /// Snapshot cadence in iterations.
    pub save_every: u64,
    /// Output resolution relative to the solve resolution.
    pub scales: f64,
    pub timestepper: Timestepper,
    pub output: OutputPolicy,
}

impl TimeConfig {
    pub fn new(timestep: f64, stop_sim_time: f64) -> Self {
        TimeConfig {
            timestep,
            stop_sim_time,
            stop_iteration: None,
            save_every: 1,
            scales: 1.0,
            timestepper: Timestepper::default(),
            output: OutputPolicy::Local,
        }
    }

    pub fn with_stop_iteration(mut self, iterations: u64) -> Self {
        self.stop_iteration = Some(iterations);
        self
    }

    pub fn with_save_every(mut self, iterations: u64) -> Self {
        self.save_every = iterations;
        self
    }

    pub fn with_scales(mut self, scales: f64) -> Self {
        self.scales = scales;
        self
    }

    pub fn with_timestepper(mut self, timestepper: Timestepper) -> Self {
        self.timestepper = timestepper;
        self
    }

    pub fn with_output(mut self, output: OutputPolicy) -> Self {
        self.output = output;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.timestep.is_finite() && self.timestep > 0.0) {
            return Err(EngineError::Configuration(format!(
                "timestep must be positive, got {}",
                self.timestep
            )));
        }
        if self.stop_sim_time.is_nan() {
            return Err(EngineError::Configuration(
                "stop time must not be NaN".to_string(),
            ));
        }
        if self.save_every == 0 {
            return Err(EngineError::Configuration(
                "snapshot cadence must be at least one iteration".to_string(),
            ));
        }
        if !(self.scales.is_finite() && self.scales > 0.0) {
            return Err(EngineError::Configuration(format!(
                "output scales must be positive, got {}",
                self.scales
            )));
        }
        if let OutputPolicy::Streamed {
            save_name,
            max_writes,
            ..
        } = &self.output
        {
            if *max_writes == 0 {
                return Err(EngineError::Configuration(
                    "snapshot sets must hold at least one write".to_string(),
                ));
            }
            if let Some(name) = save_name {
                if name.is_empty() || name.contains(['/', '\\']) {
                    return Err(EngineError::Configuration(format!(
                        "invalid save name {:?}",
                        name
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Steady `lap(u) - u / Ld^2 = q` with `u = 0` at the edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelmholtzParams {
    /// Deformation radius `Ld`; `None` is infinite (plain Poisson).
    pub deformation_radius: Option<f64>,
    pub forcing: Profile,
}

impl HelmholtzParams {
    pub fn new(deformation_radius: Option<f64>, forcing: Profile) -> Self {
        HelmholtzParams {
            deformation_radius,
            forcing,
        }
    }

    /// `1 / Ld^2`, zero for an infinite deformation radius.
    pub fn damping(&self) -> f64 {
        inverse_square(self.deformation_radius)
    }
}

/// Rigid rotation `dt(psi) = -u . grad(psi)` with `u = r e_phi`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvectionParams {
    pub initial: Profile,
}

/// Wind-driven barotropic vorticity (Stommel–Munk) on the disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VorticityParams {
    /// Bottom friction coefficient.
    pub r0: f64,
    /// Wind stress amplitude `F`.
    pub wind_stress: f64,
    /// Layer depth `H`.
    pub depth: f64,
    /// Planetary vorticity gradient.
    pub beta: f64,
    /// Lateral viscosity.
    pub nu: f64,
    /// Reference density.
    pub rho0: f64,
    /// Offset of the wind pattern as a fraction of the radius.
    pub q_shift: f64,
    pub initial_vorticity: Profile,
    pub initial_time: f64,
}

impl Default for VorticityParams {
    fn default() -> Self {
        VorticityParams {
            r0: 2e-7,
            wind_stress: 0.1,
            depth: 500.0,
            beta: 2e-11,
            nu: 80.0,
            rho0: 1000.0,
            q_shift: 0.01,
            initial_vorticity: Profile::Zero,
            initial_time: 0.0,
        }
    }
}

/// Equation family and its declared parameters, selected by tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum ProblemConfig {
    Helmholtz(HelmholtzParams),
    Advection(AdvectionParams),
    Vorticity(VorticityParams),
    /// A family registered by the caller.
    Custom {
        name: String,
        params: serde_json::Value,
    },
}

impl ProblemConfig {
    /// Registry name of the equation family.
    pub fn family(&self) -> &str {
        match self {
            ProblemConfig::Helmholtz(_) => "helmholtz",
            ProblemConfig::Advection(_) => "advection",
            ProblemConfig::Vorticity(_) => "vorticity",
            ProblemConfig::Custom { name, .. } => name,
        }
    }
}

/// Everything a run needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub domain: DomainConfig,
    pub problem: ProblemConfig,
    pub time: Option<TimeConfig>,
}

impl ExperimentConfig {
    pub fn new(domain: DomainConfig, problem: ProblemConfig) -> Self {
        ExperimentConfig {
            domain,
            problem,
            time: None,
        }
    }

    pub fn with_time(mut self, time: TimeConfig) -> Self {
        self.time = Some(time);
        self
    }

    /// Copy with a different radial resolution.
    pub fn with_nr(&self, nr: usize) -> Self {
        let mut config = self.clone();
        config.domain.nr = nr;
        config
    }

    /// Copy with a different azimuthal resolution.
    pub fn with_nphi(&self, nphi: usize) -> Self {
        let mut config = self.clone();
        config.domain.nphi = nphi;
        config
    }

    pub fn validate(&self) -> Result<()> {
        self.domain.validate()?;
        if let Some(time) = &self.time {
            time.validate()?;
        }
        Ok(())
    }

    /// Time configuration, required by time-evolving families.
    pub fn require_time(&self) -> Result<&TimeConfig> {
        self.time.as_ref().ok_or_else(|| {
            EngineError::Configuration(format!(
                "family '{}' is time-evolving and needs a time configuration",
                self.problem.family()
            ))
        })
    }
}

pub(crate) fn inverse_square(length: Option<f64>) -> f64 {
    match length {
        Some(l) if l.is_finite() => 1.0 / (l * l),
        _ => 0.0,
    }
}

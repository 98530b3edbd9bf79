// demos/convergence.rs

//! Spectral convergence of the Gaussian Helmholtz solve in both resolutions,
//! with log-linear fits over the part of each series above the round-off
//! plateau.
//!
//! Timings are only comparable single-threaded:
//! `OMP_NUM_THREADS=1 NUMEXPR_NUM_THREADS=1 cargo run --example convergence`.

mod logging;

use disk_engine::config::HelmholtzParams;
use disk_engine::reference::Profile;
use disk_engine::sweep::ConvergenceSweep;
use disk_engine::{DomainConfig, Engine, ExperimentConfig, ProblemConfig};
use tracing::info;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init()?;

    let deformation_radius = Some(1.0);
    let template = ExperimentConfig::new(
        DomainConfig::new(16, 16),
        ProblemConfig::Helmholtz(HelmholtzParams::new(
            deformation_radius,
            Profile::GaussianSource { deformation_radius },
        )),
    );
    let sweep = ConvergenceSweep::new(
        (2..=12).map(|n| 2 * n).collect(),
        (1..=8).map(|n| 4 * n).collect(),
    );

    let mut engine = Engine::new();
    let study = sweep.run(&mut engine, &template, &Profile::Gaussian)?;
    println!("{}", study);

    // Radial errors hit round-off past nr = 8.
    let radial = study.radial.fit(4)?;
    info!(fit = %radial, "radial convergence");
    // The Gaussian is axisymmetric, the azimuthal series is flat.
    match study.azimuthal.fit(study.azimuthal.len()) {
        Ok(fit) => info!(fit = %fit, "azimuthal convergence"),
        Err(e) => info!(error = %e, "azimuthal series not fitted"),
    }
    Ok(())
}

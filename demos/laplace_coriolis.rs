// demos/laplace_coriolis.rs

//! Steady Helmholtz solves on the unit disk checked against their exact
//! solutions: a Gaussian bump with a finite deformation radius and a Bessel
//! mode with an infinite one.
//!
//! Run single-threaded for repeatable timings, e.g.
//! `OMP_NUM_THREADS=1 NUMEXPR_NUM_THREADS=1 cargo run --example laplace_coriolis`.

mod logging;

use disk_engine::compare::compare;
use disk_engine::config::HelmholtzParams;
use disk_engine::reference::Profile;
use disk_engine::{DomainConfig, Engine, ExperimentConfig, ProblemConfig};
use tracing::info;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init()?;

    let deformation_radius = Some(1.0);
    let cases = [
        (
            "gaussian",
            ExperimentConfig::new(
                DomainConfig::new(8, 16),
                ProblemConfig::Helmholtz(HelmholtzParams::new(
                    deformation_radius,
                    Profile::GaussianSource { deformation_radius },
                )),
            ),
            Profile::Gaussian,
        ),
        (
            "bessel",
            ExperimentConfig::new(
                DomainConfig::new(16, 24),
                ProblemConfig::Helmholtz(HelmholtzParams::new(
                    None,
                    Profile::BesselSource {
                        order: 3,
                        amplitude: 1.0,
                        deformation_radius: None,
                    },
                )),
            ),
            Profile::BesselMode {
                order: 3,
                amplitude: 1.0,
            },
        ),
    ];

    let mut engine = Engine::new();
    for (label, config, exact) in &cases {
        let result = engine.run(config)?;
        let field = result
            .final_field()
            .ok_or("steady run produced no field")?;
        let comparison = compare(field, exact)?;
        info!(
            case = *label,
            nphi = config.domain.nphi,
            nr = config.domain.nr,
            weighted_error = comparison.weighted_error,
            integral_error = comparison.integral_error.unwrap_or(f64::NAN),
            elapsed = result.elapsed.as_secs_f64(),
            "solved"
        );
    }
    Ok(())
}

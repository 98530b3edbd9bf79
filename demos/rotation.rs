// demos/rotation.rs

//! Rigid rotation of a Bessel mode streamed to disk, then played back from the
//! output folder as a later process would.
//!
//! Usage: `cargo run --example rotation [output-root]`. Set
//! `OMP_NUM_THREADS=1` and `NUMEXPR_NUM_THREADS=1` for single-threaded runs.

mod logging;

use disk_engine::compare::compare;
use disk_engine::config::AdvectionParams;
use disk_engine::playback::Playback;
use disk_engine::reference::Profile;
use disk_engine::spectral::GatheredField;
use disk_engine::{
    DomainConfig, Engine, ExperimentConfig, OutputPolicy, PolarMesh, ProblemConfig, TimeConfig, Timestepper,
};
use std::f64::consts::PI;
use std::path::PathBuf;
use tracing::info;

const SAVE_NAME: &str = "rotation";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init()?;

    let root = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("disk-engine"));

    let initial = Profile::BesselMode {
        order: 3,
        amplitude: 1.0,
    };
    let config = ExperimentConfig::new(
        DomainConfig::new(32, 16),
        ProblemConfig::Advection(AdvectionParams {
            initial: initial.clone(),
        }),
    )
    .with_time(
        TimeConfig::new(1e-3, 2.0 * PI)
            .with_save_every(100)
            .with_scales(1.5)
            .with_timestepper(Timestepper::Sbdf3)
            .with_output(OutputPolicy::streamed(&root).with_save_name(SAVE_NAME)),
    );

    let result = Engine::new().run(&config)?;
    info!(
        folder = %root.join(SAVE_NAME).display(),
        elapsed = result.elapsed.as_secs_f64(),
        "rotation streamed"
    );

    let playback = Playback::resume(&root, SAVE_NAME)?;
    for frame in playback.at_normalized(&[0.0, 0.25, 0.5, 0.75, 1.0])? {
        let mesh = PolarMesh {
            phi: frame.phi,
            r: frame.r,
            radius: config.domain.radius,
        };
        let field = GatheredField {
            name: "psi".to_string(),
            mesh,
            values: frame.values,
            quadrature: None,
        };
        let comparison = compare(&field, &initial.clone().rotated(frame.time))?;
        info!(
            time = frame.time,
            weighted_error = comparison.weighted_error,
            "frame"
        );
    }
    Ok(())
}

// demos/stommel.rs

//! Wind-driven Stommel–Munk gyre on a disk of radius 2000 km, kept in memory.
//!
//! The western boundary current builds up over a few weeks of simulated time.
//! Run with `OMP_NUM_THREADS=1 NUMEXPR_NUM_THREADS=1` to keep any threaded
//! linear algebra single-threaded.

mod logging;

use disk_engine::config::VorticityParams;
use disk_engine::playback::Playback;
use disk_engine::{DomainConfig, Engine, ExperimentConfig, ProblemConfig, TimeConfig, Timestepper};
use tracing::info;

const DAY: f64 = 86400.0;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init()?;

    let config = ExperimentConfig::new(
        DomainConfig::new(64, 48).with_radius(2e6).with_dealias(1.5),
        ProblemConfig::Vorticity(VorticityParams::default()),
    )
    .with_time(
        TimeConfig::new(3600.0, 30.0 * DAY)
            .with_save_every(24)
            .with_timestepper(Timestepper::Sbdf2),
    );

    let result = Engine::new().run(&config)?;
    let playback = Playback::from_result(&result)?;
    info!(
        snapshots = playback.len(),
        elapsed = result.elapsed.as_secs_f64(),
        "gyre spin-up finished"
    );

    for frame in playback.frames() {
        let frame = frame?;
        let extreme = frame.values.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
        info!(day = frame.time / DAY, max_abs_psi = extreme, "snapshot");
    }
    Ok(())
}

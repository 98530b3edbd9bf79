// demos/logging.rs

//! Console logging shared by the demos.

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Installs the INFO-level console subscriber. Fails instead of panicking when
/// a global subscriber is already set.
pub fn init() -> Result<(), String> {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .try_init()
        .map_err(|e| format!("logging unavailable: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_an_error() {
        assert!(init().is_ok());
        assert!(init().is_err());
    }
}

use crate::infrastructure::config::ENV_LOG;
use tracing_subscriber::EnvFilter;

/// Installs the global fmt subscriber. `SONICFLOW_LOG` takes precedence over
/// `default_level`. Returns false when a subscriber was already installed.
pub fn init_tracing(default_level: &str) -> bool {
    let filter = EnvFilter::try_from_env(ENV_LOG).unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}

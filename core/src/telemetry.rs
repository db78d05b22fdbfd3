// Logging setup shared by the binaries
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Default directives when `RUST_LOG` is unset
pub const DEFAULT_LOG_DIRECTIVES: &str = "info,tutor_core=info";

/// Install a fmt subscriber filtered by `RUST_LOG` (falling back to
/// `default_directives`).
///
/// Returns false if a global subscriber was already set, which is normal in
/// tests that initialize logging more than once.
pub fn init_logging(default_directives: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok();

    if installed {
        info!(target: "telemetry", "Logging initialized");
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_harmless() {
        init_logging("debug");
        assert!(!init_logging("debug"));
    }
}

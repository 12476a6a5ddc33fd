//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber writing to stderr.
///
/// `RUST_LOG` wins when set; otherwise `default_level` is used (e.g. `"warn"`).
/// Calling this more than once is harmless: later calls are ignored.
pub fn tracing_subscribe_boilerplate(default_level: impl Into<String>) {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level.into()));
        let installed = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .try_init();
        if let Err(e) = installed {
                tracing::debug!("tracing subscriber already installed: {}", e);
        }
}

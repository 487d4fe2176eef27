pub mod metrics;

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. `RUST_LOG` takes precedence over the
/// level given on the command line.
pub fn setup_logging(default_level: &str) -> anyhow::Result<()> {
	let filter = match EnvFilter::try_from_default_env() {
		Ok(f) => f,
		Err(_) => EnvFilter::try_new(default_level)?,
	};
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_target(true)
		.init();
	Ok(())
}

// Logging setup

use tracing::error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

use crate::LOG_TARGET;
use crate::config::{RegistryConfig, Verbosity};

/// Filter directives for a configured verbosity. Dependencies only report errors.
pub fn directives(verbosity: Verbosity) -> String {
	format!("error,{}={}", LOG_TARGET, verbosity.as_str())
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured verbosity when it is set.
pub fn init(config: &RegistryConfig) -> Result<(), TryInitError> {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives(config.verbosity)));
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_target(false)
		.finish()
		.try_init()?;

	if let Some(bad) = &config.rejected_verbosity {
		error!(
			target: LOG_TARGET,
			"Configuration error. '{}' is an invalid value for verbosity, '{}' used instead",
			bad,
			config.verbosity.as_str()
		);
	}
	Ok(())
}

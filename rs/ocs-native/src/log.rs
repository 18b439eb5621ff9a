use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Logging configuration, shared by every binary.
#[serde_as]
#[derive(Parser, Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct Log {
	/// The level to log at, unless overridden by RUST_LOG.
	#[arg(id = "log-level", long = "log-level", env = "OCS_LOG_LEVEL", default_value_t = Level::INFO)]
	#[serde_as(as = "DisplayFromStr")]
	pub level: Level,
}

impl Default for Log {
	fn default() -> Self {
		Self { level: Level::INFO }
	}
}

impl Log {
	pub fn level(&self) -> Level {
		self.level
	}

	/// Install the global subscriber, writing to stderr.
	///
	/// Does nothing if a subscriber was already installed.
	pub fn init(&self) {
		let filter = EnvFilter::builder()
			.with_default_directive(self.level().into())
			.from_env_lossy();

		let installed = tracing_subscriber::fmt()
			.with_writer(std::io::stderr)
			.with_env_filter(filter)
			.try_init()
			.is_ok();

		if !installed {
			tracing::debug!("subscriber already installed");
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_args() {
		let log = Log::try_parse_from(["test", "--log-level", "debug"]).unwrap();
		assert_eq!(log.level(), Level::DEBUG);

		let log = Log::try_parse_from(["test"]).unwrap();
		assert_eq!(log.level(), Level::INFO);
	}

	#[test]
	fn test_serde() {
		let log: Log = serde_json::from_str(r#"{"level":"warn"}"#).unwrap();
		assert_eq!(log.level, Level::WARN);

		let log: Log = serde_json::from_str("{}").unwrap();
		assert_eq!(log.level, Level::INFO);
	}

	#[test]
	fn test_init_twice() {
		Log::default().init();
		Log::default().init();
	}
}

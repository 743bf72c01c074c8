//! Logging prelude module for convenient access to tracing macros.
//!
//! ```ignore
//! use crate::logging::*;
//!
//! info!("Hosting {} on {}", dir.display(), addr);
//! warn!("Fetching {} failed: {}", name, err);
//! ```

pub use tracing::{debug, error, info, warn};

/// Initialize the tracing subscriber with environment filter support.
///
/// Falls back to `default_level` when `RUST_LOG` is unset or invalid:
///
/// ```bash
/// RUST_LOG=debug gitlane serve ./notes
/// RUST_LOG=gitlane::server=debug,gitlane::peer=trace gitlane fetch 192.168.1.20
/// ```
pub fn init_tracing(default_level: &str) {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
		)
		.with_writer(std::io::stderr)
		.init();
}

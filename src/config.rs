//! Configuration for gitlane
//!
//! The configuration follows a priority chain:
//! 1. Built-in defaults (Config::default())
//! 2. Config file (~/.gitlane/config.toml)
//! 3. Environment variables (GITLANE_* prefix)
//! 4. CLI flags (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::GitlaneError;

/// Default TCP port for the peer server
pub const DEFAULT_PORT: u16 = 7821;

/// Maximum number of commits walked for a single pack
pub const DEFAULT_HISTORY_DEPTH: usize = 1000;

/// Name of the durable push queue file inside the state directory
pub const PUSH_QUEUE_FILE: &str = "gitlane_push_queue.json";

// ============================================================================
// MAIN CONFIGURATION STRUCT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
	/// Home directory for gitlane state (~/.gitlane)
	pub state_dir: PathBuf,

	/// Log level used when RUST_LOG is not set
	pub log_level: String,

	/// Hosting side (Wire Framer + Route Dispatcher)
	pub server: ServerConfig,

	/// Outbound peer calls
	pub peer: PeerConfig,

	/// Offline push queue
	pub queue: QueueConfig,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			state_dir: std::env::var("HOME")
				.ok()
				.map(|h| PathBuf::from(h).join(".gitlane"))
				.unwrap_or_else(|| PathBuf::from(".gitlane")),
			log_level: "info".to_string(),
			server: ServerConfig::default(),
			peer: PeerConfig::default(),
			queue: QueueConfig::default(),
		}
	}
}

impl Config {
	/// Parse a TOML config file, filling unspecified fields with defaults
	pub fn from_file(path: &Path) -> Result<Self, GitlaneError> {
		let contents = std::fs::read_to_string(path)?;
		toml::from_str(&contents).map_err(|e| GitlaneError::InvalidConfig {
			message: format!("{}: {}", path.display(), e),
		})
	}

	/// Defaults, then `<state_dir>/config.toml` if present, then environment
	pub fn load() -> Result<Self, GitlaneError> {
		Config::load_with(|key| std::env::var(key).ok())
	}

	/// `load` with an explicit environment lookup
	///
	/// `GITLANE_STATE_DIR` picks the directory `config.toml` is read from.
	pub fn load_with<F>(lookup: F) -> Result<Self, GitlaneError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let defaults = Config::default();
		let state_dir = lookup("GITLANE_STATE_DIR").map(PathBuf::from).unwrap_or_else(|| defaults.state_dir.clone());
		let path = state_dir.join("config.toml");
		let mut config = if path.exists() { Config::from_file(&path)? } else { defaults };
		config.apply_env(&lookup)?;
		config.validate()?;
		Ok(config)
	}

	/// Apply GITLANE_* overrides from the given lookup
	pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), GitlaneError>
	where
		F: Fn(&str) -> Option<String>,
	{
		if let Some(dir) = lookup("GITLANE_STATE_DIR") {
			self.state_dir = PathBuf::from(dir);
		}
		if let Some(port) = lookup("GITLANE_PORT") {
			self.server.port = port.parse().map_err(|_| GitlaneError::InvalidConfig {
				message: format!("GITLANE_PORT is not a port number: {}", port),
			})?;
		}
		if let Some(secs) = lookup("GITLANE_PEER_TIMEOUT") {
			self.peer.timeout_secs = secs.parse().map_err(|_| GitlaneError::InvalidConfig {
				message: format!("GITLANE_PEER_TIMEOUT is not a number: {}", secs),
			})?;
		}
		if let Some(level) = lookup("GITLANE_LOG") {
			self.log_level = level;
		}
		Ok(())
	}

	pub fn validate(&self) -> Result<(), GitlaneError> {
		validate_timeout_secs("peer.timeoutSecs", self.peer.timeout_secs)?;
		validate_timeout_secs("server.readTimeoutSecs", self.server.read_timeout_secs)?;
		if self.server.max_history_depth == 0 || self.peer.max_history_depth == 0 {
			return Err(GitlaneError::InvalidConfig {
				message: "history depth must be greater than 0".to_string(),
			});
		}
		if self.server.max_request_bytes == 0 {
			return Err(GitlaneError::InvalidConfig {
				message: "server.maxRequestBytes must be greater than 0".to_string(),
			});
		}
		Ok(())
	}

	/// Location of the durable push queue
	pub fn queue_path(&self) -> PathBuf {
		self.state_dir.join(&self.queue.file_name)
	}
}

fn validate_timeout_secs(name: &str, secs: u64) -> Result<(), GitlaneError> {
	if secs == 0 {
		return Err(GitlaneError::InvalidConfig {
			message: format!("{} must be greater than 0", name),
		});
	}
	if secs > 3600 {
		return Err(GitlaneError::InvalidConfig {
			message: format!("{} too large: {} seconds (max 3600)", name, secs),
		});
	}
	Ok(())
}

// ============================================================================
// NESTED CONFIGURATION STRUCTS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
	/// Address to bind (0.0.0.0 to accept LAN peers)
	pub bind_address: String,

	/// TCP port (0 picks an ephemeral port)
	pub port: u16,

	/// Drop a connection whose request is not complete within this many seconds
	pub read_timeout_secs: u64,

	/// Maximum size of a single request, headers plus body
	pub max_request_bytes: usize,

	/// Commits walked for GET /api/pack
	pub max_history_depth: usize,
}

impl Default for ServerConfig {
	fn default() -> Self {
		ServerConfig {
			bind_address: "0.0.0.0".to_string(),
			port: DEFAULT_PORT,
			read_timeout_secs: 10,
			max_request_bytes: 256 * 1024 * 1024,
			max_history_depth: DEFAULT_HISTORY_DEPTH,
		}
	}
}

impl ServerConfig {
	pub fn read_timeout(&self) -> Duration {
		Duration::from_secs(self.read_timeout_secs)
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PeerConfig {
	/// Bound applied to every outbound request
	pub timeout_secs: u64,

	/// Commits walked when building a pack for push
	pub max_history_depth: usize,
}

impl Default for PeerConfig {
	fn default() -> Self {
		PeerConfig { timeout_secs: 5, max_history_depth: DEFAULT_HISTORY_DEPTH }
	}
}

impl PeerConfig {
	pub fn timeout(&self) -> Duration {
		Duration::from_secs(self.timeout_secs)
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QueueConfig {
	/// File name of the queue inside the state directory
	pub file_name: String,
}

impl Default for QueueConfig {
	fn default() -> Self {
		QueueConfig { file_name: PUSH_QUEUE_FILE.to_string() }
	}
}


// vim: ts=4

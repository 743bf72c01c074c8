//! Error types for gitlane operations

use std::error::Error;
use std::fmt;
use std::io;

/// Main error type for hosting, peer sync and queue operations
#[derive(Debug)]
pub enum GitlaneError {
	/// Socket reset, connect failure or timeout talking to a peer
	Transport { peer: String, message: String, timed_out: bool },

	/// Malformed request or response, missing fields
	Protocol { message: String },

	/// Peer answered with a non-2xx status
	Remote { status: u16, message: String },

	/// Branch absent on peer, peer without branches, missing repository
	NotFound { what: String },

	/// Local directory already exists (clone target collision)
	AlreadyExists { path: String },

	/// A server is already bound in this process
	AlreadyHosting { dir: String },

	/// Invalid configuration
	InvalidConfig { message: String },

	/// Version store error (nested)
	Store(StoreError),

	/// Push queue error (nested)
	Queue(QueueError),

	/// I/O error
	Io(io::Error),
}

impl GitlaneError {
	/// Whether the caller may simply retry later (connectivity problems only)
	pub fn is_retryable(&self) -> bool {
		matches!(self, GitlaneError::Transport { .. })
	}

	pub fn is_timeout(&self) -> bool {
		matches!(self, GitlaneError::Transport { timed_out: true, .. })
	}
}

impl fmt::Display for GitlaneError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			GitlaneError::Transport { peer, message, timed_out } => {
				if *timed_out {
					write!(f, "Peer {} timed out: {}", peer, message)
				} else {
					write!(f, "Cannot reach peer {}: {}", peer, message)
				}
			}
			GitlaneError::Protocol { message } => write!(f, "Protocol error: {}", message),
			GitlaneError::Remote { message, .. } => write!(f, "{}", message),
			GitlaneError::NotFound { what } => write!(f, "Not found: {}", what),
			GitlaneError::AlreadyExists { path } => {
				write!(f, "A repository named {} already exists", path)
			}
			GitlaneError::AlreadyHosting { dir } => {
				write!(f, "Already hosting {}", dir)
			}
			GitlaneError::InvalidConfig { message } => {
				write!(f, "Invalid configuration: {}", message)
			}
			GitlaneError::Store(e) => write!(f, "Store error: {}", e),
			GitlaneError::Queue(e) => write!(f, "Queue error: {}", e),
			GitlaneError::Io(e) => write!(f, "I/O error: {}", e),
		}
	}
}

impl Error for GitlaneError {}

impl From<io::Error> for GitlaneError {
	fn from(e: io::Error) -> Self {
		GitlaneError::Io(e)
	}
}

impl From<StoreError> for GitlaneError {
	fn from(e: StoreError) -> Self {
		match e {
			StoreError::NotFound { what } => GitlaneError::NotFound { what },
			other => GitlaneError::Store(other),
		}
	}
}

impl From<QueueError> for GitlaneError {
	fn from(e: QueueError) -> Self {
		GitlaneError::Queue(e)
	}
}

impl From<base64::DecodeError> for GitlaneError {
	fn from(e: base64::DecodeError) -> Self {
		GitlaneError::Protocol { message: format!("invalid base64 pack: {}", e) }
	}
}

impl From<serde_json::Error> for GitlaneError {
	fn from(e: serde_json::Error) -> Self {
		GitlaneError::Protocol { message: format!("invalid JSON: {}", e) }
	}
}

/// Version store errors
#[derive(Debug)]
pub enum StoreError {
	/// Ref, object or repository does not exist
	NotFound { what: String },

	/// Ref name rejected (empty, traversal, control characters)
	InvalidRef { name: String },

	/// Packfile failed to parse or verify
	InvalidPack { message: String },

	/// Object or ref content is unreadable
	Corrupt { message: String },

	/// I/O error
	Io(io::Error),
}

impl fmt::Display for StoreError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			StoreError::NotFound { what } => write!(f, "{} not found", what),
			StoreError::InvalidRef { name } => write!(f, "Invalid ref name: {:?}", name),
			StoreError::InvalidPack { message } => write!(f, "Invalid packfile: {}", message),
			StoreError::Corrupt { message } => write!(f, "Corrupt repository: {}", message),
			StoreError::Io(e) => write!(f, "I/O error: {}", e),
		}
	}
}

impl Error for StoreError {}

impl From<io::Error> for StoreError {
	fn from(e: io::Error) -> Self {
		StoreError::Io(e)
	}
}

/// Push queue persistence errors
#[derive(Debug)]
pub enum QueueError {
	/// Failed to load the queue file
	LoadFailed { source: Box<dyn Error + Send + Sync> },

	/// Failed to save the queue file
	SaveFailed { source: Box<dyn Error + Send + Sync> },

	/// Queue file is not a valid entry list
	Corrupted { message: String },
}

impl fmt::Display for QueueError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			QueueError::LoadFailed { source } => write!(f, "Failed to load push queue: {}", source),
			QueueError::SaveFailed { source } => write!(f, "Failed to save push queue: {}", source),
			QueueError::Corrupted { message } => write!(f, "Push queue corrupted: {}", message),
		}
	}
}

impl Error for QueueError {}


// vim: ts=4

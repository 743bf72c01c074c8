//! Version store abstraction
//!
//! The sync protocol and the route dispatcher depend only on the
//! [`VersionStore`] trait: ref resolution, history walking, packfile
//! encode/decode and ref writing. [`FsStore`] is the file-backed
//! implementation shipped with the crate.

pub mod fs_store;
pub mod pack;

use async_trait::async_trait;
use std::path::Path;

use crate::error::StoreError;

pub use fs_store::FsStore;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Repository storage consumed by the peer server and the sync client
///
/// Every operation takes the repository directory explicitly so a single
/// store value can serve any number of repositories.
#[async_trait]
pub trait VersionStore: Send + Sync {
	/// Create an empty repository in `dir` (the directory may already exist)
	async fn init_repository(&self, dir: &Path) -> StoreResult<()>;

	/// All local branch names, sorted
	async fn list_branch_names(&self, dir: &Path) -> StoreResult<Vec<String>>;

	/// Commit id a branch (or `HEAD`) points at
	async fn resolve_ref(&self, dir: &Path, name: &str) -> StoreResult<String>;

	/// Commit ids reachable from `reference`, newest first, at most `max_depth`
	async fn log_ancestry(
		&self,
		dir: &Path,
		reference: &str,
		max_depth: usize,
	) -> StoreResult<Vec<String>>;

	/// Packfile holding exactly the given commits and the objects they reference
	async fn build_packfile(&self, dir: &Path, commit_ids: &[String]) -> StoreResult<Vec<u8>>;

	/// Store every object of `pack` so it can be resolved afterwards
	async fn index_packfile(&self, dir: &Path, pack: &[u8]) -> StoreResult<()>;

	/// Point branch `name` at `sha` regardless of its previous value
	async fn force_write_ref(&self, dir: &Path, name: &str, sha: &str) -> StoreResult<()>;

	async fn has_commit(&self, dir: &Path, sha: &str) -> StoreResult<bool>;

	/// Materialize `branch` into the working tree and make it current
	async fn checkout(&self, dir: &Path, branch: &str) -> StoreResult<()>;
}

/// Reject ref names that could escape `refs/heads` or confuse the wire format
pub fn validate_ref_name(name: &str) -> StoreResult<()> {
	let invalid = name.is_empty()
		|| name.starts_with('/')
		|| name.ends_with('/')
		|| name.chars().any(|c| c.is_control() || c == '\\' || c == ' ')
		|| name.split('/').any(|part| part.is_empty() || part == "." || part == "..")
		|| name == "HEAD";
	if invalid {
		return Err(StoreError::InvalidRef { name: name.to_string() });
	}
	Ok(())
}

/// Commit ids are lowercase 64-char hex BLAKE3 digests
pub fn is_object_id(sha: &str) -> bool {
	sha.len() == 64 && hex::decode(sha).is_ok() && !sha.chars().any(|c| c.is_ascii_uppercase())
}


// vim: ts=4

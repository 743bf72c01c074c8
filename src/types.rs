//! Shared data model and JSON wire payloads

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A named pointer to a commit
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Ref {
	pub name: String,
	pub sha: String,
}

impl Ref {
	pub fn new(name: impl Into<String>, sha: impl Into<String>) -> Self {
		Ref { name: name.into(), sha: sha.into() }
	}
}

/// `GET /api/health`
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
	pub ok: bool,
	pub repo_name: String,
}

/// `GET /api/refs`
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct RefsResponse {
	pub refs: Vec<Ref>,
}

/// `GET /api/pack?ref=NAME`
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct PackResponse {
	/// Base64-encoded packfile
	pub pack: String,
	#[serde(rename = "ref")]
	pub ref_name: String,
	pub commits: usize,
}

/// `POST /api/receive` body
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct ReceiveRequest {
	#[serde(rename = "ref")]
	pub ref_name: String,
	pub sha: String,
	pub pack: String,
}

/// `POST /api/receive` success
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct ReceiveResponse {
	pub ok: bool,
	#[serde(rename = "ref")]
	pub ref_name: String,
	pub sha: String,
}

/// Body of every non-2xx response
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct ErrorBody {
	pub error: String,
}

/// Absolute form of a repository directory
///
/// Symlinks and `.`/`..` are resolved when the directory exists; otherwise
/// the path is joined onto the current directory.
pub async fn absolute_dir(dir: &Path) -> PathBuf {
	if let Ok(canonical) = tokio::fs::canonicalize(dir).await {
		return canonical;
	}
	if dir.is_absolute() {
		return dir.to_path_buf();
	}
	match std::env::current_dir() {
		Ok(cwd) => cwd.join(dir),
		Err(_) => dir.to_path_buf(),
	}
}

/// Final path segment of a repository directory
pub fn repo_name(dir: &Path) -> String {
	dir.file_name()
		.map(|n| n.to_string_lossy().into_owned())
		.unwrap_or_else(|| dir.display().to_string())
}


// vim: ts=4

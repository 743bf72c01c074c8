//! Durable offline push queue
//!
//! At most one pending push per repository directory. Entries are persisted
//! as a JSON array (written through a temp file and renamed into place) so
//! they survive restarts. Credentials are never stored; `flush` receives the
//! token current at flush time.

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

use crate::error::{GitlaneError, QueueError};
use crate::logging::*;
use crate::types::absolute_dir;

/// One deferred push
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
	/// Milliseconds since the epoch at enqueue time
	pub id: u64,
	pub dir: PathBuf,
	pub repo_name: String,
	pub queued_at: u64,
}

/// Counts returned by [`PushQueue::flush`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
	pub succeeded: usize,
	pub failed: usize,
}

/// What [`PushQueue::push_or_enqueue`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushAttempt {
	Pushed,
	Queued,
}

pub struct PushQueue {
	path: PathBuf,
	entries: Mutex<Vec<QueueEntry>>,
	/// Serializes flushes so a success is never counted twice
	flushing: Mutex<()>,
}

impl PushQueue {
	/// Load the queue stored at `path`, or start empty if there is none
	pub async fn open(path: impl Into<PathBuf>) -> Result<Self, QueueError> {
		let path = path.into();
		let entries = load_entries(&path).await?;
		debug!("Push queue {} holds {} entries", path.display(), entries.len());
		Ok(PushQueue { path, entries: Mutex::new(entries), flushing: Mutex::new(()) })
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub async fn entries(&self) -> Vec<QueueEntry> {
		self.entries.lock().await.clone()
	}

	pub async fn len(&self) -> usize {
		self.entries.lock().await.len()
	}

	pub async fn is_empty(&self) -> bool {
		self.entries.lock().await.is_empty()
	}

	/// Record a pending push for `dir`; no-op if one is already queued
	///
	/// `dir` is stored in absolute form so the entry stays valid for a
	/// flush started from any working directory.
	pub async fn enqueue(&self, dir: &Path, repo_name: &str) -> Result<Vec<QueueEntry>, QueueError> {
		let dir = absolute_dir(dir).await;
		let mut entries = self.entries.lock().await;
		if entries.iter().any(|e| e.dir == dir) {
			return Ok(entries.clone());
		}

		let now = now_millis();
		let mut updated = entries.clone();
		updated.push(QueueEntry { id: now, dir, repo_name: repo_name.to_string(), queued_at: now });
		save_entries(&self.path, &updated).await?;
		*entries = updated;
		info!("Queued push for {} ({} pending)", repo_name, entries.len());
		Ok(entries.clone())
	}

	/// Drop the pending push for `dir`
	pub async fn dequeue(&self, dir: &Path) -> Result<Vec<QueueEntry>, QueueError> {
		let dir = absolute_dir(dir).await;
		let mut entries = self.entries.lock().await;
		if !entries.iter().any(|e| e.dir == dir) {
			return Ok(entries.clone());
		}

		let updated: Vec<QueueEntry> = entries.iter().filter(|e| e.dir != dir).cloned().collect();
		save_entries(&self.path, &updated).await?;
		*entries = updated;
		Ok(entries.clone())
	}

	/// Attempt every queued push; failures stay queued
	///
	/// `push` receives the entry's directory and the caller's current token.
	/// Never fails: errors are counted and logged.
	pub async fn flush<F, Fut, E>(&self, token: &str, mut push: F) -> FlushSummary
	where
		F: FnMut(PathBuf, String) -> Fut,
		Fut: Future<Output = Result<(), E>>,
		E: Display,
	{
		let _flushing = self.flushing.lock().await;
		let pending = self.entries().await;
		let mut summary = FlushSummary::default();

		for entry in pending {
			match push(entry.dir.clone(), token.to_string()).await {
				Ok(()) => {
					summary.succeeded += 1;
					if let Err(e) = self.dequeue(&entry.dir).await {
						warn!("Pushed {} but could not update the queue: {}", entry.repo_name, e);
					}
				}
				Err(e) => {
					summary.failed += 1;
					warn!("Queued push for {} failed again: {}", entry.repo_name, e);
				}
			}
		}

		if summary.succeeded + summary.failed > 0 {
			info!("Flushed push queue: {} succeeded, {} failed", summary.succeeded, summary.failed);
		}
		summary
	}

	/// Push now; on a connectivity failure, queue the push for later
	pub async fn push_or_enqueue<F, Fut>(
		&self,
		dir: &Path,
		repo_name: &str,
		token: &str,
		push: F,
	) -> Result<PushAttempt, GitlaneError>
	where
		F: FnOnce(PathBuf, String) -> Fut,
		Fut: Future<Output = Result<(), GitlaneError>>,
	{
		let dir = absolute_dir(dir).await;
		match push(dir.clone(), token.to_string()).await {
			Ok(()) => {
				self.dequeue(&dir).await?;
				Ok(PushAttempt::Pushed)
			}
			Err(e) if e.is_retryable() => {
				info!("Push of {} deferred: {}", repo_name, e);
				self.enqueue(&dir, repo_name).await?;
				Ok(PushAttempt::Queued)
			}
			Err(e) => Err(e),
		}
	}
}

fn now_millis() -> u64 {
	SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

async fn load_entries(path: &Path) -> Result<Vec<QueueEntry>, QueueError> {
	let contents = match tokio::fs::read_to_string(path).await {
		Ok(contents) => contents,
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
		Err(e) => return Err(QueueError::LoadFailed { source: Box::new(e) }),
	};
	if contents.trim().is_empty() {
		return Ok(Vec::new());
	}
	serde_json::from_str(&contents).map_err(|e| QueueError::Corrupted {
		message: format!("Failed to parse {}: {}", path.display(), e),
	})
}

async fn save_entries(path: &Path, entries: &[QueueEntry]) -> Result<(), QueueError> {
	if let Some(parent) = path.parent() {
		tokio::fs::create_dir_all(parent)
			.await
			.map_err(|e| QueueError::SaveFailed { source: Box::new(e) })?;
	}
	let json = serde_json::to_vec_pretty(entries).map_err(|e| QueueError::SaveFailed { source: Box::new(e) })?;

	let mut tmp = path.as_os_str().to_owned();
	tmp.push(".tmp");
	let tmp = PathBuf::from(tmp);
	tokio::fs::write(&tmp, json).await.map_err(|e| QueueError::SaveFailed { source: Box::new(e) })?;
	tokio::fs::rename(&tmp, path).await.map_err(|e| QueueError::SaveFailed { source: Box::new(e) })
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashSet;
	use tempfile::TempDir;

	async fn queue_in(dir: &TempDir) -> PushQueue {
		PushQueue::open(dir.path().join("gitlane_push_queue.json")).await.unwrap()
	}

	#[tokio::test]
	async fn test_enqueue_is_idempotent() {
		let state = TempDir::new().unwrap();
		let queue = queue_in(&state).await;
		queue.enqueue(Path::new("/repos/notes"), "notes").await.unwrap();
		let entries = queue.enqueue(Path::new("/repos/notes"), "notes").await.unwrap();
		assert_eq!(entries.len(), 1);
		assert_eq!(entries[0].repo_name, "notes");
	}

	#[tokio::test]
	async fn test_dequeue_removes_only_that_dir() {
		let state = TempDir::new().unwrap();
		let queue = queue_in(&state).await;
		queue.enqueue(Path::new("/repos/a"), "a").await.unwrap();
		queue.enqueue(Path::new("/repos/b"), "b").await.unwrap();

		let entries = queue.dequeue(Path::new("/repos/a")).await.unwrap();
		assert_eq!(entries.len(), 1);
		assert_eq!(entries[0].dir, PathBuf::from("/repos/b"));

		let unchanged = queue.dequeue(Path::new("/repos/missing")).await.unwrap();
		assert_eq!(unchanged, entries);
	}

	#[tokio::test]
	async fn test_entries_are_stored_with_absolute_dirs() {
		let state = TempDir::new().unwrap();
		let repo = state.path().join("notes");
		std::fs::create_dir(&repo).unwrap();
		let queue = queue_in(&state).await;

		let roundabout = repo.join("..").join("notes");
		queue.enqueue(&roundabout, "notes").await.unwrap();
		let entries = queue.enqueue(&repo, "notes").await.unwrap();
		assert_eq!(entries.len(), 1);
		assert_eq!(entries[0].dir, std::fs::canonicalize(&repo).unwrap());

		let entries = queue.enqueue(Path::new("relative/notes"), "notes").await.unwrap();
		assert!(entries[1].dir.is_absolute());
		assert!(entries[1].dir.ends_with("relative/notes"));

		let raw = tokio::fs::read_to_string(queue.path()).await.unwrap();
		assert!(!raw.contains(r#""dir": "relative"#));

		let entries = queue.dequeue(Path::new("relative/notes")).await.unwrap();
		assert_eq!(entries.len(), 1);
		let entries = queue.dequeue(&roundabout).await.unwrap();
		assert!(entries.is_empty());
	}

	#[tokio::test]
	async fn test_queue_survives_reopen() {
		let state = TempDir::new().unwrap();
		{
			let queue = queue_in(&state).await;
			queue.enqueue(Path::new("/repos/a"), "a").await.unwrap();
			queue.enqueue(Path::new("/repos/b"), "b").await.unwrap();
		}
		let reopened = queue_in(&state).await;
		let dirs: Vec<PathBuf> = reopened.entries().await.into_iter().map(|e| e.dir).collect();
		assert_eq!(dirs, vec![PathBuf::from("/repos/a"), PathBuf::from("/repos/b")]);
	}

	#[tokio::test]
	async fn test_stored_entry_shape() {
		let state = TempDir::new().unwrap();
		let queue = queue_in(&state).await;
		queue.enqueue(Path::new("/repos/a"), "a").await.unwrap();
		let raw = tokio::fs::read_to_string(queue.path()).await.unwrap();
		let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
		assert_eq!(json[0]["repoName"], "a");
		assert!(json[0]["queuedAt"].is_u64());
		assert!(json[0].get("token").is_none());
	}

	#[tokio::test]
	async fn test_corrupt_file_is_reported() {
		let state = TempDir::new().unwrap();
		let path = state.path().join("gitlane_push_queue.json");
		tokio::fs::write(&path, "{ nope").await.unwrap();
		assert!(matches!(PushQueue::open(&path).await, Err(QueueError::Corrupted { .. })));
	}

	#[tokio::test]
	async fn test_flush_counts_and_keeps_failures_in_order() {
		let state = TempDir::new().unwrap();
		let queue = queue_in(&state).await;
		for name in ["a", "b", "c", "d", "e"] {
			queue.enqueue(&PathBuf::from("/repos").join(name), name).await.unwrap();
		}
		let failing: HashSet<PathBuf> =
			["b", "d"].iter().map(|n| PathBuf::from("/repos").join(n)).collect();

		let summary = queue
			.flush("token-1", |dir, token| {
				let fails = failing.contains(&dir);
				async move {
					assert_eq!(token, "token-1");
					if fails {
						Err("offline")
					} else {
						Ok(())
					}
				}
			})
			.await;

		assert_eq!(summary, FlushSummary { succeeded: 3, failed: 2 });
		let remaining: Vec<String> = queue.entries().await.into_iter().map(|e| e.repo_name).collect();
		assert_eq!(remaining, vec!["b", "d"]);
	}

	#[tokio::test]
	async fn test_flush_empty_queue() {
		let state = TempDir::new().unwrap();
		let queue = queue_in(&state).await;
		let summary = queue.flush("t", |_, _| async { Ok::<(), String>(()) }).await;
		assert_eq!(summary, FlushSummary::default());
	}

	#[tokio::test]
	async fn test_concurrent_flushes_count_each_success_once() {
		let state = TempDir::new().unwrap();
		let queue = queue_in(&state).await;
		for name in ["a", "b", "c"] {
			queue.enqueue(&PathBuf::from("/repos").join(name), name).await.unwrap();
		}

		let push = |_: PathBuf, _: String| async {
			tokio::task::yield_now().await;
			Ok::<(), String>(())
		};
		let (first, second) = tokio::join!(queue.flush("t", push), queue.flush("t", push));

		assert_eq!(first.succeeded + second.succeeded, 3);
		assert!(queue.is_empty().await);
	}

	#[tokio::test]
	async fn test_push_or_enqueue_defers_on_transport_error() {
		let state = TempDir::new().unwrap();
		let queue = queue_in(&state).await;
		let dir = Path::new("/repos/notes");

		let attempt = queue
			.push_or_enqueue(dir, "notes", "t", |_, _| async {
				Err(GitlaneError::Transport {
					peer: "https://forge.example".to_string(),
					message: "network unreachable".to_string(),
					timed_out: false,
				})
			})
			.await
			.unwrap();
		assert_eq!(attempt, PushAttempt::Queued);
		assert_eq!(queue.len().await, 1);

		let attempt = queue.push_or_enqueue(dir, "notes", "t", |_, _| async { Ok(()) }).await.unwrap();
		assert_eq!(attempt, PushAttempt::Pushed);
		assert!(queue.is_empty().await);
	}

	#[tokio::test]
	async fn test_push_or_enqueue_surfaces_non_retryable_errors() {
		let state = TempDir::new().unwrap();
		let queue = queue_in(&state).await;
		let result = queue
			.push_or_enqueue(Path::new("/repos/notes"), "notes", "t", |_, _| async {
				Err(GitlaneError::Remote { status: 403, message: "forbidden".to_string() })
			})
			.await;
		assert!(matches!(result, Err(GitlaneError::Remote { status: 403, .. })));
		assert!(queue.is_empty().await);
	}
}

// vim: ts=4

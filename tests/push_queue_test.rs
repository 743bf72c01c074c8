//! Deferred pushes replayed against a live peer

mod common;

use std::path::PathBuf;
use tempfile::TempDir;
use tokio::net::TcpListener;

use common::*;
use gitlane::queue::{PushAttempt, PushQueue};
use gitlane::GitlaneError;

/// An address nothing is listening on
async fn dead_address() -> String {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	drop(listener);
	format!("http://{}", addr)
}

#[tokio::test]
async fn test_offline_push_is_queued_then_flushed() {
	let root = TempDir::new().unwrap();
	let laptop = root.path().join("laptop");
	let desktop = root.path().join("desktop");
	commit_file(&desktop, "base.txt", "base", "base").await;
	let tip = commit_file(&laptop, "notes.txt", "from laptop", "offline work").await;

	let queue = PushQueue::open(root.path().join("queue.json")).await.unwrap();
	let sync = peer_sync();

	let offline = dead_address().await;
	let attempt = queue
		.push_or_enqueue(&laptop, "laptop", "t0", |dir: PathBuf, _token| {
			let sync = sync.clone();
			let offline = offline.clone();
			async move { sync.push_to_peer(&dir, &offline, "main").await.map(|_| ()) }
		})
		.await
		.unwrap();
	assert_eq!(attempt, PushAttempt::Queued);
	assert_eq!(queue.len().await, 1);

	let (_hosting, _handle, url) = host(&desktop).await;
	let summary = queue
		.flush("t1", |dir, token| {
			let sync = sync.clone();
			let url = url.clone();
			async move {
				assert_eq!(token, "t1");
				sync.push_to_peer(&dir, &url, "main").await.map(|_| ())
			}
		})
		.await;

	assert_eq!(summary.succeeded, 1);
	assert_eq!(summary.failed, 0);
	assert!(queue.is_empty().await);
	assert_eq!(resolve(&desktop, "main").await, tip);

	let reopened = PushQueue::open(root.path().join("queue.json")).await.unwrap();
	assert!(reopened.is_empty().await);
}

#[tokio::test]
async fn test_rejected_push_is_not_queued() {
	let root = TempDir::new().unwrap();
	let laptop = root.path().join("laptop");
	commit_file(&laptop, "a.txt", "a", "c1").await;

	let addr = canned_peer("500 Internal Server Error", r#"{"error":"disk full"}"#).await;
	let url = format!("http://{}", addr);
	let queue = PushQueue::open(root.path().join("queue.json")).await.unwrap();
	let sync = peer_sync();

	let err = queue
		.push_or_enqueue(&laptop, "laptop", "", |dir: PathBuf, _token| {
			let sync = sync.clone();
			let url = url.clone();
			async move { sync.push_to_peer(&dir, &url, "main").await.map(|_| ()) }
		})
		.await
		.unwrap_err();

	assert!(matches!(err, GitlaneError::Remote { status: 500, .. }));
	assert!(queue.is_empty().await);
}

#[tokio::test]
async fn test_flush_keeps_entries_while_peer_is_down() {
	let root = TempDir::new().unwrap();
	let laptop = root.path().join("laptop");
	commit_file(&laptop, "a.txt", "a", "c1").await;

	let queue = PushQueue::open(root.path().join("queue.json")).await.unwrap();
	queue.enqueue(&laptop, "laptop").await.unwrap();

	let sync = peer_sync();
	let offline = dead_address().await;
	let summary = queue
		.flush("", |dir, _token| {
			let sync = sync.clone();
			let offline = offline.clone();
			async move { sync.push_to_peer(&dir, &offline, "main").await.map(|_| ()) }
		})
		.await;

	assert_eq!(summary.succeeded, 0);
	assert_eq!(summary.failed, 1);
	assert_eq!(queue.len().await, 1);
}

// vim: ts=4

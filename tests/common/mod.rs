//! Helpers shared by the integration tests
#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use gitlane::config::{PeerConfig, ServerConfig};
use gitlane::server::framer::RequestFramer;
use gitlane::server::{Hosting, ServerHandle};
use gitlane::{FsStore, PeerSync, VersionStore};

pub fn local_server_config() -> ServerConfig {
	ServerConfig { bind_address: "127.0.0.1".to_string(), port: 0, ..ServerConfig::default() }
}

pub fn peer_sync() -> PeerSync {
	PeerSync::new(Arc::new(FsStore::new()), PeerConfig::default())
}

/// Write `content` to `file` and commit it
pub async fn commit_file(dir: &Path, file: &str, content: &str, message: &str) -> String {
	let store = FsStore::new();
	if !FsStore::is_repository(dir) {
		store.init_repository(dir).await.unwrap();
	}
	tokio::fs::write(dir.join(file), content).await.unwrap();
	store.commit_all(dir, message).await.unwrap()
}

pub async fn resolve(dir: &Path, name: &str) -> String {
	FsStore::new().resolve_ref(dir, name).await.unwrap()
}

/// Host `dir` on an ephemeral port; returns the handle and its URL
pub async fn host(dir: &Path) -> (Hosting, ServerHandle, String) {
	host_with(dir, Arc::new(FsStore::new())).await
}

pub async fn host_with(dir: &Path, store: Arc<dyn VersionStore>) -> (Hosting, ServerHandle, String) {
	let hosting = Hosting::new();
	let handle = hosting.start(dir, store, &local_server_config()).await.unwrap();
	let url = format!("http://{}", handle.local_addr());
	(hosting, handle, url)
}

/// A fake peer answering every request with the same raw status and body
pub async fn canned_peer(status_line: &'static str, body: &'static str) -> SocketAddr {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	tokio::spawn(async move {
		loop {
			let Ok((mut stream, _)) = listener.accept().await else {
				break;
			};
			tokio::spawn(async move {
				let mut framer = RequestFramer::new(64 * 1024 * 1024);
				let mut buf = vec![0u8; 8192];
				loop {
					let n = stream.read(&mut buf).await.unwrap_or(0);
					if n == 0 {
						return;
					}
					if let Ok(Some(_)) = framer.push(&buf[..n]) {
						break;
					}
				}
				let response = format!(
					"HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
					status_line,
					body.len(),
					body
				);
				let _ = stream.write_all(response.as_bytes()).await;
				let _ = stream.shutdown().await;
			});
		}
	});
	addr
}

/// A fake peer that accepts connections and never answers
pub async fn silent_peer() -> SocketAddr {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	tokio::spawn(async move {
		let mut held = Vec::new();
		while let Ok((stream, _)) = listener.accept().await {
			held.push(stream);
			tokio::time::sleep(Duration::from_millis(1)).await;
		}
	});
	addr
}

// vim: ts=4

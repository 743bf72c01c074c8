//! Raw-socket tests for the peer server
//!
//! Requests are written by hand, optionally split across several writes,
//! and the raw HTTP response is checked.

mod common;

use std::net::SocketAddr;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use common::*;
use gitlane::FsStore;
use gitlane::VersionStore;

struct RawResponse {
	status: u16,
	headers: Vec<(String, String)>,
	body: serde_json::Value,
}

impl RawResponse {
	fn header(&self, name: &str) -> Option<&str> {
		self.headers
			.iter()
			.find(|(k, _)| k.eq_ignore_ascii_case(name))
			.map(|(_, v)| v.as_str())
	}
}

/// Send `parts` with small pauses in between and read until the server closes
async fn exchange(addr: SocketAddr, parts: &[&[u8]]) -> RawResponse {
	let mut stream = TcpStream::connect(addr).await.unwrap();
	for part in parts {
		stream.write_all(part).await.unwrap();
		stream.flush().await.unwrap();
		tokio::time::sleep(Duration::from_millis(20)).await;
	}

	let mut raw = Vec::new();
	stream.read_to_end(&mut raw).await.unwrap();
	let split = raw.windows(4).position(|w| w == b"\r\n\r\n").expect("header terminator");
	let head = String::from_utf8(raw[..split].to_vec()).unwrap();
	let body_bytes = &raw[split + 4..];

	let mut lines = head.split("\r\n");
	let status = lines.next().unwrap().split(' ').nth(1).unwrap().parse().unwrap();
	let headers = lines
		.filter_map(|l| l.split_once(':'))
		.map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
		.collect::<Vec<_>>();

	let response = RawResponse { status, headers, body: serde_json::from_slice(body_bytes).unwrap() };
	let length: usize = response.header("content-length").unwrap().parse().unwrap();
	assert_eq!(length, body_bytes.len(), "Content-Length must match the body");
	response
}

async fn hosted_repo() -> (TempDir, gitlane::server::Hosting, gitlane::ServerHandle, SocketAddr) {
	let root = TempDir::new().unwrap();
	let repo = root.path().join("notes");
	commit_file(&repo, "a.txt", "hello", "c1").await;
	let (hosting, handle, _) = host(&repo).await;
	let addr = handle.local_addr();
	(root, hosting, handle, addr)
}

#[tokio::test]
async fn test_health_over_socket() {
	let (_root, _hosting, _handle, addr) = hosted_repo().await;
	let res = exchange(addr, &[b"GET /api/health HTTP/1.1\r\nHost: peer\r\n\r\n"]).await;

	assert_eq!(res.status, 200);
	assert_eq!(res.header("content-type"), Some("application/json; charset=utf-8"));
	assert_eq!(res.header("connection"), Some("close"));
	assert_eq!(res.body["ok"], true);
	assert_eq!(res.body["repoName"], "notes");
}

#[tokio::test]
async fn test_request_split_mid_header_and_mid_body() {
	let (_root, _hosting, _handle, addr) = hosted_repo().await;
	let body = br#"{"ref":"main"}"#;
	let head = format!("POST /api/receive HTTP/1.1\r\nContent-Length: {}\r\n\r\n", body.len());
	let head = head.as_bytes();

	let res = exchange(addr, &[&head[..10], &head[10..30], &head[30..], &body[..5], &body[5..]]).await;
	assert_eq!(res.status, 400);
	assert!(res.body["error"].as_str().unwrap().contains("Missing"));
}

#[tokio::test]
async fn test_unknown_route_names_method_and_path() {
	let (_root, _hosting, _handle, addr) = hosted_repo().await;
	let res = exchange(addr, &[b"PUT /api/nope?x=1 HTTP/1.1\r\n\r\n"]).await;
	assert_eq!(res.status, 404);
	assert_eq!(res.body["error"], "No route: PUT /api/nope");
}

#[tokio::test]
async fn test_malformed_request_line_is_no_route() {
	let (_root, _hosting, _handle, addr) = hosted_repo().await;
	let res = exchange(addr, &[b"HELLO\r\n\r\n"]).await;
	assert_eq!(res.status, 404);
	assert!(res.body["error"].as_str().unwrap().starts_with("No route"));
}

#[tokio::test]
async fn test_pack_of_missing_branch_is_404() {
	let (_root, _hosting, _handle, addr) = hosted_repo().await;
	let res = exchange(addr, &[b"GET /api/pack?ref=missing-branch HTTP/1.1\r\n\r\n"]).await;
	assert_eq!(res.status, 404);
	assert!(res.body["error"].is_string());
}

#[tokio::test]
async fn test_pack_response_decodes_into_fresh_repository() {
	let (root, _hosting, _handle, addr) = hosted_repo().await;
	let res = exchange(addr, &[b"GET /api/pack?ref=main HTTP/1.1\r\n\r\n"]).await;
	assert_eq!(res.status, 200);
	assert_eq!(res.body["ref"], "main");
	assert_eq!(res.body["commits"], 1);

	use base64::Engine;
	let pack = base64::engine::general_purpose::STANDARD
		.decode(res.body["pack"].as_str().unwrap())
		.unwrap();
	let fresh = root.path().join("fresh");
	let store = FsStore::new();
	store.init_repository(&fresh).await.unwrap();
	store.index_packfile(&fresh, &pack).await.unwrap();
	let tip = resolve(&root.path().join("notes"), "main").await;
	assert!(store.has_commit(&fresh, &tip).await.unwrap());
}

#[tokio::test]
async fn test_one_bad_connection_does_not_stop_the_server() {
	let (_root, _hosting, handle, addr) = hosted_repo().await;

	// Half a request, then hang up
	{
		let mut stream = TcpStream::connect(addr).await.unwrap();
		stream.write_all(b"POST /api/receive HTTP/1.1\r\nContent-Le").await.unwrap();
	}
	let res = exchange(addr, &[b"GET /api/refs HTTP/1.1\r\n\r\n"]).await;
	assert_eq!(res.status, 200);
	assert_eq!(res.body["refs"][0]["name"], "main");
	assert!(handle.is_running());
}

#[tokio::test]
async fn test_concurrent_connections_are_independent() {
	let (_root, _hosting, _handle, addr) = hosted_repo().await;

	// A slow client holding a partial request must not block another
	let mut slow = TcpStream::connect(addr).await.unwrap();
	slow.write_all(b"GET /api/hea").await.unwrap();

	let res = exchange(addr, &[b"GET /api/refs HTTP/1.1\r\n\r\n"]).await;
	assert_eq!(res.status, 200);

	slow.write_all(b"lth HTTP/1.1\r\n\r\n").await.unwrap();
	let mut raw = Vec::new();
	slow.read_to_end(&mut raw).await.unwrap();
	assert!(raw.starts_with(b"HTTP/1.1 200 OK\r\n"));
}

// vim: ts=4

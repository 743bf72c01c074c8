//! HTTP client for a peer's route dispatcher

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use crate::error::GitlaneError;
use crate::logging::*;
use crate::types::{ErrorBody, HealthResponse, PackResponse, ReceiveRequest, ReceiveResponse, RefsResponse};

/// Talks to one peer; every request is bounded by the client timeout
#[derive(Clone, Debug)]
pub struct PeerClient {
	base_url: String,
	http: Client,
}

impl PeerClient {
	pub fn new(peer_url: &str, timeout: Duration) -> Result<Self, GitlaneError> {
		let http = Client::builder()
			.timeout(timeout)
			.connect_timeout(timeout)
			.build()
			.map_err(|e| GitlaneError::InvalidConfig { message: format!("HTTP client: {}", e) })?;
		Ok(PeerClient { base_url: normalize_peer_url(peer_url), http })
	}

	pub fn base_url(&self) -> &str {
		&self.base_url
	}

	pub async fn health(&self) -> Result<HealthResponse, GitlaneError> {
		self.get("/api/health").await
	}

	pub async fn refs(&self) -> Result<RefsResponse, GitlaneError> {
		self.get("/api/refs").await
	}

	pub async fn pack(&self, ref_name: &str) -> Result<PackResponse, GitlaneError> {
		self.get(&format!("/api/pack?ref={}", urlencoding::encode(ref_name))).await
	}

	pub async fn receive(&self, body: &ReceiveRequest) -> Result<ReceiveResponse, GitlaneError> {
		self.post("/api/receive", body).await
	}

	async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, GitlaneError> {
		let url = format!("{}{}", self.base_url, path);
		debug!("GET {}", url);
		let response = self.http.get(&url).send().await.map_err(|e| self.transport(e))?;
		self.handle_response(response).await
	}

	async fn post<B: Serialize, T: DeserializeOwned>(
		&self,
		path: &str,
		body: &B,
	) -> Result<T, GitlaneError> {
		let url = format!("{}{}", self.base_url, path);
		debug!("POST {}", url);
		let response = self.http.post(&url).json(body).send().await.map_err(|e| self.transport(e))?;
		self.handle_response(response).await
	}

	async fn handle_response<T: DeserializeOwned>(
		&self,
		response: reqwest::Response,
	) -> Result<T, GitlaneError> {
		let status = response.status();
		let bytes = response.bytes().await.map_err(|e| self.transport(e))?;

		if !status.is_success() {
			return Err(remote_error(status, &bytes));
		}
		serde_json::from_slice(&bytes).map_err(|e| GitlaneError::Protocol {
			message: format!("unexpected response from {}: {}", self.base_url, e),
		})
	}

	fn transport(&self, e: reqwest::Error) -> GitlaneError {
		GitlaneError::Transport {
			peer: self.base_url.clone(),
			message: e.to_string(),
			timed_out: e.is_timeout(),
		}
	}
}

/// Peer's `{error}` message, or `HTTP <status>` when there is none
fn remote_error(status: StatusCode, body: &[u8]) -> GitlaneError {
	let message = serde_json::from_slice::<ErrorBody>(body)
		.map(|b| b.error)
		.unwrap_or_else(|_| format!("HTTP {}", status.as_u16()));
	GitlaneError::Remote { status: status.as_u16(), message }
}

/// `192.168.1.4:7821/` -> `http://192.168.1.4:7821`
pub fn normalize_peer_url(peer_url: &str) -> String {
	let trimmed = peer_url.trim().trim_end_matches('/');
	if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
		trimmed.to_string()
	} else {
		format!("http://{}", trimmed)
	}
}


// vim: ts=4

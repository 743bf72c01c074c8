//! Route dispatcher
//!
//! Maps `(method, path)` of an assembled [`Request`] to one of the four
//! handlers and produces a JSON [`Response`]. Nothing here touches the
//! socket, so routes are tested with plain requests.

use base64::Engine;
use serde::Serialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;

use super::framer::Request;
use crate::error::{GitlaneError, StoreError};
use crate::logging::*;
use crate::store::{validate_ref_name, VersionStore};
use crate::types::{repo_name, HealthResponse, PackResponse, ReceiveResponse, Ref, RefsResponse};

/// Everything a handler needs about the bound repository
#[derive(Clone)]
pub struct RouteContext {
	pub store: Arc<dyn VersionStore>,
	pub dir: PathBuf,
	pub max_history_depth: usize,
}

/// Status plus JSON body
#[derive(Clone, PartialEq, Debug)]
pub struct Response {
	pub status: u16,
	pub body: Value,
}

impl Response {
	pub fn ok<T: Serialize>(payload: &T) -> Self {
		match serde_json::to_value(payload) {
			Ok(body) => Response { status: 200, body },
			Err(e) => Response::error(500, &format!("Serialization error: {}", e)),
		}
	}

	pub fn error(status: u16, message: &str) -> Self {
		Response { status, body: json!({ "error": message }) }
	}

	pub fn no_route(method: &str, path: &str) -> Self {
		Response::error(404, &format!("No route: {} {}", method, path))
	}

	pub fn status_text(&self) -> &'static str {
		match self.status {
			200 => "OK",
			400 => "Bad Request",
			404 => "Not Found",
			408 => "Request Timeout",
			413 => "Payload Too Large",
			500 => "Internal Server Error",
			_ => "Unknown",
		}
	}

	/// Full HTTP/1.1 message with connection-close semantics
	pub fn to_bytes(&self) -> Vec<u8> {
		let body = serde_json::to_vec(&self.body).unwrap_or_else(|_| b"{}".to_vec());
		let mut out = format!(
			"HTTP/1.1 {} {}\r\nContent-Type: application/json; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
			self.status,
			self.status_text(),
			body.len()
		)
		.into_bytes();
		out.extend_from_slice(&body);
		out
	}
}

/// Run exactly one handler; handler failures become 500 responses
pub async fn dispatch(ctx: &RouteContext, req: &Request) -> Response {
	let result = match (req.method.as_str(), req.path.as_str()) {
		("GET", "/api/health") => Ok(health(ctx)),
		("GET", "/api/refs") => refs(ctx).await,
		("GET", "/api/pack") => pack(ctx, req).await,
		("POST", "/api/receive") => receive(ctx, req).await,
		(method, path) => Ok(Response::no_route(method, path)),
	};

	match result {
		Ok(response) => response,
		Err(e) => {
			warn!("{} {} failed: {}", req.method, req.path, e);
			Response::error(500, &e.to_string())
		}
	}
}

fn health(ctx: &RouteContext) -> Response {
	Response::ok(&HealthResponse { ok: true, repo_name: repo_name(&ctx.dir) })
}

async fn refs(ctx: &RouteContext) -> Result<Response, GitlaneError> {
	let names = ctx.store.list_branch_names(&ctx.dir).await?;
	let mut refs = Vec::with_capacity(names.len());
	for name in names {
		match ctx.store.resolve_ref(&ctx.dir, &name).await {
			Ok(sha) => refs.push(Ref { name, sha }),
			Err(e) => debug!("Skipping unresolvable branch {}: {}", name, e),
		}
	}
	Ok(Response::ok(&RefsResponse { refs }))
}

async fn pack(ctx: &RouteContext, req: &Request) -> Result<Response, GitlaneError> {
	let ref_name = req.query.get("ref").map(String::as_str).unwrap_or("HEAD");

	let history = match ctx.store.log_ancestry(&ctx.dir, ref_name, ctx.max_history_depth).await {
		Ok(history) => history,
		Err(StoreError::NotFound { .. }) | Err(StoreError::InvalidRef { .. }) => Vec::new(),
		Err(e) => return Err(e.into()),
	};
	if history.is_empty() {
		return Ok(Response::error(404, &format!("No commits on {}", ref_name)));
	}

	let pack = ctx.store.build_packfile(&ctx.dir, &history).await?;
	debug!("Serving {} commits ({} bytes) of {}", history.len(), pack.len(), ref_name);
	Ok(Response::ok(&PackResponse {
		pack: base64::engine::general_purpose::STANDARD.encode(&pack),
		ref_name: ref_name.to_string(),
		commits: history.len(),
	}))
}

async fn receive(ctx: &RouteContext, req: &Request) -> Result<Response, GitlaneError> {
	let body: Value = match serde_json::from_slice(&req.body) {
		Ok(body) => body,
		Err(e) => return Ok(Response::error(400, &format!("Invalid JSON body: {}", e))),
	};
	let fields = (str_field(&body, "ref"), str_field(&body, "sha"), str_field(&body, "pack"));
	let (Some(ref_name), Some(sha), Some(pack)) = fields else {
		return Ok(Response::error(400, "Missing ref, sha, or pack"));
	};
	if let Err(e) = validate_ref_name(ref_name) {
		return Ok(Response::error(400, &e.to_string()));
	}

	let bytes = match base64::engine::general_purpose::STANDARD.decode(pack) {
		Ok(bytes) => bytes,
		Err(e) => return Ok(Response::error(400, &format!("Invalid base64 pack: {}", e))),
	};

	ctx.store.index_packfile(&ctx.dir, &bytes).await?;
	// Only the tip is checked; ancestors are trusted to be present
	if !ctx.store.has_commit(&ctx.dir, sha).await? {
		return Ok(Response::error(400, &format!("Pack does not contain commit {}", sha)));
	}
	ctx.store.force_write_ref(&ctx.dir, ref_name, sha).await?;
	info!("Received {} -> {} ({} bytes)", ref_name, sha, bytes.len());

	Ok(Response::ok(&ReceiveResponse { ok: true, ref_name: ref_name.to_string(), sha: sha.to_string() }))
}

fn str_field<'a>(body: &'a Value, name: &str) -> Option<&'a str> {
	body.get(name).and_then(Value::as_str).filter(|s| !s.is_empty())
}


// vim: ts=4

//! Peer server: one repository exposed over plain HTTP/1.1 on a TCP socket
//!
//! [`Hosting`] is the per-process session registry. `start` binds a
//! listener and returns the [`ServerHandle`] that owns it; only one handle
//! can be live per registry.
//!
//! ```ignore
//! let hosting = Hosting::new();
//! let mut handle = hosting.start(&dir, Arc::new(FsStore::new()), &config.server).await?;
//! println!("serving on {}", handle.local_addr());
//! handle.stop().await;
//! ```

pub mod framer;
pub mod routes;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::ServerConfig;
use crate::error::GitlaneError;
use crate::logging::*;
use crate::store::VersionStore;
use crate::types::absolute_dir;
use framer::{FrameError, RequestFramer};
use routes::{dispatch, Response, RouteContext};

const READ_CHUNK: usize = 16 * 1024;

/// Snapshot of the hosting session
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SessionState {
	pub listening: bool,
	pub bound_dir: Option<PathBuf>,
}

/// Process-wide "is a server bound, and to which repository"
///
/// The single-listener guarantee holds per registry: clones share it, but
/// two registries made with `Hosting::new()` are independent. A process is
/// expected to create one and hand clones to whoever needs to host.
#[derive(Clone, Default)]
pub struct Hosting {
	bound: Arc<Mutex<Option<PathBuf>>>,
}

impl Hosting {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn state(&self) -> SessionState {
		let bound = lock(&self.bound).clone();
		SessionState { listening: bound.is_some(), bound_dir: bound }
	}

	/// Bind a listener serving `dir`; fails while another handle is live
	///
	/// `dir` is made absolute first, so the bound directory and the name
	/// reported by `/api/health` do not depend on the working directory.
	pub async fn start(
		&self,
		dir: &Path,
		store: Arc<dyn VersionStore>,
		config: &ServerConfig,
	) -> Result<ServerHandle, GitlaneError> {
		let resolved = absolute_dir(dir).await;
		let dir = resolved.as_path();
		{
			let mut bound = lock(&self.bound);
			if let Some(current) = bound.as_ref() {
				return Err(GitlaneError::AlreadyHosting { dir: current.display().to_string() });
			}
			*bound = Some(dir.to_path_buf());
		}

		let listener = match TcpListener::bind((config.bind_address.as_str(), config.port)).await {
			Ok(listener) => listener,
			Err(e) => {
				*lock(&self.bound) = None;
				return Err(e.into());
			}
		};
		let local_addr = listener.local_addr()?;
		info!("Hosting {} on {}", dir.display(), local_addr);

		let ctx = RouteContext {
			store,
			dir: dir.to_path_buf(),
			max_history_depth: config.max_history_depth,
		};
		let limits = ConnectionLimits {
			read_timeout: config.read_timeout(),
			max_request_bytes: config.max_request_bytes,
		};
		let (shutdown_tx, shutdown_rx) = oneshot::channel();
		let task = tokio::spawn(accept_loop(listener, ctx, limits, shutdown_rx));

		Ok(ServerHandle {
			local_addr,
			dir: dir.to_path_buf(),
			shutdown: Some(shutdown_tx),
			task: Some(task),
			bound: Arc::clone(&self.bound),
		})
	}
}

/// Owner of a running listener; stopping (or dropping) it releases the session
pub struct ServerHandle {
	local_addr: SocketAddr,
	dir: PathBuf,
	shutdown: Option<oneshot::Sender<()>>,
	task: Option<JoinHandle<()>>,
	bound: Arc<Mutex<Option<PathBuf>>>,
}

impl ServerHandle {
	pub fn local_addr(&self) -> SocketAddr {
		self.local_addr
	}

	pub fn dir(&self) -> &Path {
		&self.dir
	}

	pub fn is_running(&self) -> bool {
		self.shutdown.is_some()
	}

	/// Stop accepting connections. Calling it again is a no-op.
	pub async fn stop(&mut self) {
		let Some(shutdown) = self.shutdown.take() else {
			return;
		};
		let _ = shutdown.send(());
		if let Some(task) = self.task.take() {
			if let Err(e) = task.await {
				warn!("Listener task ended abnormally: {}", e);
			}
		}
		*lock(&self.bound) = None;
		info!("Stopped hosting {}", self.dir.display());
	}
}

impl Drop for ServerHandle {
	fn drop(&mut self) {
		if let Some(shutdown) = self.shutdown.take() {
			let _ = shutdown.send(());
			*lock(&self.bound) = None;
		}
	}
}

fn lock(bound: &Mutex<Option<PathBuf>>) -> MutexGuard<'_, Option<PathBuf>> {
	bound.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Clone, Copy)]
struct ConnectionLimits {
	read_timeout: Duration,
	max_request_bytes: usize,
}

async fn accept_loop(
	listener: TcpListener,
	ctx: RouteContext,
	limits: ConnectionLimits,
	mut shutdown: oneshot::Receiver<()>,
) {
	loop {
		tokio::select! {
			_ = &mut shutdown => break,
			accepted = listener.accept() => match accepted {
				Ok((stream, peer)) => {
					let ctx = ctx.clone();
					tokio::spawn(async move {
						if let Err(e) = handle_connection(stream, &ctx, limits).await {
							warn!("Connection from {} failed: {}", peer, e);
						}
					});
				}
				Err(e) => {
					warn!("Accept failed: {}", e);
				}
			},
		}
	}
}

/// Frame one request, dispatch it, write one response, close
async fn handle_connection(
	mut stream: TcpStream,
	ctx: &RouteContext,
	limits: ConnectionLimits,
) -> std::io::Result<()> {
	let mut framer = RequestFramer::new(limits.max_request_bytes);
	let mut chunk = vec![0u8; READ_CHUNK];

	let framed = loop {
		let n = match tokio::time::timeout(limits.read_timeout, stream.read(&mut chunk)).await {
			Ok(read) => read?,
			Err(_) => {
				debug!("Request not completed within {:?}", limits.read_timeout);
				write_response(&mut stream, &Response::error(408, "Request timeout")).await?;
				return Ok(());
			}
		};
		if n == 0 {
			debug!("Peer closed after {} bytes without a full request", framer.buffered());
			return Ok(());
		}
		match framer.push(&chunk[..n]) {
			Ok(Some(request)) => break Ok(request),
			Ok(None) => continue,
			Err(e) => break Err(e),
		}
	};

	let response = match framed {
		Ok(request) => {
			debug!("{} {}", request.method, request.path);
			dispatch(ctx, &request).await
		}
		Err(FrameError::MalformedRequestLine { line }) => {
			debug!("Malformed request line {:?}", line);
			Response::error(404, &format!("No route: {}", line.trim()))
		}
		Err(e @ FrameError::TooLarge { .. }) => Response::error(413, &e.to_string()),
		Err(FrameError::AlreadyComplete) => return Ok(()),
	};

	write_response(&mut stream, &response).await
}

async fn write_response(stream: &mut TcpStream, response: &Response) -> std::io::Result<()> {
	stream.write_all(&response.to_bytes()).await?;
	stream.flush().await?;
	stream.shutdown().await
}


// vim: ts=4

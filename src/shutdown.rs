//! Signal handling for graceful termination

use tracing::{debug, warn};

/// Resolve on SIGINT/Ctrl-C or SIGTERM
pub async fn wait_for_shutdown() {
	#[cfg(unix)]
	{
		use tokio::signal::unix::{signal, SignalKind};

		let mut sigterm = match signal(SignalKind::terminate()) {
			Ok(stream) => stream,
			Err(e) => {
				warn!("Failed to setup SIGTERM handler: {}. Waiting for Ctrl-C only.", e);
				let _ = tokio::signal::ctrl_c().await;
				return;
			}
		};

		tokio::select! {
			_ = sigterm.recv() => debug!("Received SIGTERM, shutting down"),
			_ = tokio::signal::ctrl_c() => debug!("Received SIGINT, shutting down"),
		}
	}

	#[cfg(not(unix))]
	{
		if let Err(e) = tokio::signal::ctrl_c().await {
			warn!("Failed to listen for Ctrl-C: {}", e);
		}
		debug!("Received Ctrl-C, shutting down");
	}
}

// vim: ts=4

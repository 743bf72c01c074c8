//! # Gitlane - serverless LAN sync for repositories
//!
//! One device hosts a repository over a minimal HTTP/1.1 interface on a raw
//! TCP socket; another device clones or fetches its branches and pushes its
//! own commits back. Pushes to a conventional remote that fail for lack of
//! connectivity are parked in a durable queue and replayed later.
//!
//! ## Hosting
//!
//! ```rust,ignore
//! use gitlane::{config::Config, server::Hosting, store::FsStore};
//! use std::sync::Arc;
//!
//! let config = Config::load()?;
//! let hosting = Hosting::new();
//! let mut handle = hosting.start("./notes".as_ref(), Arc::new(FsStore::new()), &config.server).await?;
//! // ...
//! handle.stop().await;
//! ```
//!
//! ## Syncing with a peer
//!
//! ```rust,ignore
//! use gitlane::peer::PeerSync;
//!
//! let sync = PeerSync::new(Arc::new(FsStore::new()), config.peer.clone());
//! let clone = sync.clone_from_peer("192.168.1.20:7821", "/repos".as_ref(), "notes").await?;
//! let report = sync.fetch_from_peer(&clone.dir, "192.168.1.20:7821").await?;
//! sync.push_to_peer(&clone.dir, "192.168.1.20:7821", "main").await?;
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod peer;
pub mod queue;
pub mod server;
pub mod shutdown;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use error::{GitlaneError, QueueError, StoreError};
pub use peer::{FetchReport, PeerSync, RefUpdatePolicy};
pub use queue::{FlushSummary, PushQueue, QueueEntry};
pub use server::{Hosting, ServerHandle};
pub use store::{FsStore, VersionStore};
pub use types::Ref;

// vim: ts=4

//! Peer sync protocol (client side)
//!
//! Clone, fetch and push against another device's route dispatcher.
//! Ref updates are force overwrites: the last sync to land wins and no
//! merge is attempted.

pub mod client;

use base64::Engine;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::PeerConfig;
use crate::error::GitlaneError;
use crate::logging::*;
use crate::store::{StoreResult, VersionStore};
use crate::types::{ReceiveRequest, ReceiveResponse, Ref};
pub use client::PeerClient;

/// How a fetched ref is written into the local repository
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum RefUpdatePolicy {
	/// Set the ref to the peer's value regardless of ancestry
	#[default]
	ForceOverwrite,
}

impl RefUpdatePolicy {
	pub async fn apply(
		self,
		store: &dyn VersionStore,
		dir: &Path,
		name: &str,
		sha: &str,
	) -> StoreResult<()> {
		match self {
			RefUpdatePolicy::ForceOverwrite => store.force_write_ref(dir, name, sha).await,
		}
	}
}

/// Result of syncing one branch during a fetch
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum RefOutcome {
	/// Commit already present locally; only the ref was written
	UpToDate,
	/// Pack transferred and indexed
	Transferred { commits: usize },
	Failed { message: String },
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct RefReport {
	pub name: String,
	pub sha: String,
	pub outcome: RefOutcome,
}

/// Everything the peer advertised, with the per-branch result
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct FetchReport {
	pub refs: Vec<Ref>,
	pub branches: Vec<RefReport>,
}

impl FetchReport {
	pub fn failed(&self) -> impl Iterator<Item = &RefReport> {
		self.branches.iter().filter(|b| matches!(b.outcome, RefOutcome::Failed { .. }))
	}

	pub fn all_succeeded(&self) -> bool {
		self.failed().next().is_none()
	}
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct CloneReport {
	pub dir: PathBuf,
	pub fetch: FetchReport,
	/// Branch checked out, if checkout succeeded
	pub checked_out: Option<String>,
}

/// Sync client bound to a version store
#[derive(Clone)]
pub struct PeerSync {
	store: Arc<dyn VersionStore>,
	config: PeerConfig,
	policy: RefUpdatePolicy,
}

impl PeerSync {
	pub fn new(store: Arc<dyn VersionStore>, config: PeerConfig) -> Self {
		PeerSync { store, config, policy: RefUpdatePolicy::default() }
	}

	pub fn with_policy(mut self, policy: RefUpdatePolicy) -> Self {
		self.policy = policy;
		self
	}

	pub fn client(&self, peer_url: &str) -> Result<PeerClient, GitlaneError> {
		PeerClient::new(peer_url, self.config.timeout())
	}

	/// Bring every branch the peer advertises into `dir`
	///
	/// Per-branch failures are logged and reported; they never abort the
	/// remaining branches.
	pub async fn fetch_from_peer(&self, dir: &Path, peer_url: &str) -> Result<FetchReport, GitlaneError> {
		let client = self.client(peer_url)?;
		let refs = client.refs().await?.refs;
		if refs.is_empty() {
			return Err(GitlaneError::NotFound { what: format!("branches on {}", client.base_url()) });
		}

		let mut branches = Vec::with_capacity(refs.len());
		for r in &refs {
			let outcome = match self.fetch_ref(&client, dir, r).await {
				Ok(outcome) => outcome,
				Err(e) => {
					warn!("Fetching {} from {} failed: {}", r.name, client.base_url(), e);
					RefOutcome::Failed { message: e.to_string() }
				}
			};
			branches.push(RefReport { name: r.name.clone(), sha: r.sha.clone(), outcome });
		}

		info!(
			"Fetched {} branches from {} ({} failed)",
			refs.len(),
			client.base_url(),
			branches.iter().filter(|b| matches!(b.outcome, RefOutcome::Failed { .. })).count()
		);
		Ok(FetchReport { refs, branches })
	}

	async fn fetch_ref(&self, client: &PeerClient, dir: &Path, r: &Ref) -> Result<RefOutcome, GitlaneError> {
		if self.store.has_commit(dir, &r.sha).await? {
			self.policy.apply(self.store.as_ref(), dir, &r.name, &r.sha).await?;
			return Ok(RefOutcome::UpToDate);
		}

		let pack = client.pack(&r.name).await?;
		let bytes = base64::engine::general_purpose::STANDARD.decode(pack.pack.as_bytes())?;
		self.store.index_packfile(dir, &bytes).await?;
		self.policy.apply(self.store.as_ref(), dir, &r.name, &r.sha).await?;
		debug!("{} -> {} ({} commits, {} bytes)", r.name, r.sha, pack.commits, bytes.len());
		Ok(RefOutcome::Transferred { commits: pack.commits })
	}

	/// Send `branch` and its history to the peer, which force-writes it
	pub async fn push_to_peer(
		&self,
		dir: &Path,
		peer_url: &str,
		branch: &str,
	) -> Result<ReceiveResponse, GitlaneError> {
		let client = self.client(peer_url)?;
		let sha = self.store.resolve_ref(dir, branch).await?;
		let history = self.store.log_ancestry(dir, branch, self.config.max_history_depth).await?;
		let pack = self.store.build_packfile(dir, &history).await?;

		let body = ReceiveRequest {
			ref_name: branch.to_string(),
			sha,
			pack: base64::engine::general_purpose::STANDARD.encode(&pack),
		};
		let response = client.receive(&body).await?;
		info!(
			"Pushed {} ({} commits) to {}",
			branch,
			history.len(),
			client.base_url()
		);
		Ok(response)
	}

	/// Create `<parent>/<repo_name>` from the peer's branches
	///
	/// Checkout of the first advertised branch is best effort: a clone
	/// whose history landed still succeeds when checkout fails.
	pub async fn clone_from_peer(
		&self,
		peer_url: &str,
		parent: &Path,
		repo_name: &str,
	) -> Result<CloneReport, GitlaneError> {
		let dir = parent.join(repo_name);
		if tokio::fs::metadata(&dir).await.is_ok() {
			return Err(GitlaneError::AlreadyExists { path: dir.display().to_string() });
		}

		self.store.init_repository(&dir).await?;
		let fetch = match self.fetch_from_peer(&dir, peer_url).await {
			Ok(fetch) => fetch,
			Err(e) => {
				if let Err(cleanup) = tokio::fs::remove_dir_all(&dir).await {
					warn!("Cannot remove partial clone {}: {}", dir.display(), cleanup);
				}
				return Err(e);
			}
		};

		let mut checked_out = None;
		if let Some(first) = fetch.refs.first() {
			match self.store.checkout(&dir, &first.name).await {
				Ok(()) => checked_out = Some(first.name.clone()),
				Err(e) => warn!("Checkout of {} in {} failed: {}", first.name, dir.display(), e),
			}
		}

		info!("Cloned {} into {}", peer_url, dir.display());
		Ok(CloneReport { dir, fetch, checked_out })
	}
}

// vim: ts=4

//! File-backed version store
//!
//! Repository layout:
//!
//! ```text
//! <repo>/.gitlane/HEAD                  current branch name
//! <repo>/.gitlane/refs/heads/<branch>   commit id
//! <repo>/.gitlane/objects/<xx>/<rest>   "<kind>\0<payload>"
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs as afs;

use super::pack::{object_id, parse_pack, ObjectKind, PackBuilder, PackedObject};
use super::{is_object_id, validate_ref_name, StoreResult, VersionStore};
use crate::error::StoreError;
use crate::logging::*;

const META_DIR: &str = ".gitlane";
const DEFAULT_BRANCH: &str = "main";

/// Commit object payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
	pub parents: Vec<String>,
	pub message: String,
	pub timestamp: u64,
	/// Working-tree path (with `/` separators) to blob id
	pub files: BTreeMap<String, String>,
}

/// Version store keeping objects and refs under `<repo>/.gitlane`
#[derive(Debug, Clone, Copy, Default)]
pub struct FsStore;

impl FsStore {
	pub fn new() -> Self {
		FsStore
	}

	/// Whether `dir` holds a repository
	pub fn is_repository(dir: &Path) -> bool {
		dir.join(META_DIR).is_dir()
	}

	/// Name of the branch HEAD points at
	pub async fn current_branch(&self, dir: &Path) -> StoreResult<String> {
		self.ensure_repo(dir)?;
		let head = afs::read_to_string(dir.join(META_DIR).join("HEAD")).await?;
		let branch = head.trim().to_string();
		validate_ref_name(&branch)?;
		Ok(branch)
	}

	/// Snapshot the working tree into a new commit on the current branch
	pub async fn commit_all(&self, dir: &Path, message: &str) -> StoreResult<String> {
		self.ensure_repo(dir)?;
		let branch = self.current_branch(dir).await?;

		let mut files = BTreeMap::new();
		for rel in walk_working_tree(dir).await? {
			let data = afs::read(dir.join(&rel)).await?;
			let id = self.write_object(dir, ObjectKind::Blob, &data).await?;
			files.insert(rel, id);
		}

		let parents = match self.resolve_ref(dir, &branch).await {
			Ok(parent) => vec![parent],
			Err(StoreError::NotFound { .. }) => vec![],
			Err(e) => return Err(e),
		};
		let commit = Commit {
			parents,
			message: message.to_string(),
			timestamp: SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0),
			files,
		};
		let data = serde_json::to_vec(&commit)
			.map_err(|e| StoreError::Corrupt { message: format!("encode commit: {}", e) })?;
		let id = self.write_object(dir, ObjectKind::Commit, &data).await?;
		self.force_write_ref(dir, &branch, &id).await?;
		debug!("Committed {} on {} in {}", id, branch, dir.display());
		Ok(id)
	}

	pub async fn read_commit(&self, dir: &Path, id: &str) -> StoreResult<Commit> {
		let (kind, data) = self.read_object(dir, id).await?;
		if kind != ObjectKind::Commit {
			return Err(StoreError::NotFound { what: format!("commit {}", id) });
		}
		serde_json::from_slice(&data)
			.map_err(|e| StoreError::Corrupt { message: format!("commit {}: {}", id, e) })
	}

	fn ensure_repo(&self, dir: &Path) -> StoreResult<()> {
		if !Self::is_repository(dir) {
			return Err(StoreError::NotFound { what: format!("repository at {}", dir.display()) });
		}
		Ok(())
	}

	fn object_path(dir: &Path, id: &str) -> PathBuf {
		dir.join(META_DIR).join("objects").join(&id[..2]).join(&id[2..])
	}

	fn ref_path(dir: &Path, name: &str) -> PathBuf {
		let mut path = dir.join(META_DIR).join("refs").join("heads");
		for part in name.split('/') {
			path.push(part);
		}
		path
	}

	async fn write_object(&self, dir: &Path, kind: ObjectKind, data: &[u8]) -> StoreResult<String> {
		let id = object_id(kind, data);
		let path = Self::object_path(dir, &id);
		if afs::metadata(&path).await.is_ok() {
			return Ok(id);
		}

		let mut encoded = Vec::with_capacity(data.len() + 8);
		encoded.extend_from_slice(kind.as_str().as_bytes());
		encoded.push(0);
		encoded.extend_from_slice(data);
		write_atomic(&path, &encoded).await?;
		Ok(id)
	}

	async fn read_object(&self, dir: &Path, id: &str) -> StoreResult<(ObjectKind, Vec<u8>)> {
		if !is_object_id(id) {
			return Err(StoreError::NotFound { what: format!("object {}", id) });
		}
		let mut raw = match afs::read(Self::object_path(dir, id)).await {
			Ok(raw) => raw,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				return Err(StoreError::NotFound { what: format!("object {}", id) });
			}
			Err(e) => return Err(e.into()),
		};
		let nul = raw
			.iter()
			.position(|b| *b == 0)
			.ok_or_else(|| StoreError::Corrupt { message: format!("object {} has no header", id) })?;
		let kind = std::str::from_utf8(&raw[..nul])
			.ok()
			.and_then(ObjectKind::parse)
			.ok_or_else(|| StoreError::Corrupt { message: format!("object {} has bad type", id) })?;
		let data = raw.split_off(nul + 1);
		Ok((kind, data))
	}
}

#[async_trait]
impl VersionStore for FsStore {
	async fn init_repository(&self, dir: &Path) -> StoreResult<()> {
		let meta = dir.join(META_DIR);
		afs::create_dir_all(meta.join("objects")).await?;
		afs::create_dir_all(meta.join("refs").join("heads")).await?;
		let head = meta.join("HEAD");
		if afs::metadata(&head).await.is_err() {
			afs::write(&head, format!("{}\n", DEFAULT_BRANCH)).await?;
		}
		Ok(())
	}

	async fn list_branch_names(&self, dir: &Path) -> StoreResult<Vec<String>> {
		self.ensure_repo(dir)?;
		let heads = dir.join(META_DIR).join("refs").join("heads");
		let mut names = Vec::new();
		let mut pending = vec![(heads, String::new())];

		while let Some((path, prefix)) = pending.pop() {
			let mut entries = afs::read_dir(&path).await?;
			while let Some(entry) = entries.next_entry().await? {
				let name = entry.file_name().to_string_lossy().into_owned();
				if name.ends_with(".lock") {
					continue;
				}
				let full = if prefix.is_empty() { name } else { format!("{}/{}", prefix, name) };
				if entry.file_type().await?.is_dir() {
					pending.push((entry.path(), full));
				} else {
					names.push(full);
				}
			}
		}

		names.sort();
		Ok(names)
	}

	async fn resolve_ref(&self, dir: &Path, name: &str) -> StoreResult<String> {
		self.ensure_repo(dir)?;
		let branch = if name == "HEAD" { self.current_branch(dir).await? } else { name.to_string() };
		validate_ref_name(&branch)?;

		let sha = match afs::read_to_string(Self::ref_path(dir, &branch)).await {
			Ok(contents) => contents.trim().to_string(),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				return Err(StoreError::NotFound { what: format!("branch {}", branch) });
			}
			Err(e) => return Err(e.into()),
		};
		if !is_object_id(&sha) {
			return Err(StoreError::Corrupt { message: format!("ref {} holds {:?}", branch, sha) });
		}
		Ok(sha)
	}

	async fn log_ancestry(
		&self,
		dir: &Path,
		reference: &str,
		max_depth: usize,
	) -> StoreResult<Vec<String>> {
		let tip = self.resolve_ref(dir, reference).await?;
		let mut seen = HashSet::new();
		let mut queue = VecDeque::from([tip]);
		let mut history = Vec::new();

		while let Some(id) = queue.pop_front() {
			if history.len() >= max_depth {
				break;
			}
			if !seen.insert(id.clone()) {
				continue;
			}
			let commit = self.read_commit(dir, &id).await?;
			history.push(id);
			queue.extend(commit.parents);
		}
		Ok(history)
	}

	async fn build_packfile(&self, dir: &Path, commit_ids: &[String]) -> StoreResult<Vec<u8>> {
		let mut builder = PackBuilder::new();
		let mut seen = HashSet::new();

		for id in commit_ids {
			if !seen.insert(id.clone()) {
				continue;
			}
			let (kind, data) = self.read_object(dir, id).await?;
			if kind != ObjectKind::Commit {
				return Err(StoreError::NotFound { what: format!("commit {}", id) });
			}
			let commit: Commit = serde_json::from_slice(&data)
				.map_err(|e| StoreError::Corrupt { message: format!("commit {}: {}", id, e) })?;
			builder.add(PackedObject { kind, data });

			for blob in commit.files.values() {
				if seen.insert(blob.clone()) {
					let (kind, data) = self.read_object(dir, blob).await?;
					builder.add(PackedObject { kind, data });
				}
			}
		}

		debug!("Packed {} objects for {} commits", builder.len(), commit_ids.len());
		builder.build()
	}

	async fn index_packfile(&self, dir: &Path, pack: &[u8]) -> StoreResult<()> {
		self.ensure_repo(dir)?;
		let objects = parse_pack(pack)?;
		let count = objects.len();
		for object in objects {
			self.write_object(dir, object.kind, &object.data).await?;
		}
		debug!("Indexed {} objects into {}", count, dir.display());
		Ok(())
	}

	async fn force_write_ref(&self, dir: &Path, name: &str, sha: &str) -> StoreResult<()> {
		self.ensure_repo(dir)?;
		validate_ref_name(name)?;
		if !is_object_id(sha) {
			return Err(StoreError::Corrupt { message: format!("{:?} is not a commit id", sha) });
		}
		write_atomic(&Self::ref_path(dir, name), format!("{}\n", sha).as_bytes()).await
	}

	async fn has_commit(&self, dir: &Path, sha: &str) -> StoreResult<bool> {
		match self.read_object(dir, sha).await {
			Ok((kind, _)) => Ok(kind == ObjectKind::Commit),
			Err(StoreError::NotFound { .. }) => Ok(false),
			Err(e) => Err(e),
		}
	}

	async fn checkout(&self, dir: &Path, branch: &str) -> StoreResult<()> {
		let target = self.read_commit(dir, &self.resolve_ref(dir, branch).await?).await?;

		// Files tracked by the old HEAD but absent from the target go away
		if let Ok(old) = self.resolve_ref(dir, "HEAD").await {
			if let Ok(previous) = self.read_commit(dir, &old).await {
				for path in previous.files.keys().filter(|p| !target.files.contains_key(*p)) {
					if let Some(rel) = safe_tree_path(path) {
						let _ = afs::remove_file(dir.join(rel)).await;
					}
				}
			}
		}

		for (path, blob) in &target.files {
			let rel = safe_tree_path(path)
				.ok_or_else(|| StoreError::Corrupt { message: format!("unsafe path {:?}", path) })?;
			let (_, data) = self.read_object(dir, blob).await?;
			let dest = dir.join(rel);
			if let Some(parent) = dest.parent() {
				afs::create_dir_all(parent).await?;
			}
			afs::write(&dest, data).await?;
		}

		afs::write(dir.join(META_DIR).join("HEAD"), format!("{}\n", branch)).await?;
		info!("Checked out {} ({} files) in {}", branch, target.files.len(), dir.display());
		Ok(())
	}
}

/// Write through a sibling temp file and rename into place
async fn write_atomic(path: &Path, data: &[u8]) -> StoreResult<()> {
	if let Some(parent) = path.parent() {
		afs::create_dir_all(parent).await?;
	}
	let mut tmp = path.as_os_str().to_owned();
	tmp.push(".lock");
	let tmp = PathBuf::from(tmp);
	afs::write(&tmp, data).await?;
	afs::rename(&tmp, path).await?;
	Ok(())
}

/// Manifest path as a relative path that stays inside the working tree
fn safe_tree_path(path: &str) -> Option<PathBuf> {
	let rel = PathBuf::from(path);
	let mut components = rel.components();
	let first = components.next()?;
	let all_normal =
		rel.components().all(|c| matches!(c, Component::Normal(_))) && !path.contains('\\');
	if !all_normal || first.as_os_str() == META_DIR {
		return None;
	}
	Some(rel)
}

/// Regular files under `dir`, relative, `/`-separated, skipping the metadata dir
async fn walk_working_tree(dir: &Path) -> StoreResult<Vec<String>> {
	let mut files = Vec::new();
	let mut pending = vec![(dir.to_path_buf(), String::new())];

	while let Some((path, prefix)) = pending.pop() {
		let mut entries = afs::read_dir(&path).await?;
		while let Some(entry) = entries.next_entry().await? {
			let name = entry.file_name().to_string_lossy().into_owned();
			if prefix.is_empty() && name == META_DIR {
				continue;
			}
			let rel = if prefix.is_empty() { name } else { format!("{}/{}", prefix, name) };
			let file_type = entry.file_type().await?;
			if file_type.is_dir() {
				pending.push((entry.path(), rel));
			} else if file_type.is_file() {
				files.push(rel);
			}
		}
	}

	files.sort();
	Ok(files)
}


// vim: ts=4

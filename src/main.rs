use clap::{Arg, ArgAction, ArgMatches, Command};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use gitlane::logging::*;
use gitlane::peer::{PeerSync, RefOutcome};
use gitlane::queue::{PushAttempt, PushQueue};
use gitlane::server::Hosting;
use gitlane::types::{absolute_dir, repo_name};
use gitlane::{Config, FsStore, GitlaneError, VersionStore};

fn cli() -> Command {
	Command::new("gitlane")
		.version(env!("CARGO_PKG_VERSION"))
		.about("Share repositories between devices on the same network")
		.subcommand_required(true)
		.arg(Arg::new("port").short('p').long("port").global(true).value_name("PORT").help("Server port"))
		.subcommand(Command::new("init").about("Create an empty repository").arg(Arg::new("dir").required(true)))
		.subcommand(
			Command::new("commit")
				.about("Commit the working tree on the current branch")
				.arg(Arg::new("dir").required(true))
				.arg(Arg::new("message").short('m').long("message").required(true)),
		)
		.subcommand(
			Command::new("serve")
				.about("Host a repository for peers until interrupted")
				.arg(Arg::new("dir").required(true)),
		)
		.subcommand(
			Command::new("clone")
				.about("Clone a peer's repository")
				.arg(Arg::new("peer").required(true))
				.arg(Arg::new("name").required(true))
				.arg(Arg::new("into").long("into").value_name("PARENT").help("Parent directory")),
		)
		.subcommand(
			Command::new("fetch")
				.about("Fetch every branch from a peer")
				.arg(Arg::new("peer").required(true))
				.arg(Arg::new("repo").long("repo").value_name("DIR")),
		)
		.subcommand(
			Command::new("push")
				.about("Push a branch to a peer")
				.arg(Arg::new("peer").required(true))
				.arg(Arg::new("branch").required(true))
				.arg(Arg::new("repo").long("repo").value_name("DIR"))
				.arg(
					Arg::new("queue")
						.long("queue")
						.action(ArgAction::SetTrue)
						.help("Queue the push if the peer is unreachable"),
				),
		)
		.subcommand(
			Command::new("queue")
				.about("Inspect or replay deferred pushes")
				.subcommand_required(true)
				.subcommand(Command::new("list").about("Show pending pushes"))
				.subcommand(
					Command::new("flush")
						.about("Retry every pending push")
						.arg(Arg::new("peer").required(true))
						.arg(Arg::new("branch").long("branch").help("Branch to push (default: current)")),
				),
		)
}

/// Directory argument in absolute form, defaulting to the working directory
async fn repo_arg(matches: &ArgMatches, name: &str) -> PathBuf {
	let dir = matches.get_one::<String>(name).map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
	absolute_dir(&dir).await
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str, GitlaneError> {
	matches
		.get_one::<String>(name)
		.map(String::as_str)
		.ok_or_else(|| GitlaneError::InvalidConfig { message: format!("{} argument required", name) })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
	let matches = cli().get_matches();

	let mut config = Config::load()?;
	if let Some(port) = matches.get_one::<String>("port") {
		config.server.port = port.parse().map_err(|_| format!("invalid port: {}", port))?;
	}
	init_tracing(&config.log_level);

	let store = FsStore::new();
	let shared: Arc<dyn VersionStore> = Arc::new(store);
	let sync = PeerSync::new(Arc::clone(&shared), config.peer.clone());

	match matches.subcommand() {
		Some(("init", sub)) => {
			let dir = repo_arg(sub, "dir").await;
			store.init_repository(&dir).await?;
			println!("Initialized empty repository in {}", dir.display());
		}
		Some(("commit", sub)) => {
			let dir = repo_arg(sub, "dir").await;
			let sha = store.commit_all(&dir, required(sub, "message")?).await?;
			println!("{}", sha);
		}
		Some(("serve", sub)) => {
			let dir = repo_arg(sub, "dir").await;
			if !FsStore::is_repository(&dir) {
				return Err(format!("{} is not a repository", dir.display()).into());
			}
			let hosting = Hosting::new();
			let mut handle = hosting.start(&dir, shared, &config.server).await?;
			println!("Serving {} on {}", repo_name(&dir), handle.local_addr());
			gitlane::shutdown::wait_for_shutdown().await;
			handle.stop().await;
		}
		Some(("clone", sub)) => {
			let parent = repo_arg(sub, "into").await;
			let report = sync.clone_from_peer(required(sub, "peer")?, &parent, required(sub, "name")?).await?;
			print_fetch(&report.fetch.branches);
			match report.checked_out {
				Some(branch) => println!("Cloned into {} ({} checked out)", report.dir.display(), branch),
				None => println!("Cloned into {} (checkout failed)", report.dir.display()),
			}
		}
		Some(("fetch", sub)) => {
			let dir = repo_arg(sub, "repo").await;
			let report = sync.fetch_from_peer(&dir, required(sub, "peer")?).await?;
			print_fetch(&report.branches);
			println!("{} branches", report.refs.len());
		}
		Some(("push", sub)) => {
			let dir = repo_arg(sub, "repo").await;
			let peer = required(sub, "peer")?;
			let branch = required(sub, "branch")?;
			if sub.get_flag("queue") {
				let queue = PushQueue::open(config.queue_path()).await?;
				let token = std::env::var("GITLANE_TOKEN").unwrap_or_default();
				let attempt = queue
					.push_or_enqueue(&dir, &repo_name(&dir), &token, |dir, _token| {
						let sync = sync.clone();
						let peer = peer.to_string();
						let branch = branch.to_string();
						async move { sync.push_to_peer(&dir, &peer, &branch).await.map(|_| ()) }
					})
					.await?;
				match attempt {
					PushAttempt::Pushed => println!("Pushed {}", branch),
					PushAttempt::Queued => println!("Peer unreachable, push queued"),
				}
			} else {
				let response = sync.push_to_peer(&dir, peer, branch).await?;
				println!("Pushed {} -> {}", response.ref_name, response.sha);
			}
		}
		Some(("queue", sub)) => {
			let queue = PushQueue::open(config.queue_path()).await?;
			match sub.subcommand() {
				Some(("list", _)) => {
					for entry in queue.entries().await {
						println!("{}\t{}\t{}", entry.id, entry.repo_name, entry.dir.display());
					}
				}
				Some(("flush", flush)) => {
					let peer = required(flush, "peer")?.to_string();
					let branch = flush.get_one::<String>("branch").cloned();
					let token = std::env::var("GITLANE_TOKEN").unwrap_or_default();
					let summary = queue
						.flush(&token, |dir, _token| {
							let sync = sync.clone();
							let peer = peer.clone();
							let branch = branch.clone();
							async move { push_current(&store, &sync, &dir, &peer, branch).await }
						})
						.await;
					println!("{} pushed, {} still queued", summary.succeeded, summary.failed);
				}
				_ => unreachable!("subcommand_required"),
			}
		}
		_ => unreachable!("subcommand_required"),
	}

	Ok(())
}

async fn push_current(
	store: &FsStore,
	sync: &PeerSync,
	dir: &Path,
	peer: &str,
	branch: Option<String>,
) -> Result<(), GitlaneError> {
	let branch = match branch {
		Some(branch) => branch,
		None => store.current_branch(dir).await?,
	};
	sync.push_to_peer(dir, peer, &branch).await.map(|_| ())
}

fn print_fetch(branches: &[gitlane::peer::RefReport]) {
	for branch in branches {
		match &branch.outcome {
			RefOutcome::UpToDate => println!("  {} {} (up to date)", branch.name, &branch.sha[..12.min(branch.sha.len())]),
			RefOutcome::Transferred { commits } => {
				println!("  {} {} ({} commits)", branch.name, &branch.sha[..12.min(branch.sha.len())], commits)
			}
			RefOutcome::Failed { message } => {
				warn!("{} failed: {}", branch.name, message);
				println!("  {} FAILED: {}", branch.name, message);
			}
		}
	}
}

// vim: ts=4

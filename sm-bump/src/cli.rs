///
/// This module implements the CLI for sm-bump: command parsing, wiring of the
/// concrete collaborators and user-visible output.
///
/// All pipeline logic lives in the [`sm-bump-core`] crate. This module only maps
/// commands onto core entry points.
///
/// ## Commands
/// - `sync`: full bump (resolve, fetch, publish, pointer commit, patch, commit)
/// - `resume`: re-download, patch and commit for the persisted changeset
/// - `latest [--fetch]`: print the latest upstream release, optionally fetching its CI artifacts
/// - `fetch`: download the CI artifacts for a changeset
/// - `download`: download the canonical archive for the persisted changeset
/// - `status`: print the persisted changeset and the last checkpoint
///
/// [`sm-bump-core`]: ../../sm-bump-core/
use crate::load_config::load_config;
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use sm_bump_core::command::SystemCommandRunner;
use sm_bump_core::config::PipelineConfig;
use sm_bump_core::contract::{CommandRunner, StateStore};
use sm_bump_core::fetch::{fetch_ci_artifacts, DownloadedArtifact};
use sm_bump_core::patch::CommandPatchApplier;
use sm_bump_core::resolve::resolve_latest;
use sm_bump_core::state::{require_changeset, FileStateStore};
use sm_bump_core::synchronise::{
    apply_patches, download_canonical, last_checkpoint, synchronise, Collaborators, SyncOptions,
    SyncOutcome,
};
use sm_bump_core::upstream::HttpClient;
use std::path::PathBuf;
use std::sync::Arc;

/// CLI for sm-bump: keep mozjs in sync with upstream SpiderMonkey ESR releases.
#[derive(Parser)]
#[clap(
    name = "sm-bump",
    version,
    about = "Republish the latest SpiderMonkey ESR source release and apply the mozjs patches"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArg {
    /// Path to a YAML pipeline config (defaults are used when omitted)
    #[clap(long)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Bump to the latest upstream release: publish, commit the pointer, apply patches, commit
    Sync {
        #[clap(flatten)]
        config: ConfigArg,
        /// Run even when the persisted changeset is already the latest
        #[clap(long)]
        force: bool,
    },
    /// Resume after the pointer commit: re-download, patch and commit
    Resume {
        #[clap(flatten)]
        config: ConfigArg,
    },
    /// Print the latest upstream release tag and changeset
    Latest {
        #[clap(flatten)]
        config: ConfigArg,
        /// Also download the CI artifacts of that changeset into the work dir
        #[clap(long)]
        fetch: bool,
    },
    /// Download the CI artifacts for a changeset into the work dir
    Fetch {
        #[clap(flatten)]
        config: ConfigArg,
        /// Changeset to fetch (defaults to the persisted one)
        #[clap(long)]
        changeset: Option<String>,
    },
    /// Download the canonical source archive for the persisted changeset
    Download {
        #[clap(flatten)]
        config: ConfigArg,
    },
    /// Show the persisted changeset and the last pipeline checkpoint
    Status {
        #[clap(flatten)]
        config: ConfigArg,
    },
}

/// Concrete collaborators for a real run.
struct Runtime {
    http: HttpClient,
    runner: Arc<SystemCommandRunner>,
    state: FileStateStore,
    patcher: CommandPatchApplier,
}

impl Runtime {
    fn new(config: &PipelineConfig) -> Result<Self> {
        let runner = Arc::new(SystemCommandRunner);
        let patcher = CommandPatchApplier::new(
            config.patch.clone(),
            config.repository.work_dir.clone(),
            runner.clone(),
        );
        Ok(Self {
            http: HttpClient::new(config)?,
            runner,
            state: FileStateStore::new(config.repository.state_path()),
            patcher,
        })
    }

    fn collaborators(&self) -> Collaborators<'_> {
        Collaborators {
            upstream: &self.http,
            releases: &self.http,
            runner: self.runner.as_ref(),
            state: &self.state,
            patcher: &self.patcher,
        }
    }
}

fn print_artifacts(artifacts: &[DownloadedArtifact]) {
    for artifact in artifacts {
        println!(
            "{} <- task {} run {}: {} ({} bytes, sha256 {})",
            artifact.path.display(),
            artifact.task_id,
            artifact.run,
            artifact.remote_name,
            artifact.bytes,
            artifact.sha256
        );
    }
}

/// Async CLI entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Sync { config, force } => {
            let config = load_config(config.config)?;
            let runtime = Runtime::new(&config)?;
            tracing::info!(command = "sync", force, "Starting synchronisation");
            println!("Synchronise starting...");
            match synchronise(&config, &runtime.collaborators(), SyncOptions { force }).await? {
                SyncOutcome::UpToDate(release) => {
                    println!(
                        "Already up to date at {} (changeset {}).",
                        release.tag, release.changeset
                    );
                }
                SyncOutcome::Resumed { release, patches } => {
                    println!(
                        "Completed interrupted run for {} (changeset {}).\nReport:",
                        release.tag, release.changeset
                    );
                    println!("{:#?}", patches);
                }
                SyncOutcome::Synchronised(report) => {
                    println!("Synchronise complete.\nReport:");
                    println!("{:#?}", report);
                }
            }
        }
        Commands::Resume { config } => {
            let config = load_config(config.config)?;
            let runtime = Runtime::new(&config)?;
            tracing::info!(command = "resume", "Resuming from pointer checkpoint");
            let report = apply_patches(&config, &runtime.collaborators()).await?;
            println!("Patches applied.\nReport:");
            println!("{:#?}", report);
        }
        Commands::Latest { config, fetch } => {
            let config = load_config(config.config)?;
            let http = HttpClient::new(&config)?;
            let release = resolve_latest(&http, &config.upstream).await?;
            println!(
                "Latest tag: {}, changeset: {} (version {})",
                release.tag, release.changeset, release.sort_key
            );
            if fetch {
                let artifacts = fetch_ci_artifacts(&http, &config, &release.changeset).await?;
                print_artifacts(&artifacts);
            }
        }
        Commands::Fetch { config, changeset } => {
            let config = load_config(config.config)?;
            let runtime = Runtime::new(&config)?;
            let changeset = match changeset {
                Some(changeset) => changeset,
                None => require_changeset(&runtime.state)?,
            };
            println!("Commit: {changeset}");
            let artifacts = fetch_ci_artifacts(&runtime.http, &config, &changeset).await?;
            print_artifacts(&artifacts);
        }
        Commands::Download { config } => {
            let config = load_config(config.config)?;
            let runtime = Runtime::new(&config)?;
            let report = download_canonical(&config, &runtime.http, &runtime.state).await?;
            println!(
                "Downloaded {} from {} ({} bytes, sha256 {})",
                report.archive.display(),
                report.release_id,
                report.bytes,
                report.sha256
            );
        }
        Commands::Status { config } => {
            let config = load_config(config.config)?;
            let state = FileStateStore::new(config.repository.state_path());
            let runner = SystemCommandRunner;
            match state.read()? {
                Some(changeset) => println!("Persisted changeset: {changeset}"),
                None => println!(
                    "No persisted changeset at {}",
                    state.tracked_path().display()
                ),
            }
            let checkpoint = last_checkpoint(&config, &runner as &dyn CommandRunner).await?;
            println!("Last checkpoint: {:?}", checkpoint);
        }
    }

    Ok(())
}

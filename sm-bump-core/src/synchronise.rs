//! High-level pipeline: resolve → locate → fetch → publish → pointer commit → patch → commit.
//!
//! # Checkpoints
//! The run produces two commits. The first records the new changeset in the state
//! file; the second holds the patched source tree. A failure between them leaves the
//! repository with the pointer updated and patches missing, which
//! [`last_checkpoint`] detects and [`apply_patches`] resumes.
//!
//! # Up-to-date runs
//! When the resolved changeset equals the persisted one, [`synchronise`] makes no CI
//! lookup. It checks the working tree instead: an uncommitted state file is committed
//! and a pending patch step is run, reported as [`SyncOutcome::Resumed`]. Otherwise
//! the run reports [`SyncOutcome::UpToDate`]. With [`SyncOptions::force`]
//! the full sequence runs anyway and a duplicate release fails as
//! [`SyncError::PublishConflict`].
//!
//! # Error Handling
//! Every failure halts the run. Nothing is rolled back: an already created release
//! stays published.

use std::fs;
use std::path::PathBuf;
use tracing::{error, info, warn};

use crate::config::PipelineConfig;
use crate::contract::{CommandRunner, PatchApplier, ReleaseAssets, StateStore, UpstreamClient};
use crate::error::SyncError;
use crate::fetch::{fetch_all, DownloadedArtifact};
use crate::git;
use crate::locate::locate;
use crate::publish::{publish, Release};
use crate::resolve::{resolve_latest, ResolvedRelease};
use crate::state::require_changeset;

/// Everything the pipeline talks to.
pub struct Collaborators<'a> {
    pub upstream: &'a dyn UpstreamClient,
    pub releases: &'a dyn ReleaseAssets,
    pub runner: &'a dyn CommandRunner,
    pub state: &'a dyn StateStore,
    pub patcher: &'a dyn PatchApplier,
}

/// Pipeline progress. Stages only move forward; there is no rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Idle,
    Resolved,
    Located,
    Fetched,
    Published,
    PointerCommitted,
    Patched,
    Complete,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Run the full pipeline even when the persisted changeset is already the latest.
    pub force: bool,
}

#[derive(Debug)]
pub enum SyncOutcome {
    /// Both checkpoints exist for the latest changeset.
    UpToDate(ResolvedRelease),
    /// The latest changeset was already recorded by an interrupted run, which has
    /// now been completed from the pointer checkpoint onward.
    Resumed {
        release: ResolvedRelease,
        patches: PatchReport,
    },
    Synchronised(SynchroniseReport),
}

#[derive(Debug)]
pub struct SynchroniseReport {
    pub release: ResolvedRelease,
    pub previous_changeset: Option<String>,
    pub push_id: u64,
    pub artifacts: Vec<DownloadedArtifact>,
    pub published: Release,
    pub patches: PatchReport,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchReport {
    pub changeset: String,
    pub release_id: String,
    pub archive: PathBuf,
    pub bytes: u64,
    pub sha256: String,
}

/// The last checkpoint found in version control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Checkpoint {
    /// The latest commit is the pointer update; patches still need applying.
    PendingPatches,
    /// The latest commit is the patch commit.
    Patched,
    /// The latest commit is unrelated to the pipeline.
    Other(String),
}

fn advance(stage: &mut Stage, next: Stage) {
    info!(from = ?*stage, to = ?next, "[SYNC] Stage transition");
    *stage = next;
}

/// Run the full pipeline.
pub async fn synchronise(
    config: &PipelineConfig,
    deps: &Collaborators<'_>,
    options: SyncOptions,
) -> Result<SyncOutcome, SyncError> {
    info!("[SYNC] Starting synchronisation pipeline");
    let mut stage = Stage::Idle;
    let result = run_pipeline(config, deps, options, &mut stage).await;
    if let Err(e) = &result {
        error!(stage = ?stage, failed = e.stage(), error = %e, "[SYNC][ERROR] Pipeline halted");
    }
    result
}

async fn run_pipeline(
    config: &PipelineConfig,
    deps: &Collaborators<'_>,
    options: SyncOptions,
    stage: &mut Stage,
) -> Result<SyncOutcome, SyncError> {
    // Step 1: resolve
    let release = resolve_latest(deps.upstream, &config.upstream).await?;
    let previous_changeset = deps.state.read()?;
    advance(stage, Stage::Resolved);

    if previous_changeset.as_deref() == Some(release.changeset.as_str()) {
        if !options.force {
            return finish_current(config, deps, release, stage).await;
        }
        warn!(changeset = %release.changeset, "[SYNC] Already at latest changeset, continuing because of --force");
    }

    // Step 2: locate and fetch
    let located = locate(deps.upstream, &config.upstream, &config.ci, &release.changeset).await?;
    advance(stage, Stage::Located);
    let artifacts = fetch_all(deps.upstream, config, &located).await?;
    advance(stage, Stage::Fetched);

    // Step 3: publish
    let files: Vec<PathBuf> = artifacts.iter().map(|a| a.path.clone()).collect();
    let published = publish(
        deps.runner,
        &config.release,
        &config.upstream,
        &release.tag,
        &release.changeset,
        &files,
    )
    .await?;
    advance(stage, Stage::Published);

    // Step 4: best-effort cleanup of the CI copies
    for file in &files {
        if let Err(e) = fs::remove_file(file) {
            warn!(error = ?e, path = %file.display(), "[SYNC] Could not remove fetched artifact");
        }
    }

    // Step 5: checkpoint A
    deps.state.write(&release.changeset)?;
    git::stage(deps.runner, &config.repository, &deps.state.tracked_path()).await?;
    git::commit(deps.runner, &config.repository, &config.repository.pointer_message).await?;
    advance(stage, Stage::PointerCommitted);

    // Steps 6-9
    let patches = patch_and_commit(config, deps, stage).await?;

    info!(
        tag = %release.tag,
        changeset = %release.changeset,
        release_id = %published.id,
        "[SYNC] Synchronisation complete"
    );
    Ok(SyncOutcome::Synchronised(SynchroniseReport {
        release,
        previous_changeset,
        push_id: located.push_id,
        artifacts,
        published,
        patches,
    }))
}

/// Download the canonical asset of the release for the persisted changeset.
pub async fn download_canonical(
    config: &PipelineConfig,
    releases: &dyn ReleaseAssets,
    state: &dyn StateStore,
) -> Result<PatchReport, SyncError> {
    let changeset = require_changeset(state)?;
    let release_id = config.release.release_id(&changeset);
    let archive = config.repository.resolve(&config.release.canonical_asset);
    info!(release_id = %release_id, archive = %archive.display(), "[SYNC] Fetching canonical archive");
    let stats = releases
        .download_asset(&release_id, &config.release.canonical_asset, &archive)
        .await?;
    Ok(PatchReport {
        changeset,
        release_id,
        archive,
        bytes: stats.bytes,
        sha256: stats.sha256,
    })
}

/// The persisted changeset is already the latest. Completes whichever checkpoint an
/// earlier run left unfinished; reports `UpToDate` only when both are in place.
async fn finish_current(
    config: &PipelineConfig,
    deps: &Collaborators<'_>,
    release: ResolvedRelease,
    stage: &mut Stage,
) -> Result<SyncOutcome, SyncError> {
    let state_path = deps.state.tracked_path();
    if git::has_changes(deps.runner, &config.repository, &state_path).await? {
        warn!(changeset = %release.changeset, path = %state_path.display(), "[SYNC] Pointer written but not committed, committing it now");
        git::stage(deps.runner, &config.repository, &state_path).await?;
        git::commit(deps.runner, &config.repository, &config.repository.pointer_message).await?;
    } else if last_checkpoint(config, deps.runner).await? != Checkpoint::PendingPatches {
        info!(changeset = %release.changeset, tag = %release.tag, "[SYNC] Already at latest changeset, nothing to do");
        return Ok(SyncOutcome::UpToDate(release));
    }
    advance(stage, Stage::PointerCommitted);

    warn!(changeset = %release.changeset, "[SYNC] Patches pending for the latest changeset, resuming");
    let patches = patch_and_commit(config, deps, stage).await?;
    Ok(SyncOutcome::Resumed { release, patches })
}

async fn patch_and_commit(
    config: &PipelineConfig,
    deps: &Collaborators<'_>,
    stage: &mut Stage,
) -> Result<PatchReport, SyncError> {
    // Step 6: re-download from the published release, not from CI
    let report = download_canonical(config, deps.releases, deps.state).await?;

    // Step 7
    deps.patcher.apply(&report.archive).await?;
    advance(stage, Stage::Patched);

    // Step 8
    fs::remove_file(&report.archive).map_err(|e| SyncError::io(&report.archive, e))?;

    // Step 9: checkpoint B
    git::stage_all(deps.runner, &config.repository).await?;
    git::commit(deps.runner, &config.repository, &config.repository.patch_message).await?;
    advance(stage, Stage::Complete);
    Ok(report)
}

/// Resume an interrupted run from the canonical re-download onward, using the
/// persisted changeset.
pub async fn apply_patches(
    config: &PipelineConfig,
    deps: &Collaborators<'_>,
) -> Result<PatchReport, SyncError> {
    info!("[SYNC] Resuming from pointer checkpoint");
    let mut stage = Stage::PointerCommitted;
    let result = patch_and_commit(config, deps, &mut stage).await;
    if let Err(e) = &result {
        error!(stage = ?stage, failed = e.stage(), error = %e, "[SYNC][ERROR] Resume halted");
    }
    result
}

/// Classify the latest commit against the two checkpoint messages.
pub async fn last_checkpoint(
    config: &PipelineConfig,
    runner: &dyn CommandRunner,
) -> Result<Checkpoint, SyncError> {
    let subject = git::head_subject(runner, &config.repository).await?;
    let checkpoint = if subject == config.repository.pointer_message {
        Checkpoint::PendingPatches
    } else if subject == config.repository.patch_message {
        Checkpoint::Patched
    } else {
        Checkpoint::Other(subject)
    };
    info!(?checkpoint, "[SYNC] Last checkpoint");
    Ok(checkpoint)
}

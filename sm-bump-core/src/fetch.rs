//! Artifact retrieval from finished CI tasks.
//!
//! A task's artifact list stays empty until its run completes, so an empty list
//! advances to the next run index, up to a fixed bound. A non-empty list without a
//! matching name is a configuration mismatch and fails immediately.

use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

use crate::config::PipelineConfig;
use crate::contract::{ArtifactRecord, UpstreamClient};
use crate::error::{ArtifactMiss, SyncError};
use crate::locate::{locate, LocatedTasks};

/// A CI artifact materialised on local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedArtifact {
    pub task_id: String,
    pub run: u32,
    pub remote_name: String,
    pub path: PathBuf,
    pub bytes: u64,
    pub sha256: String,
}

/// First artifact whose name contains `substring`.
fn find_artifact<'a>(artifacts: &'a [ArtifactRecord], substring: &str) -> Option<&'a ArtifactRecord> {
    artifacts.iter().find(|a| a.name.contains(substring))
}

/// Download the first artifact of `task_id` whose name contains `substring` to
/// `dest`, trying run indices `0..max_attempts` while the artifact list is empty.
pub async fn fetch(
    upstream: &dyn UpstreamClient,
    task_id: &str,
    substring: &str,
    dest: &Path,
    max_attempts: u32,
) -> Result<DownloadedArtifact, SyncError> {
    for run in 0..max_attempts {
        debug!(task_id = %task_id, run, "[FETCH] Listing artifacts");
        let artifacts = upstream.list_artifacts(task_id, run).await?;
        if artifacts.is_empty() {
            info!(task_id = %task_id, run, "[FETCH] No artifacts yet, trying next run");
            continue;
        }

        let Some(artifact) = find_artifact(&artifacts, substring) else {
            error!(task_id = %task_id, run, substring = %substring, "[FETCH][ERROR] No artifact name matches");
            return Err(SyncError::ArtifactNotFound {
                task_id: task_id.to_string(),
                cause: ArtifactMiss::NoMatch {
                    substring: substring.to_string(),
                },
            });
        };

        info!(task_id = %task_id, run, artifact = %artifact.name, dest = %dest.display(), "[FETCH] Downloading");
        let stats = upstream
            .download_artifact(task_id, run, &artifact.name, dest)
            .await?;
        info!(bytes = stats.bytes, sha256 = %stats.sha256, dest = %dest.display(), "[FETCH] Download complete");
        return Ok(DownloadedArtifact {
            task_id: task_id.to_string(),
            run,
            remote_name: artifact.name.clone(),
            path: dest.to_path_buf(),
            bytes: stats.bytes,
            sha256: stats.sha256,
        });
    }

    error!(task_id = %task_id, attempts = max_attempts, "[FETCH][ERROR] Artifact list still empty");
    Err(SyncError::ArtifactNotFound {
        task_id: task_id.to_string(),
        cause: ArtifactMiss::Empty {
            attempts: max_attempts,
        },
    })
}

/// Fetch every configured artifact from already-located tasks, in config order.
pub async fn fetch_all(
    upstream: &dyn UpstreamClient,
    config: &PipelineConfig,
    located: &LocatedTasks,
) -> Result<Vec<DownloadedArtifact>, SyncError> {
    let mut downloaded = Vec::with_capacity(config.ci.artifacts.len());
    for spec in &config.ci.artifacts {
        let task_id = located.task_for(&spec.job).ok_or_else(|| {
            SyncError::Config(format!("no located task for job role {:?}", spec.job))
        })?;
        let dest = config.repository.resolve(&spec.file);
        downloaded.push(fetch(upstream, task_id, &spec.name, &dest, config.ci.max_attempts).await?);
    }
    Ok(downloaded)
}

/// Locate the CI tasks for `changeset` and download all configured artifacts.
pub async fn fetch_ci_artifacts(
    upstream: &dyn UpstreamClient,
    config: &PipelineConfig,
    changeset: &str,
) -> Result<Vec<DownloadedArtifact>, SyncError> {
    let located = locate(upstream, &config.upstream, &config.ci, changeset).await?;
    fetch_all(upstream, config, &located).await
}

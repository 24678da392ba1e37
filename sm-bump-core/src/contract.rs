//! # contract: collaborator interfaces for the bump pipeline
//!
//! Every system the pipeline talks to sits behind one of the traits below:
//!
//! - [`UpstreamClient`]: hg tag registry, Treeherder push/job index, Taskcluster artifacts
//! - [`ReleaseAssets`]: downloads from the published release hosting
//! - [`CommandRunner`]: external processes (`gh`, `git`, the patch script)
//! - [`StateStore`]: the persisted "last synchronised changeset" record
//! - [`PatchApplier`]: the extraction/patch step over a downloaded archive
//!
//! ## Mocking & Testing
//! - The traits are annotated for `mockall`; mocks are exported behind the default
//!   `test-export-mocks` feature so integration tests can script every remote answer.

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::SyncError;

/// One entry of the upstream tag registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRecord {
    pub tag: String,
    /// Changeset the tag points at.
    pub node: String,
}

/// CI's indexing of a changeset to an internal push id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushRecord {
    pub id: u64,
    #[serde(default)]
    pub revision: Option<String>,
}

/// A Treeherder job row. Fields are positional; the job name and task id sit at
/// fixed indices described by the endpoint's `job_property_names`.
pub type JobRecord = Vec<serde_json::Value>;

/// One file produced by a CI task run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub name: String,
    #[serde(default, rename = "contentType")]
    pub content_type: Option<String>,
}

/// Byte count and SHA-256 digest of a file written to disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadStats {
    pub bytes: u64,
    pub sha256: String,
}

/// Read-only access to the upstream tag registry and the CI indices.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Full tag list of the upstream repository.
    async fn fetch_tags(&self, repo: &str) -> Result<Vec<TagRecord>, SyncError>;

    /// Pushes indexing the changeset, most recent first.
    async fn fetch_pushes(&self, repo: &str, changeset: &str)
        -> Result<Vec<PushRecord>, SyncError>;

    /// All job rows of a push.
    async fn fetch_jobs(&self, push_id: u64) -> Result<Vec<JobRecord>, SyncError>;

    /// Artifacts of one run of a task. Empty while the run is unfinished.
    async fn list_artifacts(&self, task_id: &str, run: u32)
        -> Result<Vec<ArtifactRecord>, SyncError>;

    /// Download a named artifact of a task run to `dest`.
    async fn download_artifact(
        &self,
        task_id: &str,
        run: u32,
        name: &str,
        dest: &Path,
    ) -> Result<DownloadStats, SyncError>;
}

/// Read access to assets of published releases.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ReleaseAssets: Send + Sync {
    async fn download_asset(
        &self,
        release_id: &str,
        asset: &str,
        dest: &Path,
    ) -> Result<DownloadStats, SyncError>;
}

/// An external command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Exit status and captured output of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success() -> Self {
        Self {
            status: Some(0),
            ..Self::default()
        }
    }

    pub fn failure(status: i32, stderr: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Runs external commands. Only launch failures are errors here; a non-zero exit
/// is reported through [`CommandOutput::status`].
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &CommandSpec) -> std::io::Result<CommandOutput>;
}

/// The persisted "last synchronised changeset" record.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait StateStore: Send + Sync {
    /// `None` when no changeset has been recorded yet.
    fn read(&self) -> Result<Option<String>, SyncError>;

    fn write(&self, changeset: &str) -> Result<(), SyncError>;

    /// Path staged in version control when the record changes.
    fn tracked_path(&self) -> PathBuf;
}

/// Extracts a downloaded source archive and applies the local patch series in place.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait PatchApplier: Send + Sync {
    async fn apply(&self, archive: &Path) -> Result<(), SyncError>;
}

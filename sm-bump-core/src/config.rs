use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::SyncError;

/// Full pipeline configuration. Every section defaults to the mozjs values, so an
/// empty YAML document is a valid config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub upstream: UpstreamConfig,
    pub ci: CiConfig,
    pub release: ReleaseConfig,
    pub repository: RepositoryConfig,
    pub patch: PatchConfig,
}

/// Where release tags come from and which of them are eligible.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Repository name under the hg releases tree, e.g. `mozilla-esr140`.
    pub repo: String,
    pub hg_base_url: String,
    /// Tags must start with this prefix, which pins the tracked major version.
    pub tag_prefix: String,
    pub tag_suffix: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            repo: "mozilla-esr140".to_string(),
            hg_base_url: "https://hg.mozilla.org/releases".to_string(),
            tag_prefix: "FIREFOX_140_".to_string(),
            tag_suffix: "_RELEASE".to_string(),
        }
    }
}

impl UpstreamConfig {
    /// Human-readable view of the tag convention, e.g. `FIREFOX_140_*_RELEASE`.
    pub fn tag_pattern(&self) -> String {
        format!("{}*{}", self.tag_prefix, self.tag_suffix)
    }

    pub fn rev_url(&self, changeset: &str) -> String {
        format!(
            "{}/{}/rev/{}",
            self.hg_base_url.trim_end_matches('/'),
            self.repo,
            changeset
        )
    }
}

/// CI endpoints, required jobs and the artifacts to pull from them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CiConfig {
    pub treeherder_url: String,
    pub taskcluster_url: String,
    pub user_agent: String,
    /// Position of the task id within a Treeherder job record.
    pub task_id_field: usize,
    /// Run indices tried while a task's artifact list is still empty.
    pub max_attempts: u32,
    pub http_timeout_secs: Option<u64>,
    /// Job role -> job name pattern. All roles must be found in a push.
    pub jobs: BTreeMap<String, String>,
    /// Artifacts to fetch, in release order.
    pub artifacts: Vec<ArtifactSpec>,
}

impl Default for CiConfig {
    fn default() -> Self {
        let jobs = BTreeMap::from([
            (
                "packaging".to_string(),
                "spidermonkey-sm-package-linux64/opt".to_string(),
            ),
            ("hazard".to_string(), "hazard-linux64-haz/debug".to_string()),
        ]);
        Self {
            treeherder_url: "https://treeherder.mozilla.org/api".to_string(),
            taskcluster_url: "https://firefox-ci-tc.services.mozilla.com/api/queue/v1".to_string(),
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) mozjs-sys/1.0".to_string(),
            task_id_field: 14,
            max_attempts: 5,
            http_timeout_secs: None,
            jobs,
            artifacts: vec![
                ArtifactSpec::new("packaging", "tar.xz", "mozjs.tar.xz"),
                ArtifactSpec::new("hazard", "allFunctions.txt.gz", "allFunctions.txt.gz"),
                ArtifactSpec::new("hazard", "gcFunctions.txt.gz", "gcFunctions.txt.gz"),
            ],
        }
    }
}

/// One artifact to fetch: which job produced it, a substring of its remote name,
/// and the local file name to store it under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSpec {
    pub job: String,
    pub name: String,
    pub file: String,
}

impl ArtifactSpec {
    pub fn new(job: &str, name: &str, file: &str) -> Self {
        Self {
            job: job.to_string(),
            name: name.to_string(),
            file: file.to_string(),
        }
    }
}

/// Release hosting. `title` and `notes` accept `{tag}`, `{changeset}` and `{rev_url}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReleaseConfig {
    pub repo: String,
    pub id_prefix: String,
    pub download_base_url: String,
    /// Asset re-downloaded from the published release and handed to the patcher.
    pub canonical_asset: String,
    pub title: String,
    pub notes: String,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            repo: "servo/mozjs".to_string(),
            id_prefix: "mozjs-source-".to_string(),
            download_base_url: "https://github.com".to_string(),
            canonical_asset: "mozjs.tar.xz".to_string(),
            title: "SpiderMonkey {tag}".to_string(),
            notes: "Source code for SpiderMonkey {tag} (changeset: [{changeset}]({rev_url}))"
                .to_string(),
        }
    }
}

impl ReleaseConfig {
    pub fn release_id(&self, changeset: &str) -> String {
        format!("{}{}", self.id_prefix, changeset)
    }
}

/// The local checkout: where files land, where the pointer lives, how commits look.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    pub work_dir: PathBuf,
    /// Persisted changeset record, relative to `work_dir` unless absolute.
    pub state_file: PathBuf,
    pub pointer_message: String,
    pub patch_message: String,
    pub signoff: bool,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("."),
            state_file: PathBuf::from("etc/COMMIT"),
            pointer_message: "Update COMMIT".to_string(),
            patch_message: "Apply patches".to_string(),
            signoff: true,
        }
    }
}

impl RepositoryConfig {
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.work_dir.join(path)
        }
    }

    pub fn state_path(&self) -> PathBuf {
        self.resolve(&self.state_file)
    }

    /// `path` as seen from inside `work_dir`, for commands that run there.
    pub fn relative<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.work_dir).unwrap_or(path)
    }
}

/// External patch step, invoked as `program args... <archive>` inside `work_dir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchConfig {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: vec!["etc/update.py".to_string()],
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.upstream.tag_prefix.is_empty() {
            return Err(SyncError::Config("upstream.tag_prefix must not be empty".into()));
        }
        if self.ci.max_attempts == 0 {
            return Err(SyncError::Config("ci.max_attempts must be at least 1".into()));
        }
        if self.ci.jobs.is_empty() {
            return Err(SyncError::Config("ci.jobs must declare at least one job".into()));
        }
        if let Some(spec) = self
            .ci
            .artifacts
            .iter()
            .find(|a| !self.ci.jobs.contains_key(&a.job))
        {
            return Err(SyncError::Config(format!(
                "artifact {:?} references undeclared job role {:?}",
                spec.file, spec.job
            )));
        }
        Ok(())
    }

    pub fn trace_loaded(&self) {
        info!(
            upstream_repo = %self.upstream.repo,
            tag_pattern = %self.upstream.tag_pattern(),
            jobs = self.ci.jobs.len(),
            artifacts = self.ci.artifacts.len(),
            release_repo = %self.release.repo,
            work_dir = %self.repository.work_dir.display(),
            "Loaded PipelineConfig"
        );
        debug!(?self, "PipelineConfig loaded (full debug)");
    }
}

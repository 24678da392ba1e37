//! Error taxonomy for the bump pipeline.
//!
//! Every variant is fatal to a run. The only condition that is retried
//! (an empty artifact list) never surfaces here unless attempts run out.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Why an artifact lookup for a task came back without a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactMiss {
    /// Every run index up to the bound returned an empty artifact list.
    Empty { attempts: u32 },
    /// Artifacts were listed, but none had a name containing the substring.
    NoMatch { substring: String },
}

impl fmt::Display for ArtifactMiss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactMiss::Empty { attempts } => {
                write!(f, "no artifacts listed after {attempts} attempts")
            }
            ArtifactMiss::NoMatch { substring } => {
                write!(f, "no artifact name contains {substring:?}")
            }
        }
    }
}

/// Errors produced by any stage of the pipeline.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No upstream tag matched the configured release convention.
    #[error("no tag in {repo} matches {pattern}")]
    NoMatchingTag { repo: String, pattern: String },

    /// The CI push index has no entry for the changeset yet.
    #[error("no CI push found for changeset {changeset}")]
    PushNotFound { changeset: String },

    /// A required job was absent from the push's job list.
    #[error("could not find {role} job matching {pattern:?} in push {push_id}")]
    JobNotFound {
        role: String,
        pattern: String,
        push_id: u64,
    },

    /// A job record matched but had no task id at the configured field.
    #[error("job matching {pattern:?} has no task id at field {field}")]
    MalformedJob { pattern: String, field: usize },

    /// Artifact retrieval for a task failed.
    #[error("artifact not found for task {task_id}: {cause}")]
    ArtifactNotFound { task_id: String, cause: ArtifactMiss },

    /// The publishing backend already holds a release with this id.
    #[error("release {release_id} already exists")]
    PublishConflict { release_id: String },

    /// An external command exited unsuccessfully.
    #[error("`{command}` exited with {}: {stderr}", display_status(.status))]
    ExternalCommand {
        command: String,
        status: Option<i32>,
        stderr: String,
    },

    /// An external command could not be launched at all.
    #[error("failed to launch `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Transport, status or decode failure talking to a remote service.
    #[error("request to {url} failed")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Local filesystem failure.
    #[error("I/O error at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The persisted changeset record is missing or empty.
    #[error("no persisted changeset found at {path}")]
    MissingState { path: PathBuf },

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

fn display_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("status {code}"),
        None => "no status (terminated by signal)".to_string(),
    }
}

impl SyncError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn http(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Http {
            url: url.into(),
            source,
        }
    }

    /// Name of the lookup or stage that failed, for user-facing diagnostics.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::NoMatchingTag { .. } => "resolve",
            Self::PushNotFound { .. } | Self::JobNotFound { .. } | Self::MalformedJob { .. } => {
                "locate"
            }
            Self::ArtifactNotFound { .. } => "fetch",
            Self::PublishConflict { .. } => "publish",
            Self::ExternalCommand { .. } | Self::Spawn { .. } => "command",
            Self::Http { .. } => "http",
            Self::Io { .. } => "filesystem",
            Self::MissingState { .. } => "state",
            Self::Config(_) => "config",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_miss_messages_distinguish_subcases() {
        let empty = SyncError::ArtifactNotFound {
            task_id: "T1".into(),
            cause: ArtifactMiss::Empty { attempts: 5 },
        };
        let no_match = SyncError::ArtifactNotFound {
            task_id: "T1".into(),
            cause: ArtifactMiss::NoMatch {
                substring: "tar.xz".into(),
            },
        };
        assert_eq!(
            empty.to_string(),
            "artifact not found for task T1: no artifacts listed after 5 attempts"
        );
        assert_eq!(
            no_match.to_string(),
            "artifact not found for task T1: no artifact name contains \"tar.xz\""
        );
        assert_eq!(empty.stage(), "fetch");
    }

    #[test]
    fn external_command_reports_signal_termination() {
        let err = SyncError::ExternalCommand {
            command: "git commit".into(),
            status: None,
            stderr: "killed".into(),
        };
        assert_eq!(
            err.to_string(),
            "`git commit` exited with no status (terminated by signal): killed"
        );
    }
}

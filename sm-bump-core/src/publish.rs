//! Publishes fetched artifacts as a release keyed by changeset, through the `gh` CLI.
//!
//! Existence is not pre-checked: `gh release create` refuses an id that already
//! exists, and that refusal is reported as [`SyncError::PublishConflict`].

use std::path::PathBuf;
use tracing::{error, info};

use crate::command::run_checked;
use crate::config::{ReleaseConfig, UpstreamConfig};
use crate::contract::{CommandRunner, CommandSpec};
use crate::error::SyncError;

/// A release as created on the hosting side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub id: String,
    pub repo: String,
    pub tag: String,
    pub changeset: String,
    pub title: String,
    pub notes: String,
    pub files: Vec<PathBuf>,
}

fn render(template: &str, tag: &str, changeset: &str, rev_url: &str) -> String {
    template
        .replace("{tag}", tag)
        .replace("{changeset}", changeset)
        .replace("{rev_url}", rev_url)
}

/// Title and notes for the release of `tag` at `changeset`.
pub fn release_text(
    release: &ReleaseConfig,
    upstream: &UpstreamConfig,
    tag: &str,
    changeset: &str,
) -> (String, String) {
    let rev_url = upstream.rev_url(changeset);
    (
        render(&release.title, tag, changeset, &rev_url),
        render(&release.notes, tag, changeset, &rev_url),
    )
}

/// `gh release create <id> <files>... --repo <repo> --title <title> --notes <notes>`
pub fn create_command(
    release_id: &str,
    repo: &str,
    files: &[PathBuf],
    title: &str,
    notes: &str,
) -> CommandSpec {
    CommandSpec::new("gh")
        .args(["release", "create", release_id])
        .args(files.iter().map(|f| f.display().to_string()))
        .args(["--repo", repo, "--title", title, "--notes", notes])
}

fn is_conflict(stderr: &str) -> bool {
    stderr.contains("already exists")
}

/// Create the release for `changeset`, attaching `files` in order.
pub async fn publish(
    runner: &dyn CommandRunner,
    release: &ReleaseConfig,
    upstream: &UpstreamConfig,
    tag: &str,
    changeset: &str,
    files: &[PathBuf],
) -> Result<Release, SyncError> {
    let id = release.release_id(changeset);
    let (title, notes) = release_text(release, upstream, tag, changeset);
    let command = create_command(&id, &release.repo, files, &title, &notes);

    info!(release_id = %id, repo = %release.repo, files = files.len(), "[PUBLISH] Creating release");
    match run_checked(runner, &command).await {
        Ok(_) => {}
        Err(SyncError::ExternalCommand { ref stderr, .. }) if is_conflict(stderr) => {
            error!(release_id = %id, "[PUBLISH][ERROR] Release already exists");
            return Err(SyncError::PublishConflict { release_id: id });
        }
        Err(e) => return Err(e),
    }
    info!(release_id = %id, "[PUBLISH] Release created");

    Ok(Release {
        id,
        repo: release.repo.clone(),
        tag: tag.to_string(),
        changeset: changeset.to_string(),
        title,
        notes,
        files: files.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{CommandOutput, MockCommandRunner};

    #[test]
    fn release_text_uses_mozjs_wording() {
        let (title, notes) = release_text(
            &ReleaseConfig::default(),
            &UpstreamConfig::default(),
            "FIREFOX_140_5_0esr_RELEASE",
            "abc123",
        );
        assert_eq!(title, "SpiderMonkey FIREFOX_140_5_0esr_RELEASE");
        assert_eq!(
            notes,
            "Source code for SpiderMonkey FIREFOX_140_5_0esr_RELEASE (changeset: \
             [abc123](https://hg.mozilla.org/releases/mozilla-esr140/rev/abc123))"
        );
    }

    #[tokio::test]
    async fn duplicate_release_is_reported_as_conflict() {
        let mut runner = MockCommandRunner::new();
        runner.expect_run().times(1).returning(|_| {
            Ok(CommandOutput::failure(
                1,
                "HTTP 422: Validation Failed\ntag_name already exists",
            ))
        });

        let err = publish(
            &runner,
            &ReleaseConfig::default(),
            &UpstreamConfig::default(),
            "FIREFOX_140_5_0esr_RELEASE",
            "abc123",
            &[PathBuf::from("mozjs.tar.xz")],
        )
        .await
        .unwrap_err();
        assert!(
            matches!(err, SyncError::PublishConflict { ref release_id } if release_id == "mozjs-source-abc123")
        );
    }

    #[tokio::test]
    async fn other_failures_stay_external_command_errors() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .returning(|_| Ok(CommandOutput::failure(4, "authentication required")));

        let err = publish(
            &runner,
            &ReleaseConfig::default(),
            &UpstreamConfig::default(),
            "T",
            "abc123",
            &[],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SyncError::ExternalCommand { status: Some(4), .. }));
    }
}

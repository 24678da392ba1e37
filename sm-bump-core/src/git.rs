//! Git checkpoints: staging and signed-off commits in the working tree.

use std::path::Path;

use crate::command::run_checked;
use crate::config::RepositoryConfig;
use crate::contract::{CommandRunner, CommandSpec};
use crate::error::SyncError;

fn git(config: &RepositoryConfig) -> CommandSpec {
    CommandSpec::new("git").current_dir(&config.work_dir)
}

/// `git add <path>`
pub async fn stage(
    runner: &dyn CommandRunner,
    config: &RepositoryConfig,
    path: &Path,
) -> Result<(), SyncError> {
    let command = git(config)
        .arg("add")
        .arg(config.relative(path).display().to_string());
    run_checked(runner, &command).await.map(|_| ())
}

/// `git add --all`
pub async fn stage_all(
    runner: &dyn CommandRunner,
    config: &RepositoryConfig,
) -> Result<(), SyncError> {
    let command = git(config).args(["add", "--all"]);
    run_checked(runner, &command).await.map(|_| ())
}

/// `git commit -m <message> [--signoff]`
pub async fn commit(
    runner: &dyn CommandRunner,
    config: &RepositoryConfig,
    message: &str,
) -> Result<(), SyncError> {
    let mut command = git(config).args(["commit", "-m", message]);
    if config.signoff {
        command = command.arg("--signoff");
    }
    run_checked(runner, &command).await.map(|_| ())
}

/// Whether `path` has staged or unstaged changes (`git status --porcelain -- <path>`).
pub async fn has_changes(
    runner: &dyn CommandRunner,
    config: &RepositoryConfig,
    path: &Path,
) -> Result<bool, SyncError> {
    let command = git(config)
        .args(["status", "--porcelain", "--"])
        .arg(config.relative(path).display().to_string());
    let output = run_checked(runner, &command).await?;
    Ok(!output.stdout.trim().is_empty())
}

/// Subject line of the latest commit.
pub async fn head_subject(
    runner: &dyn CommandRunner,
    config: &RepositoryConfig,
) -> Result<String, SyncError> {
    let command = git(config).args(["log", "-1", "--format=%s"]);
    let output = run_checked(runner, &command).await?;
    Ok(output.stdout.trim().to_string())
}

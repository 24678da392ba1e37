use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::contract::{CommandOutput, CommandRunner, CommandSpec};
use crate::error::SyncError;

/// Runs commands as child processes, capturing stdout and stderr.
#[derive(Debug, Clone, Default)]
pub struct SystemCommandRunner;

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, command: &CommandSpec) -> std::io::Result<CommandOutput> {
        let mut child = Command::new(&command.program);
        child.args(&command.args);
        if let Some(dir) = &command.cwd {
            child.current_dir(dir);
        }
        debug!(command = %command, cwd = ?command.cwd, "Spawning external command");
        let output = child.output().await?;
        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Run `command` and turn a launch failure or non-zero exit into an error.
pub async fn run_checked(
    runner: &dyn CommandRunner,
    command: &CommandSpec,
) -> Result<CommandOutput, SyncError> {
    let output = runner.run(command).await.map_err(|e| {
        error!(error = ?e, command = %command, "Failed to launch external command");
        SyncError::Spawn {
            command: command.to_string(),
            source: e,
        }
    })?;
    if !output.is_success() {
        error!(
            command = %command,
            status = ?output.status,
            stderr = %output.stderr.trim(),
            "External command exited with failure"
        );
        return Err(SyncError::ExternalCommand {
            command: command.to_string(),
            status: output.status,
            stderr: output.stderr.trim().to_string(),
        });
    }
    info!(command = %command, "External command succeeded");
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::MockCommandRunner;

    #[tokio::test]
    async fn run_checked_maps_non_zero_exit() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .returning(|_| Ok(CommandOutput::failure(128, "fatal: not a git repository\n")));

        let spec = CommandSpec::new("git").args(["commit", "-m", "x"]);
        let err = run_checked(&runner, &spec).await.unwrap_err();
        match err {
            SyncError::ExternalCommand {
                command,
                status,
                stderr,
            } => {
                assert_eq!(command, "git commit -m x");
                assert_eq!(status, Some(128));
                assert_eq!(stderr, "fatal: not a git repository");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn run_checked_maps_launch_failure() {
        let mut runner = MockCommandRunner::new();
        runner.expect_run().returning(|_| {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gh: not found"))
        });

        let err = run_checked(&runner, &CommandSpec::new("gh")).await.unwrap_err();
        assert!(matches!(err, SyncError::Spawn { ref command, .. } if command == "gh"));
    }
}

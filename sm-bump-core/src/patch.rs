use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::command::run_checked;
use crate::config::PatchConfig;
use crate::contract::{CommandRunner, CommandSpec, PatchApplier};
use crate::error::SyncError;

/// Delegates extraction and patching to an external program, invoked as
/// `program args... <archive>` from the working tree root.
pub struct CommandPatchApplier {
    config: PatchConfig,
    work_dir: PathBuf,
    runner: Arc<dyn CommandRunner>,
}

impl CommandPatchApplier {
    pub fn new(config: PatchConfig, work_dir: impl Into<PathBuf>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            config,
            work_dir: work_dir.into(),
            runner,
        }
    }

    pub fn command(&self, archive: &Path) -> CommandSpec {
        CommandSpec::new(&self.config.program)
            .args(self.config.args.iter().cloned())
            .arg(
                archive
                    .strip_prefix(&self.work_dir)
                    .unwrap_or(archive)
                    .display()
                    .to_string(),
            )
            .current_dir(&self.work_dir)
    }
}

#[async_trait]
impl PatchApplier for CommandPatchApplier {
    async fn apply(&self, archive: &Path) -> Result<(), SyncError> {
        let command = self.command(archive);
        info!(command = %command, "[PATCH] Applying patch series");
        run_checked(self.runner.as_ref(), &command).await?;
        info!(archive = %archive.display(), "[PATCH] Patches applied");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{CommandOutput, MockCommandRunner};

    #[tokio::test]
    async fn runs_update_script_with_archive_path() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|cmd: &CommandSpec| {
                cmd.program == "python3"
                    && cmd.args == ["etc/update.py", "mozjs.tar.xz"]
                    && cmd.cwd.as_deref() == Some(Path::new("/src/mozjs"))
            })
            .times(1)
            .returning(|_| Ok(CommandOutput::success()));

        let applier = CommandPatchApplier::new(PatchConfig::default(), "/src/mozjs", Arc::new(runner));
        applier.apply(Path::new("mozjs.tar.xz")).await.unwrap();
    }

    #[tokio::test]
    async fn failing_patch_is_an_external_command_error() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .returning(|_| Ok(CommandOutput::failure(1, "patch does not apply")));

        let applier = CommandPatchApplier::new(PatchConfig::default(), ".", Arc::new(runner));
        let err = applier.apply(Path::new("mozjs.tar.xz")).await.unwrap_err();
        assert!(matches!(err, SyncError::ExternalCommand { ref stderr, .. } if stderr == "patch does not apply"));
    }
}

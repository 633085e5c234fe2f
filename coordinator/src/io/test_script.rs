//! Test script adapter: runs the repository's own test script with bash.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::io::process::run_command;
use crate::io::workspace::{ScriptOutcome, TestScript};

pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 1_000_000;

/// Runs `<repo>/<script>` from the script's own directory.
#[derive(Debug, Clone)]
pub struct BashTestScript {
    script: PathBuf,
    output_limit_bytes: usize,
}

impl BashTestScript {
    /// `script` is relative to the repository root, e.g. `scripts/test.sh`.
    pub fn new(script: impl Into<PathBuf>, output_limit_bytes: usize) -> Self {
        Self {
            script: script.into(),
            output_limit_bytes,
        }
    }
}

impl TestScript for BashTestScript {
    #[instrument(skip_all, fields(repo = %repo.display(), script = %self.script.display()))]
    fn run(&self, repo: &Path) -> Result<ScriptOutcome> {
        let script_path = repo.join(&self.script);
        let script_dir = script_path
            .parent()
            .with_context(|| format!("test script has no directory {}", script_path.display()))?;
        let script_name = script_path
            .file_name()
            .with_context(|| format!("test script has no file name {}", script_path.display()))?;

        let mut cmd = Command::new("bash");
        cmd.arg(script_name).current_dir(script_dir);
        let output = run_command(cmd, self.output_limit_bytes)
            .with_context(|| format!("run test script {}", script_path.display()))?;

        let succeeded = output.status.success();
        info!(succeeded, exit_code = ?output.status.code(), "test script finished");
        Ok(ScriptOutcome {
            succeeded,
            output: output.combined(),
        })
    }
}

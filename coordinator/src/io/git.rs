//! Git adapter for workspace provisioning and commit checkout.
//!
//! Every call is an explicit `git` subprocess with an argument vector; nothing
//! is routed through a shell, and callers validate commit syntax first.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

use crate::io::workspace::Vcs;

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    /// Clone `url` into `dest` (relative to the workdir or absolute).
    #[instrument(skip_all, fields(url = %url, dest = %dest.display()))]
    pub fn clone_repo(&self, url: &str, dest: &Path) -> Result<()> {
        debug!("cloning repository");
        let dest = dest.to_string_lossy();
        self.run_checked(&["clone", "--quiet", url, &dest])?;
        Ok(())
    }

    /// Succeeds iff `commit` names an existing commit object.
    #[instrument(skip_all, fields(commit = %commit))]
    pub fn verify_commit(&self, commit: &str) -> Result<()> {
        let object = format!("{commit}^{{commit}}");
        self.run_checked(&["cat-file", "-e", &object])?;
        Ok(())
    }

    /// Detach HEAD at `commit`.
    #[instrument(skip_all, fields(commit = %commit))]
    pub fn checkout_detached(&self, commit: &str) -> Result<()> {
        debug!(commit, "checking out commit");
        self.run_checked(&["checkout", "--quiet", "--detach", commit])?;
        Ok(())
    }

    /// Return the full SHA of HEAD.
    #[cfg(test)]
    pub fn head_sha(&self) -> Result<String> {
        let out = self.run_checked(&["rev-parse", "HEAD"])?;
        Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(args = %args.join(" "), stderr = %stderr.trim(), "git command failed");
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

/// [`Vcs`] backed by the `git` CLI and one upstream repository URL.
#[derive(Debug, Clone)]
pub struct GitVcs {
    repo_url: String,
}

impl GitVcs {
    pub fn new(repo_url: impl Into<String>) -> Self {
        Self {
            repo_url: repo_url.into(),
        }
    }
}

impl Vcs for GitVcs {
    fn fetch_repo(&self, dest: &Path) -> Result<()> {
        let parent = dest
            .parent()
            .with_context(|| format!("clone destination has no parent {}", dest.display()))?;
        let name = dest
            .file_name()
            .with_context(|| format!("clone destination has no name {}", dest.display()))?;
        Git::new(parent)
            .clone_repo(&self.repo_url, Path::new(name))
            .context("error cloning repo")
    }

    fn resolve_commit(&self, repo: &Path, commit: &str) -> Result<()> {
        Git::new(repo).verify_commit(commit)
    }

    fn checkout(&self, repo: &Path, commit: &str) -> Result<()> {
        Git::new(repo).checkout_detached(commit)
    }
}

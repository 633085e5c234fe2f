//! Per-job workspaces under the test area.
//!
//! Layout: `<root>/<folder>/<repo_name>/...`. Each job owns one folder, and
//! only folders that pass [`check_confined`] are ever deleted.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use crate::core::commit_ref::is_acceptable_commit_ref;
use crate::core::ids::workspace_folder_name;
use crate::core::path_guard::check_confined;

const PROJECT_CONFIG: &str = "config/project.config.example";
const GPU_PROJECT_CONFIG: &str = "config/gpu_project.config.example";

/// Version-control operations needed to prepare a workspace.
pub trait Vcs: Send + Sync {
    /// Fetch the external repository into `dest`, which must not exist yet.
    fn fetch_repo(&self, dest: &Path) -> Result<()>;
    /// Succeed iff `commit` names an existing commit in `repo`.
    fn resolve_commit(&self, repo: &Path, commit: &str) -> Result<()>;
    fn checkout(&self, repo: &Path, commit: &str) -> Result<()>;
}

/// Result of a test script that was started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOutcome {
    /// True iff the script exited with status zero.
    pub succeeded: bool,
    /// Combined stdout and stderr.
    pub output: String,
}

/// Runs the repository's test script.
pub trait TestScript: Send + Sync {
    /// `Err` means the script could not be invoked at all.
    fn run(&self, repo: &Path) -> Result<ScriptOutcome>;
}

/// A provisioned workspace owned by one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    /// `<root>/<folder>`: the unit of deletion.
    pub dir: PathBuf,
    /// `<root>/<folder>/<repo_name>`: the checkout.
    pub repo: PathBuf,
}

/// Provisioning failure, with the folder to clean up if one was created.
#[derive(Debug, thiserror::Error)]
#[error("{cause:#}")]
pub struct ProvisionError {
    pub leftover: Option<PathBuf>,
    cause: anyhow::Error,
}

/// Why the test phase ended without a script outcome.
#[derive(Debug, thiserror::Error)]
pub enum TestRunError {
    #[error("error renaming project.config: {0:#}")]
    GpuConfig(anyhow::Error),
    #[error("error running tests: {0:#}")]
    Invocation(anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct WorkspaceSettings {
    pub root: PathBuf,
    pub repo_name: String,
    pub gpu_mode: bool,
}

/// Called with a confined workspace folder just before it is deleted.
pub type DestroyHook = Arc<dyn Fn(&Path) + Send + Sync>;

pub struct WorkspaceManager {
    settings: WorkspaceSettings,
    vcs: Arc<dyn Vcs>,
    tests: Arc<dyn TestScript>,
    before_destroy: Option<DestroyHook>,
}

impl WorkspaceManager {
    pub fn new(settings: WorkspaceSettings, vcs: Arc<dyn Vcs>, tests: Arc<dyn TestScript>) -> Self {
        Self {
            settings,
            vcs,
            tests,
            before_destroy: None,
        }
    }

    pub fn with_destroy_hook(mut self, hook: DestroyHook) -> Self {
        self.before_destroy = Some(hook);
        self
    }

    /// Create a fresh folder under the root and fetch the repository into it.
    ///
    /// If the fetch fails after the folder was created, the folder is handed
    /// back in [`ProvisionError::leftover`] so the caller can destroy it along
    /// with every other outcome.
    #[instrument(skip_all)]
    pub fn provision(&self) -> Result<Workspace, ProvisionError> {
        let folder = workspace_folder_name(Utc::now());
        let dir = self.settings.root.join(&folder);
        fs::create_dir(&dir)
            .with_context(|| format!("error creating folder {}", dir.display()))
            .map_err(|cause| ProvisionError {
                leftover: None,
                cause,
            })?;
        debug!(dir = %dir.display(), "created workspace folder");

        let repo = dir.join(&self.settings.repo_name);
        if let Err(cause) = self.vcs.fetch_repo(&repo) {
            return Err(ProvisionError {
                leftover: Some(dir),
                cause,
            });
        }
        info!(repo = %repo.display(), "workspace provisioned");
        Ok(Workspace { dir, repo })
    }

    /// Resolve `commit` and, only if it resolves, check it out.
    #[instrument(skip_all, fields(commit = %commit))]
    pub fn validate_and_checkout(&self, commit: &str, workspace: &Workspace) -> bool {
        if !is_acceptable_commit_ref(commit) {
            warn!(commit, "rejecting malformed commit reference");
            return false;
        }
        if let Err(e) = self.vcs.resolve_commit(&workspace.repo, commit) {
            warn!(commit, err = %format!("{e:#}"), "error validating commit");
            return false;
        }
        if let Err(e) = self.vcs.checkout(&workspace.repo, commit) {
            warn!(commit, err = %format!("{e:#}"), "error checking out commit");
            return false;
        }
        true
    }

    /// Run the test script, swapping in the GPU config first in GPU mode.
    #[instrument(skip_all, fields(gpu_mode = self.settings.gpu_mode))]
    pub fn run_tests(&self, workspace: &Workspace) -> Result<ScriptOutcome, TestRunError> {
        if self.settings.gpu_mode {
            use_gpu_config(&workspace.repo).map_err(TestRunError::GpuConfig)?;
        }
        self.tests
            .run(&workspace.repo)
            .map_err(TestRunError::Invocation)
    }

    /// Recursively delete `dir` if it is a folder directly under the root.
    ///
    /// Rejections and delete failures are logged and otherwise ignored.
    pub fn destroy(&self, dir: &Path) {
        if let Err(rejection) = check_confined(&self.settings.root, dir) {
            error!(path = %dir.display(), %rejection, "refusing to delete path");
            return;
        }
        if let Some(hook) = &self.before_destroy {
            hook(dir);
        }
        match fs::remove_dir_all(dir) {
            Ok(()) => info!(path = %dir.display(), "deleted workspace"),
            Err(e) => warn!(path = %dir.display(), err = %e, "error deleting workspace"),
        }
    }

    /// Remove leftovers from a previous process and make sure the root exists.
    #[instrument(skip_all, fields(root = %self.settings.root.display()))]
    pub fn reset_test_area(&self) -> Result<()> {
        let root = &self.settings.root;
        if root.exists() {
            let entries =
                fs::read_dir(root).with_context(|| format!("read test area {}", root.display()))?;
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    self.destroy(&path);
                } else {
                    warn!(path = %path.display(), "leaving non-directory entry in test area");
                }
            }
        }
        fs::create_dir_all(root)
            .with_context(|| format!("create test area {}", root.display()))?;
        Ok(())
    }
}

fn use_gpu_config(repo: &Path) -> Result<()> {
    let target = repo.join(PROJECT_CONFIG);
    let gpu = repo.join(GPU_PROJECT_CONFIG);
    if !gpu.is_file() {
        return Err(anyhow!("missing {}", gpu.display()));
    }
    fs::remove_file(&target).with_context(|| format!("remove {}", target.display()))?;
    fs::rename(&gpu, &target)
        .with_context(|| format!("move {} to {}", gpu.display(), target.display()))?;
    debug!("swapped in gpu project config");
    Ok(())
}

//! Coordinator configuration (TOML file, overridable from the command line).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::io::test_script::DEFAULT_OUTPUT_LIMIT_BYTES;

pub const DEFAULT_REPO_URL: &str = "https://github.com/KevinMcGin/Simulation.git";

/// Coordinator configuration (TOML).
///
/// Missing fields take defaults, except `token`, which must be supplied by the
/// file or an override before [`CoordinatorConfig::validate`] passes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Shared secret expected in the `Tester-Token` header.
    pub token: String,

    /// Root directory under which per-job workspaces are created.
    pub test_area: PathBuf,

    /// Swap in the GPU project config before running tests.
    pub gpu_mode: bool,

    /// Repository cloned into every workspace.
    pub repo_url: String,

    /// Directory name of the clone inside a workspace.
    pub repo_name: String,

    /// Test script path relative to the repository root.
    pub test_script: PathBuf,

    /// Keep at most this many bytes each of script stdout and stderr.
    pub output_limit_bytes: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            test_area: PathBuf::from("./test_area"),
            gpu_mode: false,
            repo_url: DEFAULT_REPO_URL.to_string(),
            repo_name: "Simulation".to_string(),
            test_script: PathBuf::from("scripts/test.sh"),
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
        }
    }
}

impl CoordinatorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.token.is_empty() {
            return Err(anyhow!("token must be non-empty"));
        }
        if !self
            .test_area
            .components()
            .any(|c| matches!(c, std::path::Component::Normal(_)))
        {
            return Err(anyhow!(
                "test_area must name a directory, not {:?}",
                self.test_area
            ));
        }
        if self.repo_url.trim().is_empty() {
            return Err(anyhow!("repo_url must be non-empty"));
        }
        if !is_single_normal_component(Path::new(&self.repo_name)) {
            return Err(anyhow!("repo_name must be a single directory name"));
        }
        if self.test_script.is_absolute() || self.test_script.file_name().is_none() {
            return Err(anyhow!("test_script must be a relative file path"));
        }
        if self
            .test_script
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(anyhow!("test_script must stay inside the repository"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        Ok(())
    }
}

fn is_single_normal_component(path: &Path) -> bool {
    let mut components = path.components();
    matches!(
        (components.next(), components.next()),
        (Some(std::path::Component::Normal(_)), None)
    )
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `CoordinatorConfig::default()`. The result
/// is not validated: apply overrides first, then call `validate`.
pub fn load_config(path: &Path) -> Result<CoordinatorConfig> {
    if !path.exists() {
        return Ok(CoordinatorConfig::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: CoordinatorConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}

//! Transport-neutral boundary: authorized submit and poll.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::clock::SystemClock;
use crate::core::auth::AccessGuard;
use crate::core::types::{INVALID_TOKEN_MESSAGE, JobView, NOT_FOUND_MESSAGE};
use crate::io::config::CoordinatorConfig;
use crate::io::git::GitVcs;
use crate::io::test_script::BashTestScript;
use crate::io::workspace::{WorkspaceManager, WorkspaceSettings};
use crate::orchestrator::{Orchestrator, Submitted};
use crate::store::JobStore;

/// Returned when the presented token does not match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid token")]
pub struct Unauthorized;

/// Result of a poll, classified for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Unauthorized,
    NotFound,
    Found(JobView),
}

impl PollOutcome {
    /// Payload to return; the two failure cases have ERRORED-shaped bodies.
    pub fn into_view(self) -> JobView {
        match self {
            Self::Unauthorized => JobView::errored(INVALID_TOKEN_MESSAGE),
            Self::NotFound => JobView::errored(NOT_FOUND_MESSAGE),
            Self::Found(view) => view,
        }
    }
}

pub struct TestService {
    guard: AccessGuard,
    orchestrator: Orchestrator,
}

impl TestService {
    pub fn new(guard: AccessGuard, orchestrator: Orchestrator) -> Self {
        Self {
            guard,
            orchestrator,
        }
    }

    /// Wire the production collaborators (git CLI, bash test script, wall
    /// clock) from a validated config. Stale workspaces are removed.
    pub fn from_config(config: &CoordinatorConfig) -> Result<Self> {
        config.validate().context("invalid configuration")?;
        let guard = AccessGuard::new(config.token.clone())?;
        let workspaces = WorkspaceManager::new(
            WorkspaceSettings {
                root: config.test_area.clone(),
                repo_name: config.repo_name.clone(),
                gpu_mode: config.gpu_mode,
            },
            Arc::new(GitVcs::new(config.repo_url.clone())),
            Arc::new(BashTestScript::new(
                config.test_script.clone(),
                config.output_limit_bytes,
            )),
        );
        workspaces.reset_test_area()?;
        let orchestrator = Orchestrator::new(
            Arc::new(JobStore::new()),
            Arc::new(workspaces),
            Arc::new(SystemClock),
        );
        Ok(Self::new(guard, orchestrator))
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Start a test run for `commit`. Expired results are swept first.
    pub fn submit(&self, commit: &str, token: &str) -> Result<Submitted, Unauthorized> {
        self.orchestrator.sweep_expired();
        if !self.guard.authorize(token) {
            warn!("rejected submission with invalid token");
            return Err(Unauthorized);
        }
        Ok(self.orchestrator.submit(commit))
    }

    pub fn poll(&self, job_id: &str, token: &str) -> PollOutcome {
        if !self.guard.authorize(token) {
            warn!(job_id, "rejected poll with invalid token");
            return PollOutcome::Unauthorized;
        }
        match self.orchestrator.poll(job_id) {
            Some(job) => {
                debug!(job_id, status = %job.status, "served result");
                PollOutcome::Found(job.view())
            }
            None => PollOutcome::NotFound,
        }
    }
}

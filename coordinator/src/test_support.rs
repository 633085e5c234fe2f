//! Test-only collaborators: scripted VCS and test script, a manual clock and
//! a temporary test area.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use anyhow::{Result, anyhow};
use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::clock::Clock;
use crate::io::workspace::{ScriptOutcome, TestScript, Vcs, WorkspaceSettings};

pub const REPO_NAME: &str = "Simulation";

/// A temporary directory holding a `test_area` root.
pub struct TestArea {
    _temp: tempfile::TempDir,
    root: PathBuf,
}

impl TestArea {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir()?;
        let root = temp.path().join("test_area");
        fs::create_dir_all(&root)?;
        Ok(Self { _temp: temp, root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn settings(&self, gpu_mode: bool) -> WorkspaceSettings {
        WorkspaceSettings {
            root: self.root.clone(),
            repo_name: REPO_NAME.to_string(),
            gpu_mode,
        }
    }

    /// Number of entries directly under the root.
    pub fn folder_count(&self) -> usize {
        fs::read_dir(&self.root).map(|e| e.count()).unwrap_or(0)
    }
}

/// Record of calls made to a [`ScriptedVcs`].
#[derive(Debug, Clone, Default)]
pub struct VcsCalls {
    inner: Arc<Mutex<(Vec<String>, Vec<String>)>>,
}

impl VcsCalls {
    pub fn resolves(&self) -> Vec<String> {
        self.inner.lock().map(|c| c.0.clone()).unwrap_or_default()
    }

    pub fn checkouts(&self) -> Vec<String> {
        self.inner.lock().map(|c| c.1.clone()).unwrap_or_default()
    }
}

/// [`Vcs`] that creates an empty checkout and knows a fixed set of commits.
#[derive(Debug, Clone)]
pub struct ScriptedVcs {
    known: Vec<String>,
    fetch_error: Option<String>,
    checkout_fails: bool,
    calls: VcsCalls,
}

impl ScriptedVcs {
    pub fn resolving(known: &[&str]) -> Self {
        Self {
            known: known.iter().map(|c| c.to_string()).collect(),
            fetch_error: None,
            checkout_fails: false,
            calls: VcsCalls::default(),
        }
    }

    pub fn failing_fetch(message: &str) -> Self {
        Self {
            fetch_error: Some(message.to_string()),
            ..Self::resolving(&[])
        }
    }

    pub fn failing_checkout(mut self) -> Self {
        self.checkout_fails = true;
        self
    }

    pub fn calls(&self) -> VcsCalls {
        self.calls.clone()
    }
}

impl Vcs for ScriptedVcs {
    fn fetch_repo(&self, dest: &Path) -> Result<()> {
        if let Some(message) = &self.fetch_error {
            return Err(anyhow!("error cloning repo: {message}"));
        }
        fs::create_dir_all(dest)?;
        Ok(())
    }

    fn resolve_commit(&self, _repo: &Path, commit: &str) -> Result<()> {
        if let Ok(mut calls) = self.calls.inner.lock() {
            calls.0.push(commit.to_string());
        }
        if self.known.iter().any(|c| c == commit) {
            Ok(())
        } else {
            Err(anyhow!("fatal: Not a valid object name {commit}"))
        }
    }

    fn checkout(&self, _repo: &Path, commit: &str) -> Result<()> {
        if let Ok(mut calls) = self.calls.inner.lock() {
            calls.1.push(commit.to_string());
        }
        if self.checkout_fails {
            return Err(anyhow!("error: pathspec '{commit}' did not match"));
        }
        Ok(())
    }
}

/// A latch that blocks scripted tests until the test body opens it.
#[derive(Debug, Default)]
pub struct Gate {
    open: Mutex<bool>,
    cv: Condvar,
}

impl Gate {
    pub fn open(&self) {
        if let Ok(mut open) = self.open.lock() {
            *open = true;
            self.cv.notify_all();
        }
    }

    fn wait(&self) {
        let Ok(mut open) = self.open.lock() else {
            return;
        };
        while !*open {
            open = match self.cv.wait(open) {
                Ok(guard) => guard,
                Err(_) => return,
            };
        }
    }
}

/// [`TestScript`] returning a fixed result, optionally after a gate opens.
#[derive(Debug, Clone)]
pub struct ScriptedTestScript {
    result: std::result::Result<ScriptOutcome, String>,
    gate: Option<Arc<Gate>>,
    runs: Arc<AtomicUsize>,
}

impl ScriptedTestScript {
    pub fn passing(output: &str) -> Self {
        Self::with_result(Ok(ScriptOutcome {
            succeeded: true,
            output: output.to_string(),
        }))
    }

    pub fn failing(output: &str) -> Self {
        Self::with_result(Ok(ScriptOutcome {
            succeeded: false,
            output: output.to_string(),
        }))
    }

    pub fn uninvocable(message: &str) -> Self {
        Self::with_result(Err(message.to_string()))
    }

    fn with_result(result: std::result::Result<ScriptOutcome, String>) -> Self {
        Self {
            result,
            gate: None,
            runs: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Block every run until the returned gate is opened.
    pub fn gated(mut self) -> (Self, Arc<Gate>) {
        let gate = Arc::new(Gate::default());
        self.gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    /// Shared counter of started runs.
    pub fn runs(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.runs)
    }
}

impl TestScript for ScriptedTestScript {
    fn run(&self, _repo: &Path) -> Result<ScriptOutcome> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.wait();
        }
        self.result.clone().map_err(|message| anyhow!(message))
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new() -> Self {
        let start = Utc
            .timestamp_opt(1_700_000_000, 0)
            .single()
            .unwrap_or_else(Utc::now);
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|now| *now).unwrap_or_else(|_| Utc::now())
    }
}

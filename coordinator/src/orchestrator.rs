//! Job lifecycle: accept a submission, then drive one background worker
//! through provisioning, validation and execution.
//!
//! ```text
//! ACCEPTED → PROVISIONING → VALIDATING → EXECUTING → SUCCESS | FAILURE | ERRORED
//! ```
//!
//! Only two records are ever written per job: the RUNNING placeholder at
//! acceptance and the terminal record when the worker finishes. The
//! intermediate stages are never visible to pollers. The first failing stage
//! decides the outcome; nothing is retried.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info, info_span, warn};

use crate::clock::Clock;
use crate::core::ids::JobIdAllocator;
use crate::core::types::{INVALID_COMMIT_MESSAGE, Job, JobStatus};
use crate::io::workspace::WorkspaceManager;
use crate::store::{JobStore, StoreError};

/// Background stages of a job, used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Provisioning,
    Validating,
    Executing,
}

/// Terminal status and message produced by a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub status: JobStatus,
    pub message: String,
}

impl JobOutcome {
    fn errored(message: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Errored,
            message: message.into(),
        }
    }
}

/// An accepted submission.
#[derive(Debug)]
pub struct Submitted {
    pub job_id: String,
    worker: Option<JoinHandle<()>>,
}

impl Submitted {
    /// Block until the background worker has written the terminal record and
    /// cleaned up. Dropping a `Submitted` instead detaches the worker.
    pub fn wait(self) {
        if let Some(worker) = self.worker
            && worker.join().is_err()
        {
            error!(job_id = %self.job_id, "job worker panicked");
        }
    }
}

pub struct Orchestrator {
    store: Arc<JobStore>,
    workspaces: Arc<WorkspaceManager>,
    clock: Arc<dyn Clock>,
    ids: JobIdAllocator,
}

impl Orchestrator {
    pub fn new(
        store: Arc<JobStore>,
        workspaces: Arc<WorkspaceManager>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            workspaces,
            clock,
            ids: JobIdAllocator::new(),
        }
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Accept a submission: mint an id, write the RUNNING record and start
    /// the worker. Returns without waiting for any external step.
    pub fn submit(&self, commit: &str) -> Submitted {
        let job_id = self.insert_running();
        info!(job_id = %job_id, commit, "accepted test job");

        let store = Arc::clone(&self.store);
        let workspaces = Arc::clone(&self.workspaces);
        let clock = Arc::clone(&self.clock);
        let worker_id = job_id.clone();
        let worker_commit = commit.to_string();
        let spawned = thread::Builder::new()
            .name(format!("job-{job_id}"))
            .spawn(move || run_job(&store, &workspaces, clock.as_ref(), &worker_id, &worker_commit));

        match spawned {
            Ok(handle) => Submitted {
                job_id,
                worker: Some(handle),
            },
            Err(e) => {
                error!(job_id = %job_id, err = %e, "failed to start job worker");
                let job = Job::terminal(
                    JobStatus::Errored,
                    format!("error starting job: {e}"),
                    self.clock.now(),
                );
                self.store.put(&job_id, job);
                Submitted {
                    job_id,
                    worker: None,
                }
            }
        }
    }

    /// Return the current record, removing it once a terminal record is served.
    pub fn poll(&self, job_id: &str) -> Option<Job> {
        self.store.serve(job_id, self.clock.now())
    }

    /// Drop every expired record.
    pub fn sweep_expired(&self) {
        let evicted = self.store.sweep(self.clock.now());
        if evicted > 0 {
            debug!(evicted, "swept expired results");
        }
    }

    fn insert_running(&self) -> String {
        loop {
            let now = self.clock.now();
            let job_id = self.ids.allocate(now);
            match self.store.create(&job_id, Job::running(now), now) {
                Ok(()) => return job_id,
                Err(StoreError::DuplicateId(id)) => {
                    warn!(job_id = %id, "job id already live, allocating another");
                }
            }
        }
    }
}

fn run_job(
    store: &JobStore,
    workspaces: &WorkspaceManager,
    clock: &dyn Clock,
    job_id: &str,
    commit: &str,
) {
    let _span = info_span!("job", job_id = %job_id).entered();
    info!(commit, "running tests for commit");

    let (outcome, workspace_dir) = drive(workspaces, commit);

    store.put(
        job_id,
        Job::terminal(outcome.status, outcome.message, clock.now()),
    );
    info!(status = %outcome.status, "result generated");

    if let Some(dir) = workspace_dir {
        workspaces.destroy(&dir);
    }
}

/// Run the background stages. Returns the outcome and the workspace folder
/// to destroy, if one was created.
fn drive(workspaces: &WorkspaceManager, commit: &str) -> (JobOutcome, Option<PathBuf>) {
    debug!(stage = ?Stage::Provisioning, "entering stage");
    let workspace = match workspaces.provision() {
        Ok(workspace) => workspace,
        Err(e) => {
            warn!(err = %e, "provisioning failed");
            let message = e.to_string();
            return (JobOutcome::errored(message), e.leftover);
        }
    };

    debug!(stage = ?Stage::Validating, "entering stage");
    if !workspaces.validate_and_checkout(commit, &workspace) {
        return (
            JobOutcome::errored(INVALID_COMMIT_MESSAGE),
            Some(workspace.dir),
        );
    }

    debug!(stage = ?Stage::Executing, "entering stage");
    let outcome = match workspaces.run_tests(&workspace) {
        Ok(result) => JobOutcome {
            status: if result.succeeded {
                JobStatus::Success
            } else {
                JobStatus::Failure
            },
            message: result.output,
        },
        Err(e) => {
            warn!(err = %e, "test execution failed");
            JobOutcome::errored(e.to_string())
        }
    };
    (outcome, Some(workspace.dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::RUNNING_MESSAGE;
    use crate::io::workspace::DestroyHook;
    use crate::test_support::{ManualClock, ScriptedTestScript, ScriptedVcs, TestArea};
    use std::fs;
    use std::path::Path;
    use std::sync::Mutex;
    use std::sync::atomic::Ordering;

    struct Harness {
        area: TestArea,
        clock: Arc<ManualClock>,
        orchestrator: Orchestrator,
    }

    fn harness(vcs: ScriptedVcs, tests: ScriptedTestScript, gpu_mode: bool) -> Harness {
        let area = TestArea::new().expect("area");
        let clock = Arc::new(ManualClock::new());
        let workspaces = WorkspaceManager::new(area.settings(gpu_mode), Arc::new(vcs), Arc::new(tests));
        let orchestrator = Orchestrator::new(
            Arc::new(JobStore::new()),
            Arc::new(workspaces),
            clock.clone(),
        );
        Harness {
            area,
            clock,
            orchestrator,
        }
    }

    #[test]
    fn submit_writes_running_before_worker_finishes() {
        let (tests, gate) = ScriptedTestScript::passing("ok").gated();
        let h = harness(ScriptedVcs::resolving(&["abc"]), tests, false);

        let submitted = h.orchestrator.submit("abc");
        let id = submitted.job_id.clone();
        let job = h.orchestrator.poll(&id).expect("running record");
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.message, RUNNING_MESSAGE);

        gate.open();
        submitted.wait();
        let job = h.orchestrator.poll(&id).expect("terminal record");
        assert_eq!(job.status, JobStatus::Success);
    }

    #[test]
    fn passing_script_is_success_with_output() {
        let h = harness(
            ScriptedVcs::resolving(&["abc"]),
            ScriptedTestScript::passing("12 passed\n"),
            false,
        );
        let submitted = h.orchestrator.submit("abc");
        let id = submitted.job_id.clone();
        submitted.wait();

        let job = h.orchestrator.poll(&id).expect("result");
        assert_eq!(job.status, JobStatus::Success);
        assert_eq!(job.message, "12 passed\n");
        assert!(h.orchestrator.poll(&id).is_none(), "served once");
        assert_eq!(h.area.folder_count(), 0, "workspace destroyed");
    }

    #[test]
    fn failing_script_is_failure_with_output() {
        let h = harness(
            ScriptedVcs::resolving(&["abc"]),
            ScriptedTestScript::failing("1 failed\n"),
            false,
        );
        let submitted = h.orchestrator.submit("abc");
        let id = submitted.job_id.clone();
        submitted.wait();

        let job = h.orchestrator.poll(&id).expect("result");
        assert_eq!(job.status, JobStatus::Failure);
        assert_eq!(job.message, "1 failed\n");
        assert_eq!(h.area.folder_count(), 0);
    }

    #[test]
    fn unresolved_commit_is_errored_without_running_tests() {
        let tests = ScriptedTestScript::passing("ok");
        let runs = tests.runs();
        let vcs = ScriptedVcs::resolving(&["abc"]);
        let calls = vcs.calls();
        let h = harness(vcs, tests, false);

        let submitted = h.orchestrator.submit("zzzz");
        let id = submitted.job_id.clone();
        submitted.wait();

        let job = h.orchestrator.poll(&id).expect("result");
        assert_eq!(job.status, JobStatus::Errored);
        assert_eq!(job.message, INVALID_COMMIT_MESSAGE);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert!(calls.checkouts().is_empty());
        assert_eq!(h.area.folder_count(), 0);
    }

    #[test]
    fn checkout_failure_uses_same_message() {
        let h = harness(
            ScriptedVcs::resolving(&["abc"]).failing_checkout(),
            ScriptedTestScript::passing("ok"),
            false,
        );
        let submitted = h.orchestrator.submit("abc");
        let id = submitted.job_id.clone();
        submitted.wait();

        let job = h.orchestrator.poll(&id).expect("result");
        assert_eq!(job.status, JobStatus::Errored);
        assert_eq!(job.message, INVALID_COMMIT_MESSAGE);
    }

    #[test]
    fn fetch_failure_is_errored_with_description() {
        let tests = ScriptedTestScript::passing("ok");
        let runs = tests.runs();
        let h = harness(ScriptedVcs::failing_fetch("could not resolve host"), tests, false);

        let submitted = h.orchestrator.submit("abc");
        let id = submitted.job_id.clone();
        submitted.wait();

        let job = h.orchestrator.poll(&id).expect("result");
        assert_eq!(job.status, JobStatus::Errored);
        assert!(job.message.contains("could not resolve host"), "{}", job.message);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert_eq!(h.area.folder_count(), 0, "partial workspace destroyed");
    }

    #[test]
    fn uninvocable_script_is_errored() {
        let h = harness(
            ScriptedVcs::resolving(&["abc"]),
            ScriptedTestScript::uninvocable("spawn bash: not found"),
            false,
        );
        let submitted = h.orchestrator.submit("abc");
        let id = submitted.job_id.clone();
        submitted.wait();

        let job = h.orchestrator.poll(&id).expect("result");
        assert_eq!(job.status, JobStatus::Errored);
        assert!(job.message.contains("spawn bash: not found"));
    }

    #[test]
    fn gpu_swap_failure_is_errored_not_failure() {
        let tests = ScriptedTestScript::passing("ok");
        let runs = tests.runs();
        let h = harness(ScriptedVcs::resolving(&["abc"]), tests, true);

        let submitted = h.orchestrator.submit("abc");
        let id = submitted.job_id.clone();
        submitted.wait();

        let job = h.orchestrator.poll(&id).expect("result");
        assert_eq!(job.status, JobStatus::Errored);
        assert!(job.message.starts_with("error renaming project.config"));
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unserved_result_expires_after_two_hours() {
        let h = harness(
            ScriptedVcs::resolving(&["abc"]),
            ScriptedTestScript::passing("ok"),
            false,
        );
        let submitted = h.orchestrator.submit("abc");
        let id = submitted.job_id.clone();
        submitted.wait();

        h.clock.advance(chrono::Duration::hours(2) + chrono::Duration::seconds(1));
        assert!(h.orchestrator.poll(&id).is_none());
    }

    #[test]
    fn sweep_evicts_expired_records() {
        let h = harness(
            ScriptedVcs::resolving(&["abc"]),
            ScriptedTestScript::passing("ok"),
            false,
        );
        let submitted = h.orchestrator.submit("abc");
        submitted.wait();
        assert_eq!(h.orchestrator.store().len(), 1);

        h.clock.advance(chrono::Duration::hours(3));
        h.orchestrator.sweep_expired();
        assert!(h.orchestrator.store().is_empty());
    }

    #[test]
    fn terminal_record_is_written_before_cleanup_and_survives_its_failure() {
        let area = TestArea::new().expect("area");
        let store = Arc::new(JobStore::new());
        let clock = Arc::new(ManualClock::new());
        let job_id: Arc<Mutex<Option<String>>> = Arc::default();
        let seen_at_cleanup: Arc<Mutex<Option<Job>>> = Arc::default();

        let hook: DestroyHook = {
            let store = Arc::clone(&store);
            let clock = Arc::clone(&clock);
            let job_id = Arc::clone(&job_id);
            let seen = Arc::clone(&seen_at_cleanup);
            Arc::new(move |dir: &Path| {
                let id = job_id.lock().expect("id").clone().expect("id recorded");
                *seen.lock().expect("seen") = store.get(&id, clock.now());
                // Pull the folder out from under the delete so it fails.
                fs::remove_dir_all(dir).expect("remove ahead of destroy");
            })
        };
        let (tests, gate) = ScriptedTestScript::passing("ok\n").gated();
        let workspaces = WorkspaceManager::new(
            area.settings(false),
            Arc::new(ScriptedVcs::resolving(&["abc"])),
            Arc::new(tests),
        )
        .with_destroy_hook(hook);
        let orchestrator = Orchestrator::new(Arc::clone(&store), Arc::new(workspaces), clock);

        let submitted = orchestrator.submit("abc");
        let id = submitted.job_id.clone();
        *job_id.lock().expect("id") = Some(id.clone());
        gate.open();
        submitted.wait();

        let at_cleanup = seen_at_cleanup.lock().expect("seen").clone().expect("record present");
        assert_eq!(at_cleanup.status, JobStatus::Success);

        let job = orchestrator.poll(&id).expect("record survives failed cleanup");
        assert_eq!(job.status, JobStatus::Success);
        assert_eq!(job.message, "ok\n");
        assert_eq!(area.folder_count(), 0);
    }

    #[test]
    fn rapid_submissions_get_distinct_ids() {
        let (tests, gate) = ScriptedTestScript::passing("ok").gated();
        let h = harness(ScriptedVcs::resolving(&["abc"]), tests, false);

        let submissions: Vec<Submitted> = (0..5).map(|_| h.orchestrator.submit("abc")).collect();
        let mut ids: Vec<&str> = submissions.iter().map(|s| s.job_id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 5);

        gate.open();
        for submitted in submissions {
            submitted.wait();
        }
        assert_eq!(h.area.folder_count(), 0);
    }
}

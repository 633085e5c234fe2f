//! In-memory job result store shared by request handlers and workers.
//!
//! Every operation takes the same lock, so a reader never observes a record
//! halfway through an overwrite and concurrent writers never lose updates.
//! Expiry is logical: a record past its `expires_at` is treated as absent by
//! every read even before a sweep physically removes it.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

use crate::core::types::Job;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("job id {0} is already present")]
    DuplicateId(String),
}

#[derive(Debug, Default)]
pub struct JobStore {
    entries: Mutex<HashMap<String, Job>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new record; fails if `id` is already live.
    ///
    /// An expired record under the same id does not count as live and is
    /// replaced.
    pub fn create(&self, id: &str, job: Job, now: DateTime<Utc>) -> Result<(), StoreError> {
        let mut entries = self.lock();
        if entries.get(id).is_some_and(|existing| !existing.is_expired(now)) {
            return Err(StoreError::DuplicateId(id.to_string()));
        }
        entries.insert(id.to_string(), job);
        Ok(())
    }

    /// Return a copy of the live record for `id`.
    pub fn get(&self, id: &str, now: DateTime<Utc>) -> Option<Job> {
        self.lock()
            .get(id)
            .filter(|job| !job.is_expired(now))
            .cloned()
    }

    pub fn put(&self, id: &str, job: Job) {
        self.lock().insert(id.to_string(), job);
    }

    pub fn delete(&self, id: &str) {
        self.lock().remove(id);
    }

    /// Return the live record for `id`, removing it if it is terminal.
    ///
    /// Lookup and removal happen under one lock acquisition, so a terminal
    /// record is handed out at most once. Expired records are removed and
    /// reported as absent.
    pub fn serve(&self, id: &str, now: DateTime<Utc>) -> Option<Job> {
        let mut entries = self.lock();
        let job = entries.get(id)?;
        if job.is_expired(now) {
            debug!(job_id = %id, "dropping expired result on read");
            entries.remove(id);
            return None;
        }
        if job.status.is_terminal() {
            debug!(job_id = %id, "removing served result");
            return entries.remove(id);
        }
        Some(job.clone())
    }

    /// Remove every record whose `expires_at` is before `now`.
    ///
    /// Returns the number of evicted records.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|id, job| {
            let keep = !job.is_expired(now);
            if !keep {
                debug!(job_id = %id, "evicting expired result");
            }
            keep
        });
        before - entries.len()
    }

    /// Number of physically stored records, including unswept expired ones.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // A panic while holding the lock cannot leave a half-written record:
    // each critical section is a single map operation.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Job>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

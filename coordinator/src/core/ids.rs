//! Job id and workspace folder name generation.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use rand::{Rng, distributions::Alphanumeric};

/// Mints job ids from a millisecond timestamp plus a process-wide sequence.
///
/// Two submissions in the same millisecond still receive distinct ids because
/// the sequence number never repeats within a process.
#[derive(Debug, Default)]
pub struct JobIdAllocator {
    next_seq: AtomicU64,
}

impl JobIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&self, now: DateTime<Utc>) -> String {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        build_job_id(now.timestamp_millis(), seq)
    }
}

pub fn build_job_id(millis: i64, seq: u64) -> String {
    format!("{millis:x}-{seq:x}")
}

/// Folder name for a new workspace: hex microseconds plus a random suffix.
pub fn workspace_folder_name(now: DateTime<Utc>) -> String {
    build_folder_name(now.timestamp_micros(), &generate_short_id())
}

pub fn build_folder_name(micros: i64, short_id: &str) -> String {
    format!("{micros:x}-{short_id}")
}

fn generate_short_id() -> String {
    let mut rng = rand::thread_rng();
    std::iter::repeat_with(|| rng.sample(Alphanumeric))
        .map(char::from)
        .take(6)
        .collect::<String>()
        .to_lowercase()
}

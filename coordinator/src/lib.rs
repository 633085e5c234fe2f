//! Commit-triggered test coordinator for the simulation repository.
//!
//! A submission names a commit. The coordinator answers at once with a job id,
//! then on a background worker clones the repository into a fresh workspace,
//! checks the commit out, runs the repository's test script and records the
//! outcome. Pollers read the record until a terminal result is served once or
//! the record expires.
//!
//! - **[`core`]**: Pure logic (record types, ids, authorization, commit and
//!   path checks). No I/O.
//! - **[`io`]**: Side effects (git, test script, workspaces, config). The git
//!   and script adapters sit behind traits so tests can script them.
//!
//! [`store`], [`orchestrator`] and [`service`] tie the two together.

pub mod clock;
pub mod core;
pub mod io;
pub mod logging;
pub mod orchestrator;
pub mod service;
pub mod store;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

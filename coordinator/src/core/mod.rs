//! Deterministic, pure logic shared by the coordinator.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! values and take the current time as an argument so tests stay deterministic.

pub mod auth;
pub mod commit_ref;
pub mod ids;
pub mod path_guard;
pub mod types;

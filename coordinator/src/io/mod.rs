//! Side-effecting adapters: filesystem, git, and child processes.

pub mod config;
pub mod git;
pub mod process;
pub mod test_script;
pub mod workspace;

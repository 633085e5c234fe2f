//! Syntax check for caller-supplied commit references.

use std::sync::LazyLock;

const MAX_REF_LEN: usize = 255;

static REF_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^[0-9A-Za-z][0-9A-Za-z_./-]*$").unwrap());

/// True if `commit` may be handed to the version-control tool.
///
/// Only hashes and plain ref names pass: no whitespace, shell metacharacters,
/// revision operators (`~`, `^`, `@{`), leading option dashes or `..`.
/// Dashes after the first character are fine: git gets an argument vector.
pub fn is_acceptable_commit_ref(commit: &str) -> bool {
    commit.len() <= MAX_REF_LEN && !commit.contains("..") && REF_RE.is_match(commit)
}

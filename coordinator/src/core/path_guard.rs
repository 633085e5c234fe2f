//! Confinement check run before any recursive delete under the test area.
//!
//! The check is an allow-list: a path is deletable only if it is the root
//! followed by exactly one plain folder name. Anything else is rejected.

use std::path::{Component, Path};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathRejection {
    #[error("path contains a parent-directory segment")]
    ParentSegment,
    #[error("path is the test-area root itself")]
    BareRoot,
    #[error("path is not under the test-area root")]
    OutsideRoot,
    #[error("path is not a single folder directly under the test-area root")]
    UnexpectedShape,
}

/// Verify that `path` is `<root>/<folder>` and nothing else.
pub fn check_confined(root: &Path, path: &Path) -> Result<(), PathRejection> {
    let has_parent = |p: &Path| p.components().any(|c| matches!(c, Component::ParentDir));
    if has_parent(root) || has_parent(path) {
        return Err(PathRejection::ParentSegment);
    }

    let rel = path
        .strip_prefix(root)
        .map_err(|_| PathRejection::OutsideRoot)?;

    let mut components = rel.components();
    match (components.next(), components.next()) {
        (None, _) => Err(PathRejection::BareRoot),
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(PathRejection::UnexpectedShape),
    }
}

//! Test utilities shared across test modules

use crate::paths::Paths;
use tempfile::TempDir;

/// Create a Paths struct rooted in a temporary directory.
///
/// The base dir is a not-yet-existing child so tests also cover first-run
/// layout creation; the output file sits next to it, outside the base dir.
pub fn setup_test_paths(temp_dir: &TempDir) -> Paths {
    Paths::new(
        temp_dir.path().join(".aclprof"),
        temp_dir.path().join("acl.hujson"),
    )
}

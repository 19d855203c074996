use anyhow::{Context, Result};
use directories::BaseDirs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Directory under the home directory used when `--dir` is not given
const DEFAULT_DIR_NAME: &str = ".aclprof";
/// Output file name (inside the base dir) used when `--output` is not given
const DEFAULT_OUTPUT_NAME: &str = "acl.hujson";
/// Extension of the per-profile content files
pub const CONTENT_EXTENSION: &str = "hujson";

/// All computed paths used by aclprof
#[derive(Debug, Clone)]
pub struct Paths {
    /// <dir>
    pub base_dir: PathBuf,
    /// <dir>/profiles
    pub profiles_dir: PathBuf,
    /// <dir>/profiles/index.json
    pub index_file: PathBuf,
    /// <dir>/state.json
    pub state_file: PathBuf,
    /// File overwritten when a profile is applied
    pub output_file: PathBuf,
}

impl Paths {
    /// Lay out every path beneath `base_dir`. Nothing is created on disk.
    pub fn new(base_dir: impl Into<PathBuf>, output_file: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let profiles_dir = base_dir.join("profiles");
        let index_file = profiles_dir.join("index.json");
        let state_file = base_dir.join("state.json");

        Self {
            base_dir,
            profiles_dir,
            index_file,
            state_file,
            output_file: output_file.into(),
        }
    }

    /// Resolve paths from CLI/env overrides, falling back to `~/.aclprof`
    /// and `<dir>/acl.hujson`.
    pub fn resolve(dir: Option<PathBuf>, output: Option<PathBuf>) -> Result<Self> {
        let base_dir = match dir {
            Some(dir) => dir,
            None => default_base_dir()?,
        };
        let output_file = output.unwrap_or_else(|| base_dir.join(DEFAULT_OUTPUT_NAME));
        Ok(Self::new(base_dir, output_file))
    }

    /// Path of the content file for a freshly generated identifier
    pub fn profile_content(&self, id: &Uuid) -> PathBuf {
        self.profiles_dir
            .join(format!("{}.{}", id, CONTENT_EXTENSION))
    }

    /// Check if a path is within the profiles directory
    pub fn is_in_profiles_dir(&self, path: &Path) -> bool {
        path.starts_with(&self.profiles_dir)
    }
}

fn default_base_dir() -> Result<PathBuf> {
    let base_dirs = BaseDirs::new().context("Failed to determine home directory")?;
    Ok(base_dirs.home_dir().join(DEFAULT_DIR_NAME))
}

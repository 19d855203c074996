use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// CLI bookkeeping stored in <dir>/state.json.
///
/// The index itself never reads this; it only records what `aclprof apply`
/// last wrote to the output file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct State {
    /// Name of the profile last applied through the CLI
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_profile: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<DateTime<Utc>>,
}

impl State {
    /// Read state from file, returning default if file doesn't exist
    pub fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {:?}", path))?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {:?}", path))
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.active_profile.as_deref() == Some(name)
    }
}

/// A state file held under an exclusive OS lock while it is being changed.
///
/// Lets two `aclprof` invocations update the active marker without losing
/// each other's write. The lock is released on drop.
pub struct LockedState {
    file: File,
    state: State,
    path: std::path::PathBuf,
}

impl LockedState {
    /// Open and lock the state file for exclusive access
    pub fn lock(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("Failed to open state file: {:?}", path))?;

        // Blocks until available
        file.lock_exclusive()
            .with_context(|| format!("Failed to lock state file: {:?}", path))?;

        let state = Self::read_from_file(&file, path)?;

        Ok(Self {
            file,
            state,
            path: path.to_path_buf(),
        })
    }

    fn read_from_file(mut file: &File, path: &Path) -> Result<State> {
        let mut content = String::new();
        file.read_to_string(&mut content)
            .with_context(|| format!("Failed to read state file: {:?}", path))?;

        if content.trim().is_empty() {
            return Ok(State::default());
        }

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {:?}", path))
    }

    /// Record `name` as the applied profile
    pub fn mark_applied(&mut self, name: &str) -> Result<()> {
        self.state.active_profile = Some(name.to_string());
        self.state.applied_at = Some(Utc::now());
        self.save()
    }

    /// Follow a rename if it touched the active profile
    pub fn rename_active(&mut self, old_name: &str, new_name: &str) -> Result<bool> {
        if !self.state.is_active(old_name) {
            return Ok(false);
        }
        self.state.active_profile = Some(new_name.to_string());
        self.save()?;
        Ok(true)
    }

    /// Drop the active marker if it points at `name`
    pub fn clear_active(&mut self, name: &str) -> Result<bool> {
        if !self.state.is_active(name) {
            return Ok(false);
        }
        self.state.active_profile = None;
        self.state.applied_at = None;
        self.save()?;
        Ok(true)
    }

    // Rewrites through the locked handle; a rename would swap the inode
    // out from under the lock.
    fn save(&mut self) -> Result<()> {
        let content =
            serde_json::to_string_pretty(&self.state).context("Failed to serialize state")?;

        self.file
            .set_len(0)
            .with_context(|| format!("Failed to truncate state file: {:?}", self.path))?;
        self.file
            .seek(SeekFrom::Start(0))
            .with_context(|| format!("Failed to seek state file: {:?}", self.path))?;
        self.file
            .write_all(content.as_bytes())
            .with_context(|| format!("Failed to write state file: {:?}", self.path))?;
        self.file
            .sync_all()
            .with_context(|| format!("Failed to sync state file: {:?}", self.path))?;

        Ok(())
    }
}

impl Drop for LockedState {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

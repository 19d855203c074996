//! Filesystem utility functions
//!
//! Small helpers shared by the index and the CLI state file. All of them
//! report failures as [`IndexError::Io`] tagged with the offending path.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use crate::error::{IndexError, Result};

/// Create (or truncate) `path` and write `data` in full.
///
/// The handle is closed before returning, on the error path too.
pub fn write_file(path: &Path, data: &[u8]) -> Result<()> {
    let mut file = File::create(path).map_err(|e| IndexError::io(path, e))?;
    file.write_all(data).map_err(|e| IndexError::io(path, e))?;
    Ok(())
}

/// Read a whole file into memory
pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    let mut file = File::open(path).map_err(|e| IndexError::io(path, e))?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)
        .map_err(|e| IndexError::io(path, e))?;
    Ok(data)
}

/// Replace `path` by writing a sibling temp file and renaming it over the target.
///
/// A crash mid-write leaves the previous contents intact.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    write_file(&temp_path, data)?;
    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        IndexError::io(path, e)
    })
}

/// Create `path` and any missing parents with mode 0755
pub fn create_dir_all(path: &Path) -> Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o755);
    }
    builder.create(path).map_err(|e| IndexError::io(path, e))
}

/// Whether the owner write bit is set on `meta`
#[cfg(unix)]
pub fn is_owner_writable(meta: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o200 != 0
}

#[cfg(not(unix))]
pub fn is_owner_writable(meta: &fs::Metadata) -> bool {
    !meta.permissions().readonly()
}

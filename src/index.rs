//! The profile index.
//!
//! Maps profile names to content files under `<dir>/profiles/` and keeps that
//! mapping in `<dir>/profiles/index.json`. A single lock serializes every
//! operation on an [`Index`], so one instance can be shared between threads
//! behind an `Arc`. Nothing guards against a second process opening the same
//! directory.
//!
//! ```text
//! <dir>/
//!   profiles/
//!     index.json          { "<name>": { "path": "<dir>/profiles/<uuid>.hujson" } }
//!     <uuid>.hujson       raw profile content
//! <output>                content of the last applied profile
//! ```

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

use crate::error::{IndexError, Result};
use crate::fs_utils;
use crate::paths::{CONTENT_EXTENSION, Paths};

/// Where a profile's content lives on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub path: PathBuf,
}

type Entries = BTreeMap<String, ProfileRecord>;

/// Named storage of opaque ACL documents with rename and activate operations
#[derive(Debug)]
pub struct Index {
    paths: Paths,
    entries: Mutex<Entries>,
}

impl Index {
    /// Open the index rooted at `base_dir`, creating the layout if needed.
    ///
    /// `output_file` is the file [`Index::apply`] overwrites.
    pub fn open(base_dir: impl Into<PathBuf>, output_file: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with_paths(Paths::new(base_dir, output_file))
    }

    /// Open the index using an already resolved [`Paths`] layout
    pub fn open_with_paths(paths: Paths) -> Result<Self> {
        ensure_layout(&paths)?;

        let entries = match fs::metadata(&paths.index_file) {
            Ok(_) => load_index(&paths.index_file)?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let entries = Entries::new();
                persist_index(&paths.index_file, &entries)?;
                entries
            }
            Err(e) => return Err(IndexError::io(&paths.index_file, e)),
        };

        debug!(
            dir = %paths.base_dir.display(),
            profiles = entries.len(),
            "opened profile index"
        );

        Ok(Self {
            paths,
            entries: Mutex::new(entries),
        })
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    pub fn output_path(&self) -> &Path {
        &self.paths.output_file
    }

    /// Store `content` under `name`, replacing the content of an existing profile.
    ///
    /// A new profile gets a fresh `<uuid>.hujson` file; an existing one keeps
    /// its file and has it rewritten in full.
    pub fn set(&self, name: &str, content: &[u8]) -> Result<()> {
        let mut entries = self.entries.lock();

        let (path, is_new) = match entries.get(name) {
            Some(record) => (record.path.clone(), false),
            None => (self.paths.profile_content(&Uuid::new_v4()), true),
        };

        if let Err(err) = fs_utils::write_file(&path, content) {
            if is_new {
                let _ = fs::remove_file(&path);
            }
            return Err(err);
        }

        if !is_new {
            persist_index(&self.paths.index_file, &entries)?;
            debug!(profile = name, path = %path.display(), "updated profile");
            return Ok(());
        }

        entries.insert(name.to_string(), ProfileRecord { path: path.clone() });
        if let Err(err) = persist_index(&self.paths.index_file, &entries) {
            entries.remove(name);
            let _ = fs::remove_file(&path);
            return Err(err);
        }

        debug!(profile = name, path = %path.display(), "created profile");
        Ok(())
    }

    /// Forget `name`. Removing an unknown name is not an error.
    ///
    /// The content file stays on disk; see [`Index::orphaned_files`].
    pub fn remove(&self, name: &str) -> Result<()> {
        let mut entries = self.entries.lock();

        let removed = entries.remove(name);
        if let Err(err) = persist_index(&self.paths.index_file, &entries) {
            if let Some(record) = removed {
                entries.insert(name.to_string(), record);
            }
            return Err(err);
        }

        debug!(profile = name, existed = removed.is_some(), "removed profile");
        Ok(())
    }

    /// Move `old_name` to `new_name`, keeping its content file.
    ///
    /// Never overwrites: fails with [`IndexError::ProfileExists`] if
    /// `new_name` is taken.
    pub fn rename(&self, old_name: &str, new_name: &str) -> Result<()> {
        let mut entries = self.entries.lock();

        // A missing source wins over a taken destination
        if entries.contains_key(old_name) && entries.contains_key(new_name) {
            return Err(IndexError::ProfileExists(new_name.to_string()));
        }
        let record = entries
            .remove(old_name)
            .ok_or_else(|| IndexError::ProfileNotFound(old_name.to_string()))?;
        entries.insert(new_name.to_string(), record);

        if let Err(err) = persist_index(&self.paths.index_file, &entries) {
            if let Some(record) = entries.remove(new_name) {
                entries.insert(old_name.to_string(), record);
            }
            return Err(err);
        }

        debug!(from = old_name, to = new_name, "renamed profile");
        Ok(())
    }

    /// Copy the content of `name` over the output file
    pub fn apply(&self, name: &str) -> Result<()> {
        let entries = self.entries.lock();

        let record = entries
            .get(name)
            .ok_or_else(|| IndexError::ProfileNotFound(name.to_string()))?;

        let data = fs_utils::read_file(&record.path)?;
        fs_utils::write_file(&self.paths.output_file, &data)?;

        debug!(
            profile = name,
            output = %self.paths.output_file.display(),
            bytes = data.len(),
            "applied profile"
        );
        Ok(())
    }

    /// Read the stored content of `name`
    pub fn read(&self, name: &str) -> Result<Vec<u8>> {
        let entries = self.entries.lock();
        let record = entries
            .get(name)
            .ok_or_else(|| IndexError::ProfileNotFound(name.to_string()))?;
        fs_utils::read_file(&record.path)
    }

    /// Profile names in sorted order
    pub fn names(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }

    pub fn record(&self, name: &str) -> Option<ProfileRecord> {
        self.entries.lock().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.lock().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Content files in the profiles directory that no profile points at.
    ///
    /// These accumulate because [`Index::remove`] leaves content on disk.
    pub fn orphaned_files(&self) -> Result<Vec<PathBuf>> {
        let entries = self.entries.lock();

        let referenced: HashSet<_> = entries
            .values()
            .filter_map(|record| record.path.file_name())
            .collect();

        let dir = &self.paths.profiles_dir;
        let mut orphans = Vec::new();
        for entry in fs::read_dir(dir).map_err(|e| IndexError::io(dir, e))? {
            let path = entry.map_err(|e| IndexError::io(dir, e))?.path();
            let is_content = path
                .extension()
                .is_some_and(|ext| ext == CONTENT_EXTENSION);
            let is_referenced = path
                .file_name()
                .is_some_and(|name| referenced.contains(name));
            if is_content && !is_referenced {
                orphans.push(path);
            }
        }
        orphans.sort();
        Ok(orphans)
    }
}

/// Make sure `<dir>` is a writable directory and `<dir>/profiles` exists
fn ensure_layout(paths: &Paths) -> Result<()> {
    let base = &paths.base_dir;

    let meta = match fs::metadata(base) {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            fs_utils::create_dir_all(base)?;
            fs::metadata(base).map_err(|e| IndexError::io(base, e))?
        }
        Err(e) => return Err(IndexError::io(base, e)),
    };

    if !meta.is_dir() {
        return Err(IndexError::NotADirectory(base.clone()));
    }
    if !fs_utils::is_owner_writable(&meta) {
        return Err(IndexError::NotWritable(base.clone()));
    }

    fs_utils::create_dir_all(&paths.profiles_dir)
}

fn load_index(path: &Path) -> Result<Entries> {
    let data = fs_utils::read_file(path)?;
    // A literal `null` is treated as an empty index
    let entries: Option<Entries> = serde_json::from_slice(&data).map_err(|source| {
        IndexError::Parse {
            path: path.to_path_buf(),
            source,
        }
    })?;
    Ok(entries.unwrap_or_default())
}

/// Serialize `entries` with a four space indent and replace the index file
fn persist_index(path: &Path, entries: &Entries) -> Result<()> {
    let mut data = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut data, formatter);
    entries
        .serialize(&mut serializer)
        .map_err(IndexError::Serialize)?;

    fs_utils::write_atomic(path, &data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::setup_test_paths;
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    fn open_test_index(temp_dir: &TempDir) -> Index {
        Index::open_with_paths(setup_test_paths(temp_dir)).unwrap()
    }

    #[test]
    fn test_open_creates_layout() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        assert!(!paths.base_dir.exists());

        let index = Index::open_with_paths(paths.clone()).unwrap();
        assert!(index.is_empty());
        assert!(paths.profiles_dir.is_dir());
        assert_eq!(fs::read_to_string(&paths.index_file).unwrap(), "{}");
    }

    #[test]
    fn test_open_on_regular_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("not-a-dir");
        fs::write(&file, "x").unwrap();

        let err = Index::open(&file, temp_dir.path().join("out.hujson")).unwrap_err();
        assert!(matches!(err, IndexError::NotADirectory(_)));
        assert!(err.is_config());
    }

    #[cfg(unix)]
    #[test]
    fn test_open_read_only_dir_fails() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path().join("ro");
        fs::create_dir(&base).unwrap();
        fs::set_permissions(&base, fs::Permissions::from_mode(0o555)).unwrap();

        let err = Index::open(&base, temp_dir.path().join("out.hujson")).unwrap_err();
        assert!(matches!(err, IndexError::NotWritable(_)));
        assert!(!base.join("profiles").exists());

        fs::set_permissions(&base, fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_open_malformed_index_fails() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        fs::create_dir_all(&paths.profiles_dir).unwrap();
        fs::write(&paths.index_file, "{ not json").unwrap();

        let err = Index::open_with_paths(paths).unwrap_err();
        assert!(matches!(err, IndexError::Parse { .. }));
    }

    #[test]
    fn test_open_null_index_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        fs::create_dir_all(&paths.profiles_dir).unwrap();
        fs::write(&paths.index_file, "null").unwrap();

        let index = Index::open_with_paths(paths).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn test_set_new_profile() {
        let temp_dir = TempDir::new().unwrap();
        let index = open_test_index(&temp_dir);

        index.set("prod", b"{\"acls\": []}").unwrap();

        let record = index.record("prod").unwrap();
        assert!(index.paths().is_in_profiles_dir(&record.path));
        assert_eq!(
            record.path.extension().and_then(|e| e.to_str()),
            Some("hujson")
        );
        assert_eq!(fs::read(&record.path).unwrap(), b"{\"acls\": []}");
    }

    #[test]
    fn test_set_existing_reuses_path() {
        let temp_dir = TempDir::new().unwrap();
        let index = open_test_index(&temp_dir);

        index.set("prod", b"first version, longer").unwrap();
        let before = index.record("prod").unwrap();
        index.set("prod", b"second").unwrap();
        let after = index.record("prod").unwrap();

        assert_eq!(before, after);
        assert_eq!(index.read("prod").unwrap(), b"second");
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_set_persists_index() {
        let temp_dir = TempDir::new().unwrap();
        let index = open_test_index(&temp_dir);
        index.set("prod", b"x").unwrap();

        let raw = fs::read_to_string(&index.paths().index_file).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let path = parsed["prod"]["path"].as_str().unwrap();
        assert_eq!(PathBuf::from(path), index.record("prod").unwrap().path);
        // four space indent
        assert!(raw.contains("\n    \"prod\""));
    }

    #[test]
    fn test_set_fails_when_profiles_dir_missing() {
        let temp_dir = TempDir::new().unwrap();
        let index = open_test_index(&temp_dir);
        fs::remove_dir_all(&index.paths().profiles_dir).unwrap();

        let err = index.set("prod", b"x").unwrap_err();
        assert!(matches!(err, IndexError::Io { .. }));
        assert!(!index.contains("prod"));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let index = open_test_index(&temp_dir);
        index.set("dev", b"x").unwrap();

        index.remove("dev").unwrap();
        index.remove("dev").unwrap();
        index.remove("never-existed").unwrap();
        assert!(!index.contains("dev"));
    }

    #[test]
    fn test_remove_keeps_content_file() {
        let temp_dir = TempDir::new().unwrap();
        let index = open_test_index(&temp_dir);
        index.set("dev", b"x").unwrap();
        index.set("prod", b"y").unwrap();
        let dev_path = index.record("dev").unwrap().path;

        assert!(index.orphaned_files().unwrap().is_empty());
        index.remove("dev").unwrap();

        assert!(dev_path.exists());
        assert_eq!(index.orphaned_files().unwrap(), vec![dev_path]);
    }

    #[test]
    fn test_rename() {
        let temp_dir = TempDir::new().unwrap();
        let index = open_test_index(&temp_dir);
        index.set("old", b"content").unwrap();
        let record = index.record("old").unwrap();

        index.rename("old", "new").unwrap();

        assert!(!index.contains("old"));
        assert_eq!(index.record("new").unwrap(), record);
        assert_eq!(index.read("new").unwrap(), b"content");
    }

    #[test]
    fn test_rename_errors() {
        let temp_dir = TempDir::new().unwrap();
        let index = open_test_index(&temp_dir);
        index.set("a", b"1").unwrap();
        index.set("b", b"2").unwrap();

        assert!(matches!(
            index.rename("missing", "c"),
            Err(IndexError::ProfileNotFound(name)) if name == "missing"
        ));
        assert!(matches!(
            index.rename("a", "b"),
            Err(IndexError::ProfileExists(name)) if name == "b"
        ));
        assert!(matches!(
            index.rename("missing", "b"),
            Err(IndexError::ProfileNotFound(name)) if name == "missing"
        ));
        assert!(matches!(
            index.rename("a", "a"),
            Err(IndexError::ProfileExists(name)) if name == "a"
        ));
        assert_eq!(index.read("a").unwrap(), b"1");
        assert_eq!(index.read("b").unwrap(), b"2");
    }

    /// Make every later index save fail by putting a directory where
    /// `index.json` goes
    fn block_index_file(index: &Index) {
        let index_file = &index.paths().index_file;
        fs::remove_file(index_file).unwrap();
        fs::create_dir(index_file).unwrap();
        fs::write(index_file.join("keep"), "x").unwrap();
    }

    #[test]
    fn test_set_rolls_back_when_save_fails() {
        let temp_dir = TempDir::new().unwrap();
        let index = open_test_index(&temp_dir);
        index.set("a", b"1").unwrap();
        block_index_file(&index);

        let err = index.set("b", b"2").unwrap_err();
        assert!(matches!(err, IndexError::Io { .. }));
        assert!(!index.contains("b"));
        assert_eq!(index.names(), vec!["a"]);
        assert!(index.orphaned_files().unwrap().is_empty());
        assert!(!index.paths().profiles_dir.join("index.json.tmp").exists());
    }

    #[test]
    fn test_rename_rolls_back_when_save_fails() {
        let temp_dir = TempDir::new().unwrap();
        let index = open_test_index(&temp_dir);
        index.set("a", b"1").unwrap();
        let record = index.record("a").unwrap();
        block_index_file(&index);

        assert!(matches!(index.rename("a", "c"), Err(IndexError::Io { .. })));
        assert_eq!(index.record("a"), Some(record));
        assert!(!index.contains("c"));
        assert_eq!(index.read("a").unwrap(), b"1");
    }

    #[test]
    fn test_remove_rolls_back_when_save_fails() {
        let temp_dir = TempDir::new().unwrap();
        let index = open_test_index(&temp_dir);
        index.set("a", b"1").unwrap();
        let record = index.record("a").unwrap();
        block_index_file(&index);

        assert!(matches!(index.remove("a"), Err(IndexError::Io { .. })));
        assert_eq!(index.record("a"), Some(record));
    }

    #[test]
    fn test_apply() {
        let temp_dir = TempDir::new().unwrap();
        let index = open_test_index(&temp_dir);
        index.set("prod", b"prod policy").unwrap();
        index.set("dev", b"dev").unwrap();

        index.apply("prod").unwrap();
        assert_eq!(fs::read(index.output_path()).unwrap(), b"prod policy");

        index.apply("dev").unwrap();
        assert_eq!(fs::read(index.output_path()).unwrap(), b"dev");
    }

    #[test]
    fn test_apply_missing_profile() {
        let temp_dir = TempDir::new().unwrap();
        let index = open_test_index(&temp_dir);

        assert!(matches!(
            index.apply("nope"),
            Err(IndexError::ProfileNotFound(_))
        ));
        assert!(!index.output_path().exists());
    }

    #[test]
    fn test_apply_missing_content_file() {
        let temp_dir = TempDir::new().unwrap();
        let index = open_test_index(&temp_dir);
        index.set("prod", b"x").unwrap();
        fs::remove_file(index.record("prod").unwrap().path).unwrap();

        assert!(matches!(index.apply("prod"), Err(IndexError::Io { .. })));
    }

    #[test]
    fn test_names_sorted() {
        let temp_dir = TempDir::new().unwrap();
        let index = open_test_index(&temp_dir);
        for name in ["zeta", "alpha", "mid"] {
            index.set(name, name.as_bytes()).unwrap();
        }
        assert_eq!(index.names(), vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_concurrent_sets() {
        let temp_dir = TempDir::new().unwrap();
        let index = Arc::new(open_test_index(&temp_dir));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let index = Arc::clone(&index);
                thread::spawn(move || {
                    for j in 0..5 {
                        let name = format!("profile-{}-{}", i, j);
                        index.set(&name, name.as_bytes()).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(index.len(), 40);
        let reopened = Index::open_with_paths(index.paths().clone()).unwrap();
        assert_eq!(reopened.names(), index.names());
        assert_eq!(reopened.read("profile-3-4").unwrap(), b"profile-3-4");
    }
}

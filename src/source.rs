//! Data-source capability for the analysis engine.
//!
//! Every input the engine reads arrives through [`DataSource`], addressed by
//! logical paths relative to the host root (`proc/interrupts`,
//! `sys/devices/system/node`, ...). The engine does not care whether the
//! backing store is the live filesystem or a captured sosreport tree; absent
//! files are reported as `None` / an empty listing rather than as errors, so
//! callers branch on presence explicitly.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Read-only access to host data by logical path.
pub trait DataSource {
    /// Read a file's contents, `None` if the path does not exist.
    fn read_to_string(&self, path: &str) -> Result<Option<String>>;

    /// List the entry names of a directory, empty if the path does not exist.
    fn list_dir(&self, path: &str) -> Result<Vec<String>>;

    /// Human-readable description of the backing store, for logs.
    fn describe(&self) -> String;
}

fn read_at(root: &Path, path: &str) -> Result<Option<String>> {
    match fs::read_to_string(root.join(path)) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn list_at(root: &Path, path: &str) -> Result<Vec<String>> {
    let entries = match fs::read_dir(root.join(path)) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}

/// A captured sosreport tree on disk.
#[derive(Debug, Clone)]
pub struct SnapshotSource {
    root: PathBuf,
}

impl SnapshotSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl DataSource for SnapshotSource {
    fn read_to_string(&self, path: &str) -> Result<Option<String>> {
        read_at(&self.root, path)
    }

    fn list_dir(&self, path: &str) -> Result<Vec<String>> {
        list_at(&self.root, path)
    }

    fn describe(&self) -> String {
        format!("snapshot at {}", self.root.display())
    }
}

/// The live host filesystem, rooted at `/`.
#[derive(Debug, Clone, Default)]
pub struct LiveSource;

impl DataSource for LiveSource {
    fn read_to_string(&self, path: &str) -> Result<Option<String>> {
        read_at(Path::new("/"), path)
    }

    fn list_dir(&self, path: &str) -> Result<Vec<String>> {
        list_at(Path::new("/"), path)
    }

    fn describe(&self) -> String {
        "live host".to_string()
    }
}

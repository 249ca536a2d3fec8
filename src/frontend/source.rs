//! Source text providers for the frontend.
//!
//! The frontend never touches the filesystem directly; it asks a
//! [`SourceProvider`] for file contents. [`FsSource`] reads from disk,
//! [`MemorySource`] serves in-memory fixtures.

use indexmap::IndexMap;
use std::io;
use std::path::{Path, PathBuf};

/// Supplies source text by path.
pub trait SourceProvider: Send + Sync {
    /// Read the full text of `path`.
    fn read(&self, path: &Path) -> io::Result<String>;

    /// Whether `path` exists.
    fn exists(&self, path: &Path) -> bool;
}

/// Reads sources from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSource;

impl SourceProvider for FsSource {
    fn read(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// In-memory set of source files keyed by normalized path.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: IndexMap<PathBuf, String>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a file.
    pub fn with_file(mut self, path: impl AsRef<Path>, text: impl Into<String>) -> Self {
        self.insert(path, text);
        self
    }

    pub fn insert(&mut self, path: impl AsRef<Path>, text: impl Into<String>) {
        self.files.insert(normalize(path.as_ref()), text.into());
    }
}

impl SourceProvider for MemorySource {
    fn read(&self, path: &Path) -> io::Result<String> {
        self.files.get(&normalize(path)).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such source: {}", path.display()),
            )
        })
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(&normalize(path))
    }
}

/// Lexically normalize a path (drop `.` segments, fold `..`).
pub fn normalize(path: &Path) -> PathBuf {
    use std::path::Component;
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_source_normalizes_paths() {
        let source = MemorySource::new().with_file("include/./a.h", "int x;");
        assert!(source.exists(Path::new("include/a.h")));
        assert!(source.exists(Path::new("include/sub/../a.h")));
        assert_eq!(source.read(Path::new("include/a.h")).unwrap(), "int x;");
    }

    #[test]
    fn test_memory_source_missing_file() {
        let source = MemorySource::new();
        let err = source.read(Path::new("missing.h")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}

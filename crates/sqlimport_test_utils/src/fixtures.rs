//! Source files and table definitions on disk.

use sqlimport_core::{ColumnSpec, MaxLength};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A temp directory holding source files; removed on drop.
pub struct SourceFixture {
    dir: TempDir,
}

impl SourceFixture {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir()?,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `contents` to `name` inside the fixture directory.
    pub fn write(&self, name: &str, contents: &str) -> std::io::Result<PathBuf> {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    /// Like [`write`](Self::write), for contents that are not valid UTF-8.
    pub fn write_bytes(&self, name: &str, contents: &[u8]) -> std::io::Result<PathBuf> {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    /// Names of the files currently in the directory, sorted.
    pub fn file_names(&self) -> std::io::Result<Vec<String>> {
        list_files(self.dir.path())
    }
}

/// Sorted file names in `dir`.
pub fn list_files(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut names = std::fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect::<std::io::Result<Vec<_>>>()?;
    names.sort();
    Ok(names)
}

/// Build a column list from `(name, type)` pairs, in ordinal order.
///
/// Character types get a width of 50; everything else is unbounded.
pub fn columns(spec: &[(&str, &str)]) -> Vec<ColumnSpec> {
    spec.iter()
        .enumerate()
        .map(|(idx, (name, type_name))| {
            let column = ColumnSpec::new(idx as u32 + 1, *name, *type_name, MaxLength::Unbounded);
            if column.sql_type.is_character() {
                ColumnSpec {
                    max_length: MaxLength::Bounded(50),
                    ..column
                }
            } else {
                column
            }
        })
        .collect()
}

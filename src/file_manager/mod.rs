//! Filesystem facade rooted at one directory
//!
//! All paths handed to the file manager are relative to its root. It opens
//! byte-stream handles and manages directories; it knows nothing about
//! records or framing. Errors are plain `io::Error`s; callers attach context.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Owns a root directory and opens files beneath it
#[derive(Debug, Clone)]
pub struct FileManager {
    root: PathBuf,
}

impl FileManager {
    /// Creates a file manager rooted at `root`. Nothing is touched on disk.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Absolute path of `relative` under the root.
    pub fn file_path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root.join(relative)
    }

    /// Path of the directory `name` under the root, without creating it.
    pub fn directory(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Creates the directory `name` (and the root) if missing.
    ///
    /// Fails if the path exists and is not a directory.
    pub fn create_directory(&self, name: &str) -> io::Result<PathBuf> {
        let dir = self.directory(name);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Creates an empty file at `relative` if it does not exist yet.
    pub fn create_file(&self, relative: impl AsRef<Path>) -> io::Result<PathBuf> {
        let path = self.file_path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(path)
    }

    /// Deletes the file at `relative`.
    ///
    /// Returns `Ok(false)` if there was nothing to delete.
    pub fn delete_file(&self, relative: impl AsRef<Path>) -> io::Result<bool> {
        match fs::remove_file(self.file_path(relative)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Lists regular files in directory `name`, sorted by path.
    ///
    /// A missing directory lists as empty.
    pub fn list_files(&self, name: &str) -> io::Result<Vec<PathBuf>> {
        let dir = self.directory(name);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    /// Opens `relative` for reading.
    pub fn new_input_stream(&self, relative: impl AsRef<Path>) -> io::Result<File> {
        File::open(self.file_path(relative))
    }

    /// Opens `relative` for writing, creating it if missing.
    ///
    /// With `append` the handle writes at the tail; otherwise the file is
    /// truncated first.
    pub fn new_output_stream(&self, relative: impl AsRef<Path>, append: bool) -> io::Result<File> {
        let mut options = OpenOptions::new();
        options.create(true);
        if append {
            options.append(true);
        } else {
            options.write(true).truncate(true);
        }
        options.open(self.file_path(relative))
    }

    /// Atomically replaces `to` with `from` (both relative to the root).
    pub fn rename(&self, from: impl AsRef<Path>, to: impl AsRef<Path>) -> io::Result<()> {
        fs::rename(self.file_path(from), self.file_path(to))
    }

    /// Fsyncs directory `name` so renames and creations inside it are durable.
    pub fn sync_directory(&self, name: &str) -> io::Result<()> {
        File::open(self.directory(name))?.sync_all()
    }
}

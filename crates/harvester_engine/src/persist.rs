//! Atomic placement of export files.
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::Builder;

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("{} exists and is not a directory", .0.display())]
    NotADirectory(PathBuf),
    #[error("cannot create output directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Creates `dir` and its parents when missing.
pub fn ensure_output_dir(dir: &Path) -> Result<(), PersistError> {
    match fs::metadata(dir) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(PersistError::NotADirectory(dir.to_path_buf())),
        Err(_) => fs::create_dir_all(dir).map_err(|source| PersistError::CreateDir {
            path: dir.to_path_buf(),
            source,
        }),
    }
}

/// Writes export files into one directory. Content lands in a `.part` file
/// beside the target and is renamed over it once synced, so a reader sees
/// either the previous export or the new one.
#[derive(Debug, Clone)]
pub struct AtomicFileWriter {
    dir: PathBuf,
}

impl AtomicFileWriter {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the final path of the written file.
    pub fn write(&self, filename: &str, content: &[u8]) -> Result<PathBuf, PersistError> {
        ensure_output_dir(&self.dir)?;

        let mut part = Builder::new()
            .prefix(".harvest-")
            .suffix(".part")
            .tempfile_in(&self.dir)?;
        part.write_all(content)?;
        part.as_file().sync_all()?;

        let target = self.dir.join(filename);
        part.persist(&target).map_err(|err| PersistError::Io(err.error))?;
        Ok(target)
    }
}

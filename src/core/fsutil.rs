//! Durable file operations shared by the ledger, encoder and transfer
//!
//! Every state change other processes can observe goes through a temp file in
//! the target directory followed by `rename(2)`. Temp files are named
//! `.<final-name>.<random>.tmp` so leftovers of a crashed writer can be found.

use crate::domain::{CourierError, Result};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Suffix of every temp file created here
pub const TEMP_SUFFIX: &str = ".tmp";

/// Prefix of the temp files belonging to `final_name`
pub fn temp_prefix(final_name: &str) -> String {
    format!(".{final_name}.")
}

/// Create an empty temp file next to `final_path`
pub fn temp_file_for(final_path: &Path) -> io::Result<NamedTempFile> {
    let parent = parent_dir(final_path)?;
    let name = file_name(final_path)?;
    tempfile::Builder::new()
        .prefix(&temp_prefix(&name))
        .suffix(TEMP_SUFFIX)
        .tempfile_in(parent)
}

/// Flush `tmp`, fsync it, rename it over `final_path` and fsync the directory
pub fn persist_durable(mut tmp: NamedTempFile, final_path: &Path) -> io::Result<()> {
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(final_path).map_err(|e| e.error)?;
    fsync_dir(parent_dir(final_path)?)
}

/// Replace `path` with `data` atomically
///
/// Readers see either the previous content or `data`, never a mix.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut tmp = temp_file_for(path)?;
    tmp.write_all(data)?;
    persist_durable(tmp, path)
}

/// Make directory entry changes (create, rename, unlink) in `dir` durable
#[cfg(unix)]
pub fn fsync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
pub fn fsync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

/// Remove `path`, treating "already gone" as success.
///
/// Returns whether a file was removed.
pub fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Remove temp files left behind for `final_name` in `dir`.
///
/// Returns the number of files removed.
pub fn remove_stale_temps(dir: &Path, final_name: &str) -> io::Result<usize> {
    let prefix = temp_prefix(final_name);
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(&prefix) && name.ends_with(TEMP_SUFFIX) && remove_if_exists(&entry.path())? {
            removed += 1;
        }
    }
    Ok(removed)
}

/// Run blocking file work on the blocking pool
pub async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| CourierError::Other(format!("blocking file task failed: {e}")))?
}

fn parent_dir(path: &Path) -> io::Result<&Path> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => Ok(parent),
        Some(_) => Ok(Path::new(".")),
        None => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} has no parent directory", path.display()),
        )),
    }
}

fn file_name(path: &Path) -> io::Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} has no file name", path.display()),
            )
        })
}

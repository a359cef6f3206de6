use fs4::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Suffix appended to the repository config filename to get the lock path.
pub const LOCK_FILE_SUFFIX: &str = ".mlock";

pub fn lock_file_path(config_filename: &Path) -> PathBuf {
    let mut path = config_filename.as_os_str().to_owned();
    path.push(LOCK_FILE_SUFFIX);
    PathBuf::from(path)
}

/// Exclusive advisory lock held for the duration of a maintenance run.
///
/// Only excludes processes on this machine. Released on drop.
#[derive(Debug)]
pub struct MaintenanceLock {
    file: File,
    path: PathBuf,
}

impl MaintenanceLock {
    /// Tries to take the lock without blocking. `Ok(None)` when another
    /// holder already has it.
    pub fn try_acquire(path: &Path) -> io::Result<Option<Self>> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self {
                file,
                path: path.to_path_buf(),
            })),
            Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(None),
            #[cfg(windows)]
            Err(err) if matches!(err.raw_os_error(), Some(32 | 33)) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

impl Drop for MaintenanceLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            debug!("unable to release maintenance lock {:?}: {}", self.path, err);
        }
    }
}

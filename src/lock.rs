//! Advisory locking around the cached archive.
//!
//! Concurrent runs that share a cache path serialise on a sibling
//! `<cache>.lock` file. The lock is released when the guard is dropped.

use fs2::FileExt;
use log::{debug, warn};
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Held exclusive lock on a cache path.
#[derive(Debug)]
pub struct CacheLock {
    file: File,
    path: PathBuf,
}

impl CacheLock {
    /// Block until the exclusive lock for `cache_path` is acquired.
    ///
    /// Creates the lock file, and its parent directory, when absent.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the lock file cannot be created or locked.
    pub fn acquire(cache_path: &Path) -> io::Result<Self> {
        let path = lock_path(cache_path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;
        FileExt::lock_exclusive(&file)?;
        debug!("locked {}", path.display());
        Ok(Self { file, path })
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            warn!("failed to release {}: {err}", self.path.display());
        }
    }
}

/// `<cache_path>.lock`, keeping the full original file name.
#[must_use]
pub fn lock_path(cache_path: &Path) -> PathBuf {
    let mut name = OsString::from(cache_path.as_os_str());
    name.push(".lock");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn lock_path_appends_suffix() {
        assert_eq!(
            lock_path(Path::new("cache/db.zip")),
            PathBuf::from("cache/db.zip.lock")
        );
    }

    #[test]
    fn acquire_creates_parent_and_lock_file() {
        let temp = tempfile::tempdir().expect("temp dir");
        let cache = temp.path().join("nested").join("db.zip");

        let lock = CacheLock::acquire(&cache).expect("lock");

        assert!(lock.path().is_file());
        assert!(!cache.exists());
    }

    #[test]
    fn second_holder_waits_for_release() {
        let temp = tempfile::tempdir().expect("temp dir");
        let cache = temp.path().join("db.zip");
        let first = CacheLock::acquire(&cache).expect("first lock");

        let (sender, receiver) = mpsc::channel();
        let contender_cache = cache.clone();
        let contender = std::thread::spawn(move || {
            let _second = CacheLock::acquire(&contender_cache).expect("second lock");
            sender.send(()).expect("send");
        });

        assert!(
            receiver.recv_timeout(Duration::from_millis(200)).is_err(),
            "second lock acquired while first was held"
        );
        drop(first);
        receiver
            .recv_timeout(Duration::from_secs(10))
            .expect("second lock acquired after release");
        contender.join().expect("contender thread");
    }
}

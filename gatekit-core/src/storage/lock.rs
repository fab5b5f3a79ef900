//! Exclusive lock serializing read-modify-write cycles on the access document.
//!
//! Two layers are combined:
//!
//! * an in-process [`Mutex`] so threads sharing one [`AccessLock`] queue up,
//! * an advisory file lock (`flock` on Unix, `LockFileEx` on Windows) on a
//!   sidecar file so separate processes editing the same document queue up.
//!
//! The guard must be held across load, mutate and save. Holding it only
//! around the save still loses concurrent updates.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, TryLockError};

use super::error::{StorageError, StorageResult};

/// A process-local plus file-backed exclusive lock.
#[derive(Debug)]
pub struct AccessLock {
    path: PathBuf,
    file: File,
    local: Mutex<()>,
}

/// Guard that holds both lock layers for its lifetime.
#[derive(Debug)]
pub struct AccessLockGuard<'a> {
    file: &'a File,
    _local: MutexGuard<'a, ()>,
}

impl AccessLock {
    /// Opens or creates the lock file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or its parent directory cannot be created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| map_io_err(&err))?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|err| map_io_err(&err))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            local: Mutex::new(()),
        })
    }

    /// Returns the lock file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Blocks until both lock layers are held.
    ///
    /// # Errors
    ///
    /// Returns an error if the mutex is poisoned or the file lock fails.
    pub fn lock(&self) -> StorageResult<AccessLockGuard<'_>> {
        let local = self
            .local
            .lock()
            .map_err(|_| StorageError::Lock("access mutex poisoned".to_string()))?;
        sys::lock_exclusive(&self.file).map_err(|err| map_io_err(&err))?;
        Ok(AccessLockGuard {
            file: &self.file,
            _local: local,
        })
    }

    /// Attempts to take both lock layers without blocking.
    ///
    /// Returns `Ok(None)` when another thread or process holds the lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the mutex is poisoned or the lock attempt fails
    /// for reasons other than contention.
    pub fn try_lock(&self) -> StorageResult<Option<AccessLockGuard<'_>>> {
        let local = match self.local.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return Ok(None),
            Err(TryLockError::Poisoned(_)) => {
                return Err(StorageError::Lock("access mutex poisoned".to_string()))
            }
        };
        if sys::try_lock_exclusive(&self.file).map_err(|err| map_io_err(&err))? {
            Ok(Some(AccessLockGuard {
                file: &self.file,
                _local: local,
            }))
        } else {
            Ok(None)
        }
    }
}

impl Drop for AccessLockGuard<'_> {
    fn drop(&mut self) {
        // Released before the mutex guard field drops.
        if let Err(err) = sys::unlock(self.file) {
            log::warn!("failed to release access file lock: {err}");
        }
    }
}

fn map_io_err(err: &std::io::Error) -> StorageError {
    StorageError::Lock(err.to_string())
}

#[cfg(unix)]
mod sys {
    use std::fs::File;
    use std::os::raw::c_int;
    use std::os::unix::io::AsRawFd;

    const LOCK_EX: c_int = 2;
    const LOCK_NB: c_int = 4;
    const LOCK_UN: c_int = 8;

    extern "C" {
        fn flock(fd: c_int, operation: c_int) -> c_int;
    }

    fn call(file: &File, operation: c_int) -> std::io::Result<()> {
        // SAFETY: the descriptor stays valid for the borrow of `file`.
        let result = unsafe { flock(file.as_raw_fd(), operation) };
        if result == 0 {
            Ok(())
        } else {
            Err(std::io::Error::last_os_error())
        }
    }

    pub(super) fn lock_exclusive(file: &File) -> std::io::Result<()> {
        call(file, LOCK_EX)
    }

    pub(super) fn try_lock_exclusive(file: &File) -> std::io::Result<bool> {
        match call(file, LOCK_EX | LOCK_NB) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => Ok(false),
            Err(err) => Err(err),
        }
    }

    pub(super) fn unlock(file: &File) -> std::io::Result<()> {
        call(file, LOCK_UN)
    }
}

#[cfg(windows)]
mod sys {
    use std::fs::File;
    use std::os::windows::io::AsRawHandle;

    type Handle = *mut std::ffi::c_void;

    #[repr(C)]
    #[allow(dead_code)]
    struct Overlapped {
        internal: usize,
        internal_high: usize,
        offset: u32,
        offset_high: u32,
        h_event: Handle,
    }

    const LOCKFILE_EXCLUSIVE_LOCK: u32 = 0x2;
    const LOCKFILE_FAIL_IMMEDIATELY: u32 = 0x1;
    const ERROR_LOCK_VIOLATION: i32 = 33;

    extern "system" {
        fn LockFileEx(
            h_file: Handle,
            flags: u32,
            reserved: u32,
            bytes_to_lock_low: u32,
            bytes_to_lock_high: u32,
            overlapped: *mut Overlapped,
        ) -> i32;
        fn UnlockFileEx(
            h_file: Handle,
            reserved: u32,
            bytes_to_unlock_low: u32,
            bytes_to_unlock_high: u32,
            overlapped: *mut Overlapped,
        ) -> i32;
    }

    fn lock_file(file: &File, flags: u32) -> std::io::Result<()> {
        let handle = file.as_raw_handle().cast::<std::ffi::c_void>();
        // SAFETY: an all-zero OVERLAPPED is the documented "offset 0" value.
        let mut overlapped: Overlapped = unsafe { std::mem::zeroed() };
        let result = unsafe {
            LockFileEx(
                handle,
                LOCKFILE_EXCLUSIVE_LOCK | flags,
                0,
                1,
                0,
                &mut overlapped,
            )
        };
        if result != 0 {
            Ok(())
        } else {
            Err(std::io::Error::last_os_error())
        }
    }

    pub(super) fn lock_exclusive(file: &File) -> std::io::Result<()> {
        lock_file(file, 0)
    }

    pub(super) fn try_lock_exclusive(file: &File) -> std::io::Result<bool> {
        match lock_file(file, LOCKFILE_FAIL_IMMEDIATELY) {
            Ok(()) => Ok(true),
            Err(err) if err.raw_os_error() == Some(ERROR_LOCK_VIOLATION) => Ok(false),
            Err(err) => Err(err),
        }
    }

    pub(super) fn unlock(file: &File) -> std::io::Result<()> {
        let handle = file.as_raw_handle().cast::<std::ffi::c_void>();
        // SAFETY: see `lock_file`.
        let mut overlapped: Overlapped = unsafe { std::mem::zeroed() };
        let result = unsafe { UnlockFileEx(handle, 0, 1, 0, &mut overlapped) };
        if result != 0 {
            Ok(())
        } else {
            Err(std::io::Error::last_os_error())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Arc;
    use uuid::Uuid;

    fn temp_lock_path() -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("gatekit-lock-{}.lock", Uuid::new_v4()));
        path
    }

    #[test]
    fn test_lock_is_exclusive_across_handles() {
        let path = temp_lock_path();
        let lock_a = AccessLock::open(&path).expect("open lock");
        let guard = lock_a.lock().expect("acquire lock");

        let lock_b = AccessLock::open(&path).expect("open lock");
        assert!(lock_b.try_lock().expect("try lock").is_none());

        drop(guard);
        assert!(lock_b.try_lock().expect("try lock").is_some());

        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_lock_is_exclusive_within_one_handle() {
        let path = temp_lock_path();
        let lock = Arc::new(AccessLock::open(&path).expect("open lock"));

        let (locked_tx, locked_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let holder = {
            let lock = Arc::clone(&lock);
            std::thread::spawn(move || {
                let guard = lock.lock().expect("lock in thread");
                locked_tx.send(()).expect("signal locked");
                release_rx.recv().expect("wait release");
                drop(guard);
            })
        };

        locked_rx.recv().expect("wait locked");
        assert!(lock.try_lock().expect("try lock").is_none());

        release_tx.send(()).expect("release");
        holder.join().expect("thread join");
        assert!(lock.try_lock().expect("try lock").is_some());

        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_open_creates_parent_directories() {
        let mut dir = std::env::temp_dir();
        dir.push(format!("gatekit-lock-dir-{}", Uuid::new_v4()));
        let path = dir.join("nested").join("access.lock");

        let lock = AccessLock::open(&path).expect("open lock");
        assert_eq!(lock.path(), path.as_path());
        assert!(path.exists());

        let _ = fs::remove_dir_all(dir);
    }
}

//! Advisory file lock serializing store mutations across processes.
//!
//! The lock is an exclusive `flock` on a well-known file. Every acquisition
//! opens its own file description, so two threads or two processes exclude
//! each other. A thread that already holds the lock may acquire it again:
//! every guard on that thread shares the open lock file, and the OS lock is
//! released when the last of them drops, in whatever order they drop.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

use labnet_core::error::{LeaseError, Result};

/// Base interval between two lock attempts.
pub const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Random jitter added to every poll so waiters don't move in lockstep.
pub const LOCK_POLL_JITTER_MS: u64 = 25;

thread_local! {
    /// Lock files held by this thread. Guards own the file; the map only
    /// lets a nested acquisition find it.
    static HELD: RefCell<HashMap<PathBuf, Weak<File>>> = RefCell::new(HashMap::new());
}

/// Exclusive lock on a file path.
#[derive(Debug, Clone)]
pub struct DirLock {
    path: PathBuf,
}

impl DirLock {
    /// Lock backed by the file at `path` (created on first use).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the calling thread currently holds this lock.
    pub fn is_held(&self) -> bool {
        self.held_file().is_some()
    }

    fn held_file(&self) -> Option<Rc<File>> {
        HELD.with(|held| held.borrow().get(&self.path).and_then(Weak::upgrade))
    }

    /// Acquire the lock, polling until `timeout` elapses.
    ///
    /// A zero timeout makes exactly one attempt.
    pub fn acquire(&self, timeout: Duration) -> Result<LockGuard> {
        let start = Instant::now();
        tracing::debug!(path = %self.path.display(), "Acquiring lock");
        loop {
            if let Some(guard) = self.try_acquire()? {
                return Ok(guard);
            }
            if start.elapsed() >= timeout {
                tracing::debug!(path = %self.path.display(), ?timeout, "Lock wait timed out");
                return Err(LeaseError::LockUnavailable {
                    path: self.path.clone(),
                    timeout,
                });
            }
            let jitter_ms = rand::random::<u64>() % (LOCK_POLL_JITTER_MS + 1);
            std::thread::sleep(LOCK_POLL_INTERVAL + Duration::from_millis(jitter_ms));
        }
    }

    /// Try once to take the lock.
    ///
    /// Returns `Ok(None)` when another thread or process holds it.
    pub fn try_acquire(&self) -> Result<Option<LockGuard>> {
        if let Some(file) = self.held_file() {
            return Ok(Some(LockGuard::new(self.path.clone(), file, false)));
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|e| LeaseError::io(format!("opening lock file {}", self.path.display()), e))?;

        match try_flock_exclusive(&file) {
            Ok(true) => {
                let file = Rc::new(file);
                HELD.with(|held| {
                    held.borrow_mut()
                        .insert(self.path.clone(), Rc::downgrade(&file));
                });
                tracing::debug!(path = %self.path.display(), "Holding lock");
                Ok(Some(LockGuard::new(self.path.clone(), file, true)))
            }
            Ok(false) => Ok(None),
            Err(e) => Err(LeaseError::io(
                format!("locking {}", self.path.display()),
                e,
            )),
        }
    }
}

/// RAII guard for a held [`DirLock`].
///
/// Not `Send`: the shared lock file belongs to the acquiring thread.
pub struct LockGuard {
    path: PathBuf,
    /// Open lock file, shared with every nested guard of this thread.
    file: Rc<File>,
    outermost: bool,
}

impl LockGuard {
    fn new(path: PathBuf, file: Rc<File>, outermost: bool) -> Self {
        Self {
            path,
            file,
            outermost,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether this guard took the OS-level lock (first acquisition).
    pub fn is_outermost(&self) -> bool {
        self.outermost
    }
}

impl fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard")
            .field("path", &self.path)
            .field("outermost", &self.is_outermost())
            .finish()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if Rc::strong_count(&self.file) > 1 {
            return;
        }
        // Last guard: closing the descriptor releases the flock.
        let _ = HELD.try_with(|held| {
            held.borrow_mut().remove(&self.path);
        });
        tracing::debug!(path = %self.path.display(), "Released lock");
    }
}

/// Try to acquire an exclusive flock on a file (non-blocking).
///
/// Returns `Ok(true)` if the lock was acquired, `Ok(false)` if the file is
/// already locked through another file description.
fn try_flock_exclusive(file: &File) -> io::Result<bool> {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        let fd = file.as_raw_fd();
        let result = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
        if result == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::WouldBlock || err.raw_os_error() == Some(libc::EWOULDBLOCK)
        {
            return Ok(false);
        }
        Err(err)
    }
    #[cfg(not(unix))]
    {
        let _ = file;
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "advisory file locking requires a unix platform",
        ))
    }
}

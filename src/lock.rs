use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::time::{Duration, Instant};

use log::debug;

/// How long to wait between acquisition attempts.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Total budget before giving up on the lock.
pub const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Advisory `flock` on a well-known file, keeping generation single-flight
/// across processes. The lock is released when the guard drops, including
/// on panic and on every early-return path.
pub struct GenerationLock {
    file: File,
}

impl GenerationLock {
    /// Try to take the lock, polling until the timeout budget runs out.
    /// Returns `Ok(None)` when another holder kept it the whole time.
    pub fn acquire(path: &Path) -> Result<Option<Self>, String> {
        Self::acquire_with(path, ACQUIRE_TIMEOUT, POLL_INTERVAL)
    }

    pub fn acquire_with(
        path: &Path,
        timeout: Duration,
        poll: Duration,
    ) -> Result<Option<Self>, String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }

        // Each acquire opens its own descriptor so two threads of the same
        // process still exclude each other.
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(path)
            .map_err(|e| format!("Could not open lock file {}: {}", path.display(), e))?;

        let deadline = Instant::now() + timeout;
        loop {
            if try_flock(&file) {
                debug!("Acquired generation lock at {}", path.display());
                return Ok(Some(GenerationLock { file }));
            }
            if Instant::now() >= deadline {
                debug!("Gave up on generation lock at {}", path.display());
                return Ok(None);
            }
            std::thread::sleep(poll);
        }
    }
}

impl Drop for GenerationLock {
    fn drop(&mut self) {
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
    }
}

fn try_flock(file: &File) -> bool {
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    rc == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static LOCK_DIR_COUNTER: AtomicUsize = AtomicUsize::new(0);

    fn lock_path() -> std::path::PathBuf {
        let n = LOCK_DIR_COUNTER.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!("plume_lock_test_{}_{}", std::process::id(), n))
    }

    #[test]
    fn test_acquire_and_release() {
        let path = lock_path().join("generator.lock");
        let guard = GenerationLock::acquire_with(
            &path,
            Duration::from_millis(200),
            Duration::from_millis(10),
        )
        .unwrap();
        assert!(guard.is_some());
        drop(guard);

        // Re-acquirable after release.
        let again = GenerationLock::acquire_with(
            &path,
            Duration::from_millis(200),
            Duration::from_millis(10),
        )
        .unwrap();
        assert!(again.is_some());
    }

    #[test]
    fn test_second_holder_times_out() {
        let path = lock_path().join("generator.lock");
        let first = GenerationLock::acquire_with(
            &path,
            Duration::from_millis(200),
            Duration::from_millis(10),
        )
        .unwrap();
        assert!(first.is_some());

        let path2 = path.clone();
        let second = std::thread::spawn(move || {
            GenerationLock::acquire_with(
                &path2,
                Duration::from_millis(150),
                Duration::from_millis(10),
            )
        })
        .join()
        .unwrap()
        .unwrap();
        assert!(second.is_none());
    }
}

//! Named POSIX semaphores used as binary handoff tokens.

use std::ffi::CString;
use std::io;
use std::ptr::NonNull;

use crate::transport::TransportError;

/// Handle to a named semaphore, closed on drop
///
/// Dropping the handle does not unlink the name; the session owner does that
/// once both processes are done with it.
pub(crate) struct NamedSemaphore {
    sem: NonNull<libc::sem_t>,
    name: String,
}

impl NamedSemaphore {
    /// Create a fresh semaphore with value 0, replacing any stale instance
    pub(crate) fn create(name: &str) -> Result<Self, TransportError> {
        Self::unlink(name)?;
        let c_name = c_name(name)?;
        let mode: libc::c_uint = 0o600;
        let initial: libc::c_uint = 0;
        // SAFETY: c_name is a valid NUL-terminated string; mode and initial
        // value are passed as the variadic arguments sem_open expects.
        let sem = unsafe {
            libc::sem_open(c_name.as_ptr(), libc::O_CREAT | libc::O_EXCL, mode, initial)
        };
        Self::from_raw(sem, name)
    }

    /// Open an existing semaphore by name
    pub(crate) fn open(name: &str) -> Result<Self, TransportError> {
        let c_name = c_name(name)?;
        // SAFETY: c_name is a valid NUL-terminated string.
        let sem = unsafe { libc::sem_open(c_name.as_ptr(), 0) };
        Self::from_raw(sem, name)
    }

    fn from_raw(sem: *mut libc::sem_t, name: &str) -> Result<Self, TransportError> {
        if sem == libc::SEM_FAILED {
            return Err(TransportError::acquire(
                format!("semaphore {name}"),
                io::Error::last_os_error(),
            ));
        }
        let sem = NonNull::new(sem).ok_or_else(|| {
            TransportError::acquire(
                format!("semaphore {name}"),
                io::Error::new(io::ErrorKind::Other, "sem_open returned null"),
            )
        })?;
        Ok(Self {
            sem,
            name: name.to_string(),
        })
    }

    /// Remove a semaphore name; a missing name is not an error
    pub(crate) fn unlink(name: &str) -> Result<(), TransportError> {
        let c_name = c_name(name)?;
        // SAFETY: c_name is a valid NUL-terminated string.
        if unsafe { libc::sem_unlink(c_name.as_ptr()) } != 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ENOENT) {
                return Err(TransportError::Io(err));
            }
        }
        Ok(())
    }

    /// Increment the semaphore (hand the turn over)
    pub(crate) fn post(&self) -> Result<(), TransportError> {
        // SAFETY: self.sem came from a successful sem_open and is open.
        if unsafe { libc::sem_post(self.sem.as_ptr()) } != 0 {
            return Err(TransportError::Io(io::Error::last_os_error()));
        }
        Ok(())
    }

    /// Block until the semaphore can be decremented (wait for the turn)
    pub(crate) fn wait(&self) -> Result<(), TransportError> {
        loop {
            // SAFETY: self.sem came from a successful sem_open and is open.
            if unsafe { libc::sem_wait(self.sem.as_ptr()) } == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(TransportError::Io(err));
            }
        }
    }

    /// Decrement without blocking; `false` if the value was zero
    pub(crate) fn try_wait(&self) -> Result<bool, TransportError> {
        loop {
            // SAFETY: self.sem came from a successful sem_open and is open.
            if unsafe { libc::sem_trywait(self.sem.as_ptr()) } == 0 {
                return Ok(true);
            }
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EAGAIN) => return Ok(false),
                Some(libc::EINTR) => continue,
                _ => return Err(TransportError::Io(err)),
            }
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for NamedSemaphore {
    fn drop(&mut self) {
        // SAFETY: closed exactly once, here.
        if unsafe { libc::sem_close(self.sem.as_ptr()) } != 0 {
            tracing::warn!(
                semaphore = self.name(),
                error = %io::Error::last_os_error(),
                "sem_close failed"
            );
        }
    }
}

// SAFETY: a named semaphore handle is valid process-wide; sem_* calls are
// thread-safe.
unsafe impl Send for NamedSemaphore {}

fn c_name(name: &str) -> Result<CString, TransportError> {
    CString::new(name).map_err(|_| {
        TransportError::InvalidState(format!("IPC object name {name:?} contains a NUL byte"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::config::SharedMemoryConfig;

    fn test_name() -> String {
        SharedMemoryConfig::unique().exit_name()
    }

    #[test]
    fn test_post_then_try_wait() {
        let name = test_name();
        let sem = NamedSemaphore::create(&name).unwrap();

        assert!(!sem.try_wait().unwrap());
        sem.post().unwrap();
        assert!(sem.try_wait().unwrap());
        assert!(!sem.try_wait().unwrap());

        drop(sem);
        NamedSemaphore::unlink(&name).unwrap();
    }

    #[test]
    fn test_open_shares_value_with_creator() {
        let name = test_name();
        let creator = NamedSemaphore::create(&name).unwrap();
        let opener = NamedSemaphore::open(&name).unwrap();

        creator.post().unwrap();
        opener.wait().unwrap();
        assert!(!creator.try_wait().unwrap());
        assert_eq!(opener.name(), name);

        drop(creator);
        drop(opener);
        NamedSemaphore::unlink(&name).unwrap();
    }

    #[test]
    fn test_create_replaces_stale_instance() {
        let name = test_name();
        let stale = NamedSemaphore::create(&name).unwrap();
        stale.post().unwrap();
        drop(stale);

        // Left-over value from the stale instance must not leak through
        let fresh = NamedSemaphore::create(&name).unwrap();
        assert!(!fresh.try_wait().unwrap());

        drop(fresh);
        NamedSemaphore::unlink(&name).unwrap();
    }

    #[test]
    fn test_open_missing_fails() {
        let result = NamedSemaphore::open(&test_name());
        assert!(matches!(
            result,
            Err(TransportError::ResourceAcquisition { .. })
        ));
    }

    #[test]
    fn test_unlink_missing_is_ok() {
        NamedSemaphore::unlink(&test_name()).unwrap();
    }
}

//! Shared memory object and its mapping.
//!
//! # Layout
//!
//! ```text
//! +----------------+-------------------------------------------+
//! | Count (4)      | Batch payload (segment_size - 4 bytes)    |
//! | host-order u32 | f32 elements                              |
//! +----------------+-------------------------------------------+
//! ```

use std::ffi::CString;
use std::fs::File;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::ptr::NonNull;

use crate::matrix::ELEMENT_SIZE;
use crate::transport::config::SEGMENT_HEADER_SIZE;
use crate::transport::TransportError;

/// A named shared memory object, sized but not yet mapped
pub(crate) struct SharedObject {
    fd: OwnedFd,
    size: usize,
}

impl SharedObject {
    /// Create a fresh object of `size` bytes, replacing any stale instance
    pub(crate) fn create(name: &str, size: usize) -> Result<Self, TransportError> {
        Self::unlink(name)?;
        let c_name = c_name(name)?;

        // SAFETY: c_name is a valid NUL-terminated string.
        let fd = unsafe {
            libc::shm_open(
                c_name.as_ptr(),
                libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
                0o600,
            )
        };
        if fd < 0 {
            return Err(TransportError::acquire(
                format!("shared memory object {name}"),
                io::Error::last_os_error(),
            ));
        }
        // SAFETY: fd is a freshly opened descriptor owned by nobody else.
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };

        let file = File::from(fd);
        file.set_len(size as u64).map_err(|e| {
            TransportError::acquire(format!("shared memory object {name} (ftruncate)"), e)
        })?;

        Ok(Self {
            fd: OwnedFd::from(file),
            size,
        })
    }

    /// Remove the object's name; a missing name is not an error
    pub(crate) fn unlink(name: &str) -> Result<(), TransportError> {
        let c_name = c_name(name)?;
        // SAFETY: c_name is a valid NUL-terminated string.
        if unsafe { libc::shm_unlink(c_name.as_ptr()) } != 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ENOENT) {
                return Err(TransportError::Io(err));
            }
        }
        Ok(())
    }

    /// Duplicate the descriptor for the other process
    pub(crate) fn try_clone(&self) -> Result<Self, TransportError> {
        Ok(Self {
            fd: self
                .fd
                .try_clone()
                .map_err(|e| TransportError::acquire("shared memory descriptor", e))?,
            size: self.size,
        })
    }

    /// Map the object read/write into this process
    pub(crate) fn map(self) -> Result<Segment, TransportError> {
        Segment::map(&self.fd, self.size)
    }
}

/// A `MAP_SHARED` view of the segment, unmapped on drop
pub(crate) struct Segment {
    ptr: NonNull<u8>,
    len: usize,
}

impl Segment {
    fn map(fd: &OwnedFd, len: usize) -> Result<Self, TransportError> {
        if len < SEGMENT_HEADER_SIZE + ELEMENT_SIZE {
            return Err(TransportError::InvalidState(format!(
                "segment of {len} bytes cannot hold a header and one element"
            )));
        }

        // SAFETY: fd refers to a shared memory object truncated to `len` bytes.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd.as_raw_fd(),
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(TransportError::acquire(
                "shared memory mapping",
                io::Error::last_os_error(),
            ));
        }
        let ptr = NonNull::new(ptr.cast::<u8>()).ok_or_else(|| {
            TransportError::acquire(
                "shared memory mapping",
                io::Error::new(io::ErrorKind::Other, "mmap returned null"),
            )
        })?;

        Ok(Self { ptr, len })
    }

    /// Number of `f32` elements the payload area holds
    pub(crate) fn capacity(&self) -> usize {
        (self.len - SEGMENT_HEADER_SIZE) / ELEMENT_SIZE
    }

    /// Read the element-count header
    pub(crate) fn header(&self) -> u32 {
        // SAFETY: the mapping is page aligned and at least 4 bytes long.
        unsafe { self.ptr.cast::<u32>().as_ptr().read_volatile() }
    }

    /// Write the element-count header
    pub(crate) fn set_header(&mut self, count: u32) {
        // SAFETY: the mapping is page aligned and at least 4 bytes long.
        unsafe { self.ptr.cast::<u32>().as_ptr().write_volatile(count) }
    }

    /// The payload area as elements
    pub(crate) fn payload(&self) -> &[f32] {
        // SAFETY: offset 4 of a page-aligned mapping is f32 aligned and
        // `capacity` elements fit before the end of the mapping.
        unsafe {
            std::slice::from_raw_parts(
                self.ptr.as_ptr().add(SEGMENT_HEADER_SIZE).cast::<f32>(),
                self.capacity(),
            )
        }
    }

    /// The payload area as mutable elements
    pub(crate) fn payload_mut(&mut self) -> &mut [f32] {
        // SAFETY: as in `payload`; `&mut self` keeps this the only view in
        // this process.
        unsafe {
            std::slice::from_raw_parts_mut(
                self.ptr.as_ptr().add(SEGMENT_HEADER_SIZE).cast::<f32>(),
                self.capacity(),
            )
        }
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        // SAFETY: unmapped exactly once, here; no slices outlive `self`.
        unsafe {
            libc::munmap(self.ptr.as_ptr().cast::<libc::c_void>(), self.len);
        }
    }
}

// SAFETY: the mapping is owned by this value and valid process-wide.
unsafe impl Send for Segment {}

fn c_name(name: &str) -> Result<CString, TransportError> {
    CString::new(name).map_err(|_| {
        TransportError::InvalidState(format!("IPC object name {name:?} contains a NUL byte"))
    })
}

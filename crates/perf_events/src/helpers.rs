//! Perf event utilities for hardware counters.
//!
//! This module provides the error type shared by every counter source and the
//! raw `perf_event_open` helpers used to open and control a single counter.

#[cfg(target_os = "linux")]
use perf_event_open_sys as sys;
#[cfg(target_os = "linux")]
use std::fs::File;
use std::io;
#[cfg(target_os = "linux")]
use std::os::unix::io::{AsRawFd, FromRawFd};

/// Error type for perf event operations
#[derive(Debug, thiserror::Error)]
pub enum PerfEventError {
    /// Error opening perf event
    #[error("failed to open perf event {name}: {source}")]
    OpenError {
        /// Counter name that failed to open
        name: String,
        /// Source error
        source: io::Error,
    },

    /// The counter name is not in the table of known events
    #[error("unknown perf event: {0}")]
    UnknownEvent(String),

    /// Error enabling perf event
    #[error("failed to enable perf event: {0}")]
    EnableError(io::Error),

    /// Error disabling perf event
    #[error("failed to disable perf event: {0}")]
    DisableError(io::Error),

    /// Error reading the counter descriptor
    #[error("failed to read perf event: {0}")]
    ReadError(io::Error),

    /// The kernel returned fewer bytes than a full reading
    #[error("short read from perf event: expected {expected} bytes, got {actual}")]
    ShortRead {
        /// Bytes requested
        expected: usize,
        /// Bytes returned
        actual: usize,
    },

    /// Error writing a report line
    #[error("failed to write report: {0}")]
    ReportError(io::Error),
}

/// Opens one counter for the calling process on any CPU.
///
/// The counter starts disabled, is inherited by threads spawned afterwards and
/// reports its enabled and running times alongside the value.
///
/// # Arguments
///
/// * `name` - Display name, used only for error reporting
/// * `type_` - Perf event type (`PERF_TYPE_HARDWARE`, `PERF_TYPE_HW_CACHE`, ...)
/// * `config` - Type-specific event configuration
/// * `exclude_user` - Count only kernel-mode events
///
/// # Returns
///
/// * `Ok(File)` - The owned counter descriptor
/// * `Err(PerfEventError)` on failure
#[cfg(target_os = "linux")]
pub fn open_counter(
    name: &str,
    type_: u32,
    config: u64,
    exclude_user: bool,
) -> Result<File, PerfEventError> {
    let mut attr = sys::bindings::perf_event_attr::default();
    attr.size = std::mem::size_of::<sys::bindings::perf_event_attr>() as u32;
    attr.type_ = type_;
    attr.config = config;
    attr.read_format = (sys::bindings::PERF_FORMAT_TOTAL_TIME_ENABLED
        | sys::bindings::PERF_FORMAT_TOTAL_TIME_RUNNING) as u64;
    attr.set_disabled(1);
    attr.set_inherit(1);
    attr.set_exclude_hv(1);
    if exclude_user {
        attr.set_exclude_user(1);
    }

    let fd = unsafe {
        sys::perf_event_open(
            &mut attr,
            0,  // pid (calling process)
            -1, // cpu (any)
            -1, // group_fd
            sys::bindings::PERF_FLAG_FD_CLOEXEC as u64,
        )
    };

    if fd < 0 {
        return Err(PerfEventError::OpenError {
            name: name.to_string(),
            source: io::Error::last_os_error(),
        });
    }

    // Take ownership of the file descriptor
    Ok(unsafe { File::from_raw_fd(fd) })
}

/// Resets and enables a counter.
#[cfg(target_os = "linux")]
pub fn enable_counter(file: &File) -> Result<(), PerfEventError> {
    let fd = file.as_raw_fd();
    if unsafe { sys::ioctls::RESET(fd, 0) } < 0 {
        return Err(PerfEventError::EnableError(io::Error::last_os_error()));
    }
    if unsafe { sys::ioctls::ENABLE(fd, 0) } < 0 {
        return Err(PerfEventError::EnableError(io::Error::last_os_error()));
    }
    Ok(())
}

/// Disables a counter, keeping its accumulated value readable.
#[cfg(target_os = "linux")]
pub fn disable_counter(file: &File) -> Result<(), PerfEventError> {
    if unsafe { sys::ioctls::DISABLE(file.as_raw_fd(), 0) } < 0 {
        return Err(PerfEventError::DisableError(io::Error::last_os_error()));
    }
    Ok(())
}

//! Passing a descriptor to a child by value.
//!
//! The parent duplicates an endpoint into a descriptor that survives
//! `exec`, writes its number on the child's command line, and the child
//! adopts that number back into an [`Endpoint`].

use tracing::debug;

use crate::endpoint::Endpoint;
#[cfg(unix)]
use crate::endpoint::EndpointKind;
use crate::error::{Result, TransportError};

/// Duplicate `endpoint` into a descriptor every spawned child inherits.
#[cfg(unix)]
pub fn duplicate_inheritable(endpoint: &Endpoint) -> Result<Endpoint> {
    use std::os::fd::{FromRawFd, OwnedFd};

    let source = libc::c_int::try_from(endpoint.raw_value()?).map_err(|_| {
        TransportError::Duplicate(std::io::Error::from(std::io::ErrorKind::InvalidInput))
    })?;
    // SAFETY: `source` is an open descriptor owned by `endpoint`. dup(2)
    // returns a new descriptor with FD_CLOEXEC cleared.
    let fd = unsafe { libc::dup(source) };
    if fd < 0 {
        return Err(TransportError::Duplicate(std::io::Error::last_os_error()));
    }
    debug!(source, fd, "duplicated inheritable handle");
    // SAFETY: dup(2) succeeded and the new descriptor has no other owner.
    let owned = unsafe { OwnedFd::from_raw_fd(fd) };
    Ok(Endpoint::from_file(EndpointKind::DuplicatedHandle, owned.into()))
}

#[cfg(not(unix))]
pub fn duplicate_inheritable(_endpoint: &Endpoint) -> Result<Endpoint> {
    Err(TransportError::Unsupported("inheritable handle duplication"))
}

/// Take ownership of a descriptor number inherited from the parent.
///
/// The number must name an open descriptor, otherwise
/// [`TransportError::InvalidHandle`] is returned.
///
/// # Safety
///
/// `handle` must not be owned by anything else in this process: the
/// returned endpoint closes it on drop.
#[cfg(unix)]
pub unsafe fn adopt(handle: u64) -> Result<Endpoint> {
    use std::os::fd::{FromRawFd, OwnedFd};

    let fd = libc::c_int::try_from(handle).map_err(|_| TransportError::InvalidHandle {
        handle,
        source: std::io::Error::from(std::io::ErrorKind::InvalidInput),
    })?;
    // SAFETY: F_GETFD only queries descriptor flags; it fails with EBADF for
    // numbers that are not open.
    if unsafe { libc::fcntl(fd, libc::F_GETFD) } < 0 {
        return Err(TransportError::InvalidHandle {
            handle,
            source: std::io::Error::last_os_error(),
        });
    }
    debug!(fd, "adopted inherited handle");
    // SAFETY: the descriptor is open and the caller guarantees it is unowned.
    let owned = unsafe { OwnedFd::from_raw_fd(fd) };
    Ok(Endpoint::from_file(EndpointKind::DuplicatedHandle, owned.into()))
}

/// # Safety
///
/// See the Unix version.
#[cfg(not(unix))]
pub unsafe fn adopt(_handle: u64) -> Result<Endpoint> {
    Err(TransportError::Unsupported("inherited handle adoption"))
}

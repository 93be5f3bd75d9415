use tracing::debug;

use crate::endpoint::Endpoint;
#[cfg(unix)]
use crate::endpoint::EndpointKind;
use crate::error::{Result, TransportError};

/// An anonymous pipe owned by a single process.
///
/// Both ends are close-on-exec; a child only ever receives an end that was
/// explicitly duplicated for it or passed as one of its standard streams.
#[derive(Debug)]
pub struct AnonymousPipe {
    reader: Endpoint,
    writer: Endpoint,
    capacity: Option<usize>,
}

impl AnonymousPipe {
    /// Create a pipe, asking for `capacity` bytes of kernel buffer.
    ///
    /// A capacity of `0` keeps the system default. On Linux the request is
    /// applied with `F_SETPIPE_SZ`, which rounds up to a whole page; other
    /// platforms ignore the hint.
    #[cfg(unix)]
    pub fn create(capacity: usize) -> Result<Self> {
        use std::os::fd::{FromRawFd, OwnedFd};

        let mut fds = [0 as libc::c_int; 2];
        // SAFETY: `fds` is a valid two-element buffer for pipe(2) to fill.
        let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
        if rc != 0 {
            return Err(TransportError::Pipe(std::io::Error::last_os_error()));
        }
        // SAFETY: pipe(2) succeeded, so both descriptors are open and owned
        // by nobody else in this process.
        let (read_fd, write_fd) =
            unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };

        set_cloexec(&read_fd).map_err(TransportError::Pipe)?;
        set_cloexec(&write_fd).map_err(TransportError::Pipe)?;

        let capacity = apply_capacity(&write_fd, capacity)?;
        debug!(?capacity, "created anonymous pipe");

        Ok(Self {
            reader: Endpoint::from_file(EndpointKind::PipeRead, read_fd.into()),
            writer: Endpoint::from_file(EndpointKind::PipeWrite, write_fd.into()),
            capacity,
        })
    }

    #[cfg(not(unix))]
    pub fn create(_capacity: usize) -> Result<Self> {
        Err(TransportError::Unsupported("anonymous pipe"))
    }

    /// Effective kernel capacity, when the platform reports it.
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn reader(&mut self) -> &mut Endpoint {
        &mut self.reader
    }

    pub fn writer(&mut self) -> &mut Endpoint {
        &mut self.writer
    }

    /// Split into `(read end, write end)`.
    pub fn into_parts(self) -> (Endpoint, Endpoint) {
        (self.reader, self.writer)
    }
}

#[cfg(unix)]
pub(crate) fn set_cloexec(fd: &std::os::fd::OwnedFd) -> std::io::Result<()> {
    use std::os::fd::AsRawFd;

    // SAFETY: `fd` is an open descriptor owned by the caller.
    let flags = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_GETFD) };
    if flags < 0 {
        return Err(std::io::Error::last_os_error());
    }
    // SAFETY: as above; only the descriptor flags are changed.
    let rc = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFD, flags | libc::FD_CLOEXEC) };
    if rc < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(target_os = "linux")]
fn apply_capacity(fd: &std::os::fd::OwnedFd, requested: usize) -> Result<Option<usize>> {
    use std::os::fd::AsRawFd;

    if requested > 0 {
        let size = libc::c_int::try_from(requested).map_err(|_| TransportError::PipeCapacity {
            requested,
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "capacity does not fit in a C int",
            ),
        })?;
        // SAFETY: `fd` is an open pipe descriptor owned by the caller.
        let rc = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETPIPE_SZ, size) };
        if rc < 0 {
            return Err(TransportError::PipeCapacity {
                requested,
                source: std::io::Error::last_os_error(),
            });
        }
    }

    // SAFETY: as above; F_GETPIPE_SZ only reads pipe state.
    let actual = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_GETPIPE_SZ) };
    Ok(usize::try_from(actual).ok())
}

#[cfg(all(unix, not(target_os = "linux")))]
fn apply_capacity(_fd: &std::os::fd::OwnedFd, requested: usize) -> Result<Option<usize>> {
    if requested > 0 {
        debug!(requested, "pipe capacity hint ignored on this platform");
    }
    Ok(None)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::endpoint::filler;

    #[test]
    fn write_then_read_returns_what_was_written() {
        let mut pipe = AnonymousPipe::create(0).unwrap();
        let wrote = pipe.writer().write_once(&filler(10)).unwrap();
        assert_eq!(wrote, 10);

        let read = pipe.reader().read_once(4).unwrap();
        assert_eq!(read.as_ref(), b"$$$$");
    }

    #[test]
    fn read_is_short_when_less_was_written() {
        let mut pipe = AnonymousPipe::create(512).unwrap();
        pipe.writer().write_once(&filler(5)).unwrap();

        let read = pipe.reader().read_once(10).unwrap();
        assert_eq!(read.len(), 5);
    }

    #[test]
    fn zero_length_read_returns_immediately() {
        let mut pipe = AnonymousPipe::create(0).unwrap();
        let read = pipe.reader().read_once(0).unwrap();
        assert!(read.is_empty());
    }

    #[test]
    fn dropping_writer_signals_end_of_stream() {
        let (mut reader, writer) = AnonymousPipe::create(0).unwrap().into_parts();
        drop(writer);
        assert!(reader.read_once(8).unwrap().is_empty());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn capacity_is_at_least_the_request() {
        let pipe = AnonymousPipe::create(8192).unwrap();
        assert!(pipe.capacity().unwrap() >= 8192);
    }

    #[test]
    fn ends_are_close_on_exec() {
        let pipe = AnonymousPipe::create(0).unwrap();
        for end in [&pipe.reader, &pipe.writer] {
            let fd = end.raw_value().unwrap() as libc::c_int;
            let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
            assert!(flags & libc::FD_CLOEXEC != 0);
        }
    }
}

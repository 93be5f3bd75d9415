use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::process::Stdio;

use bytes::{Bytes, BytesMut};

use crate::error::Result;

/// The byte every probe write is made of.
pub const FILLER: u8 = b'$';

/// `len` filler bytes.
pub fn filler(len: usize) -> Vec<u8> {
    vec![FILLER; len]
}

/// What an [`Endpoint`] is one end of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    PipeRead,
    PipeWrite,
    /// A descriptor duplicated so that a child process inherits it.
    DuplicatedHandle,
    Socket,
}

/// One owned end of a probe channel.
///
/// The underlying descriptor is closed when the endpoint is dropped, or
/// handed to a child process through [`Endpoint::into_stdio`].
pub struct Endpoint {
    kind: EndpointKind,
    inner: EndpointInner,
}

enum EndpointInner {
    File(File),
    Socket(TcpStream),
}

impl Endpoint {
    pub(crate) fn from_file(kind: EndpointKind, file: File) -> Self {
        Self {
            kind,
            inner: EndpointInner::File(file),
        }
    }

    pub(crate) fn from_socket(stream: TcpStream) -> Self {
        Self {
            kind: EndpointKind::Socket,
            inner: EndpointInner::Socket(stream),
        }
    }

    pub fn kind(&self) -> EndpointKind {
        self.kind
    }

    /// Issue exactly one read of at most `count` bytes.
    ///
    /// A short read is a valid outcome and is returned as-is; zero bytes
    /// means end of stream (or `count == 0`).
    pub fn read_once(&mut self, count: usize) -> Result<Bytes> {
        let mut buf = BytesMut::zeroed(count);
        let read = loop {
            match self.read(&mut buf) {
                Ok(n) => break n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        };
        buf.truncate(read);
        Ok(buf.freeze())
    }

    /// Issue exactly one write of `data` and return what the OS accepted.
    pub fn write_once(&mut self, data: &[u8]) -> Result<usize> {
        loop {
            match self.write(data) {
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// The numeric descriptor value, as passed to a child on its command line.
    #[cfg(unix)]
    pub fn raw_value(&self) -> Result<u64> {
        use std::os::fd::AsRawFd;

        let fd = match &self.inner {
            EndpointInner::File(file) => file.as_raw_fd(),
            EndpointInner::Socket(stream) => stream.as_raw_fd(),
        };
        // Open descriptors are never negative.
        Ok(u64::try_from(fd).unwrap_or_default())
    }

    #[cfg(not(unix))]
    pub fn raw_value(&self) -> Result<u64> {
        Err(crate::error::TransportError::Unsupported("raw handle values"))
    }

    /// Hand the endpoint over as a child's standard stream.
    #[cfg(unix)]
    pub fn into_stdio(self) -> Stdio {
        use std::os::fd::OwnedFd;

        match self.inner {
            EndpointInner::File(file) => Stdio::from(file),
            EndpointInner::Socket(stream) => Stdio::from(OwnedFd::from(stream)),
        }
    }

    #[cfg(not(unix))]
    pub fn into_stdio(self) -> Stdio {
        match self.inner {
            EndpointInner::File(file) => Stdio::from(file),
            // Non-unix targets never produce socket endpoints.
            EndpointInner::Socket(_) => Stdio::null(),
        }
    }

    /// Duplicate the descriptor; the copy is not inherited by children.
    pub fn try_clone(&self) -> Result<Self> {
        let inner = match &self.inner {
            EndpointInner::File(file) => EndpointInner::File(file.try_clone()?),
            EndpointInner::Socket(stream) => EndpointInner::Socket(stream.try_clone()?),
        };
        Ok(Self {
            kind: self.kind,
            inner,
        })
    }
}

impl Read for Endpoint {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            EndpointInner::File(file) => file.read(buf),
            EndpointInner::Socket(stream) => stream.read(buf),
        }
    }
}

impl Write for Endpoint {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            EndpointInner::File(file) => file.write(buf),
            EndpointInner::Socket(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            EndpointInner::File(file) => file.flush(),
            EndpointInner::Socket(stream) => stream.flush(),
        }
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let backing = match &self.inner {
            EndpointInner::File(_) => "file",
            EndpointInner::Socket(_) => "socket",
        };
        f.debug_struct("Endpoint")
            .field("kind", &self.kind)
            .field("backing", &backing)
            .finish()
    }
}

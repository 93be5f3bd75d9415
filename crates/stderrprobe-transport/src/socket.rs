use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};

use tracing::debug;

use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};

/// A socket implementation available on this host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketProvider {
    /// Human readable provider name, used in reports.
    pub name: &'static str,
    /// Whether sockets from this provider can be used anywhere a generic
    /// I/O handle is expected, including as a child's redirected stderr.
    pub handle_capable: bool,
}

impl SocketProvider {
    /// List the stream-socket providers this platform offers.
    pub fn providers() -> Vec<SocketProvider> {
        #[cfg(unix)]
        {
            // Every socket is a file descriptor on Unix.
            vec![SocketProvider {
                name: "TCP/IP (AF_INET stream socket)",
                handle_capable: true,
            }]
        }

        #[cfg(not(unix))]
        {
            Vec::new()
        }
    }

    /// The first provider whose sockets can act as generic I/O handles.
    pub fn select_handle_capable() -> Result<SocketProvider> {
        let providers = Self::providers();
        for (index, provider) in providers.iter().enumerate() {
            debug!(
                index,
                name = provider.name,
                handle_capable = provider.handle_capable,
                "socket provider"
            );
        }
        providers
            .into_iter()
            .find(|provider| provider.handle_capable)
            .ok_or(TransportError::NoHandleCapableProvider)
    }

    /// Connect a write socket from this provider to `addr` (blocking).
    pub fn connect(&self, addr: SocketAddr) -> Result<Endpoint> {
        if !self.handle_capable {
            return Err(TransportError::NoHandleCapableProvider);
        }
        let stream =
            TcpStream::connect(addr).map_err(|source| TransportError::Connect { addr, source })?;
        debug!(%addr, "write socket connected");
        Ok(Endpoint::from_socket(stream))
    }
}

/// The listening half of a loopback socket pair.
#[derive(Debug)]
pub struct ReadSocket {
    listener: TcpListener,
    addr: SocketAddr,
}

impl ReadSocket {
    /// Bind and listen on an ephemeral loopback port.
    pub fn bind_loopback() -> Result<Self> {
        let requested = SocketAddr::from((Ipv4Addr::LOCALHOST, 0));
        let listener = TcpListener::bind(requested).map_err(|source| TransportError::Bind {
            addr: requested,
            source,
        })?;
        let addr = listener.local_addr().map_err(|source| TransportError::Bind {
            addr: requested,
            source,
        })?;
        debug!(%addr, "read socket listening");
        Ok(Self { listener, addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Accept one incoming connection (blocking).
    pub fn accept(&self) -> Result<Endpoint> {
        let (stream, peer) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(%peer, "read socket accepted connection");
        Ok(Endpoint::from_socket(stream))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::endpoint::{filler, EndpointKind};

    #[test]
    fn unix_has_a_handle_capable_provider() {
        let provider = SocketProvider::select_handle_capable().unwrap();
        assert!(provider.handle_capable);
    }

    #[test]
    fn provider_without_handle_support_refuses_to_connect() {
        let reader = ReadSocket::bind_loopback().unwrap();
        let provider = SocketProvider {
            name: "plain",
            handle_capable: false,
        };
        assert!(matches!(
            provider.connect(reader.local_addr()),
            Err(TransportError::NoHandleCapableProvider)
        ));
    }

    #[test]
    fn connected_pair_carries_bytes() {
        let reader = ReadSocket::bind_loopback().unwrap();
        assert!(reader.local_addr().ip().is_loopback());

        let provider = SocketProvider::select_handle_capable().unwrap();
        let mut writer = provider.connect(reader.local_addr()).unwrap();
        assert_eq!(writer.kind(), EndpointKind::Socket);
        writer.write_once(&filler(5)).unwrap();

        let mut accepted = reader.accept().unwrap();
        let read = accepted.read_once(5).unwrap();
        assert_eq!(read.as_ref(), b"$$$$$");
    }
}

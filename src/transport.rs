//! A uniform async byte-stream endpoint backed by TCP or a local (UNIX domain) stream socket.
//!
//! The framed connection and the handshake state machine are generic over any
//! `AsyncRead + AsyncWrite + Unpin` type; [`Transport`] is the concrete implementation this crate
//! ships so that callers don't have to hand-roll the `tcp://`/`uds://` dispatch themselves.
use futures::io::{AsyncRead, AsyncWrite};
use socket2::{SockRef, TcpKeepalive};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Errors raised while parsing or resolving a distribution address.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The address scheme was neither `tcp://`, `uds://`, nor bare `alive@host`.
    #[error("unknown transport scheme {scheme:?}")]
    UnknownTransport { scheme: String },

    #[error("address is missing a node name (expected alive@host)")]
    MissingNodeName,

    #[error(transparent)]
    InvalidNodeName(#[from] crate::node::NodeNameError),

    #[error("DNS resolution of {host:?} failed: {source}")]
    DnsResolveFailed {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Connect(#[from] std::io::Error),
}

/// The transport scheme carried by a distribution address, mirroring [`crate::node::NodeType`]'s
/// sibling concept at the socket layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Tcp,
    Uds,
}

/// A parsed distribution address: `tcp://alive@host`, `uds:///path/to/socket`, or bare
/// `alive@host` (defaults to TCP).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    Tcp(crate::node::NodeName),
    Uds(PathBuf),
}

impl std::str::FromStr for Address {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(rest) = s.strip_prefix("tcp://") {
            Ok(Address::Tcp(rest.parse()?))
        } else if let Some(rest) = s.strip_prefix("uds://") {
            Ok(Address::Uds(PathBuf::from(rest)))
        } else if s.contains("://") {
            let scheme = s.split("://").next().unwrap_or(s).to_owned();
            Err(TransportError::UnknownTransport { scheme })
        } else {
            Ok(Address::Tcp(s.parse()?))
        }
    }
}

/// A connected byte-stream endpoint, uniform over its concrete transport kind.
///
/// The framed connection and handshake never match on this enum themselves; they only use the
/// `AsyncRead`/`AsyncWrite` impl below. Matching happens once, at construction time.
#[derive(Debug, Clone)]
pub enum Transport {
    Tcp(smol::net::TcpStream),
    Uds(smol::net::unix::UnixStream),
}

impl Transport {
    /// Resolves `host` via the system resolver and connects over TCP to the first address that
    /// accepts a connection, trying the remainder in order on failure.
    pub async fn connect_tcp(host: &str, port: u16) -> Result<Self, TransportError> {
        let addrs: Vec<SocketAddr> = smol::net::resolve((host, port))
            .await
            .map_err(|source| TransportError::DnsResolveFailed {
                host: host.to_owned(),
                source,
            })?;
        let mut last_err = None;
        for addr in addrs {
            match smol::net::TcpStream::connect(addr).await {
                Ok(stream) => {
                    let _ = stream.set_nodelay(true);
                    let _ = SockRef::from(&stream).set_tcp_keepalive(&TcpKeepalive::new());
                    return Ok(Transport::Tcp(stream));
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err
            .unwrap_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses to try")
            })
            .into())
    }

    /// Connects to a local stream socket at `path`.
    pub async fn connect_uds(path: &std::path::Path) -> Result<Self, TransportError> {
        let stream = smol::net::unix::UnixStream::connect(path).await?;
        Ok(Transport::Uds(stream))
    }

    /// Connects to `address`, dispatching on its scheme. `epmd_port` is used only for
    /// [`Address::Tcp`] (see [`crate::handshake`] for the EPMD lookup that precedes the actual
    /// peer connection — this helper connects directly to a known `host:port`).
    pub async fn connect(host: &str, port: u16, scheme: Scheme) -> Result<Self, TransportError> {
        match scheme {
            Scheme::Tcp => Self::connect_tcp(host, port).await,
            Scheme::Uds => Self::connect_uds(std::path::Path::new(host)).await,
        }
    }

    pub fn close(&self) -> std::io::Result<()> {
        match self {
            Transport::Tcp(s) => s.shutdown(std::net::Shutdown::Both),
            Transport::Uds(s) => s.shutdown(std::net::Shutdown::Both),
        }
    }
}

impl AsyncRead for Transport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            Transport::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            Transport::Uds(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            Transport::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            Transport::Uds(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Transport::Tcp(s) => Pin::new(s).poll_flush(cx),
            Transport::Uds(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Transport::Tcp(s) => Pin::new(s).poll_close(cx),
            Transport::Uds(s) => Pin::new(s).poll_close(cx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tcp_scheme() {
        let addr: Address = "tcp://foo@localhost".parse().unwrap();
        assert!(matches!(addr, Address::Tcp(n) if n.name() == "foo" && n.host() == "localhost"));
    }

    #[test]
    fn parses_uds_scheme() {
        let addr: Address = "uds:///tmp/node_sock".parse().unwrap();
        assert_eq!(addr, Address::Uds(PathBuf::from("/tmp/node_sock")));
    }

    #[test]
    fn bare_address_defaults_to_tcp() {
        let addr: Address = "foo@localhost".parse().unwrap();
        assert!(matches!(addr, Address::Tcp(_)));
    }

    #[test]
    fn unknown_scheme_is_rejected() {
        let err = "quic://foo@localhost".parse::<Address>().unwrap_err();
        assert!(matches!(err, TransportError::UnknownTransport { .. }));
    }
}

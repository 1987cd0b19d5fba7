//! Endpoints, dialing and socket halves.
//!
//! - `tcp`, `tcp4`, `tcp6`: TCP stream to `host:port`
//! - `unix` (unix only): Unix Domain Socket at a path
//!
//! # Example
//!
//! ```ignore
//! use gearwire::transport::{Dialer, Endpoint, NetDialer};
//!
//! let endpoint = Endpoint::parse("tcp", "127.0.0.1:4730")?;
//! let transport = NetDialer.dial(&endpoint).await?;
//! ```

use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::error::{AgentError, Result};

/// Boxed future for dialer results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Read half of a connected socket.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Write half of a connected socket.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Address family restriction for TCP endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    /// Whatever the resolver returns.
    Any,
    /// IPv4 only (`tcp4`).
    V4,
    /// IPv6 only (`tcp6`).
    V6,
}

/// One job-server endpoint: network family plus address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// TCP `host:port`.
    Tcp {
        /// `host:port` as given.
        address: String,
        /// Address family restriction.
        family: Family,
    },
    /// Unix Domain Socket path.
    #[cfg(unix)]
    Unix(std::path::PathBuf),
}

impl Endpoint {
    /// Parse a `(network, address)` pair.
    pub fn parse(network: &str, address: &str) -> Result<Self> {
        if address.is_empty() {
            return Err(AgentError::InvalidEndpoint(format!(
                "empty address for network {network:?}"
            )));
        }

        let family = match network {
            "tcp" => Family::Any,
            "tcp4" => Family::V4,
            "tcp6" => Family::V6,
            #[cfg(unix)]
            "unix" => return Ok(Endpoint::Unix(address.into())),
            other => {
                return Err(AgentError::InvalidEndpoint(format!(
                    "unsupported network {other:?}"
                )))
            }
        };

        Ok(Endpoint::Tcp {
            address: address.to_string(),
            family,
        })
    }

    /// Network name as accepted by [`Endpoint::parse`].
    pub fn network(&self) -> &'static str {
        match self {
            Endpoint::Tcp { family: Family::Any, .. } => "tcp",
            Endpoint::Tcp { family: Family::V4, .. } => "tcp4",
            Endpoint::Tcp { family: Family::V6, .. } => "tcp6",
            #[cfg(unix)]
            Endpoint::Unix(_) => "unix",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp { address, .. } => write!(f, "{}://{}", self.network(), address),
            #[cfg(unix)]
            Endpoint::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

/// A freshly dialed socket, split into halves.
pub struct Transport {
    /// Read half, owned by the read loop.
    pub reader: BoxedReader,
    /// Write half, owned by the agent's write lock.
    pub writer: BoxedWriter,
}

impl Transport {
    /// Wrap already split halves.
    pub fn new(reader: BoxedReader, writer: BoxedWriter) -> Self {
        Self { reader, writer }
    }

    /// Split any bidirectional stream (e.g. `tokio::io::duplex` in tests).
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self::new(Box::new(reader), Box::new(writer))
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport").finish_non_exhaustive()
    }
}

/// Opens sockets for an agent.
pub trait Dialer: Send + Sync + 'static {
    /// Dial the endpoint once.
    fn dial<'a>(&'a self, endpoint: &'a Endpoint) -> BoxFuture<'a, io::Result<Transport>>;
}

/// Dialer for real TCP and Unix sockets.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetDialer;

impl Dialer for NetDialer {
    fn dial<'a>(&'a self, endpoint: &'a Endpoint) -> BoxFuture<'a, io::Result<Transport>> {
        Box::pin(async move {
            match endpoint {
                Endpoint::Tcp { address, family } => {
                    let stream = dial_tcp(address, *family).await?;
                    stream.set_nodelay(true)?;
                    let (reader, writer) = stream.into_split();
                    Ok(Transport::new(Box::new(reader), Box::new(writer)))
                }
                #[cfg(unix)]
                Endpoint::Unix(path) => {
                    let stream = tokio::net::UnixStream::connect(path).await?;
                    let (reader, writer) = stream.into_split();
                    Ok(Transport::new(Box::new(reader), Box::new(writer)))
                }
            }
        })
    }
}

async fn dial_tcp(address: &str, family: Family) -> io::Result<TcpStream> {
    if family == Family::Any {
        return TcpStream::connect(address).await;
    }

    let mut last_err = None;
    for addr in tokio::net::lookup_host(address).await? {
        let wanted = match family {
            Family::V4 => addr.is_ipv4(),
            Family::V6 => addr.is_ipv6(),
            Family::Any => true,
        };
        if !wanted {
            continue;
        }
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }

    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("no {family:?} address for {address}"),
        )
    }))
}

/// Whether a read error can be retried on the same socket.
pub fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[test]
    fn test_parse_tcp_families() {
        let any = Endpoint::parse("tcp", "127.0.0.1:4730").unwrap();
        assert_eq!(any.network(), "tcp");
        assert_eq!(any.to_string(), "tcp://127.0.0.1:4730");

        let v4 = Endpoint::parse("tcp4", "localhost:4730").unwrap();
        assert!(matches!(v4, Endpoint::Tcp { family: Family::V4, .. }));

        let v6 = Endpoint::parse("tcp6", "[::1]:4730").unwrap();
        assert_eq!(v6.network(), "tcp6");
    }

    #[test]
    fn test_parse_rejects_unknown_network() {
        let err = Endpoint::parse("udp", "127.0.0.1:4730").unwrap_err();
        assert!(matches!(err, AgentError::InvalidEndpoint(_)));

        let err = Endpoint::parse("tcp", "").unwrap_err();
        assert!(matches!(err, AgentError::InvalidEndpoint(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_parse_unix() {
        let endpoint = Endpoint::parse("unix", "/tmp/gearmand.sock").unwrap();
        assert_eq!(endpoint.to_string(), "unix:///tmp/gearmand.sock");
    }

    #[test]
    fn test_transient_classification() {
        assert!(is_transient(&io::Error::from(io::ErrorKind::Interrupted)));
        assert!(is_transient(&io::Error::from(io::ErrorKind::WouldBlock)));
        assert!(!is_transient(&io::Error::from(io::ErrorKind::ConnectionReset)));
        assert!(!is_transient(&io::Error::from(io::ErrorKind::UnexpectedEof)));
    }

    #[tokio::test]
    async fn test_net_dialer_tcp() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let endpoint = Endpoint::parse("tcp4", &addr).unwrap();

        let dialer = NetDialer;
        let (dialed, accepted) = tokio::join!(dialer.dial(&endpoint), listener.accept());
        let mut transport = dialed.unwrap();
        let (mut server, _) = accepted.unwrap();

        transport.writer.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        server.write_all(b"pong").await.unwrap();
        transport.reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");
    }

    #[tokio::test]
    async fn test_net_dialer_refused() {
        // bind then drop to get a port nobody listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let endpoint = Endpoint::parse("tcp", &addr).unwrap();
        assert!(NetDialer.dial(&endpoint).await.is_err());
    }
}

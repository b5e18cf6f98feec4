//! Transport Module
//!
//! Provides the connection abstraction wrapped by every endpoint, and a
//! `socket2`-backed implementation of it. Endpoints never create sockets
//! themselves; they only check readiness, resolve the descriptor and forward
//! deadline and close requests to a [`Transport`].

use std::fmt;
use std::io;
use std::net::{TcpStream, UdpSocket};
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol, Socket, Type};

/// Smallest timeout handed to the OS for a deadline that has already passed.
/// A zero timeout means "block forever" at the socket level.
const MIN_TIMEOUT: Duration = Duration::from_micros(1);

/// Shape of the wrapped connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Stream socket (TCP)
    Stream,
    /// Datagram socket (UDP)
    Datagram,
    /// Raw IPv4 socket
    Raw,
}

impl TransportKind {
    /// Whether the connection delivers discrete packets
    pub fn is_packet_oriented(&self) -> bool {
        matches!(self, TransportKind::Datagram | TransportKind::Raw)
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Stream => write!(f, "stream"),
            TransportKind::Datagram => write!(f, "datagram"),
            TransportKind::Raw => write!(f, "raw"),
        }
    }
}

/// Connection abstraction wrapped by an endpoint
///
/// Deadlines are absolute points in time; `None` clears the deadline. Every
/// method must keep working (by returning an error) after [`close`] has
/// succeeded, since endpoints forward calls regardless of closure.
///
/// [`close`]: Transport::close
#[cfg_attr(test, mockall::automock)]
pub trait Transport: fmt::Debug + Send + Sync {
    /// Shape of the connection
    fn kind(&self) -> TransportKind;

    /// Resolve the system file descriptor
    fn sysfd(&self) -> io::Result<RawFd>;

    /// Set both the read and write deadlines
    fn set_deadline(&self, deadline: Option<Instant>) -> io::Result<()> {
        self.set_read_deadline(deadline)?;
        self.set_write_deadline(deadline)
    }

    /// Set the read deadline
    fn set_read_deadline(&self, deadline: Option<Instant>) -> io::Result<()>;

    /// Set the write deadline
    fn set_write_deadline(&self, deadline: Option<Instant>) -> io::Result<()>;

    /// Close the connection
    fn close(&self) -> io::Result<()>;
}

/// Error reported by a transport after it has been closed
pub fn closed_error() -> io::Error {
    io::Error::new(
        io::ErrorKind::NotConnected,
        "use of closed network connection",
    )
}

fn timeout_until(deadline: Option<Instant>) -> Option<Duration> {
    deadline.map(|d| d.saturating_duration_since(Instant::now()).max(MIN_TIMEOUT))
}

/// Socket-backed transport
///
/// Wraps a `socket2` socket and releases it exactly once on [`close`].
/// Afterwards every operation fails with [`closed_error`].
///
/// [`close`]: Transport::close
pub struct SocketTransport {
    inner: RwLock<Option<Socket>>,
    kind: TransportKind,
}

impl SocketTransport {
    /// Wrap an existing socket, detecting its kind from the socket type
    ///
    /// # Returns
    ///
    /// * `Ok(SocketTransport)` - Wrapped socket
    /// * `Err(io::Error)` - The socket type could not be queried or is not
    ///   stream, datagram or raw
    pub fn new(socket: Socket) -> io::Result<Self> {
        let ty = socket.r#type()?;
        let kind = if ty == Type::STREAM {
            TransportKind::Stream
        } else if ty == Type::DGRAM {
            TransportKind::Datagram
        } else if ty == Type::RAW {
            TransportKind::Raw
        } else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "unsupported socket type",
            ));
        };
        Ok(Self::with_kind(socket, kind))
    }

    /// Wrap a connected TCP stream
    pub fn from_tcp(stream: TcpStream) -> Self {
        Self::with_kind(Socket::from(stream), TransportKind::Stream)
    }

    /// Wrap a UDP socket
    pub fn from_udp(socket: UdpSocket) -> Self {
        Self::with_kind(Socket::from(socket), TransportKind::Datagram)
    }

    /// Create a raw IPv4 socket carrying the given IP protocol number
    ///
    /// Usually requires elevated privileges.
    ///
    /// # Arguments
    ///
    /// * `protocol` - IP protocol number (e.g. 89 for OSPF, 47 for GRE)
    pub fn raw(protocol: i32) -> io::Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::from(protocol)))?;
        Ok(Self::with_kind(socket, TransportKind::Raw))
    }

    fn with_kind(socket: Socket, kind: TransportKind) -> Self {
        Self {
            inner: RwLock::new(Some(socket)),
            kind,
        }
    }

    /// Run `f` against the open socket, or fail if it has been closed
    pub fn with_socket<R>(&self, f: impl FnOnce(&Socket) -> io::Result<R>) -> io::Result<R> {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(socket) => f(socket),
            None => Err(closed_error()),
        }
    }

    /// Whether `close` has released the socket
    pub fn is_closed(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_none()
    }
}

impl fmt::Debug for SocketTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketTransport")
            .field("kind", &self.kind)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Transport for SocketTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn sysfd(&self) -> io::Result<RawFd> {
        self.with_socket(|s| Ok(s.as_raw_fd()))
    }

    fn set_read_deadline(&self, deadline: Option<Instant>) -> io::Result<()> {
        self.with_socket(|s| s.set_read_timeout(timeout_until(deadline)))
    }

    fn set_write_deadline(&self, deadline: Option<Instant>) -> io::Result<()> {
        self.with_socket(|s| s.set_write_timeout(timeout_until(deadline)))
    }

    fn close(&self) -> io::Result<()> {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        match guard.take() {
            // dropping the socket closes the descriptor
            Some(socket) => {
                drop(socket);
                Ok(())
            }
            None => Err(closed_error()),
        }
    }
}

//! Lazily connected, fire-and-forget UDP emitter.
//!
//! # State Machine
//! ```text
//! Disconnected --(ensure_connected ok)--> Connected
//! Connected: kept until the emitter is dropped
//! ```
//!
//! A failed connect leaves the emitter disconnected and the next call simply
//! tries again. A failed send never disconnects it: UDP has no session to
//! break.

use std::fmt;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::sync::Arc;

use thiserror::Error;

use crate::observability::metrics;
use crate::udp_log::destination::Destination;
use crate::udp_log::record::LogRecord;

/// Upper bound on inbound datagrams discarded after one send.
const MAX_DRAINED_REPLIES: usize = 8;

/// Runtime transport failure. Never fatal to the caller.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect UDP log socket to {peer}: {source}")]
    ConnectFailed {
        peer: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to send log record to {peer}: {source}")]
    SendFailed {
        peer: SocketAddr,
        #[source]
        source: io::Error,
    },
}

impl TransportError {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::ConnectFailed { .. } => "connect",
            TransportError::SendFailed { .. } => "send",
        }
    }
}

/// A connected datagram socket.
pub trait DatagramSocket {
    /// Send one datagram to the connected peer without blocking.
    fn send(&self, datagram: &[u8]) -> io::Result<usize>;

    /// Receive one pending datagram without blocking.
    fn try_recv(&self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Creates connected datagram sockets.
pub trait Transport {
    type Socket: DatagramSocket + fmt::Debug;

    fn connect(&self, peer: SocketAddr) -> io::Result<Self::Socket>;
}

/// The real transport: a non-blocking `std::net::UdpSocket`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UdpTransport;

impl Transport for UdpTransport {
    type Socket = UdpSocket;

    fn connect(&self, peer: SocketAddr) -> io::Result<UdpSocket> {
        let local: SocketAddr = match peer {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(local)?;
        socket.set_nonblocking(true)?;
        socket.connect(peer)?;
        Ok(socket)
    }
}

impl DatagramSocket for UdpSocket {
    fn send(&self, datagram: &[u8]) -> io::Result<usize> {
        UdpSocket::send(self, datagram)
    }

    fn try_recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.recv(buf)
    }
}

/// Handler invoked for every datagram read back from the collector.
pub type ReadHandler = fn(&[u8]);

/// The collector never answers; anything it sends is dropped on purpose.
pub fn ignore_reply(_datagram: &[u8]) {}

/// An established association with the collector.
pub struct Connection<S> {
    socket: S,
    on_readable: ReadHandler,
}

impl<S: fmt::Debug> fmt::Debug for Connection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("socket", &self.socket)
            .finish_non_exhaustive()
    }
}

impl<S: DatagramSocket> Connection<S> {
    fn new(socket: S) -> Self {
        Self {
            socket,
            on_readable: ignore_reply,
        }
    }

    pub fn socket(&self) -> &S {
        &self.socket
    }

    /// Hand any pending inbound datagrams to the read handler.
    fn drain_replies(&self) {
        let mut buf = [0u8; 512];
        for _ in 0..MAX_DRAINED_REPLIES {
            match self.socket.try_recv(&mut buf) {
                Ok(n) => (self.on_readable)(&buf[..n]),
                Err(_) => break,
            }
        }
    }
}

/// Per-destination emitter state. One per worker per destination.
#[derive(Debug)]
pub struct UdpEmitter<T: Transport = UdpTransport> {
    destination: Arc<Destination>,
    peer: SocketAddr,
    transport: T,
    connection: Option<Connection<T::Socket>>,
}

impl UdpEmitter<UdpTransport> {
    /// Emitter over real UDP sockets. `None` for a disabled destination.
    pub fn new(destination: Arc<Destination>) -> Option<Self> {
        Self::with_transport(destination, UdpTransport)
    }
}

impl<T: Transport> UdpEmitter<T> {
    pub fn with_transport(destination: Arc<Destination>, transport: T) -> Option<Self> {
        let peer = destination.resolved_address()?;
        Some(Self {
            destination,
            peer,
            transport,
            connection: None,
        })
    }

    pub fn destination(&self) -> &Arc<Destination> {
        &self.destination
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn connection(&self) -> Option<&Connection<T::Socket>> {
        self.connection.as_ref()
    }

    /// Connect on first use. A no-op once connected.
    pub fn ensure_connected(&mut self) -> Result<(), TransportError> {
        self.connected().map(|_| ())
    }

    /// Serialize and send one record as a single datagram.
    pub fn send_record(&mut self, record: &LogRecord<'_>) -> Result<(), TransportError> {
        let peer = self.peer;
        let connection = self.connected()?;

        let datagram = record.to_bytes();
        let result = match connection.socket.send(&datagram) {
            Ok(sent) if sent == datagram.len() => Ok(()),
            Ok(sent) => Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short write: {} of {} bytes", sent, datagram.len()),
            )),
            Err(e) => Err(e),
        };
        connection.drain_replies();

        match result {
            Ok(()) => {
                tracing::trace!(collector = %self.destination, bytes = datagram.len(), "Sent log record");
                metrics::record_datagram_sent(datagram.len());
                Ok(())
            }
            Err(source) => Err(TransportError::SendFailed { peer, source }),
        }
    }

    fn connected(&mut self) -> Result<&Connection<T::Socket>, TransportError> {
        let connection = match self.connection.take() {
            Some(connection) => connection,
            None => self.connect()?,
        };
        Ok(self.connection.insert(connection))
    }

    fn connect(&self) -> Result<Connection<T::Socket>, TransportError> {
        let socket = self
            .transport
            .connect(self.peer)
            .map_err(|source| TransportError::ConnectFailed {
                peer: self.peer,
                source,
            })?;

        tracing::debug!(collector = %self.destination, "UDP log socket connected");
        metrics::record_connect();
        Ok(Connection::new(socket))
    }
}

impl<T: Transport> Drop for UdpEmitter<T> {
    fn drop(&mut self) {
        if self.connection.take().is_some() {
            tracing::debug!(collector = %self.destination, "UDP log socket released");
            metrics::record_socket_released();
        }
    }
}

//! Connection Handler
//!
//! A [`Connection`] is one client socket plus two buffers: bytes the client
//! has sent that have not formed a complete command yet, and replies that
//! the socket has not accepted yet. It does not run on its own task: the
//! server's event loop waits for the socket to become ready and then calls
//! [`Connection::process`], handing it the store for the duration of that
//! call. Nothing in `process` awaits.
//!
//! ## One processing round
//!
//! ```text
//!   socket ── try_read(chunk) ──► receive buffer
//!                                      │
//!                                      ▼
//!                              decode() ──► commands ──► CommandHandler
//!                                 │   ▲                       │
//!                  malformed frame│   │ decode again          │ replies
//!                   (dropped)     └───┘                       ▼
//!   socket ◄────────── try_write ◄──────────────────── send buffer
//! ```
//!
//! ## Buffer Management
//!
//! TCP is a byte stream: one read may carry half a command or ten of them.
//! Undecoded bytes stay in a `BytesMut` until the rest arrives. Decoded
//! bytes are released from the front with `advance`, so the buffer never
//! holds a byte that has already been answered.
//!
//! Replies go out as far as the socket takes them; the remainder waits for
//! the next writable event. Once more than [`MAX_PENDING_OUTPUT`] bytes are
//! waiting, the connection stops reading until the client catches up.

use crate::commands::CommandHandler;
use crate::protocol::decode;
use crate::storage::Store;
use bytes::{Buf, BytesMut};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{Interest, Ready};
use tokio::net::TcpStream;
use tracing::{debug, trace, warn};

/// Initial receive buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Unsent reply bytes above which a connection stops reading (64 KB)
pub const MAX_PENDING_OUTPUT: usize = 64 * 1024;

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
    /// Frames dropped because they violated the framing rules
    pub malformed_frames: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn malformed_frame(&self) {
        self.malformed_frames.fetch_add(1, Ordering::Relaxed);
    }
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Client closed its end of the socket
    #[error("Client disconnected")]
    ClientDisconnected,
}

/// A client connection owned by the event loop.
///
/// Dropping a `Connection` closes the socket.
pub struct Connection {
    id: u64,
    stream: TcpStream,
    addr: SocketAddr,

    /// Bytes received but not yet decoded
    buffer: BytesMut,

    /// Encoded replies the socket has not taken yet
    outgoing: BytesMut,

    /// Scratch space for a single non-blocking read
    chunk: Vec<u8>,

    stats: Arc<ConnectionStats>,
}

impl Connection {
    /// Wraps an accepted socket. `read_chunk` caps how many bytes a single
    /// [`process`](Self::process) call reads.
    pub fn new(
        id: u64,
        stream: TcpStream,
        addr: SocketAddr,
        read_chunk: usize,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            id,
            stream,
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            outgoing: BytesMut::new(),
            chunk: vec![0; read_chunk.max(1)],
            stats,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Bytes waiting for the rest of their frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Reply bytes not yet accepted by the socket.
    pub fn pending_output(&self) -> usize {
        self.outgoing.len()
    }

    /// What this connection is waiting for: input while its send backlog
    /// is small, output while anything is unsent.
    pub fn interest(&self) -> Interest {
        match self.outgoing.len() {
            0 => Interest::READABLE,
            n if n > MAX_PENDING_OUTPUT => Interest::WRITABLE,
            _ => Interest::READABLE | Interest::WRITABLE,
        }
    }

    /// Resolves when the socket is ready for [`interest`](Self::interest).
    ///
    /// Readiness can be spurious; [`process`](Self::process) handles that
    /// by returning `Ok(0)`.
    pub async fn ready(&self) -> io::Result<Ready> {
        self.stream.ready(self.interest()).await
    }

    /// Handles one readiness event without blocking: reads once if
    /// readable, executes every complete command and pushes as many queued
    /// reply bytes as the socket accepts.
    ///
    /// Returns the number of commands executed, which may be 0 when only a
    /// partial frame arrived or the event was for writing.
    pub fn process(
        &mut self,
        ready: Ready,
        handler: &CommandHandler,
        store: &mut Store,
    ) -> Result<usize, ConnectionError> {
        let mut executed = 0;

        if (ready.is_readable() || ready.is_read_closed())
            && self.outgoing.len() <= MAX_PENDING_OUTPUT
        {
            executed = self.read_and_execute(handler, store)?;
        }

        if !self.outgoing.is_empty() {
            self.flush()?;
        }

        Ok(executed)
    }

    fn read_and_execute(
        &mut self,
        handler: &CommandHandler,
        store: &mut Store,
    ) -> Result<usize, ConnectionError> {
        let n = match self.stream.try_read(&mut self.chunk) {
            Ok(0) => return Err(ConnectionError::ClientDisconnected),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        self.buffer.extend_from_slice(&self.chunk[..n]);
        self.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, buffered = self.buffer.len(), "Read data");

        let mut executed = 0;

        loop {
            let decoded = decode(&self.buffer);
            self.buffer.advance(decoded.consumed);

            for command in &decoded.commands {
                let reply = handler.execute(store, command);
                trace!(client = %self.addr, reply = %reply, "Executed command");
                reply.encode_into(&mut self.outgoing);
                self.stats.command_processed();
                executed += 1;
            }

            if decoded.discarded == 0 {
                break;
            }
            self.stats.malformed_frame();
            warn!(
                client = %self.addr,
                discarded = decoded.discarded,
                "Discarded malformed frame"
            );
        }

        Ok(executed)
    }

    /// Writes queued replies until the socket would block.
    fn flush(&mut self) -> Result<(), ConnectionError> {
        while !self.outgoing.is_empty() {
            match self.stream.try_write(&self.outgoing) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
                Ok(n) => {
                    self.outgoing.advance(n);
                    self.stats.bytes_written(n);
                    trace!(client = %self.addr, bytes = n, pending = self.outgoing.len(), "Sent replies");
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.stats.connection_closed();
        debug!(client = %self.addr, id = self.id, "Connection closed");
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("addr", &self.addr)
            .field("buffered", &self.buffer.len())
            .field("pending_output", &self.outgoing.len())
            .finish()
    }
}

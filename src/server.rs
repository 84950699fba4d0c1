//! Server
//!
//! One task does all the work. It owns the listener, the [`Store`] and every
//! [`Connection`], and sleeps in a single `select!` until something happens:
//!
//! ```text
//!                     ┌──────────────────────────────┐
//!   accept() ────────►│                              │──► new Connection
//!   shutdown ────────►│          event loop          │──► break
//!   tick (mpsc) ─────►│   (owns Store, Connections)  │──► ActiveExpiry::run
//!   ready(conn) ─────►│                              │──► Connection::process
//!                     └──────────────────────────────┘
//!          ▲
//!          │ try_send(()) every tick_interval
//!   ┌──────┴──────┐
//!   │ ticker task │  (never touches the store)
//!   └─────────────┘
//! ```
//!
//! Because only the loop touches the store, commands from different clients
//! are applied one after another with no locking, and an expiry sweep never
//! overlaps a command. No branch awaits after it has been selected: socket
//! writes are attempted with `try_write` and the rest is left for the next
//! writable event, so one slow client cannot hold up the others.
//!
//! A failing `accept()` (for example when the process is out of file
//! descriptors) pauses accepting for a while, doubling the pause on each
//! consecutive failure up to one second.

use crate::commands::CommandHandler;
use crate::connection::{Connection, ConnectionError, ConnectionStats};
use crate::storage::{
    spawn_ticker, ActiveExpiry, Clock, ExpiryConfig, Store, StoreStats, SystemClock,
};
use futures_util::future::select_all;
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::Ready;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

/// First pause after a failed accept
const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(10);

/// Longest pause between accept attempts while they keep failing
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Server configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on (0 picks a free port)
    pub port: u16,
    /// Period of the active expiry timer
    pub tick_interval: Duration,
    /// Maximum bytes taken from a socket per readiness event
    pub read_chunk: usize,
    pub expiry: ExpiryConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: crate::DEFAULT_HOST.to_string(),
            port: crate::DEFAULT_PORT,
            tick_interval: Duration::from_millis(100),
            read_chunk: 1024,
            expiry: ExpiryConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Errors that stop the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Stops a running (or not yet running) server.
///
/// Cheap to clone and safe to move to other tasks or threads.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Asks the event loop to stop. Calling it more than once is harmless.
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }
}

/// A bound server, ready to [`listen`](Server::listen).
pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    clock: Arc<dyn Clock>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    stats: Arc<ConnectionStats>,
}

impl Server {
    /// Binds the listening socket using the wall clock.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        Self::bind_with_clock(config, Arc::new(SystemClock)).await
    }

    /// Binds the listening socket; expirations are measured with `clock`.
    pub async fn bind_with_clock(
        config: ServerConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ServerError> {
        let addr = config.bind_address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        info!(address = %listener.local_addr()?, "Listening");

        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            listener,
            config,
            clock,
            shutdown_tx: Arc::new(shutdown_tx),
            stats: Arc::new(ConnectionStats::new()),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Counters shared with every connection.
    pub fn stats(&self) -> Arc<ConnectionStats> {
        Arc::clone(&self.stats)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    /// Runs the event loop until shutdown is requested.
    ///
    /// On return every client socket has been closed and the timer task has
    /// finished. The final store statistics are handed back.
    pub async fn listen(self) -> Result<StoreStats, ServerError> {
        let Server {
            listener,
            config,
            clock,
            shutdown_tx,
            stats,
        } = self;

        let mut shutdown_rx = shutdown_tx.subscribe();
        let (tick_tx, mut tick_rx) = mpsc::channel(1);
        let ticker = spawn_ticker(config.tick_interval, tick_tx, shutdown_tx.subscribe());

        let mut store = Store::new(clock);
        let handler = CommandHandler::new();
        let mut expiry = ActiveExpiry::new(config.expiry);
        let mut connections: HashMap<u64, Connection> = HashMap::new();
        let mut next_id: u64 = 0;
        let mut backoff = AcceptBackoff::new();
        let mut accept_paused_until: Option<Instant> = None;

        loop {
            if *shutdown_rx.borrow_and_update() {
                break;
            }
            let resume_at = accept_paused_until.unwrap_or_else(Instant::now);

            tokio::select! {
                accepted = listener.accept(), if accept_paused_until.is_none() => match accepted {
                    Ok((stream, addr)) => {
                        backoff.succeeded();
                        next_id += 1;
                        info!(client = %addr, id = next_id, "Client connected");
                        let conn = Connection::new(
                            next_id,
                            stream,
                            addr,
                            config.read_chunk,
                            Arc::clone(&stats),
                        );
                        connections.insert(next_id, conn);
                    }
                    Err(e) => {
                        let pause = backoff.failed();
                        error!(
                            error = %e,
                            pause_ms = pause.as_millis() as u64,
                            "Failed to accept connection"
                        );
                        accept_paused_until = Some(Instant::now() + pause);
                    }
                },

                _ = time::sleep_until(resume_at), if accept_paused_until.is_some() => {
                    accept_paused_until = None;
                }

                _ = shutdown_rx.changed() => {}

                Some(()) = tick_rx.recv() => {
                    expiry.run(&mut store);
                }

                (id, ready) = next_ready(&connections) => {
                    if let Some(conn) = connections.get_mut(&id) {
                        let result = match ready {
                            Ok(ready) => conn.process(ready, &handler, &mut store),
                            Err(e) => Err(e.into()),
                        };
                        match result {
                            Ok(_) => {}
                            Err(ConnectionError::ClientDisconnected) => {
                                connections.remove(&id);
                            }
                            Err(e) => {
                                warn!(id = id, error = %e, "Connection error");
                                connections.remove(&id);
                            }
                        }
                    }
                }
            }
        }

        info!(connections = connections.len(), "Shutting down");
        drop(connections);

        shutdown_tx.send_replace(true);
        if let Err(e) = ticker.await {
            warn!(error = %e, "Ticker task failed");
        }

        let final_stats = store.stats();
        debug!(
            keys = final_stats.keys,
            expired = final_stats.expired_keys,
            "Event loop stopped"
        );
        Ok(final_stats)
    }
}

/// Resolves with the first connection whose socket is ready for what it
/// is waiting on. Never resolves while there are no connections.
async fn next_ready(connections: &HashMap<u64, Connection>) -> (u64, io::Result<Ready>) {
    if connections.is_empty() {
        return std::future::pending().await;
    }

    let waits = connections
        .values()
        .map(|conn| Box::pin(async move { (conn.id(), conn.ready().await) }));
    let (first, _, _) = select_all(waits).await;
    first
}

/// Pause schedule for a listener whose `accept()` keeps failing.
#[derive(Debug)]
struct AcceptBackoff {
    delay: Duration,
}

impl AcceptBackoff {
    fn new() -> Self {
        Self {
            delay: ACCEPT_BACKOFF_MIN,
        }
    }

    /// Returns the pause for this failure and doubles the next one.
    fn failed(&mut self) -> Duration {
        let pause = self.delay;
        self.delay = (self.delay * 2).min(ACCEPT_BACKOFF_MAX);
        pause
    }

    fn succeeded(&mut self) {
        self.delay = ACCEPT_BACKOFF_MIN;
    }
}

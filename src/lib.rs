//! # FerroKV - A Single-Threaded In-Memory Key-Value Server
//!
//! FerroKV speaks the Redis wire protocol and keeps everything in memory:
//! plain values, hashes and sorted sets, each optionally carrying an
//! expiration.
//!
//! ## Features
//!
//! - **Redis-Compatible**: RESP requests and replies, usable from `redis-cli`
//! - **One Event Loop**: a single task owns the store, so there is no locking
//! - **Binary Safe**: keys, fields and values are arbitrary bytes
//! - **TTL Support**: expired keys vanish on access and are swept in the background
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              FerroKV                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │   Server    │───>│ Connection  │───>│  Command    │                  │
//! │  │ (event loop)│    │  + decoder  │    │  Handler    │                  │
//! │  └──────┬──────┘    └─────────────┘    └──────┬──────┘                  │
//! │         │                                     │                         │
//! │         │ tick                                ▼                         │
//! │         │           ┌──────────────────────────────────────────────┐    │
//! │         │           │                   Store                      │    │
//! │         │           │   Scalar │ Hash │ SortedSet   + expirations  │    │
//! │         │           └──────────────────────────────────────────────┘    │
//! │         │                                     ▲                         │
//! │         ▼                                     │                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                     ActiveExpiry (sampling sweep)                │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use ferrokv::server::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let server = Server::bind(ServerConfig::default()).await?;
//!
//!     let shutdown = server.shutdown_handle();
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         shutdown.shutdown();
//!     });
//!
//!     server.listen().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `PING [message]`, `ECHO message`
//! - `SET key value [NX|XX]`, `GET key`, `DEL key`, `EXISTS key`, `KEYS *`
//! - `EXPIRE key seconds`, `PEXPIRE key milliseconds`
//! - `HSET hash field value`, `HGET hash field`, `HMGET hash field [field ...]`,
//!   `HINCRBY hash field amount`
//! - `ZADD key score member`, `ZRANGE key start stop`, `ZRANK key member`,
//!   `ZSCORE key member`
//!
//! ## Module Overview
//!
//! - [`protocol`]: request decoder and reply encoder
//! - [`storage`]: keyspace, sorted sets, clocks and expiry
//! - [`commands`]: command registry and dispatch
//! - [`connection`]: client sockets and their buffers
//! - [`server`]: the event loop, configuration and shutdown
//!
//! ## Design Highlights
//!
//! ### Passive + Active Expiry
//!
//! Keys with a TTL are expired in two ways:
//! 1. **Passive**: every lookup checks the key's deadline first
//! 2. **Active**: on each timer tick a random sample of volatile keys is
//!    checked, repeating while more than a quarter of the sample was stale
//!
//! This ensures memory is reclaimed even for keys that are never accessed again.

pub mod commands;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::{CommandError, CommandHandler};
pub use connection::{Connection, ConnectionError, ConnectionStats};
pub use protocol::{decode, Command, Reply};
pub use server::{Server, ServerConfig, ServerError, ShutdownHandle};
pub use storage::{ActiveExpiry, Clock, ExpiryConfig, ManualClock, Store, SystemClock};

/// The default port FerroKV listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host FerroKV binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of FerroKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

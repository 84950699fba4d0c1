//! Connection Module
//!
//! Client sockets and their receive and send buffers. Connections have no
//! task of their own; the event loop in [`server`](crate::server) owns all
//! of them and drives whichever one became ready.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Server event loop                         │
//! │                                                             │
//! │   accept() ──► Connection { id, socket, buffers }           │
//! │                                                             │
//! │   ready(conn) ──► conn.process(ready, &handler, &mut store) │
//! │                          │                                  │
//! │                          ├── Ok(n)   keep the connection    │
//! │                          └── Err(_)  drop it (socket closed)│
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Non-blocking I/O**: one `try_read` per readiness event, replies sent
//!   with `try_write`, reading paused while too much output is queued
//! - **Pipelining**: every complete command in the buffer runs in one round
//! - **Resynchronisation**: malformed frames are dropped, later frames still run
//! - **Statistics**: shared atomic counters in [`ConnectionStats`]

pub mod handler;

pub use handler::{Connection, ConnectionError, ConnectionStats, MAX_PENDING_OUTPUT};

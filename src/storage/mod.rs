//! Storage Module
//!
//! Everything the server remembers lives here: the keyspace with its three
//! value shapes, expiration instants, and the machinery that reclaims
//! expired keys.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Store                              │
//! │   Scalar(Bytes) │ Hash(field → value) │ SortedSet(ZSet)     │
//! │   expirations: key → instant                 ▲              │
//! └──────────────────────────────────────────────┼──────────────┘
//!          ▲ passive check on every lookup       │
//!          │                                     │ once per tick
//!   ┌──────┴──────┐                     ┌────────┴────────┐
//!   │    Clock    │                     │  ActiveExpiry   │
//!   └─────────────┘                     └─────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use ferrokv::storage::{ManualClock, Store, Value};
//! use bytes::Bytes;
//! use std::sync::Arc;
//!
//! let clock = Arc::new(ManualClock::default());
//! let mut store = Store::new(clock.clone());
//!
//! store.set(Bytes::from("session"), Value::Scalar(Bytes::from("token123")));
//! store.expire_in_millis(b"session", 1500);
//!
//! clock.advance(2.0);
//! assert!(store.get(b"session").is_none());
//! ```

pub mod clock;
pub mod engine;
pub mod expiry;
pub mod zset;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{Store, StoreStats, Value};
pub use expiry::{spawn_ticker, ActiveExpiry, ExpiryConfig, SweepReport};
pub use zset::ZSet;

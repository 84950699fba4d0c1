//! Command Module
//!
//! The command layer sits between the decoder and the store. It receives
//! decoded commands, runs them against the [`Store`](crate::storage::Store)
//! and produces replies.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │    Decoder      │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! │                 │
//! │  - Dispatch     │
//! │  - Validate     │
//! │  - Execute      │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │     Store       │  (storage module)
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! ### Scalar and key commands
//! - `SET key value [NX|XX]`, `GET`, `DEL`, `EXISTS`, `KEYS *`
//! - `EXPIRE`, `PEXPIRE`
//!
//! ### Hash commands
//! - `HSET`, `HGET`, `HMGET`, `HINCRBY`
//!
//! ### Sorted set commands
//! - `ZADD`, `ZRANGE`, `ZRANK`, `ZSCORE`
//!
//! ### Connection commands
//! - `PING [message]`, `ECHO message`

pub mod error;
pub mod handler;
pub mod registry;

pub use error::CommandError;
pub use handler::CommandHandler;
pub use registry::{Arity, CommandSpec, COMMANDS};

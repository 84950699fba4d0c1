//! Wire Protocol
//!
//! Requests arrive as arrays of bulk strings and are turned into
//! [`Command`]s by the incremental [`decode`] function. Results go back
//! out as [`Reply`] values.
//!
//! ## Modules
//!
//! - `decoder`: streaming request decoder, tolerant of partial reads and pipelining
//! - `reply`: the reply type and its byte-exact encoding
//!
//! ## Example
//!
//! ```
//! use ferrokv::protocol::{decode, Command, Reply};
//!
//! let wire = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n*1\r\n$4\r\nPI";
//! let decoded = decode(wire);
//! assert_eq!(decoded.commands, vec![Command::from_parts(&["GET", "name"]).unwrap()]);
//! assert_eq!(decoded.consumed, 23);
//!
//! assert_eq!(&Reply::pong().encode()[..], b"+PONG\r\n");
//! ```

pub mod decoder;
pub mod reply;

pub use decoder::{decode, Command, Decoded, MAX_BULK_LEN, MAX_LINE_LEN};
pub use reply::Reply;

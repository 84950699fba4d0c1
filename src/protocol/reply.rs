//! Reply Types and Wire Encoding
//!
//! Every command produces exactly one [`Reply`]. The encoder writes the
//! byte-exact wire form:
//!
//! | Reply            | Wire form                      |
//! |------------------|--------------------------------|
//! | `Status("OK")`   | `+OK\r\n`                      |
//! | `Error(msg)`     | `-<msg>\r\n`                   |
//! | `Integer(n)`     | `:<n>\r\n`                     |
//! | `Bulk(bytes)`    | `$<len>\r\n<bytes>\r\n`        |
//! | `Nil`            | `$-1\r\n`                      |
//! | `Array(items)`   | `*<count>\r\n` + each item     |

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// The CRLF terminator used by every frame.
pub const CRLF: &[u8] = b"\r\n";

/// Type marker bytes.
pub mod marker {
    pub const STATUS: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// A command result, ready to be encoded for the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Simple status line, e.g. `OK` or `PONG`.
    Status(&'static str),

    /// Error line. The message carries its own prefix (`ERR`, `WRONGTYPE`).
    Error(String),

    /// Signed 64-bit integer.
    Integer(i64),

    /// Length-prefixed, binary-safe string.
    Bulk(Bytes),

    /// Null bulk string. Also used for nil elements inside arrays.
    Nil,

    /// Sequence of replies, encoded recursively.
    Array(Vec<Reply>),
}

impl Reply {
    /// `+OK`
    pub fn ok() -> Self {
        Reply::Status("OK")
    }

    /// `+PONG`
    pub fn pong() -> Self {
        Reply::Status("PONG")
    }

    pub fn nil() -> Self {
        Reply::Nil
    }

    pub fn error(message: impl Into<String>) -> Self {
        Reply::Error(message.into())
    }

    pub fn integer(n: i64) -> Self {
        Reply::Integer(n)
    }

    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Reply::Bulk(data.into())
    }

    pub fn array(items: Vec<Reply>) -> Self {
        Reply::Array(items)
    }

    /// Bulk string for `Some`, nil for `None`.
    pub fn from_option(value: Option<Bytes>) -> Self {
        value.map(Reply::Bulk).unwrap_or(Reply::Nil)
    }

    /// Encodes this reply into a fresh buffer.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Appends the wire form of this reply to `buf`.
    ///
    /// Replies for a whole pipelined batch are accumulated into one buffer
    /// and written with a single call.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        match self {
            Reply::Status(s) => {
                buf.put_u8(marker::STATUS);
                buf.put_slice(s.as_bytes());
                buf.put_slice(CRLF);
            }
            Reply::Error(msg) => {
                buf.put_u8(marker::ERROR);
                buf.put_slice(msg.as_bytes());
                buf.put_slice(CRLF);
            }
            Reply::Integer(n) => {
                buf.put_u8(marker::INTEGER);
                buf.put_slice(n.to_string().as_bytes());
                buf.put_slice(CRLF);
            }
            Reply::Bulk(data) => {
                buf.put_u8(marker::BULK);
                buf.put_slice(data.len().to_string().as_bytes());
                buf.put_slice(CRLF);
                buf.put_slice(data);
                buf.put_slice(CRLF);
            }
            Reply::Nil => buf.put_slice(b"$-1\r\n"),
            Reply::Array(items) => {
                buf.put_u8(marker::ARRAY);
                buf.put_slice(items.len().to_string().as_bytes());
                buf.put_slice(CRLF);
                for item in items {
                    item.encode_into(buf);
                }
            }
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Status(s) => write!(f, "{}", s),
            Reply::Error(msg) => write!(f, "(error) {}", msg),
            Reply::Integer(n) => write!(f, "(integer) {}", n),
            Reply::Bulk(data) => match std::str::from_utf8(data) {
                Ok(s) => write!(f, "\"{}\"", s),
                Err(_) => write!(f, "(binary, {} bytes)", data.len()),
            },
            Reply::Nil => write!(f, "(nil)"),
            Reply::Array(items) if items.is_empty() => write!(f, "(empty array)"),
            Reply::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}) {}", i + 1, item)?;
                }
                Ok(())
            }
        }
    }
}

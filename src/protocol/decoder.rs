//! Incremental Request Decoder
//!
//! Clients send each command as an array of bulk strings:
//!
//! ```text
//! *<N>\r\n
//! $<L1>\r\n<L1 bytes>\r\n
//! ...
//! $<LN>\r\n<LN bytes>\r\n
//! ```
//!
//! TCP delivers those bytes in arbitrary pieces, so [`decode`] works on
//! whatever has been buffered so far and reports how much of it was fully
//! consumed. The caller drops exactly that prefix and keeps the rest:
//!
//! 1. Frames are decoded one after another until the buffer runs out.
//! 2. A frame that is cut short contributes nothing to `consumed`; it is
//!    parsed again from its first byte once more data arrives.
//! 3. A frame that breaks the framing rules (wrong marker, non-numeric
//!    count or length) is dropped: everything read up to the offending
//!    point counts as consumed and decoding stops for this pass. No reply
//!    is produced for the dropped bytes.

use crate::protocol::reply::{marker, Reply, CRLF};
use bytes::Bytes;

/// Largest accepted bulk payload (512 MiB).
pub const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Longest accepted count or length line, excluding its CRLF (64 KiB).
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Upper bound for the argument vector preallocation, so a hostile count
/// line cannot force a huge allocation before any payload arrives.
const MAX_PREALLOC_ARGS: usize = 1024;

/// One decoded request: a command name followed by its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    name: Bytes,
    args: Vec<Bytes>,
}

impl Command {
    pub fn new(name: impl Into<Bytes>, args: Vec<Bytes>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Builds a command from string parts. Returns `None` for an empty slice.
    pub fn from_parts<S: AsRef<[u8]>>(parts: &[S]) -> Option<Self> {
        let (name, rest) = parts.split_first()?;
        Some(Self::new(
            Bytes::copy_from_slice(name.as_ref()),
            rest.iter()
                .map(|p| Bytes::copy_from_slice(p.as_ref()))
                .collect(),
        ))
    }

    /// The command name exactly as the client sent it.
    pub fn name(&self) -> &Bytes {
        &self.name
    }

    /// Arguments after the name.
    pub fn args(&self) -> &[Bytes] {
        &self.args
    }

    /// Encodes the command as a request frame, the way a client would send it.
    pub fn encode(&self) -> Bytes {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(Reply::Bulk(self.name.clone()));
        parts.extend(self.args.iter().cloned().map(Reply::Bulk));
        Reply::Array(parts).encode()
    }
}

/// Outcome of one decoding pass over a buffer.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Decoded {
    /// Complete commands, in the order they appeared.
    pub commands: Vec<Command>,

    /// Bytes the caller must drop from the front of its buffer.
    pub consumed: usize,

    /// Bytes of a malformed frame included in `consumed` (0 if none).
    pub discarded: usize,
}

/// Outcome of looking for the next CRLF-terminated line.
enum Line<'a> {
    Complete(&'a [u8]),
    Incomplete,
    /// No CRLF within the line limit; carries the number of bytes scanned.
    TooLong(usize),
}

/// Result of decoding a single frame from the front of a slice.
#[derive(Debug, PartialEq, Eq)]
enum Frame {
    /// A full frame of `len` bytes; `None` for an empty `*0` frame.
    Complete(Option<Command>, usize),
    /// Ran out of bytes before the frame ended.
    Incomplete,
    /// Framing violation after reading `len` bytes.
    Malformed(usize),
}

/// Decodes every complete command at the front of `buf`.
///
/// Never looks at bytes before `consumed` twice: the caller is expected to
/// advance its buffer by [`Decoded::consumed`] before the next call.
pub fn decode(buf: &[u8]) -> Decoded {
    let mut decoded = Decoded::default();

    while decoded.consumed < buf.len() {
        match decode_frame(&buf[decoded.consumed..]) {
            Frame::Complete(command, len) => {
                decoded.consumed += len;
                decoded.commands.extend(command);
            }
            Frame::Incomplete => break,
            Frame::Malformed(len) => {
                decoded.consumed += len;
                decoded.discarded = len;
                break;
            }
        }
    }

    decoded
}

fn decode_frame(buf: &[u8]) -> Frame {
    let mut cursor = Cursor::new(buf);

    let header = match cursor.read_line() {
        Line::Complete(line) => line,
        Line::Incomplete => return Frame::Incomplete,
        Line::TooLong(skip) => return Frame::Malformed(cursor.pos + skip),
    };
    let count = match header.split_first() {
        Some((&marker::ARRAY, digits)) => match parse_decimal(digits) {
            Some(n) => n,
            None => return Frame::Malformed(cursor.pos),
        },
        _ => return Frame::Malformed(cursor.pos),
    };

    let mut parts = Vec::with_capacity(count.min(MAX_PREALLOC_ARGS));
    for _ in 0..count {
        match cursor.read_byte() {
            Some(marker::BULK) => {}
            Some(_) => return Frame::Malformed(cursor.pos),
            None => return Frame::Incomplete,
        }

        let line = match cursor.read_line() {
            Line::Complete(line) => line,
            Line::Incomplete => return Frame::Incomplete,
            Line::TooLong(skip) => return Frame::Malformed(cursor.pos + skip),
        };
        let len = match parse_decimal(line) {
            Some(len) if len <= MAX_BULK_LEN => len,
            _ => return Frame::Malformed(cursor.pos),
        };

        let Some(payload) = cursor.read_exact(len) else {
            return Frame::Incomplete;
        };
        match cursor.read_exact(CRLF.len()) {
            Some(CRLF) => {}
            Some(_) => return Frame::Malformed(cursor.pos),
            None => return Frame::Incomplete,
        }

        parts.push(Bytes::copy_from_slice(payload));
    }

    let mut parts = parts.into_iter();
    let command = parts.next().map(|name| Command::new(name, parts.collect()));
    Frame::Complete(command, cursor.pos)
}

/// Parses an unsigned decimal number. Signs, spaces and empty input are rejected.
fn parse_decimal(digits: &[u8]) -> Option<usize> {
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}

/// Forward-only reader over a byte slice.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    /// Returns the next line without its CRLF.
    ///
    /// Only the first `MAX_LINE_LEN + 2` bytes are searched, so a peer that
    /// never sends CRLF costs a bounded scan per pass.
    fn read_line(&mut self) -> Line<'a> {
        let rest = self.remaining();
        let window = &rest[..rest.len().min(MAX_LINE_LEN + CRLF.len())];
        match window.windows(2).position(|w| w == CRLF) {
            Some(end) => {
                self.pos += end + CRLF.len();
                Line::Complete(&rest[..end])
            }
            None if window.len() == MAX_LINE_LEN + CRLF.len() => Line::TooLong(window.len()),
            None => Line::Incomplete,
        }
    }

    fn read_byte(&mut self) -> Option<u8> {
        let byte = *self.remaining().first()?;
        self.pos += 1;
        Some(byte)
    }

    fn read_exact(&mut self, n: usize) -> Option<&'a [u8]> {
        let rest = self.remaining();
        if rest.len() < n {
            return None;
        }
        self.pos += n;
        Some(&rest[..n])
    }
}

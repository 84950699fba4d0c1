//! Errors a command can report back to the client.

use crate::protocol::Reply;
use thiserror::Error;

/// A command that could not be executed.
///
/// These never close the connection: they are encoded as an error reply
/// and the next pipelined command runs as usual. The `Display` text is the
/// exact message the client sees.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("ERR unknown command '{0}'")]
    UnknownCommand(String),

    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArity(&'static str),

    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    #[error("ERR value is not an integer or out of range")]
    NotInteger,

    #[error("ERR value is not a valid float")]
    NotFloat,

    #[error("ERR increment or decrement would overflow")]
    Overflow,

    #[error("ERR syntax error")]
    Syntax,

    /// KEYS only understands the match-everything pattern.
    ///
    /// Any other pattern is answered with this error reply and the
    /// connection carries on. Glob matching is not implemented, and a
    /// pattern is never treated as a fatal request.
    #[error("ERR pattern '{0}' is not supported, only '*' is")]
    UnsupportedPattern(String),
}

impl From<CommandError> for Reply {
    fn from(err: CommandError) -> Self {
        Reply::Error(err.to_string())
    }
}

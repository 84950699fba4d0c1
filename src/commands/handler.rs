//! Command Dispatcher
//!
//! Turns a decoded [`Command`] into a [`Reply`]:
//!
//! ```text
//!   Command
//!      │
//!      ├── PING / ECHO ──────────────► answered here, store untouched
//!      │
//!      ▼
//!   registry lookup (case-insensitive)
//!      │            └── miss ────────► ERR unknown command '<name>'
//!      ▼
//!   arity check ──── mismatch ───────► ERR wrong number of arguments
//!      │
//!      ▼
//!   CommandSpec::run(&mut Store, args)
//! ```

use crate::commands::error::CommandError;
use crate::commands::registry::{CommandSpec, COMMANDS};
use crate::protocol::{Command, Reply};
use crate::storage::Store;
use std::collections::HashMap;

/// Routes commands to the store.
///
/// The registry is built once, in [`CommandHandler::new`], and never
/// changes afterwards.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    registry: HashMap<&'static str, &'static CommandSpec>,
}

impl Default for CommandHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandHandler {
    pub fn new() -> Self {
        Self {
            registry: COMMANDS.iter().map(|spec| (spec.name, spec)).collect(),
        }
    }

    /// Executes one command and returns the reply to send.
    pub fn execute(&self, store: &mut Store, command: &Command) -> Reply {
        self.dispatch(store, command).unwrap_or_else(Reply::from)
    }

    fn dispatch(&self, store: &mut Store, command: &Command) -> Result<Reply, CommandError> {
        let name = String::from_utf8_lossy(command.name()).to_ascii_lowercase();
        let args = command.args();

        match name.as_str() {
            "ping" => match args {
                [] => Ok(Reply::pong()),
                [message] => Ok(Reply::Bulk(message.clone())),
                _ => Err(CommandError::WrongArity("ping")),
            },
            "echo" => match args {
                [message] => Ok(Reply::Bulk(message.clone())),
                _ => Err(CommandError::WrongArity("echo")),
            },
            _ => {
                let spec = self.lookup(&name).ok_or_else(|| {
                    CommandError::UnknownCommand(String::from_utf8_lossy(command.name()).into_owned())
                })?;
                if !spec.arity.accepts(args.len()) {
                    return Err(CommandError::WrongArity(spec.name));
                }
                (spec.run)(store, args)
            }
        }
    }

    /// Finds a registry entry by lowercase name.
    pub fn lookup(&self, name: &str) -> Option<&'static CommandSpec> {
        self.registry.get(name).copied()
    }

    /// Names of all registered store commands, sorted.
    pub fn command_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.registry.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ManualClock;
    use bytes::Bytes;
    use std::sync::Arc;

    struct Harness {
        handler: CommandHandler,
        store: Store,
        clock: Arc<ManualClock>,
    }

    impl Harness {
        fn new() -> Self {
            let clock = Arc::new(ManualClock::default());
            Self {
                handler: CommandHandler::new(),
                store: Store::new(clock.clone()),
                clock,
            }
        }

        fn run(&mut self, parts: &[&str]) -> Reply {
            let command = Command::from_parts(parts).unwrap();
            self.handler.execute(&mut self.store, &command)
        }
    }

    fn bulks(items: &[&'static str]) -> Reply {
        Reply::array(items.iter().map(|s| Reply::bulk(*s)).collect())
    }

    #[test]
    fn test_ping_and_echo() {
        let mut h = Harness::new();
        assert_eq!(h.run(&["PING"]), Reply::pong());
        assert_eq!(h.run(&["ping", "hi"]), Reply::bulk("hi"));
        assert_eq!(h.run(&["ECHO", "hello\nthere"]), Reply::bulk("hello\nthere"));
        assert_eq!(
            h.run(&["ECHO"]),
            Reply::error("ERR wrong number of arguments for 'echo' command")
        );
        assert!(h.store.is_empty());
    }

    #[test]
    fn test_names_are_case_insensitive() {
        let mut h = Harness::new();
        assert_eq!(h.run(&["sEt", "abc", "123"]), Reply::ok());
        assert_eq!(h.run(&["get", "abc"]), Reply::bulk("123"));
        assert_eq!(h.run(&["GET", "abc"]), Reply::bulk("123"));
    }

    #[test]
    fn test_unknown_command_leaves_store_alone() {
        let mut h = Harness::new();
        h.run(&["SET", "abc", "123"]);

        assert_eq!(h.run(&["FLUSHALL"]), Reply::error("ERR unknown command 'FLUSHALL'"));
        assert_eq!(h.run(&["GET", "abc"]), Reply::bulk("123"));
        assert_eq!(h.store.len(), 1);
    }

    #[test]
    fn test_set_get() {
        let mut h = Harness::new();
        assert_eq!(h.run(&["GET", "abc"]), Reply::Nil);
        assert_eq!(h.run(&["SET", "abc", "123"]), Reply::ok());
        assert_eq!(h.run(&["GET", "abc"]), Reply::bulk("123"));
    }

    #[test]
    fn test_set_nx() {
        let mut h = Harness::new();
        assert_eq!(h.run(&["SET", "abc", "123", "NX"]), Reply::ok());
        assert_eq!(h.run(&["SET", "abc", "456", "NX"]), Reply::Nil);
        assert_eq!(h.run(&["GET", "abc"]), Reply::bulk("123"));
    }

    #[test]
    fn test_set_xx() {
        let mut h = Harness::new();
        assert_eq!(h.run(&["SET", "abc", "123", "XX"]), Reply::Nil);
        assert_eq!(h.run(&["EXISTS", "abc"]), Reply::integer(0));

        h.run(&["SET", "abc", "123"]);
        assert_eq!(h.run(&["SET", "abc", "456", "xx"]), Reply::ok());
        assert_eq!(h.run(&["GET", "abc"]), Reply::bulk("456"));
    }

    #[test]
    fn test_set_argument_errors() {
        let mut h = Harness::new();
        assert_eq!(
            h.run(&["SET", "abc"]),
            Reply::error("ERR wrong number of arguments for 'set' command")
        );
        assert_eq!(h.run(&["SET", "abc", "1", "EX"]), Reply::error("ERR syntax error"));
        assert!(h.store.is_empty());
    }

    #[test]
    fn test_del_is_idempotent() {
        let mut h = Harness::new();
        h.run(&["SET", "abc", "123"]);
        h.run(&["PEXPIRE", "abc", "5000"]);

        assert_eq!(h.run(&["DEL", "abc"]), Reply::integer(1));
        assert_eq!(h.run(&["DEL", "abc"]), Reply::integer(0));
        assert_eq!(h.store.stats().volatile_keys, 0);
    }

    #[test]
    fn test_hash_commands() {
        let mut h = Harness::new();
        assert_eq!(h.run(&["HSET", "myhash", "abc", "123"]), Reply::ok());
        assert_eq!(h.run(&["HSET", "other", "def", "456"]), Reply::ok());
        assert_eq!(h.run(&["HSET", "myhash", "def", "456"]), Reply::ok());

        assert_eq!(h.run(&["HGET", "myhash", "abc"]), Reply::bulk("123"));
        assert_eq!(h.run(&["HGET", "myhash", "nope"]), Reply::Nil);
        assert_eq!(h.run(&["HGET", "nohash", "abc"]), Reply::Nil);
        assert_eq!(
            h.run(&["HMGET", "myhash", "abc", "missing", "def"]),
            Reply::array(vec![Reply::bulk("123"), Reply::Nil, Reply::bulk("456")])
        );
    }

    #[test]
    fn test_hmget_on_absent_hash() {
        let mut h = Harness::new();
        assert_eq!(h.run(&["HMGET", "myhash", "key"]), Reply::array(vec![Reply::Nil]));
    }

    #[test]
    fn test_hmget_on_scalar_is_type_error() {
        let mut h = Harness::new();
        h.run(&["SET", "myhash", "bogus"]);
        assert_eq!(h.run(&["HMGET", "myhash", "key"]), Reply::from(CommandError::WrongType));
    }

    #[test]
    fn test_hincrby() {
        let mut h = Harness::new();
        h.run(&["HSET", "myhash", "abc", "123"]);
        assert_eq!(h.run(&["HINCRBY", "myhash", "abc", "2"]), Reply::integer(125));
        assert_eq!(h.run(&["HINCRBY", "myhash", "new", "-5"]), Reply::integer(-5));
        assert_eq!(h.run(&["HGET", "myhash", "abc"]), Reply::bulk("125"));

        // missing hash is a no-op
        assert_eq!(h.run(&["HINCRBY", "nohash", "abc", "1"]), Reply::Nil);
        assert_eq!(h.run(&["EXISTS", "nohash"]), Reply::integer(0));

        assert_eq!(h.run(&["HINCRBY", "myhash", "abc", "x"]), Reply::from(CommandError::NotInteger));
        h.run(&["HSET", "myhash", "word", "hello"]);
        assert_eq!(h.run(&["HINCRBY", "myhash", "word", "1"]), Reply::from(CommandError::NotInteger));
    }

    #[test]
    fn test_type_mismatches() {
        let mut h = Harness::new();
        h.run(&["HSET", "h", "f", "v"]);
        h.run(&["SET", "s", "v"]);
        h.run(&["ZADD", "z", "1", "m"]);

        let wrongtype: Reply = CommandError::WrongType.into();
        assert_eq!(h.run(&["GET", "h"]), wrongtype);
        assert_eq!(h.run(&["HSET", "s", "f", "v"]), wrongtype);
        assert_eq!(h.run(&["HGET", "z", "f"]), wrongtype);
        assert_eq!(h.run(&["ZADD", "h", "1", "m"]), wrongtype);
        assert_eq!(h.run(&["ZRANGE", "s", "0", "1"]), wrongtype);
        assert_eq!(h.run(&["ZSCORE", "h", "m"]), wrongtype);
        assert_eq!(h.run(&["ZRANK", "s", "m"]), wrongtype);
        assert_eq!(h.run(&["HINCRBY", "z", "f", "1"]), wrongtype);
    }

    #[test]
    fn test_exists_and_keys() {
        let mut h = Harness::new();
        assert_eq!(h.run(&["EXISTS", "abc"]), Reply::integer(0));
        h.run(&["SET", "abc", "123"]);
        h.run(&["SET", "def", "456"]);
        assert_eq!(h.run(&["EXISTS", "abc"]), Reply::integer(1));
        assert_eq!(h.run(&["KEYS", "*"]), bulks(&["abc", "def"]));
    }

    #[test]
    fn test_keys_rejects_patterns() {
        let mut h = Harness::new();
        h.run(&["SET", "abc", "123"]);
        let reply = h.run(&["KEYS", "a*"]);
        assert_eq!(reply, Reply::from(CommandError::UnsupportedPattern("a*".into())));
        assert_eq!(
            reply.to_string(),
            "(error) ERR pattern 'a*' is not supported, only '*' is"
        );

        // the rejected request leaves the store usable
        assert_eq!(h.run(&["KEYS", "*"]), Reply::Array(vec![Reply::bulk("abc")]));
        assert_eq!(h.run(&["GET", "abc"]), Reply::bulk("123"));
    }

    #[test]
    fn test_passive_expiry_through_commands() {
        let mut h = Harness::new();
        h.run(&["SET", "abc", "123"]);
        assert_eq!(h.run(&["EXPIRE", "abc", "1"]), Reply::integer(1));

        h.clock.set(0.9);
        assert_eq!(h.run(&["GET", "abc"]), Reply::bulk("123"));
        assert_eq!(h.run(&["EXISTS", "abc"]), Reply::integer(1));

        h.clock.set(1.0);
        assert_eq!(h.run(&["GET", "abc"]), Reply::Nil);
        assert_eq!(h.run(&["EXISTS", "abc"]), Reply::integer(0));
    }

    #[test]
    fn test_passive_expiry_of_hashes() {
        let mut h = Harness::new();
        let reads: [&[&str]; 3] = [
            &["HGET", "k", "abc"],
            &["HMGET", "k", "abc"],
            &["HINCRBY", "k", "abc", "1"],
        ];
        for read in reads {
            h.clock.set(0.0);
            h.run(&["DEL", "k"]);
            h.run(&["HSET", "k", "abc", "123"]);
            h.run(&["PEXPIRE", "k", "1000"]);

            h.clock.set(0.9);
            h.run(read);
            assert_eq!(h.run(&["EXISTS", "k"]), Reply::integer(1), "{:?}", read);

            h.clock.set(1.0);
            h.run(read);
            assert_eq!(h.run(&["EXISTS", "k"]), Reply::integer(0), "{:?}", read);
        }
    }

    #[test]
    fn test_expire_on_missing_key() {
        let mut h = Harness::new();
        assert_eq!(h.run(&["EXPIRE", "abc", "10"]), Reply::integer(0));
        assert_eq!(h.run(&["PEXPIRE", "abc", "10"]), Reply::integer(0));
        assert_eq!(h.run(&["PEXPIRE", "abc", "soon"]), Reply::from(CommandError::NotInteger));
    }

    #[test]
    fn test_set_clears_ttl() {
        let mut h = Harness::new();
        h.run(&["SET", "abc", "123"]);
        h.run(&["PEXPIRE", "abc", "100"]);
        h.run(&["SET", "abc", "456"]);

        h.clock.set(60.0);
        assert_eq!(h.run(&["GET", "abc"]), Reply::bulk("456"));
    }

    #[test]
    fn test_sorted_set_queries() {
        let mut h = Harness::new();
        assert_eq!(h.run(&["ZADD", "leaderboard", "1000", "alice"]), Reply::integer(1));
        h.run(&["ZADD", "leaderboard", "3000", "bob"]);
        h.run(&["ZADD", "leaderboard", "2000", "charlie"]);

        assert_eq!(h.run(&["ZRANGE", "leaderboard", "0", "1"]), bulks(&["alice", "charlie"]));
        assert_eq!(h.run(&["ZRANK", "leaderboard", "charlie"]), Reply::integer(1));
        assert_eq!(h.run(&["ZSCORE", "leaderboard", "charlie"]), Reply::bulk("2000"));

        assert_eq!(h.run(&["ZRANK", "leaderboard", "dave"]), Reply::Nil);
        assert_eq!(h.run(&["ZSCORE", "leaderboard", "dave"]), Reply::Nil);
        assert_eq!(h.run(&["ZRANK", "nothing", "alice"]), Reply::Nil);
        assert_eq!(h.run(&["ZRANGE", "nothing", "0", "-1"]), Reply::array(vec![]));
    }

    #[test]
    fn test_sorted_set_ties_and_updates() {
        let mut h = Harness::new();
        h.run(&["ZADD", "leaderboard", "1000", "alice"]);
        h.run(&["ZADD", "leaderboard", "1000", "bob"]);
        h.run(&["ZADD", "leaderboard", "1000", "charlie"]);
        assert_eq!(h.run(&["ZRANGE", "leaderboard", "0", "1"]), bulks(&["alice", "bob"]));

        h.run(&["ZADD", "leaderboard", "0.5", "charlie"]);
        assert_eq!(h.run(&["ZRANK", "leaderboard", "charlie"]), Reply::integer(0));
        assert_eq!(h.run(&["ZSCORE", "leaderboard", "charlie"]), Reply::bulk("0.5"));
    }

    #[test]
    fn test_zadd_rejects_bad_score() {
        let mut h = Harness::new();
        assert_eq!(h.run(&["ZADD", "z", "lots", "alice"]), Reply::from(CommandError::NotFloat));
        assert_eq!(h.run(&["EXISTS", "z"]), Reply::integer(0));
    }

    #[test]
    fn test_registry_lookup() {
        let handler = CommandHandler::new();
        assert_eq!(handler.command_names().len(), 15);
        assert!(handler.lookup("zscore").is_some());
        assert!(handler.lookup("ping").is_none());
        assert!(handler.lookup("lookup").is_none());
    }

    #[test]
    fn test_binary_values_round_trip() {
        let mut h = Harness::new();
        let command = Command::new(
            "SET",
            vec![Bytes::from_static(b"bin"), Bytes::from_static(b"\x00\xff\r\n")],
        );
        h.handler.execute(&mut h.store, &command);
        assert_eq!(h.run(&["GET", "bin"]), Reply::bulk(&b"\x00\xff\r\n"[..]));
    }
}

//! Command Registry
//!
//! The full set of store commands, declared up front. Each entry pairs a
//! lowercase name with the number of arguments it takes (not counting the
//! name) and the function that runs it. Anything not listed here cannot be
//! reached from the wire.

use crate::commands::error::CommandError;
use crate::protocol::Reply;
use crate::storage::{Store, Value, ZSet};
use bytes::Bytes;
use std::collections::HashMap;

/// Signature shared by every store command. `args` excludes the command name.
pub type CommandFn = fn(&mut Store, &[Bytes]) -> Result<Reply, CommandError>;

/// Accepted argument counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    Range(usize, usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(self, n: usize) -> bool {
        match self {
            Arity::Exact(want) => n == want,
            Arity::Range(min, max) => (min..=max).contains(&n),
            Arity::AtLeast(min) => n >= min,
        }
    }
}

/// One registry entry.
#[derive(Clone, Copy)]
pub struct CommandSpec {
    pub name: &'static str,
    pub arity: Arity,
    pub run: CommandFn,
}

impl std::fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSpec")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

/// Every store command the server understands.
pub static COMMANDS: &[CommandSpec] = &[
    CommandSpec { name: "set", arity: Arity::Range(2, 3), run: set },
    CommandSpec { name: "get", arity: Arity::Exact(1), run: get },
    CommandSpec { name: "del", arity: Arity::Exact(1), run: del },
    CommandSpec { name: "hset", arity: Arity::Exact(3), run: hset },
    CommandSpec { name: "hget", arity: Arity::Exact(2), run: hget },
    CommandSpec { name: "hmget", arity: Arity::AtLeast(2), run: hmget },
    CommandSpec { name: "hincrby", arity: Arity::Exact(3), run: hincrby },
    CommandSpec { name: "exists", arity: Arity::Exact(1), run: exists },
    CommandSpec { name: "keys", arity: Arity::Exact(1), run: keys },
    CommandSpec { name: "expire", arity: Arity::Exact(2), run: expire },
    CommandSpec { name: "pexpire", arity: Arity::Exact(2), run: pexpire },
    CommandSpec { name: "zadd", arity: Arity::Exact(3), run: zadd },
    CommandSpec { name: "zrange", arity: Arity::Exact(3), run: zrange },
    CommandSpec { name: "zrank", arity: Arity::Exact(2), run: zrank },
    CommandSpec { name: "zscore", arity: Arity::Exact(2), run: zscore },
];

// ============================================================================
// Argument parsing
// ============================================================================

fn parse_int(arg: &[u8]) -> Result<i64, CommandError> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(CommandError::NotInteger)
}

fn parse_score(arg: &[u8]) -> Result<f64, CommandError> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|score| !score.is_nan())
        .ok_or(CommandError::NotFloat)
}

/// Renders a score the way clients expect: `2000`, `1.5`, `inf`.
fn format_score(score: f64) -> Bytes {
    Bytes::from(score.to_string())
}

// ============================================================================
// Scalar commands
// ============================================================================

/// SET key value [NX|XX]
fn set(store: &mut Store, args: &[Bytes]) -> Result<Reply, CommandError> {
    let (key, value) = (&args[0], &args[1]);

    let (nx, xx) = match args.get(2) {
        None => (false, false),
        Some(m) if m.eq_ignore_ascii_case(b"NX") => (true, false),
        Some(m) if m.eq_ignore_ascii_case(b"XX") => (false, true),
        Some(_) => return Err(CommandError::Syntax),
    };

    if nx || xx {
        let exists = store.contains(key);
        if (nx && exists) || (xx && !exists) {
            return Ok(Reply::Nil);
        }
    }

    store.set(key.clone(), Value::Scalar(value.clone()));
    Ok(Reply::ok())
}

/// GET key
fn get(store: &mut Store, args: &[Bytes]) -> Result<Reply, CommandError> {
    match store.get(&args[0]) {
        None => Ok(Reply::Nil),
        Some(Value::Scalar(value)) => Ok(Reply::Bulk(value.clone())),
        Some(_) => Err(CommandError::WrongType),
    }
}

/// DEL key
fn del(store: &mut Store, args: &[Bytes]) -> Result<Reply, CommandError> {
    store.expire_if_due(&args[0]);
    let removed = store.remove(&args[0]).is_some();
    Ok(Reply::Integer(removed as i64))
}

/// EXISTS key
fn exists(store: &mut Store, args: &[Bytes]) -> Result<Reply, CommandError> {
    Ok(Reply::Integer(store.contains(&args[0]) as i64))
}

/// KEYS *
fn keys(store: &mut Store, args: &[Bytes]) -> Result<Reply, CommandError> {
    if &args[0][..] != b"*" {
        return Err(CommandError::UnsupportedPattern(
            String::from_utf8_lossy(&args[0]).into_owned(),
        ));
    }
    Ok(Reply::Array(store.keys().into_iter().map(Reply::Bulk).collect()))
}

/// EXPIRE key seconds
fn expire(store: &mut Store, args: &[Bytes]) -> Result<Reply, CommandError> {
    let millis = parse_int(&args[1])?
        .checked_mul(1000)
        .ok_or(CommandError::NotInteger)?;
    Ok(Reply::Integer(store.expire_in_millis(&args[0], millis) as i64))
}

/// PEXPIRE key milliseconds
fn pexpire(store: &mut Store, args: &[Bytes]) -> Result<Reply, CommandError> {
    let millis = parse_int(&args[1])?;
    Ok(Reply::Integer(store.expire_in_millis(&args[0], millis) as i64))
}

// ============================================================================
// Hash commands
// ============================================================================

/// HSET hash field value
fn hset(store: &mut Store, args: &[Bytes]) -> Result<Reply, CommandError> {
    match store.get_or_insert_with(args[0].clone(), || Value::Hash(HashMap::new())) {
        Value::Hash(map) => {
            map.insert(args[1].clone(), args[2].clone());
            Ok(Reply::ok())
        }
        _ => Err(CommandError::WrongType),
    }
}

/// HGET hash field
fn hget(store: &mut Store, args: &[Bytes]) -> Result<Reply, CommandError> {
    match store.get(&args[0]) {
        None => Ok(Reply::Nil),
        Some(Value::Hash(map)) => Ok(Reply::from_option(map.get(&args[1]).cloned())),
        Some(_) => Err(CommandError::WrongType),
    }
}

/// HMGET hash field [field ...]
fn hmget(store: &mut Store, args: &[Bytes]) -> Result<Reply, CommandError> {
    let fields = &args[1..];
    match store.get(&args[0]) {
        None => Ok(Reply::Array(vec![Reply::Nil; fields.len()])),
        Some(Value::Hash(map)) => Ok(Reply::Array(
            fields
                .iter()
                .map(|field| Reply::from_option(map.get(field).cloned()))
                .collect(),
        )),
        Some(_) => Err(CommandError::WrongType),
    }
}

/// HINCRBY hash field amount
///
/// A missing field counts as 0. A missing hash is left alone and yields nil.
fn hincrby(store: &mut Store, args: &[Bytes]) -> Result<Reply, CommandError> {
    let amount = parse_int(&args[2])?;

    match store.get_mut(&args[0]) {
        None => Ok(Reply::Nil),
        Some(Value::Hash(map)) => {
            let current = match map.get(&args[1]) {
                Some(existing) => parse_int(existing)?,
                None => 0,
            };
            let updated = current
                .checked_add(amount)
                .ok_or(CommandError::Overflow)?;
            map.insert(args[1].clone(), Bytes::from(updated.to_string()));
            Ok(Reply::Integer(updated))
        }
        Some(_) => Err(CommandError::WrongType),
    }
}

// ============================================================================
// Sorted set commands
// ============================================================================

/// ZADD key score member
fn zadd(store: &mut Store, args: &[Bytes]) -> Result<Reply, CommandError> {
    let score = parse_score(&args[1])?;

    match store.get_or_insert_with(args[0].clone(), || Value::SortedSet(ZSet::new())) {
        Value::SortedSet(zset) => {
            zset.add(score, args[2].clone());
            Ok(Reply::Integer(1))
        }
        _ => Err(CommandError::WrongType),
    }
}

/// ZRANGE key start stop
fn zrange(store: &mut Store, args: &[Bytes]) -> Result<Reply, CommandError> {
    let start = parse_int(&args[1])?;
    let stop = parse_int(&args[2])?;

    match store.get(&args[0]) {
        None => Ok(Reply::Array(Vec::new())),
        Some(Value::SortedSet(zset)) => Ok(Reply::Array(
            zset.range(start, stop).into_iter().map(Reply::Bulk).collect(),
        )),
        Some(_) => Err(CommandError::WrongType),
    }
}

/// ZRANK key member
fn zrank(store: &mut Store, args: &[Bytes]) -> Result<Reply, CommandError> {
    match store.get(&args[0]) {
        None => Ok(Reply::Nil),
        Some(Value::SortedSet(zset)) => Ok(zset
            .rank(&args[1])
            .map(|rank| Reply::Integer(rank as i64))
            .unwrap_or(Reply::Nil)),
        Some(_) => Err(CommandError::WrongType),
    }
}

/// ZSCORE key member
fn zscore(store: &mut Store, args: &[Bytes]) -> Result<Reply, CommandError> {
    match store.get(&args[0]) {
        None => Ok(Reply::Nil),
        Some(Value::SortedSet(zset)) => {
            Ok(Reply::from_option(zset.score(&args[1]).map(format_score)))
        }
        Some(_) => Err(CommandError::WrongType),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_registry_names_are_unique_and_lowercase() {
        let mut seen = HashSet::new();
        for spec in COMMANDS {
            assert_eq!(spec.name, spec.name.to_ascii_lowercase());
            assert!(seen.insert(spec.name), "duplicate entry {}", spec.name);
        }
        assert_eq!(COMMANDS.len(), 15);
    }

    #[test]
    fn test_arity() {
        assert!(Arity::Exact(1).accepts(1));
        assert!(!Arity::Exact(1).accepts(2));
        assert!(Arity::Range(2, 3).accepts(2));
        assert!(Arity::Range(2, 3).accepts(3));
        assert!(!Arity::Range(2, 3).accepts(1));
        assert!(!Arity::Range(2, 3).accepts(4));
        assert!(Arity::AtLeast(2).accepts(10));
        assert!(!Arity::AtLeast(2).accepts(1));
    }

    #[test]
    fn test_parse_helpers() {
        assert_eq!(parse_int(b"-42"), Ok(-42));
        assert_eq!(parse_int(b"4x"), Err(CommandError::NotInteger));
        assert_eq!(parse_int(b""), Err(CommandError::NotInteger));

        assert_eq!(parse_score(b"1.5"), Ok(1.5));
        assert_eq!(parse_score(b"2000"), Ok(2000.0));
        assert_eq!(parse_score(b"nan"), Err(CommandError::NotFloat));
        assert_eq!(parse_score(b"abc"), Err(CommandError::NotFloat));
    }

    #[test]
    fn test_format_score() {
        assert_eq!(format_score(2000.0), Bytes::from("2000"));
        assert_eq!(format_score(1.5), Bytes::from("1.5"));
        assert_eq!(format_score(-0.25), Bytes::from("-0.25"));
    }
}

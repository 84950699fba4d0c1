//! Sorted Set
//!
//! Two coupled views of the same members:
//!
//! - `scores`: member → score, for O(1) score lookups
//! - `ordered`: `(score, member)` pairs sorted by score, ties broken by
//!   member bytes, for rank and range queries
//!
//! Every member in `scores` appears exactly once in `ordered` with the same
//! score. Positions are found by binary search.

use bytes::Bytes;
use std::cmp::Ordering;
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZSet {
    scores: HashMap<Bytes, f64>,
    ordered: Vec<(f64, Bytes)>,
}

/// Ordering of `(score, member)` pairs: score first, then member bytes.
fn compare(a: (f64, &[u8]), b: (f64, &[u8])) -> Ordering {
    a.0.total_cmp(&b.0).then_with(|| a.1.cmp(b.1))
}

impl ZSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    fn search(&self, score: f64, member: &[u8]) -> Result<usize, usize> {
        self.ordered
            .binary_search_by(|(s, m)| compare((*s, &m[..]), (score, member)))
    }

    /// Inserts `member` with `score`, or moves an existing member to its new score.
    ///
    /// Returns `true` if the member was not present before.
    pub fn add(&mut self, score: f64, member: Bytes) -> bool {
        let previous = self.scores.insert(member.clone(), score);

        if let Some(old) = previous {
            if let Ok(idx) = self.search(old, &member) {
                self.ordered.remove(idx);
            }
        }

        let idx = match self.search(score, &member) {
            Ok(idx) | Err(idx) => idx,
        };
        self.ordered.insert(idx, (score, member));

        previous.is_none()
    }

    /// Members at positions `start..=stop` in score order.
    ///
    /// Negative indexes count from the end (`-1` is the last member). Bounds
    /// past either end are clamped; an empty range yields an empty vector.
    pub fn range(&self, start: i64, stop: i64) -> Vec<Bytes> {
        let len = self.ordered.len() as i64;
        let start = if start < 0 { (len + start).max(0) } else { start };
        let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };

        if start > stop || start >= len {
            return Vec::new();
        }

        self.ordered[start as usize..=stop as usize]
            .iter()
            .map(|(_, member)| member.clone())
            .collect()
    }

    /// Zero-based position of `member` in score order.
    pub fn rank(&self, member: &[u8]) -> Option<usize> {
        let score = *self.scores.get(member)?;
        self.search(score, member).ok()
    }

    pub fn score(&self, member: &[u8]) -> Option<f64> {
        self.scores.get(member).copied()
    }

    /// Iterates `(score, member)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (f64, &Bytes)> {
        self.ordered.iter().map(|(score, member)| (*score, member))
    }
}

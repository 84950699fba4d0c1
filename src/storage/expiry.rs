//! Active Expiry
//!
//! Passive expiry (see [`Store::expire_if_due`]) only reclaims keys that
//! somebody reads. Keys that expire and are never touched again would stay
//! in memory forever, so the event loop also runs an [`ActiveExpiry`]
//! sweep once per timer tick.
//!
//! ## Algorithm
//!
//! 1. Draw a random sample of up to `sample_size` keys from the keys that
//!    carry an expiration.
//! 2. Run the passive check on each; count how many were actually expired.
//! 3. If more than `threshold` of the sample was expired, the keyspace is
//!    probably full of stale keys: go back to 1. Otherwise stop.
//!
//! Sampling picks random slots in the store's dense list of volatile keys,
//! so a round costs O(`sample_size`). The cost of a tick therefore tracks
//! the density of expired keys rather than the size of the keyspace.
//!
//! ## Timer
//!
//! The sweep itself runs on the event loop. [`spawn_ticker`] starts the
//! only other task in the server: it sleeps for the tick interval and sends
//! a unit signal down a channel. It never sees the store.

use crate::storage::engine::Store;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, trace};

/// Tuning for the active expiry sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpiryConfig {
    /// Keys sampled per round (default: 100)
    pub sample_size: usize,

    /// Keep sampling while the expired fraction of a round exceeds this (default: 0.25)
    pub threshold: f64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            sample_size: 100,
            threshold: 0.25,
        }
    }
}

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub rounds: usize,
    pub sampled: usize,
    pub expired: usize,
}

/// Randomised, bounded reclamation of expired keys.
#[derive(Debug)]
pub struct ActiveExpiry {
    config: ExpiryConfig,
    rng: StdRng,
}

impl ActiveExpiry {
    pub fn new(config: ExpiryConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Uses the given RNG for sampling, so sweeps can be replayed in tests.
    pub fn with_rng(config: ExpiryConfig, rng: StdRng) -> Self {
        Self { config, rng }
    }

    pub fn config(&self) -> &ExpiryConfig {
        &self.config
    }

    /// Runs sampling rounds until a round's expired fraction is at or below
    /// the threshold, or no volatile keys remain.
    pub fn run(&mut self, store: &mut Store) -> SweepReport {
        let mut report = SweepReport::default();
        if self.config.sample_size == 0 {
            return report;
        }

        loop {
            let sample = store.sample_volatile(&mut self.rng, self.config.sample_size);
            if sample.is_empty() {
                break;
            }

            let expired = sample
                .iter()
                .filter(|key| store.expire_if_due(key))
                .count();

            report.rounds += 1;
            report.sampled += sample.len();
            report.expired += expired;
            trace!(
                round = report.rounds,
                sampled = sample.len(),
                expired = expired,
                "Expiry sample"
            );

            if expired as f64 <= self.config.threshold * sample.len() as f64 {
                break;
            }
        }

        if report.expired > 0 {
            debug!(
                rounds = report.rounds,
                expired = report.expired,
                keys_remaining = store.len(),
                "Expired keys reclaimed"
            );
        }
        report
    }
}

/// Starts the timer task.
///
/// Every `period` it tries to queue a tick on `ticks`. If the previous tick
/// has not been consumed yet the new one is dropped, so a busy event loop
/// never builds a backlog. The task ends when `shutdown` flips to `true`
/// or the receiving side goes away.
pub fn spawn_ticker(
    period: Duration,
    ticks: mpsc::Sender<()>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval_at(time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        if *shutdown.borrow() {
            return;
        }

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        debug!("Ticker received shutdown signal");
                        return;
                    }
                    continue;
                }
            }

            if let Err(mpsc::error::TrySendError::Closed(())) = ticks.try_send(()) {
                debug!("Tick receiver closed, stopping ticker");
                return;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::clock::ManualClock;
    use bytes::Bytes;
    use crate::storage::engine::Value;
    use std::sync::Arc;

    fn seeded(config: ExpiryConfig) -> ActiveExpiry {
        ActiveExpiry::with_rng(config, StdRng::seed_from_u64(7))
    }

    fn populate(store: &mut Store, prefix: &str, n: usize, ttl_ms: Option<i64>) {
        for i in 0..n {
            let key = Bytes::from(format!("{}{}", prefix, i));
            store.set(key.clone(), Value::Scalar(Bytes::from("123")));
            if let Some(ttl) = ttl_ms {
                assert!(store.expire_in_millis(&key, ttl));
            }
        }
    }

    #[test]
    fn test_sweep_without_volatile_keys_is_noop() {
        let mut store = Store::new(Arc::new(ManualClock::default()));
        populate(&mut store, "keep", 10, None);

        let report = seeded(ExpiryConfig::default()).run(&mut store);
        assert_eq!(report, SweepReport::default());
        assert_eq!(store.len(), 10);
    }

    #[test]
    fn test_dense_expiry_is_reclaimed_in_one_sweep() {
        let clock = Arc::new(ManualClock::default());
        let mut store = Store::new(clock.clone());
        populate(&mut store, "keep", 50, None);
        populate(&mut store, "expire", 1000, Some(100));
        clock.advance(1.0);

        let report = seeded(ExpiryConfig::default()).run(&mut store);

        // every round is fully expired until the table is empty
        assert_eq!(report.expired, 1000);
        assert!(report.rounds >= 10);
        assert_eq!(store.len(), 50);
        assert_eq!(store.stats().volatile_keys, 0);
    }

    #[test]
    fn test_sparse_expiry_stops_after_one_round() {
        let clock = Arc::new(ManualClock::default());
        let mut store = Store::new(clock.clone());
        populate(&mut store, "later", 500, Some(60_000));
        populate(&mut store, "soon", 5, Some(10));
        clock.advance(1.0);

        let report = seeded(ExpiryConfig::default()).run(&mut store);
        assert_eq!(report.rounds, 1);
        assert_eq!(report.sampled, 100);
        assert!(report.expired <= 5);
    }

    #[test]
    fn test_repeated_sweeps_converge() {
        let clock = Arc::new(ManualClock::default());
        let mut store = Store::new(clock.clone());
        populate(&mut store, "later", 400, Some(60_000));
        populate(&mut store, "soon", 40, Some(10));
        clock.advance(1.0);

        let mut sweeper = seeded(ExpiryConfig {
            sample_size: 20,
            threshold: 0.25,
        });
        for _ in 0..500 {
            sweeper.run(&mut store);
        }

        assert_eq!(store.len(), 400);
        assert_eq!(store.stats().expired_keys, 40);
    }

    #[test]
    fn test_sparse_round_samples_only_sample_size() {
        let clock = Arc::new(ManualClock::default());
        let mut store = Store::new(clock.clone());
        populate(&mut store, "later", 200_000, Some(60_000));
        populate(&mut store, "soon", 3, Some(10));
        clock.advance(1.0);

        let report = seeded(ExpiryConfig::default()).run(&mut store);
        assert_eq!(report.rounds, 1);
        assert_eq!(report.sampled, 100);
        assert_eq!(store.stats().volatile_keys + report.expired, 200_003);
    }

    #[tokio::test]
    async fn test_ticker_sends_ticks_and_stops() {
        let (tick_tx, mut tick_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ticker = spawn_ticker(Duration::from_millis(10), tick_tx, shutdown_rx);

        for _ in 0..3 {
            let tick = time::timeout(Duration::from_secs(1), tick_rx.recv()).await;
            assert_eq!(tick.ok().flatten(), Some(()));
        }

        shutdown_tx.send_replace(true);
        tokio_test::assert_ok!(time::timeout(Duration::from_secs(1), ticker).await);
    }

    #[tokio::test]
    async fn test_ticker_stops_when_receiver_dropped() {
        let (tick_tx, tick_rx) = mpsc::channel(1);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let ticker = spawn_ticker(Duration::from_millis(5), tick_tx, shutdown_rx);
        drop(tick_rx);

        tokio_test::assert_ok!(time::timeout(Duration::from_secs(1), ticker).await);
    }
}

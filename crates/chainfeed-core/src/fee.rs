//! Epoch-based fee controller.
//!
//! The required fee starts at the configured initial fee and decays by
//! `fee_delta` every epoch in which no paid message arrived, never going
//! below `min_fee`. The controller never raises the fee.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::manager::FeedManager;

/// Fee parameters taken from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeePolicy {
    /// Floor for the required fee.
    pub min_fee: u64,
    /// Fee a fresh epoch starts at. Always `>= min_fee`.
    pub initial_fee: u64,
    /// Amount the fee drops after an idle epoch.
    pub fee_delta: u64,
    /// Target epoch length in seconds.
    pub target_epoch_secs: i64,
}

impl FeePolicy {
    pub fn new(min_fee: u64, fee_delta: u64, target_epoch_secs: i64) -> Self {
        Self {
            min_fee,
            initial_fee: min_fee,
            fee_delta,
            target_epoch_secs,
        }
    }

    /// Start fresh epochs at `fee` instead of `min_fee`. Values below the
    /// floor are clamped up to it.
    pub fn with_initial_fee(mut self, fee: u64) -> Self {
        self.initial_fee = fee.max(self.min_fee);
        self
    }

    /// Period between controller firings.
    pub fn epoch_duration(&self) -> Duration {
        Duration::from_secs(self.target_epoch_secs.max(1) as u64)
    }
}

/// Outcome of one recompute, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeUpdate {
    /// Fired before half an epoch elapsed; nothing changed.
    Debounced,
    /// Epoch rolled over with the fee unchanged.
    Held { fee: u64, messages: u64 },
    /// Epoch was idle and the fee dropped.
    Decreased { from: u64, to: u64 },
}

/// Mutable fee/epoch counters. Exactly one instance lives in the manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeState {
    pub epoch_start: i64,
    pub epoch_messages: u64,
    pub fee_amount: u64,
}

impl FeeState {
    /// A fresh epoch starting at `now`.
    pub fn new(now: i64, policy: &FeePolicy) -> Self {
        Self {
            epoch_start: now,
            epoch_messages: 0,
            fee_amount: policy.initial_fee.max(policy.min_fee),
        }
    }

    /// Count one accepted message against the current epoch.
    pub fn record_message(&mut self) {
        self.epoch_messages += 1;
    }

    /// Roll the epoch over at `now`.
    pub fn recompute(&mut self, now: i64, policy: &FeePolicy) -> FeeUpdate {
        if now - self.epoch_start < policy.target_epoch_secs / 2 {
            return FeeUpdate::Debounced;
        }

        let update = if self.fee_amount > policy.min_fee && self.epoch_messages == 0 {
            let from = self.fee_amount;
            self.fee_amount = from.saturating_sub(policy.fee_delta).max(policy.min_fee);
            FeeUpdate::Decreased {
                from,
                to: self.fee_amount,
            }
        } else {
            FeeUpdate::Held {
                fee: self.fee_amount,
                messages: self.epoch_messages,
            }
        };

        self.epoch_messages = 0;
        self.epoch_start = now;
        update
    }
}

// ─── FeeController task ──────────────────────────────────────────────────────

/// Periodic task that calls [`FeedManager::recompute_fee`] once per epoch.
pub struct FeeController {
    manager: Arc<FeedManager>,
    cancel: CancellationToken,
}

impl FeeController {
    pub fn new(manager: Arc<FeedManager>, cancel: CancellationToken) -> Self {
        Self { manager, cancel }
    }

    /// Run until the token is cancelled.
    pub async fn run(self) {
        let period = self.manager.fee_policy().epoch_duration();
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(period_secs = period.as_secs(), "fee controller started");
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.manager.recompute_fee().await;
                }
            }
        }
        tracing::info!("fee controller stopped");
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> FeePolicy {
        FeePolicy::new(500_000, 100_000, 300).with_initial_fee(1_000_000)
    }

    #[test]
    fn early_firing_is_debounced() {
        let p = policy();
        let mut state = FeeState::new(1_000, &p);
        assert_eq!(state.recompute(1_149, &p), FeeUpdate::Debounced);
        assert_eq!(state.fee_amount, 1_000_000);
        assert_eq!(state.epoch_start, 1_000);
    }

    #[test]
    fn idle_epoch_decreases_fee() {
        let p = policy();
        let mut state = FeeState::new(0, &p);
        assert_eq!(
            state.recompute(301, &p),
            FeeUpdate::Decreased {
                from: 1_000_000,
                to: 900_000
            }
        );
        assert_eq!(state.epoch_start, 301);
        assert_eq!(state.epoch_messages, 0);
    }

    #[test]
    fn busy_epoch_holds_fee_and_resets_counter() {
        let p = policy();
        let mut state = FeeState::new(0, &p);
        state.record_message();
        state.record_message();
        assert_eq!(
            state.recompute(300, &p),
            FeeUpdate::Held {
                fee: 1_000_000,
                messages: 2
            }
        );
        assert_eq!(state.epoch_messages, 0);
    }

    #[test]
    fn fee_never_drops_below_floor() {
        let p = FeePolicy::new(500_000, 300_000, 300).with_initial_fee(600_000);
        let mut state = FeeState::new(0, &p);
        state.recompute(300, &p);
        assert_eq!(state.fee_amount, 500_000);
        // At the floor nothing changes.
        assert_eq!(
            state.recompute(600, &p),
            FeeUpdate::Held {
                fee: 500_000,
                messages: 0
            }
        );
    }

    #[test]
    fn fee_is_never_raised() {
        let p = policy();
        let mut state = FeeState::new(0, &p);
        let mut last = state.fee_amount;
        for epoch in 1..20 {
            if epoch % 3 == 0 {
                state.record_message();
            }
            state.recompute(epoch * 300, &p);
            assert!(state.fee_amount <= last);
            assert!(state.fee_amount >= p.min_fee);
            last = state.fee_amount;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn controller_decays_fee_after_an_idle_epoch() {
        use crate::config::FeedConfig;
        use crate::store::MemoryFeedStore;
        use crate::testing::MockConnector;

        let connector = Arc::new(MockConnector::new());
        connector.add_node("http://node:9650", "subnet", "chain");
        let config = FeedConfig {
            rpc_url: "http://node:9650".into(),
            min_fee: 500_000,
            initial_fee: Some(1_000_000),
            ..Default::default()
        };
        let manager = Arc::new(
            FeedManager::new(config, connector, Arc::new(MemoryFeedStore::new()))
                .await
                .unwrap(),
        );

        let cancel = CancellationToken::new();
        let task = tokio::spawn(FeeController::new(Arc::clone(&manager), cancel.clone()).run());

        tokio::time::sleep(Duration::from_secs(299)).await;
        assert_eq!(manager.feed_info().await.fee, 1_000_000);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(manager.feed_info().await.fee, 900_000);
        assert_eq!(manager.fee_state().await.epoch_messages, 0);

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(manager.feed_info().await.fee, 800_000);

        cancel.cancel();
        task.await.unwrap();
    }

    #[test]
    fn initial_fee_is_clamped_to_floor() {
        let p = FeePolicy::new(1_000, 10, 60).with_initial_fee(1);
        assert_eq!(FeeState::new(0, &p).fee_amount, 1_000);
    }
}

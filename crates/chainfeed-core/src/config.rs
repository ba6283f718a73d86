//! Feed manager configuration.

use serde::{Deserialize, Serialize};

use crate::error::FeedError;
use crate::fee::FeePolicy;

/// Recipient used when none is configured.
pub const DEFAULT_RECIPIENT: &str =
    "nuklai1qpg4ecapjymddcde8sfq06dshzpxltqnl47tvfz0hnkesjz7t0p35d5fnr3";

/// Configuration for a [`FeedManager`](crate::manager::FeedManager) and its
/// background tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Upstream node RPC endpoint.
    pub rpc_url: String,
    /// Account that must be paid for a message to be accepted.
    pub recipient: String,
    /// Floor for the required fee.
    pub min_fee: u64,
    /// Fee drop per idle epoch.
    pub fee_delta: u64,
    /// Fee a fresh epoch starts at. `None` = `min_fee`.
    pub initial_fee: Option<u64>,
    /// Epoch length in seconds.
    pub target_epoch_secs: i64,
    /// Token required by the endpoint-swap admin call.
    pub admin_token: String,
    /// Upper bound on entries returned by one feed query.
    pub feed_size: usize,
    /// Sleep after a failed block read (milliseconds).
    pub read_backoff_ms: u64,
    /// Sleep after a failed (re)connect (milliseconds).
    pub reconnect_backoff_ms: u64,
    /// Pause between blocks (milliseconds).
    pub block_pause_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            rpc_url: String::new(),
            recipient: DEFAULT_RECIPIENT.into(),
            min_fee: 1_000_000,
            fee_delta: 100_000,
            initial_fee: None,
            target_epoch_secs: 300,
            admin_token: "ADMIN_TOKEN".into(),
            feed_size: 100,
            read_backoff_ms: 10_000,
            reconnect_backoff_ms: 10_000,
            block_pause_ms: 1_000,
        }
    }
}

impl FeedConfig {
    /// Fee parameters derived from this config.
    pub fn fee_policy(&self) -> FeePolicy {
        let policy = FeePolicy::new(self.min_fee, self.fee_delta, self.target_epoch_secs);
        match self.initial_fee {
            Some(fee) => policy.with_initial_fee(fee),
            None => policy,
        }
    }

    /// Check the values a running manager depends on.
    pub fn validate(&self) -> Result<(), FeedError> {
        if self.rpc_url.trim().is_empty() {
            return Err(FeedError::Config("rpc_url must be set".into()));
        }
        if !looks_like_bech32(&self.recipient) {
            return Err(FeedError::Config(format!(
                "recipient {:?} is not a bech32 address",
                self.recipient
            )));
        }
        if self.target_epoch_secs <= 0 {
            return Err(FeedError::Config("target_epoch_secs must be positive".into()));
        }
        if self.feed_size == 0 {
            return Err(FeedError::Config("feed_size must be positive".into()));
        }
        if let Some(initial) = self.initial_fee {
            if initial < self.min_fee {
                return Err(FeedError::Config(format!(
                    "initial_fee {initial} is below min_fee {}",
                    self.min_fee
                )));
            }
        }
        Ok(())
    }
}

/// Shallow bech32 shape check: `<hrp>1<data>`, lowercase alphanumerics,
/// data drawn from the bech32 charset.
pub fn looks_like_bech32(addr: &str) -> bool {
    const CHARSET: &str = "qpzry9x8gf2tvdw0s3jn54khce6mua7l";
    let Some(sep) = addr.rfind('1') else {
        return false;
    };
    let (hrp, data) = (&addr[..sep], &addr[sep + 1..]);
    !hrp.is_empty()
        && data.len() >= 6
        && hrp.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        && data.chars().all(|c| CHARSET.contains(c))
}

/// Canonical lowercase form of a bech32 string. Bech32 is case-insensitive
/// but may not mix cases; mixed-case input yields `None`.
pub fn canonical_bech32(addr: &str) -> Option<String> {
    let has_upper = addr.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = addr.chars().any(|c| c.is_ascii_lowercase());
    if has_upper && has_lower {
        return None;
    }
    Some(addr.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> FeedConfig {
        FeedConfig {
            rpc_url: "http://127.0.0.1:9650".into(),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_validate_once_rpc_is_set() {
        assert!(FeedConfig::default().validate().is_err());
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn default_recipient_is_bech32() {
        assert!(looks_like_bech32(DEFAULT_RECIPIENT));
        assert!(!looks_like_bech32("0xdeadbeef"));
        assert!(!looks_like_bech32("nuklai1"));
        assert!(!looks_like_bech32("Nuklai1qpg4ecapjy"));
    }

    #[test]
    fn canonical_form_rejects_mixed_case() {
        assert_eq!(canonical_bech32("NUKLAI1QPZ").as_deref(), Some("nuklai1qpz"));
        assert_eq!(canonical_bech32("nuklai1qpz").as_deref(), Some("nuklai1qpz"));
        assert_eq!(canonical_bech32("Nuklai1qpz"), None);
    }

    #[test]
    fn initial_fee_below_floor_is_rejected() {
        let cfg = FeedConfig {
            initial_fee: Some(10),
            ..valid()
        };
        assert!(matches!(cfg.validate(), Err(FeedError::Config(_))));
    }

    #[test]
    fn fee_policy_uses_initial_fee() {
        let cfg = FeedConfig {
            initial_fee: Some(2_000_000),
            ..valid()
        };
        let policy = cfg.fee_policy();
        assert_eq!(policy.initial_fee, 2_000_000);
        assert_eq!(policy.min_fee, 1_000_000);
        assert_eq!(valid().fee_policy().initial_fee, 1_000_000);
    }
}

//! Feed manager — shared state for the listener, the fee controller and
//! the query/admin API.
//!
//! Fee counters and the upstream connection live in one [`ManagerState`]
//! behind one lock. Critical sections never perform I/O: network identity
//! queries and store reads/writes happen outside the lock.

use std::sync::Arc;

use tokio::sync::{watch, RwLock};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::chain::{ChainClient, ChainConnector, Transaction, Transfer};
use crate::config::{canonical_bech32, FeedConfig};
use crate::error::FeedError;
use crate::fee::{FeePolicy, FeeState, FeeUpdate};
use crate::ingest::Ingestor;
use crate::store::FeedStore;
use crate::types::{FeedContent, FeedEntry, FeedInfo, NetworkIdentity};

/// Current upstream connection. Replaced wholesale on an endpoint swap.
#[derive(Clone)]
pub struct ConnectionState {
    pub endpoint: String,
    pub identity: NetworkIdentity,
    pub client: Arc<dyn ChainClient>,
    /// Incremented on every successful swap.
    pub generation: u64,
}

impl std::fmt::Debug for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionState")
            .field("endpoint", &self.endpoint)
            .field("identity", &self.identity)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

struct ManagerState {
    fee: FeeState,
    connection: ConnectionState,
}

/// Why a transfer to the recipient did not become a feed entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    InsufficientFee { paid: u64, required: u64 },
    MalformedMemo(String),
    EmptyMessage,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientFee { paid, required } => {
                write!(f, "paid {paid}, required {required}")
            }
            Self::MalformedMemo(reason) => write!(f, "memo could not be parsed: {reason}"),
            Self::EmptyMessage => write!(f, "memo message is empty"),
        }
    }
}

/// The feed manager.
pub struct FeedManager {
    config: FeedConfig,
    /// `config.recipient` in canonical form.
    recipient: String,
    policy: FeePolicy,
    connector: Arc<dyn ChainConnector>,
    ingestor: Ingestor,
    state: RwLock<ManagerState>,
    endpoint_tx: watch::Sender<u64>,
    clock: EpochClock,
}

/// Wall-clock seconds, advanced by the tokio clock from a fixed anchor so
/// epochs follow the runtime timer that fires them.
#[derive(Debug, Clone, Copy)]
struct EpochClock {
    unix_anchor: i64,
    anchor: Instant,
}

impl EpochClock {
    fn start() -> Self {
        Self {
            unix_anchor: chrono::Utc::now().timestamp(),
            anchor: Instant::now(),
        }
    }

    fn now(&self) -> i64 {
        self.unix_anchor + self.anchor.elapsed().as_secs() as i64
    }
}

impl FeedManager {
    /// Validate `config`, reach the configured node and start the first epoch.
    ///
    /// Failing to reach the node here is a startup error.
    pub async fn new(
        config: FeedConfig,
        connector: Arc<dyn ChainConnector>,
        store: Arc<dyn FeedStore>,
    ) -> Result<Self, FeedError> {
        config.validate()?;
        let policy = config.fee_policy();

        let client = connector.connect(&config.rpc_url)?;
        let identity = client.network_identity().await?;
        let clock = EpochClock::start();
        let fee = FeeState::new(clock.now(), &policy);

        info!(
            network_id = identity.network_id,
            subnet_id = %identity.subnet_id,
            chain_id = %identity.chain_id,
            address = %config.recipient,
            fee = fee.fee_amount,
            store = store.backend(),
            "feed initialized"
        );

        let connection = ConnectionState {
            endpoint: config.rpc_url.clone(),
            identity,
            client,
            generation: 0,
        };
        let (endpoint_tx, _) = watch::channel(0);

        Ok(Self {
            recipient: config.recipient.to_ascii_lowercase(),
            policy,
            connector,
            ingestor: Ingestor::new(store),
            state: RwLock::new(ManagerState { fee, connection }),
            endpoint_tx,
            clock,
            config,
        })
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    pub fn fee_policy(&self) -> FeePolicy {
        self.policy
    }

    pub fn ingestor(&self) -> &Ingestor {
        &self.ingestor
    }

    /// Snapshot of the current connection.
    pub async fn connection(&self) -> ConnectionState {
        self.state.read().await.connection.clone()
    }

    /// Snapshot of the fee counters.
    pub async fn fee_state(&self) -> FeeState {
        self.state.read().await.fee.clone()
    }

    /// Receiver that changes whenever `update_endpoint` swaps the connection.
    /// The value is the new connection generation.
    pub fn endpoint_changes(&self) -> watch::Receiver<u64> {
        self.endpoint_tx.subscribe()
    }

    /// Returns `true` if `transfer` pays the configured recipient.
    pub fn pays_recipient(&self, transfer: &Transfer) -> bool {
        match canonical_bech32(&transfer.to) {
            Some(to) => to == self.recipient,
            None => false,
        }
    }

    // ─── Query/Admin API ────────────────────────────────────────────────────

    /// Recipient address and the fee currently required.
    pub async fn feed_info(&self) -> FeedInfo {
        let state = self.state.read().await;
        FeedInfo {
            address: self.config.recipient.clone(),
            fee: state.fee.fee_amount,
        }
    }

    /// Up to `limit` most recent entries, newest first.
    ///
    /// `limit <= 0` yields an empty list. The limit is capped at the
    /// configured feed size.
    pub async fn feed(&self, limit: i64) -> Result<Vec<FeedEntry>, FeedError> {
        if limit <= 0 {
            return Ok(vec![]);
        }
        let limit = (limit as u64).min(self.config.feed_size as u64) as usize;
        let records = self.ingestor.store().get_range(limit).await?;
        records.into_iter().map(|r| r.into_entry()).collect()
    }

    /// Swap the upstream endpoint. Requires the admin token.
    ///
    /// The new node is queried for its identity before anything changes; if
    /// that fails the previous connection and fee state stay in place. On
    /// success the connection, identity and a fresh fee epoch are installed
    /// together and the listener is notified to resubscribe.
    pub async fn update_endpoint(
        &self,
        endpoint: &str,
        token: &str,
    ) -> Result<NetworkIdentity, FeedError> {
        if token != self.config.admin_token {
            warn!(endpoint, "rejected endpoint update with invalid admin token");
            return Err(FeedError::Unauthorized);
        }

        let old_endpoint = self.state.read().await.connection.endpoint.clone();
        info!(old = %old_endpoint, new = endpoint, "updating upstream RPC endpoint");

        let client = self.connector.connect(endpoint)?;
        let identity = client.network_identity().await.map_err(|e| {
            warn!(endpoint, error = %e, "failed to fetch network details");
            e
        })?;

        let generation = {
            let mut state = self.state.write().await;
            let generation = state.connection.generation + 1;
            state.connection = ConnectionState {
                endpoint: endpoint.to_string(),
                identity: identity.clone(),
                client,
                generation,
            };
            state.fee = FeeState::new(self.clock.now(), &self.policy);
            generation
        };
        self.endpoint_tx.send_replace(generation);

        info!(
            endpoint,
            network_id = identity.network_id,
            subnet_id = %identity.subnet_id,
            chain_id = %identity.chain_id,
            fee = self.policy.initial_fee,
            "RPC endpoint updated and fee epoch reset"
        );
        Ok(identity)
    }

    // ─── Fee controller ─────────────────────────────────────────────────────

    /// Roll the fee epoch over now.
    pub async fn recompute_fee(&self) -> FeeUpdate {
        self.recompute_fee_at(self.clock.now()).await
    }

    /// Roll the fee epoch over at an explicit timestamp.
    pub async fn recompute_fee_at(&self, now: i64) -> FeeUpdate {
        let update = self.state.write().await.fee.recompute(now, &self.policy);
        match update {
            FeeUpdate::Debounced => {}
            FeeUpdate::Decreased { from, to } => {
                info!(from, to, epoch_start = now, "decreasing message fee");
            }
            FeeUpdate::Held { fee, messages } => {
                info!(fee, messages, epoch_start = now, "fee epoch rolled over");
            }
        }
        update
    }

    // ─── Listener hooks ─────────────────────────────────────────────────────

    /// Validate a transfer to the recipient and turn it into a feed entry.
    ///
    /// On success the current epoch's message counter has already been
    /// incremented, whether or not the entry is later persisted.
    pub async fn accept_transfer(
        &self,
        tx: &Transaction,
        transfer: &Transfer,
        block_timestamp: i64,
    ) -> Result<FeedEntry, Rejection> {
        let mut state = self.state.write().await;

        if transfer.value < state.fee.fee_amount {
            return Err(Rejection::InsufficientFee {
                paid: transfer.value,
                required: state.fee.fee_amount,
            });
        }
        let content = FeedContent::decode_memo(&transfer.memo)
            .map_err(|e| Rejection::MalformedMemo(e.to_string()))?;
        if content.message.is_empty() {
            return Err(Rejection::EmptyMessage);
        }

        state.fee.record_message();
        let identity = &state.connection.identity;
        Ok(FeedEntry {
            subnet_id: identity.subnet_id.clone(),
            chain_id: identity.chain_id.clone(),
            address: tx.actor.clone(),
            id: tx.id.clone(),
            timestamp: block_timestamp,
            fee: transfer.value,
            content,
        })
    }

    /// Hand an accepted entry to the ingestion pipeline.
    pub async fn append(&self, entry: &FeedEntry) -> bool {
        self.ingestor.append(entry).await
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

//! Chain listener — follows the upstream block stream and feeds the
//! ingestion pipeline.
//!
//! # Loop
//! Each pass:
//!   - reconnects if the manager's connection generation moved on
//!   - fetches a parser from the chain client
//!   - waits for the next block, racing shutdown and endpoint changes
//!   - validates every transfer to the recipient and appends accepted
//!     entries
//!   - pauses briefly before asking for the next block
//!
//! Errors are classified by [`FeedError::severity`]. Recoverable ones are
//! logged and retried after a fixed backoff; fatal ones end the loop.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::chain::{Action, BlockSubscription, ChainClient, ConfirmedBlock};
use crate::error::{FeedError, Severity};
use crate::manager::FeedManager;

/// Per-block counters, mostly for logs and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockStats {
    /// Transfers to the recipient inside successful transactions.
    pub transfers: u32,
    pub accepted: u32,
    pub rejected: u32,
    /// Accepted entries the store confirmed.
    pub persisted: u32,
}

/// Outcome of one pass of the loop.
#[derive(Debug)]
enum Pass {
    Block(BlockStats),
    /// Shutdown or an endpoint change interrupted the wait.
    Interrupted,
}

/// An open subscription and the connection it was opened against.
struct Session {
    generation: u64,
    endpoint: String,
    client: Arc<dyn ChainClient>,
    subscription: Box<dyn BlockSubscription>,
}

/// Resolve `fut` unless `cancel` fires first.
async fn or_cancel<T>(cancel: &CancellationToken, fut: impl Future<Output = T>) -> Option<T> {
    tokio::select! {
        _ = cancel.cancelled() => None,
        value = fut => Some(value),
    }
}

/// Sleep for `duration` or until `cancel` fires.
async fn pause(cancel: &CancellationToken, duration: Duration) {
    or_cancel(cancel, tokio::time::sleep(duration)).await;
}

/// The long-running block consumer.
pub struct ChainListener {
    manager: Arc<FeedManager>,
    cancel: CancellationToken,
    endpoint_rx: watch::Receiver<u64>,
    session: Option<Session>,
    last_timestamp: Option<i64>,
    read_backoff: Duration,
    reconnect_backoff: Duration,
    block_pause: Duration,
}

impl ChainListener {
    pub fn new(manager: Arc<FeedManager>, cancel: CancellationToken) -> Self {
        let config = manager.config();
        Self {
            endpoint_rx: manager.endpoint_changes(),
            read_backoff: Duration::from_millis(config.read_backoff_ms),
            reconnect_backoff: Duration::from_millis(config.reconnect_backoff_ms),
            block_pause: Duration::from_millis(config.block_pause_ms),
            session: None,
            last_timestamp: None,
            manager,
            cancel,
        }
    }

    /// Run until the token is cancelled or a fatal error occurs.
    pub async fn run(mut self) -> Result<(), FeedError> {
        info!("chain listener started");

        while !self.cancel.is_cancelled() {
            match self.pass().await {
                Ok(Pass::Block(stats)) => {
                    if stats.transfers > 0 {
                        debug!(
                            transfers = stats.transfers,
                            accepted = stats.accepted,
                            rejected = stats.rejected,
                            persisted = stats.persisted,
                            "block processed"
                        );
                    }
                    pause(&self.cancel, self.block_pause).await;
                }
                Ok(Pass::Interrupted) => {}
                Err(e) => match e.severity() {
                    Severity::Recoverable => {
                        // A rejected subscription leaves nothing to read from.
                        let reconnect = e.is_connection()
                            || matches!(e, FeedError::Rpc(_))
                            || self.session.is_none();
                        let backoff = if reconnect {
                            self.close_session().await;
                            self.reconnect_backoff
                        } else {
                            self.read_backoff
                        };
                        warn!(
                            error = %e,
                            backoff_ms = backoff.as_millis() as u64,
                            "block stream unavailable, retrying"
                        );
                        pause(&self.cancel, backoff).await;
                    }
                    Severity::Fatal => {
                        error!(error = %e, "chain listener stopping on fatal error");
                        self.close_session().await;
                        return Err(e);
                    }
                },
            }
        }

        self.close_session().await;
        info!("chain listener stopped");
        Ok(())
    }

    async fn pass(&mut self) -> Result<Pass, FeedError> {
        if !self.ensure_connected().await? {
            return Ok(Pass::Interrupted);
        }
        let Some(session) = self.session.as_mut() else {
            return Ok(Pass::Interrupted);
        };

        let parser = match or_cancel(&self.cancel, session.client.parser()).await {
            Some(parser) => parser?,
            None => return Ok(Pass::Interrupted),
        };

        let confirmed = tokio::select! {
            _ = self.cancel.cancelled() => return Ok(Pass::Interrupted),
            Ok(()) = self.endpoint_rx.changed() => {
                info!(endpoint = %session.endpoint, "endpoint change signalled, dropping subscription");
                return Ok(Pass::Interrupted);
            }
            next = session.subscription.next_block(parser.as_ref()) => next?,
        };

        Ok(Pass::Block(self.process_block(&confirmed).await))
    }

    /// Open a subscription if there is none, or if the manager swapped the
    /// connection since ours was opened. Returns `false` if cancelled.
    async fn ensure_connected(&mut self) -> Result<bool, FeedError> {
        // Mark the current generation as seen before reading it so a swap
        // that lands after this point still wakes the next read.
        self.endpoint_rx.borrow_and_update();
        let connection = self.manager.connection().await;

        if let Some(session) = &self.session {
            if session.generation == connection.generation {
                return Ok(true);
            }
            info!(
                old = %session.endpoint,
                new = %connection.endpoint,
                "detected RPC endpoint change, reconnecting"
            );
        }
        self.close_session().await;

        let subscription = match or_cancel(&self.cancel, connection.client.subscribe_blocks()).await {
            Some(result) => result?,
            None => return Ok(false),
        };

        info!(endpoint = %connection.endpoint, "connected to RPC and registered for blocks");
        self.session = Some(Session {
            generation: connection.generation,
            endpoint: connection.endpoint,
            client: connection.client,
            subscription,
        });
        Ok(true)
    }

    async fn close_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.subscription.close().await;
        }
    }


    /// Validate and ingest every feed payment in `confirmed`.
    pub(crate) async fn process_block(&mut self, confirmed: &ConfirmedBlock) -> BlockStats {
        let block = &confirmed.block;
        if block.txs.len() != confirmed.results.len() {
            warn!(
                block = %block.id,
                txs = block.txs.len(),
                results = confirmed.results.len(),
                "block results do not line up with transactions"
            );
        }
        if let Some(last) = self.last_timestamp {
            if block.timestamp < last {
                warn!(block = %block.id, timestamp = block.timestamp, last, "block timestamp went backwards");
            }
        }
        self.last_timestamp = Some(block.timestamp);

        let mut stats = BlockStats::default();
        for tx in confirmed.successful_txs() {
            for action in &tx.actions {
                let Action::Transfer(transfer) = action else {
                    continue;
                };
                if !self.manager.pays_recipient(transfer) {
                    continue;
                }
                stats.transfers += 1;

                match self.manager.accept_transfer(tx, transfer, block.timestamp).await {
                    Ok(entry) => {
                        stats.accepted += 1;
                        if self.manager.append(&entry).await {
                            stats.persisted += 1;
                        }
                    }
                    Err(reason) => {
                        stats.rejected += 1;
                        info!(
                            from = %tx.actor,
                            tx_id = %tx.id,
                            payment = transfer.value,
                            memo = %String::from_utf8_lossy(&transfer.memo),
                            reason = %reason,
                            "incoming message rejected"
                        );
                    }
                }
            }
        }
        stats
    }
}

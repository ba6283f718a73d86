//! Background task bundle: the chain listener and the fee controller,
//! sharing one manager and one cancellation token.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::FeedError;
use crate::fee::FeeController;
use crate::listener::ChainListener;
use crate::manager::FeedManager;

/// Running background tasks for one [`FeedManager`].
pub struct FeedService {
    manager: Arc<FeedManager>,
    cancel: CancellationToken,
    listener: JoinHandle<Result<(), FeedError>>,
    fee: JoinHandle<()>,
}

impl FeedService {
    /// Spawn the listener and the fee controller.
    ///
    /// If the listener stops on a fatal error the shared token is cancelled,
    /// which also stops the fee controller and anything else watching it.
    pub fn start(manager: Arc<FeedManager>, cancel: CancellationToken) -> Self {
        let listener = ChainListener::new(Arc::clone(&manager), cancel.clone());
        let listener_cancel = cancel.clone();
        let listener = tokio::spawn(async move {
            let result = listener.run().await;
            if let Err(e) = &result {
                error!(error = %e, "listener failed, shutting down");
                listener_cancel.cancel();
            }
            result
        });

        let fee = tokio::spawn(FeeController::new(Arc::clone(&manager), cancel.clone()).run());

        info!("feed service started");
        Self {
            manager,
            cancel,
            listener,
            fee,
        }
    }

    pub fn manager(&self) -> &Arc<FeedManager> {
        &self.manager
    }

    /// Token that stops every task in this service.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel all tasks and wait for them. Returns the listener's error if
    /// it stopped on one.
    pub async fn shutdown(self) -> Result<(), FeedError> {
        self.cancel.cancel();
        if let Err(e) = self.fee.await {
            error!(error = %e, "fee controller task panicked");
        }
        let result = match self.listener.await {
            Ok(result) => result,
            Err(e) => Err(FeedError::Other(format!("listener task panicked: {e}"))),
        };
        info!("feed service stopped");
        result
    }
}

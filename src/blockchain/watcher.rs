//! Confirmation watcher.
//!
//! Polls receipts for processing transactions that carry an EVM hash and
//! reports the outcome back to the state machine. Also keeps the
//! broadcaster's readiness flag in line with RPC health.

use alloy::primitives::TxHash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};

use crate::amount::Amount;
use crate::blockchain::client::BlockchainClient;
use crate::blockchain::types::ConfirmationStatus;
use crate::transactions::TransactionService;

pub struct ConfirmationWatcher {
    client: BlockchainClient,
    transactions: Arc<TransactionService>,
    readiness: Arc<AtomicBool>,
    poll_interval: Duration,
}

impl ConfirmationWatcher {
    pub fn new(
        client: BlockchainClient,
        transactions: Arc<TransactionService>,
        readiness: Arc<AtomicBool>,
    ) -> Self {
        let poll_interval = Duration::from_millis(client.config().poll_interval_ms.max(100));
        Self {
            client,
            transactions,
            readiness,
            poll_interval,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(interval_ms = self.poll_interval.as_millis() as u64, "Confirmation watcher started");

        loop {
            tokio::select! {
                _ = ticker.tick() => self.poll().await,
                _ = shutdown.recv() => break,
            }
        }
        tracing::info!("Confirmation watcher stopped");
    }

    async fn poll(&self) {
        let healthy = self.client.is_healthy().await;
        if self.readiness.swap(healthy, Ordering::AcqRel) != healthy {
            tracing::warn!(healthy, "Blockchain RPC health changed");
        }
        if !healthy {
            return;
        }

        for (id, hash) in self.transactions.processing_hashes() {
            let Ok(tx_hash) = hash.parse::<TxHash>() else {
                tracing::debug!(transaction_id = %id, tx_hash = %hash, "Skipping non-EVM hash");
                continue;
            };
            let result = match self.client.confirmation_status(tx_hash).await {
                Ok(ConfirmationStatus::Confirmed { block_number, fee }) => {
                    tracing::info!(transaction_id = %id, block_number, "Transaction confirmed");
                    self.transactions.complete(id, Some(Amount(fee)), Some(&hash)).map(|_| ())
                }
                Ok(ConfirmationStatus::Failed(reason)) => {
                    self.transactions.mark_failed(id, &reason).map(|_| ())
                }
                Ok(ConfirmationStatus::Confirming { current, required }) => {
                    tracing::debug!(transaction_id = %id, current, required, "Waiting for confirmations");
                    Ok(())
                }
                Ok(ConfirmationStatus::Pending) => Ok(()),
                Err(e) => {
                    tracing::warn!(transaction_id = %id, error = %e, "Receipt lookup failed");
                    Ok(())
                }
            };
            if let Err(e) = result {
                tracing::warn!(transaction_id = %id, error = %e, "Could not apply confirmation");
            }
        }
    }
}

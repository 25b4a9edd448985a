//! Execution dispatcher.
//!
//! # Responsibilities
//! - Hand every transaction entering `processing` to the broadcaster
//! - Retry failed submissions with exponential backoff, then mark the transaction failed
//! - Periodically expire stale pending transactions and promote approved ones
//!   whose execution gate opened

use arc_swap::ArcSwap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, sleep, MissedTickBehavior};
use uuid::Uuid;

use crate::config::RuntimeSettings;
use crate::execution::broadcaster::Broadcaster;
use crate::observability::metrics;
use crate::resilience::backoff::calculate_backoff;
use crate::transactions::{TransactionService, TransactionStatus};

pub struct Dispatcher {
    transactions: Arc<TransactionService>,
    broadcaster: Arc<dyn Broadcaster>,
    settings: Arc<ArcSwap<RuntimeSettings>>,
    queue: mpsc::UnboundedReceiver<Uuid>,
}

impl Dispatcher {
    pub fn new(
        transactions: Arc<TransactionService>,
        broadcaster: Arc<dyn Broadcaster>,
        settings: Arc<ArcSwap<RuntimeSettings>>,
        queue: mpsc::UnboundedReceiver<Uuid>,
    ) -> Self {
        Self {
            transactions,
            broadcaster,
            settings,
            queue,
        }
    }

    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        let period = Duration::from_millis(self.settings.load().execution.dispatch_interval_ms.max(1));
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(interval_ms = period.as_millis() as u64, "Execution dispatcher started");

        loop {
            tokio::select! {
                next = self.queue.recv() => {
                    let Some(id) = next else { break };
                    tokio::spawn(execute(
                        self.transactions.clone(),
                        self.broadcaster.clone(),
                        self.settings.clone(),
                        id,
                    ));
                }
                _ = ticker.tick() => self.sweep(),
                _ = shutdown.recv() => break,
            }
        }
        tracing::info!("Execution dispatcher stopped");
    }

    fn sweep(&self) {
        let expired = self.transactions.expire_stale();
        if expired > 0 {
            tracing::info!(expired, "Expired stale pending transactions");
        }
        for id in self.transactions.awaiting_execution() {
            if let Err(e) = self.transactions.promote(id) {
                tracing::warn!(transaction_id = %id, error = %e, "Promotion failed");
            }
        }
    }
}

/// Submit one transaction, retrying with backoff.
pub async fn execute(
    transactions: Arc<TransactionService>,
    broadcaster: Arc<dyn Broadcaster>,
    settings: Arc<ArcSwap<RuntimeSettings>>,
    id: Uuid,
) {
    let execution = settings.load().execution.clone();
    let max_attempts = execution.max_attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=max_attempts {
        let tx = match transactions.get(id) {
            Ok(tx) if tx.status == TransactionStatus::Processing && tx.tx_hash.is_none() => tx,
            Ok(_) => return,
            Err(e) => {
                tracing::warn!(transaction_id = %id, error = %e, "Dispatched transaction vanished");
                return;
            }
        };

        match broadcaster.submit(&tx).await {
            Ok(Some(hash)) => {
                metrics::record_broadcast("broadcast");
                if let Err(e) = transactions.record_broadcast(id, &hash) {
                    tracing::warn!(transaction_id = %id, error = %e, "Could not record broadcast");
                }
                return;
            }
            Ok(None) => {
                metrics::record_broadcast("handed_off");
                tracing::debug!(transaction_id = %id, "Transaction handed to external signer");
                return;
            }
            Err(e) => {
                metrics::record_broadcast("error");
                tracing::warn!(transaction_id = %id, attempt, error = %e, "Broadcast attempt failed");
                last_error = e.to_string();
                if attempt < max_attempts {
                    sleep(calculate_backoff(attempt, execution.base_delay_ms, execution.max_delay_ms)).await;
                }
            }
        }
    }

    if let Err(e) = transactions.mark_failed(id, &last_error) {
        tracing::warn!(transaction_id = %id, error = %e, "Could not mark transaction failed");
    }
}

//! Broadcast collaborator seam.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::blockchain::BlockchainError;
use crate::clock::Clock;
use crate::engine::events::{EngineEvent, EventBus};
use crate::transactions::Transaction;

/// Hands a processing transaction to whatever signs and broadcasts it.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Cheap readiness probe used by the execution gate.
    fn is_ready(&self) -> bool;

    /// Submit for signing and broadcast. Returns the on-chain hash when the
    /// collaborator knows it synchronously; `None` means it will report back
    /// later through `record_broadcast` / `complete` / `fail`.
    async fn submit(&self, tx: &Transaction) -> Result<Option<String>, BlockchainError>;
}

/// Publishes `execution_requested` for an external signer.
pub struct ExternalBroadcaster {
    readiness: Arc<AtomicBool>,
    events: EventBus,
    clock: Arc<dyn Clock>,
}

impl ExternalBroadcaster {
    pub fn new(events: EventBus, clock: Arc<dyn Clock>) -> Self {
        Self {
            readiness: Arc::new(AtomicBool::new(true)),
            events,
            clock,
        }
    }

    /// Shared flag the confirmation watcher flips with RPC health.
    pub fn readiness(&self) -> Arc<AtomicBool> {
        self.readiness.clone()
    }
}

#[async_trait]
impl Broadcaster for ExternalBroadcaster {
    fn is_ready(&self) -> bool {
        self.readiness.load(Ordering::Acquire)
    }

    async fn submit(&self, tx: &Transaction) -> Result<Option<String>, BlockchainError> {
        if !self.is_ready() {
            return Err(BlockchainError::NotAvailable("broadcaster offline".to_string()));
        }
        self.events.publish(EngineEvent::ExecutionRequested {
            transaction_id: tx.id,
            wallet_id: tx.wallet_id,
            attempt: tx.attempt,
            at: self.clock.now(),
        });
        Ok(None)
    }
}

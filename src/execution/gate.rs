//! Execution readiness.

use std::sync::Arc;

use crate::execution::broadcaster::Broadcaster;
use crate::mpc::ThresholdOracle;
use crate::transactions::Transaction;

/// Decides whether a transaction that reached quorum may start processing.
///
/// Called under the transaction's lock; implementations must not block.
pub trait ExecutionGate: Send + Sync {
    fn ready(&self, tx: &Transaction) -> bool;
}

/// Broadcaster must be up and, for signed types, the wallet's MPC threshold reachable.
pub struct DefaultGate {
    broadcaster: Arc<dyn Broadcaster>,
    oracle: Arc<dyn ThresholdOracle>,
}

impl DefaultGate {
    pub fn new(broadcaster: Arc<dyn Broadcaster>, oracle: Arc<dyn ThresholdOracle>) -> Self {
        Self { broadcaster, oracle }
    }
}

impl ExecutionGate for DefaultGate {
    fn ready(&self, tx: &Transaction) -> bool {
        if !self.broadcaster.is_ready() {
            return false;
        }
        !tx.tx_type.requires_signing() || self.oracle.threshold_status(tx.wallet_id).available
    }
}

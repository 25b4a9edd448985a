//! Chain-specific types and error definitions.

use alloy::primitives::U256;
use thiserror::Error;

pub use crate::config::schema::BlockchainConfig;

/// Chain ID type for strong typing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainId(pub u64);

impl From<u64> for ChainId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Errors raised by the broadcast and confirmation collaborators.
///
/// These never reach an approving caller; they end up in the
/// transaction's `error_message`.
#[derive(Debug, Error)]
pub enum BlockchainError {
    /// RPC connection or request failed.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// Transaction was reverted on-chain.
    #[error("Transaction reverted: {0}")]
    Reverted(String),

    /// Chain configuration mismatch.
    #[error("Chain ID mismatch: expected {expected}, got {actual}")]
    ChainMismatch { expected: u64, actual: u64 },

    /// Broadcaster or client not ready.
    #[error("Blockchain not available: {0}")]
    NotAvailable(String),

    #[error("Invalid transaction hash '{0}'")]
    InvalidHash(String),
}

/// Result type for blockchain operations.
pub type BlockchainResult<T> = Result<T, BlockchainError>;

/// Transaction confirmation status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationStatus {
    /// Not mined yet.
    Pending,
    /// Mined but not enough confirmations.
    Confirming { current: u32, required: u32 },
    /// Confirmed with the required block depth; `fee` is gas used times effective gas price.
    Confirmed { block_number: u64, fee: U256 },
    /// Reverted or dropped.
    Failed(String),
}

/// Classify a mined receipt.
pub fn classify_receipt(
    success: bool,
    tx_block: u64,
    current_block: u64,
    required: u32,
    gas_used: u64,
    effective_gas_price: u128,
) -> ConfirmationStatus {
    if !success {
        return ConfirmationStatus::Failed("transaction reverted".to_string());
    }
    let confirmations = current_block.saturating_sub(tx_block).min(u32::MAX as u64) as u32;
    if confirmations >= required {
        ConfirmationStatus::Confirmed {
            block_number: tx_block,
            fee: U256::from(gas_used) * U256::from(effective_gas_price),
        }
    } else {
        ConfirmationStatus::Confirming {
            current: confirmations,
            required,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BlockchainConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.rpc_timeout_secs, 10);
        assert_eq!(config.confirmation_blocks, 3);
    }

    #[test]
    fn test_receipt_classification() {
        assert!(matches!(
            classify_receipt(false, 10, 20, 3, 21_000, 1),
            ConfirmationStatus::Failed(_)
        ));
        assert_eq!(
            classify_receipt(true, 10, 11, 3, 21_000, 1),
            ConfirmationStatus::Confirming { current: 1, required: 3 }
        );
        assert_eq!(
            classify_receipt(true, 10, 13, 3, 21_000, 2_000_000_000),
            ConfirmationStatus::Confirmed {
                block_number: 10,
                fee: U256::from(42_000_000_000_000u64),
            }
        );
    }

    #[test]
    fn test_error_display() {
        let err = BlockchainError::ChainMismatch { expected: 1, actual: 5 };
        assert_eq!(err.to_string(), "Chain ID mismatch: expected 1, got 5");
    }
}

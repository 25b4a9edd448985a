//! Blockchain integration.
//!
//! # Data Flow
//! ```text
//! dispatcher → Broadcaster (external signer) → record_broadcast(tx_hash)
//! ConfirmationWatcher → client.rs (receipt + block height) → complete | mark_failed
//! ```
//!
//! Every RPC call has a timeout and falls through to the next provider.
//! An unreachable chain only closes the execution gate.

pub mod client;
pub mod types;
pub mod watcher;

pub use client::BlockchainClient;
pub use types::{BlockchainConfig, BlockchainError, ChainId, ConfirmationStatus};
pub use watcher::ConfirmationWatcher;

//! Batch coordination.

pub mod coordinator;
pub mod types;

pub use coordinator::{BatchBook, BatchCoordinator, MemberStatusSource};
pub use types::{
    derive_batch_state, BatchActionReport, BatchCounts, BatchFilter, BatchStatus, MemberOutcome,
    NewBatch, TransactionBatch,
};

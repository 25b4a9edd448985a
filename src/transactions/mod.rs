//! Transaction lifecycle.
//!
//! ```text
//! submit ──► PolicyResolver::admit_all ──► pending
//! approve ─► ApprovalLedger ─► quorum? ──► approved | processing
//! dispatcher / watcher ──────────────────► completed | failed
//! ```

pub mod machine;
pub mod types;

pub use machine::{TransactionService, TransactionStats};
pub use types::{
    ApprovalOutcome, Transaction, TransactionFilter, TransactionRequest, TransactionStatus,
    TransactionType,
};

//! Approval ledger subsystem.
//!
//! Records one decision per (subject, approver) and exposes quorum state to
//! the transaction state machine and the cold storage workflow.

pub mod ledger;
pub mod types;

pub use ledger::ApprovalLedger;
pub use types::{
    ApprovalDecision, ApprovalSubject, Tally, TransactionApproval, Vote, VoteOutcome,
};

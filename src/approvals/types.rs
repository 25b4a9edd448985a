//! Approval ledger record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Entity a vote is cast on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ApprovalSubject {
    Transaction(Uuid),
    ColdStorage(Uuid),
}

impl ApprovalSubject {
    pub fn label(&self) -> &'static str {
        match self {
            ApprovalSubject::Transaction(_) => "transaction",
            ApprovalSubject::ColdStorage(_) => "cold_storage",
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            ApprovalSubject::Transaction(id) | ApprovalSubject::ColdStorage(id) => *id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approved,
    Rejected,
    Pending,
}

impl ApprovalDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalDecision::Approved => "approved",
            ApprovalDecision::Rejected => "rejected",
            ApprovalDecision::Pending => "pending",
        }
    }
}

/// One approver's latest vote on a subject within a round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionApproval {
    pub subject: ApprovalSubject,
    pub approver_id: String,
    pub round: u32,
    pub decision: ApprovalDecision,
    pub mfa_verified: bool,
    /// False for votes recorded after quorum gating closed (audit only).
    pub counted: bool,
    pub reason: Option<String>,
    pub decided_at: DateTime<Utc>,
    /// Bumped every time this approver's decision is replaced.
    pub revision: u32,
}

/// Vote submitted to the ledger.
#[derive(Debug, Clone)]
pub struct Vote {
    pub approver_id: String,
    pub decision: ApprovalDecision,
    pub mfa_verified: bool,
    pub reason: Option<String>,
}

impl Vote {
    pub fn approve(approver_id: &str, mfa_verified: bool) -> Self {
        Self {
            approver_id: approver_id.to_string(),
            decision: ApprovalDecision::Approved,
            mfa_verified,
            reason: None,
        }
    }

    pub fn reject(approver_id: &str, reason: &str) -> Self {
        Self {
            approver_id: approver_id.to_string(),
            decision: ApprovalDecision::Rejected,
            mfa_verified: false,
            reason: Some(reason.to_string()),
        }
    }
}

/// What the ledger did with a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VoteOutcome {
    /// First vote from this approver in the round.
    Recorded,
    /// Approver changed their decision (or upgraded MFA); the latest vote wins.
    Replaced { previous: ApprovalDecision },
    /// Identical repeat; no-op.
    Unchanged,
}

impl VoteOutcome {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, VoteOutcome::Unchanged)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VoteOutcome::Recorded => "recorded",
            VoteOutcome::Replaced { .. } => "replaced",
            VoteOutcome::Unchanged => "unchanged",
        }
    }
}

/// Decided vote counts for the current round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub approved: u32,
    /// Approved votes that count toward quorum under the MFA requirement.
    pub counted_approved: u32,
    pub rejected: u32,
    pub pending: u32,
}

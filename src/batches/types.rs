//! Batch types and status derivation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::transactions::{TransactionRequest, TransactionStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Processing,
    Completed,
    Partial,
    Failed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Pending => "pending",
            BatchStatus::Processing => "processing",
            BatchStatus::Completed => "completed",
            BatchStatus::Partial => "partial",
            BatchStatus::Failed => "failed",
        }
    }
}

/// Aggregate view of a batch, always derived from member states.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionBatch {
    pub id: Uuid,
    pub name: Option<String>,
    pub created_by: Option<String>,
    pub total_count: usize,
    pub approved_count: usize,
    pub completed_count: usize,
    pub failed_count: usize,
    pub status: BatchStatus,
    pub transaction_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchCounts {
    pub total: usize,
    pub approved: usize,
    pub completed: usize,
    pub failed: usize,
    pub status: BatchStatus,
}

/// Pure function of member statuses.
///
/// `failed` counts every unsuccessful terminal member (failed, rejected,
/// cancelled). An empty member list derives to `pending`.
pub fn derive_batch_state(members: &[TransactionStatus]) -> BatchCounts {
    let total = members.len();
    let approved = members.iter().filter(|s| s.passed_quorum()).count();
    let completed = members
        .iter()
        .filter(|s| **s == TransactionStatus::Completed)
        .count();
    let failed = members.iter().filter(|s| s.is_unsuccessful()).count();
    let pending = members
        .iter()
        .filter(|s| **s == TransactionStatus::Pending)
        .count();

    let status = if total == 0 || pending == total {
        BatchStatus::Pending
    } else if completed == total {
        BatchStatus::Completed
    } else if failed == total {
        BatchStatus::Failed
    } else if completed > 0 && failed > 0 && completed + failed == total {
        BatchStatus::Partial
    } else {
        BatchStatus::Processing
    };

    BatchCounts {
        total,
        approved,
        completed,
        failed,
        status,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
    pub transactions: Vec<TransactionRequest>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchFilter {
    pub status: Option<BatchStatus>,
    pub wallet_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Per-member result of a batch-wide action.
#[derive(Debug, Clone, Serialize)]
pub struct MemberOutcome {
    pub transaction_id: Uuid,
    pub status: Option<TransactionStatus>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchActionReport {
    pub batch: TransactionBatch,
    pub members: Vec<MemberOutcome>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use TransactionStatus::*;

    #[test]
    fn test_partial_after_mixed_terminal_outcomes() {
        let counts = derive_batch_state(&[Completed, Completed, Failed]);
        assert_eq!(counts.status, BatchStatus::Partial);
        assert_eq!(counts.completed, 2);
        assert_eq!(counts.failed, 1);
    }

    #[test]
    fn test_status_table() {
        assert_eq!(derive_batch_state(&[Pending, Pending]).status, BatchStatus::Pending);
        assert_eq!(derive_batch_state(&[Pending, Approved]).status, BatchStatus::Processing);
        assert_eq!(derive_batch_state(&[Completed, Processing]).status, BatchStatus::Processing);
        assert_eq!(derive_batch_state(&[Completed, Failed, Pending]).status, BatchStatus::Processing);
        assert_eq!(derive_batch_state(&[Rejected, Cancelled, Failed]).status, BatchStatus::Failed);
        assert_eq!(derive_batch_state(&[Completed, Completed]).status, BatchStatus::Completed);
        assert_eq!(derive_batch_state(&[Completed, Rejected]).status, BatchStatus::Partial);
    }

    fn any_status() -> impl Strategy<Value = TransactionStatus> {
        prop_oneof![
            Just(Pending),
            Just(Approved),
            Just(Processing),
            Just(Completed),
            Just(Rejected),
            Just(Cancelled),
            Just(Failed),
        ]
    }

    proptest! {
        #[test]
        fn prop_counts_bounded_and_idempotent(members in proptest::collection::vec(any_status(), 0..50)) {
            let first = derive_batch_state(&members);
            let second = derive_batch_state(&members);
            prop_assert_eq!(first, second);
            prop_assert!(first.completed + first.failed <= first.total);
            prop_assert!(first.approved <= first.total);
            if first.status == BatchStatus::Completed {
                prop_assert_eq!(first.completed, first.total);
            }
        }
    }
}

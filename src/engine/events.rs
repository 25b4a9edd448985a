//! Change notifications.
//!
//! Every committed state change is published after the entity lock is
//! released. Subscribers that fall behind the channel capacity skip the
//! lagged events and keep going; they are expected to re-read through the
//! list endpoints.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::approvals::{ApprovalDecision, ApprovalSubject, VoteOutcome};
use crate::batches::BatchStatus;
use crate::cold_storage::ColdStorageStatus;
use crate::pools::RelationshipStatus;
use crate::transactions::TransactionStatus;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    TransactionStatusChanged {
        transaction_id: Uuid,
        wallet_id: Uuid,
        batch_id: Option<Uuid>,
        from: Option<TransactionStatus>,
        to: TransactionStatus,
        at: DateTime<Utc>,
    },
    ApprovalRecorded {
        subject: ApprovalSubject,
        approver_id: String,
        decision: ApprovalDecision,
        outcome: VoteOutcome,
        at: DateTime<Utc>,
    },
    BatchStatusChanged {
        batch_id: Uuid,
        from: Option<BatchStatus>,
        to: BatchStatus,
        at: DateTime<Utc>,
    },
    ColdStorageStatusChanged {
        request_id: Uuid,
        wallet_id: Uuid,
        from: Option<ColdStorageStatus>,
        to: ColdStorageStatus,
        at: DateTime<Utc>,
    },
    RelationshipChanged {
        relationship_id: Uuid,
        parent_wallet_id: Uuid,
        child_wallet_id: Uuid,
        status: RelationshipStatus,
        at: DateTime<Utc>,
    },
    /// A processing transaction is waiting for the external signer.
    ExecutionRequested {
        transaction_id: Uuid,
        wallet_id: Uuid,
        attempt: u32,
        at: DateTime<Utc>,
    },
}

/// Fan-out of [`EngineEvent`]s to any number of subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish to current subscribers. Having none is not an error.
    pub fn publish(&self, event: EngineEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_reach_subscribers() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let id = Uuid::new_v4();

        bus.publish(EngineEvent::ExecutionRequested {
            transaction_id: id,
            wallet_id: Uuid::new_v4(),
            attempt: 1,
            at: Utc::now(),
        });

        match rx.recv().await.unwrap() {
            EngineEvent::ExecutionRequested { transaction_id, .. } => assert_eq!(transaction_id, id),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_event_json_is_tagged() {
        let event = EngineEvent::BatchStatusChanged {
            batch_id: Uuid::nil(),
            from: None,
            to: BatchStatus::Pending,
            at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "batch_status_changed");
        assert_eq!(json["to"], "pending");
    }

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        let bus = EventBus::new(1);
        bus.publish(EngineEvent::ExecutionRequested {
            transaction_id: Uuid::nil(),
            wallet_id: Uuid::nil(),
            attempt: 1,
            at: Utc::now(),
        });
        assert_eq!(bus.subscriber_count(), 0);
    }
}

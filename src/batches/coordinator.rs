//! Batch coordinator.
//!
//! # Responsibilities
//! - Admit a batch's members atomically through the transaction service
//! - Recompute aggregate counts and status whenever a member changes
//! - Fan batch-wide actions out to members, one member's error never stops the rest
//!
//! Batch state is never stored as counters; every read re-derives it from the
//! members' authoritative statuses. Only the last published status is kept so
//! that change events fire once per edge.

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::batches::types::{
    derive_batch_state, BatchActionReport, BatchFilter, BatchStatus, MemberOutcome, NewBatch,
    TransactionBatch,
};
use crate::clock::Clock;
use crate::config::RuntimeSettings;
use crate::engine::events::{EngineEvent, EventBus};
use crate::error::{EngineError, EngineResult};
use crate::observability::metrics;
use crate::pagination::{Page, PageRequest};
use crate::transactions::{Transaction, TransactionService, TransactionStatus};

/// Reads member statuses for aggregation.
pub trait MemberStatusSource {
    fn member_statuses(&self, ids: &[Uuid]) -> Vec<TransactionStatus>;
}

#[derive(Debug)]
struct BatchRecord {
    id: Uuid,
    name: Option<String>,
    created_by: Option<String>,
    member_ids: Vec<Uuid>,
    wallet_ids: BTreeSet<Uuid>,
    created_at: DateTime<Utc>,
    last_status: Option<BatchStatus>,
}

impl BatchRecord {
    fn summarize(&self, statuses: &[TransactionStatus]) -> TransactionBatch {
        let counts = derive_batch_state(statuses);
        TransactionBatch {
            id: self.id,
            name: self.name.clone(),
            created_by: self.created_by.clone(),
            total_count: self.member_ids.len(),
            approved_count: counts.approved,
            completed_count: counts.completed,
            failed_count: counts.failed,
            status: counts.status,
            transaction_ids: self.member_ids.clone(),
            created_at: self.created_at,
        }
    }
}

/// Batch membership records.
///
/// Lock order: batch -> transaction.
pub struct BatchBook {
    records: DashMap<Uuid, Arc<Mutex<BatchRecord>>>,
    events: EventBus,
    clock: Arc<dyn Clock>,
}

impl BatchBook {
    pub fn new(events: EventBus, clock: Arc<dyn Clock>) -> Self {
        Self {
            records: DashMap::new(),
            events,
            clock,
        }
    }

    fn insert(&self, record: BatchRecord) {
        self.records.insert(record.id, Arc::new(Mutex::new(record)));
    }

    /// Recompute a batch from its members; publishes on status change.
    ///
    /// Unknown batch ids are ignored: members are admitted before their
    /// batch record exists.
    pub fn refresh(&self, batch_id: Uuid, source: &dyn MemberStatusSource) -> Option<TransactionBatch> {
        let handle = self.records.get(&batch_id).map(|r| r.value().clone())?;
        let mut record = handle.lock().expect("batch mutex poisoned");
        let statuses = source.member_statuses(&record.member_ids);
        let batch = record.summarize(&statuses);

        if record.last_status != Some(batch.status) {
            let from = record.last_status;
            record.last_status = Some(batch.status);
            let from_label = from.map(|s| s.as_str()).unwrap_or("none");
            tracing::info!(
                batch_id = %batch_id,
                from = from_label,
                to = batch.status.as_str(),
                completed = batch.completed_count,
                failed = batch.failed_count,
                total = batch.total_count,
                "Batch status changed"
            );
            metrics::record_transition("batch", from_label, batch.status.as_str());
            self.events.publish(EngineEvent::BatchStatusChanged {
                batch_id,
                from,
                to: batch.status,
                at: self.clock.now(),
            });
        }
        Some(batch)
    }

    pub fn summarize(&self, batch_id: Uuid, source: &dyn MemberStatusSource) -> EngineResult<TransactionBatch> {
        let handle = self
            .records
            .get(&batch_id)
            .map(|r| r.value().clone())
            .ok_or_else(|| EngineError::not_found("batch", batch_id))?;
        let record = handle.lock().expect("batch mutex poisoned");
        let statuses = source.member_statuses(&record.member_ids);
        Ok(record.summarize(&statuses))
    }

    fn member_ids(&self, batch_id: Uuid) -> EngineResult<Vec<Uuid>> {
        let handle = self
            .records
            .get(&batch_id)
            .map(|r| r.value().clone())
            .ok_or_else(|| EngineError::not_found("batch", batch_id))?;
        let record = handle.lock().expect("batch mutex poisoned");
        Ok(record.member_ids.clone())
    }

    fn ids_matching(&self, filter: &BatchFilter) -> Vec<Uuid> {
        let handles: Vec<_> = self.records.iter().map(|r| r.value().clone()).collect();
        handles
            .iter()
            .filter_map(|handle| {
                let record = handle.lock().expect("batch mutex poisoned");
                let keep = filter.wallet_id.is_none_or(|w| record.wallet_ids.contains(&w))
                    && filter.from.is_none_or(|from| record.created_at >= from)
                    && filter.to.is_none_or(|to| record.created_at <= to);
                keep.then_some(record.id)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

pub struct BatchCoordinator {
    book: Arc<BatchBook>,
    transactions: Arc<TransactionService>,
    settings: Arc<ArcSwap<RuntimeSettings>>,
    clock: Arc<dyn Clock>,
}

impl BatchCoordinator {
    pub fn new(
        book: Arc<BatchBook>,
        transactions: Arc<TransactionService>,
        settings: Arc<ArcSwap<RuntimeSettings>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            book,
            transactions,
            settings,
            clock,
        }
    }

    /// Admit every member or none, then track them as one batch.
    pub fn create_batch(&self, request: NewBatch) -> EngineResult<TransactionBatch> {
        let max = self.settings.load().policy.max_batch_size;
        if request.transactions.is_empty() {
            return Err(EngineError::Validation("batch must contain at least one transaction".into()));
        }
        if request.transactions.len() > max {
            return Err(EngineError::Validation(format!(
                "batch of {} exceeds max_batch_size {}",
                request.transactions.len(),
                max
            )));
        }

        let batch_id = Uuid::new_v4();
        let members = self
            .transactions
            .submit_many(request.transactions, Some(batch_id))?;

        self.book.insert(BatchRecord {
            id: batch_id,
            name: request.name,
            created_by: request.created_by,
            member_ids: members.iter().map(|tx| tx.id).collect(),
            wallet_ids: members.iter().map(|tx| tx.wallet_id).collect(),
            created_at: self.clock.now(),
            last_status: None,
        });
        tracing::info!(batch_id = %batch_id, members = members.len(), "Batch created");

        self.book
            .refresh(batch_id, self.transactions.as_ref())
            .ok_or_else(|| EngineError::not_found("batch", batch_id))
    }

    pub fn get(&self, batch_id: Uuid) -> EngineResult<TransactionBatch> {
        self.book.summarize(batch_id, self.transactions.as_ref())
    }

    pub fn members(&self, batch_id: Uuid) -> EngineResult<Vec<Transaction>> {
        self.book
            .member_ids(batch_id)?
            .into_iter()
            .map(|id| self.transactions.get(id))
            .collect()
    }

    /// Filtered listing, newest first.
    pub fn list(&self, filter: &BatchFilter, page: PageRequest) -> Page<TransactionBatch> {
        let mut items: Vec<_> = self
            .book
            .ids_matching(filter)
            .into_iter()
            .filter_map(|id| self.get(id).ok())
            .filter(|batch| filter.status.is_none_or(|s| batch.status == s))
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Page::from_vec(items, page)
    }

    pub fn len(&self) -> usize {
        self.book.len()
    }

    pub fn is_empty(&self) -> bool {
        self.book.is_empty()
    }

    /// Approve every member on behalf of one approver.
    pub fn approve_batch(&self, batch_id: Uuid, approver_id: &str, mfa_verified: bool) -> EngineResult<BatchActionReport> {
        self.for_each_member(batch_id, |id| {
            self.transactions
                .approve(id, approver_id, mfa_verified)
                .map(|outcome| outcome.transaction)
        })
    }

    /// Cancel every member still cancellable.
    pub fn cancel_batch(&self, batch_id: Uuid, reason: Option<&str>) -> EngineResult<BatchActionReport> {
        self.for_each_member(batch_id, |id| self.transactions.cancel(id, reason))
    }

    fn for_each_member(
        &self,
        batch_id: Uuid,
        action: impl Fn(Uuid) -> EngineResult<Transaction>,
    ) -> EngineResult<BatchActionReport> {
        let members = self
            .book
            .member_ids(batch_id)?
            .into_iter()
            .map(|id| match action(id) {
                Ok(tx) => MemberOutcome {
                    transaction_id: id,
                    status: Some(tx.status),
                    error: None,
                },
                Err(err) => MemberOutcome {
                    transaction_id: id,
                    status: self.transactions.get(id).ok().map(|tx| tx.status),
                    error: Some(err.to_string()),
                },
            })
            .collect();
        Ok(BatchActionReport {
            batch: self.get(batch_id)?,
            members,
        })
    }
}

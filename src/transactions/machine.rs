//! Transaction state machine.
//!
//! # Responsibilities
//! - Admit transactions against the resolved policy (atomic per submission or batch)
//! - Serialize votes and quorum evaluation per transaction
//! - Apply execution outcomes reported by the broadcast collaborator
//!
//! # Concurrency
//! Each transaction sits behind its own mutex. A vote, the quorum check and
//! the resulting transition happen under that lock, so exactly one caller
//! observes the quorum edge. Events, batch refreshes and execution hand-off
//! run after the lock is released.
//!
//! Lock order: transaction -> daily usage. Batch locks are never taken while
//! a transaction lock is held.

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::amount::Amount;
use crate::approvals::{ApprovalLedger, ApprovalSubject, TransactionApproval, Vote, VoteOutcome};
use crate::batches::{BatchBook, MemberStatusSource};
use crate::clock::Clock;
use crate::config::RuntimeSettings;
use crate::engine::events::{EngineEvent, EventBus};
use crate::error::{EngineError, EngineResult, PolicyRule};
use crate::execution::ExecutionGate;
use crate::observability::metrics;
use crate::pagination::{Page, PageRequest};
use crate::policy::{Admission, PolicyResolver};
use crate::transactions::types::{
    ApprovalOutcome, Transaction, TransactionFilter, TransactionRequest, TransactionStatus,
};

const ENTITY: &str = "transaction";

/// Committed change, applied to the outside world after unlocking.
struct Change {
    snapshot: Transaction,
    from: Option<TransactionStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionStats {
    pub total: usize,
    pub by_status: BTreeMap<&'static str, usize>,
}

pub struct TransactionService {
    transactions: DashMap<Uuid, Arc<Mutex<Transaction>>>,
    ledger: Arc<ApprovalLedger>,
    policies: Arc<PolicyResolver>,
    batches: Arc<BatchBook>,
    gate: Arc<dyn ExecutionGate>,
    queue: mpsc::UnboundedSender<Uuid>,
    events: EventBus,
    settings: Arc<ArcSwap<RuntimeSettings>>,
    clock: Arc<dyn Clock>,
}

impl TransactionService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ledger: Arc<ApprovalLedger>,
        policies: Arc<PolicyResolver>,
        batches: Arc<BatchBook>,
        gate: Arc<dyn ExecutionGate>,
        queue: mpsc::UnboundedSender<Uuid>,
        events: EventBus,
        settings: Arc<ArcSwap<RuntimeSettings>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            transactions: DashMap::new(),
            ledger,
            policies,
            batches,
            gate,
            queue,
            events,
            settings,
            clock,
        }
    }

    pub fn submit(&self, request: TransactionRequest) -> EngineResult<Transaction> {
        self.admit(vec![request], None, false)?
            .pop()
            .ok_or_else(|| EngineError::Validation("no transaction admitted".into()))
    }

    /// Pool-internal transfer; the destination whitelist does not apply.
    pub fn submit_internal(&self, request: TransactionRequest) -> EngineResult<Transaction> {
        self.admit(vec![request], None, true)?
            .pop()
            .ok_or_else(|| EngineError::Validation("no transaction admitted".into()))
    }

    /// Admit every request or none of them.
    pub fn submit_many(
        &self,
        requests: Vec<TransactionRequest>,
        batch_id: Option<Uuid>,
    ) -> EngineResult<Vec<Transaction>> {
        self.admit(requests, batch_id, false)
    }

    fn admit(
        &self,
        requests: Vec<TransactionRequest>,
        batch_id: Option<Uuid>,
        internal: bool,
    ) -> EngineResult<Vec<Transaction>> {
        let now = self.clock.now();
        let many = requests.len() > 1;
        for (index, request) in requests.iter().enumerate() {
            request.validate(now).map_err(|err| match err {
                EngineError::Validation(msg) if many => {
                    EngineError::Validation(format!("member {}: {}", index, msg))
                }
                other => other,
            })?;
        }

        let admissions: Vec<Admission> = requests
            .iter()
            .map(|r| Admission {
                transaction_id: Uuid::new_v4(),
                wallet_id: r.wallet_id,
                amount: r.amount,
                currency: r.currency.clone(),
                to_address: r.to_address.clone(),
                outbound: r.tx_type.is_outbound(),
                internal,
            })
            .collect();
        let grants = self.policies.admit_all(&admissions)?;

        let mut changes = Vec::with_capacity(requests.len());
        for ((request, admission), grant) in requests.into_iter().zip(&admissions).zip(grants) {
            let requires = self
                .policies
                .required_approvals(grant.min_approvers, request.risk_score);
            let mut tx = Transaction {
                id: admission.transaction_id,
                wallet_id: request.wallet_id,
                batch_id,
                tx_type: request.tx_type,
                amount: request.amount,
                currency: request.currency.to_ascii_uppercase(),
                to_address: request.to_address,
                estimated_fee: request.estimated_fee,
                actual_fee: None,
                risk_score: request.risk_score,
                requires_approvals: requires,
                current_approvals: 0,
                requires_mfa: grant.require_mfa,
                status: TransactionStatus::Pending,
                attempt: 1,
                initiated_by: request.initiated_by,
                memo: request.memo,
                tx_hash: None,
                error_message: None,
                rejection_reason: None,
                cancellation_reason: None,
                expires_at: request.expires_at,
                created_at: now,
                updated_at: now,
                internal,
            };
            if requires == 0 {
                tx.status = self.post_quorum_status(&tx);
            }

            tracing::info!(
                transaction_id = %tx.id,
                wallet_id = %tx.wallet_id,
                tx_type = ?tx.tx_type,
                amount = %tx.amount,
                currency = %tx.currency,
                requires_approvals = requires,
                risk_score = tx.risk_score,
                "Transaction admitted"
            );
            self.transactions
                .insert(tx.id, Arc::new(Mutex::new(tx.clone())));
            changes.push(Change { snapshot: tx, from: None });
        }

        let admitted = changes.iter().map(|c| c.snapshot.clone()).collect();
        for change in changes {
            self.after_change(change);
        }
        Ok(admitted)
    }

    /// Cast an approving vote and advance on quorum.
    pub fn approve(&self, id: Uuid, approver_id: &str, mfa_verified: bool) -> EngineResult<ApprovalOutcome> {
        if approver_id.trim().is_empty() {
            return Err(EngineError::Validation("approver_id must not be empty".into()));
        }
        let handle = self.handle(id)?;
        let subject = ApprovalSubject::Transaction(id);
        let now = self.clock.now();

        let (result, change) = {
            let mut tx = handle.lock().expect("transaction mutex poisoned");
            match tx.status {
                TransactionStatus::Rejected | TransactionStatus::Cancelled | TransactionStatus::Failed => {
                    return Err(invalid(&tx, "approve"));
                }
                TransactionStatus::Approved | TransactionStatus::Processing | TransactionStatus::Completed => {
                    // past quorum gating: audit only
                    let vote = self.ledger.cast_vote(subject, Vote::approve(approver_id, mfa_verified), false);
                    let outcome = ApprovalOutcome {
                        transaction: tx.clone(),
                        vote,
                        duplicate: vote.is_duplicate(),
                        quorum_reached: false,
                        remaining_approvals: 0,
                    };
                    (Ok(outcome), None)
                }
                TransactionStatus::Pending => {
                    if tx.expires_at.is_some_and(|at| now >= at) {
                        let from = self.transition(&mut tx, TransactionStatus::Cancelled, now);
                        tx.cancellation_reason = Some("expired".to_string());
                        self.policies.release(tx.wallet_id, tx.id);
                        let change = Change { snapshot: tx.clone(), from: Some(from) };
                        (Err(EngineError::TransactionExpired { id }), Some(change))
                    } else {
                        if !self.settings.load().policy.allow_self_approval
                            && tx.initiated_by.as_deref() == Some(approver_id)
                        {
                            metrics::record_policy_violation(PolicyRule::SelfApproval.as_str());
                            tracing::warn!(transaction_id = %id, approver_id, "Self-approval refused");
                            return Err(EngineError::policy(
                                PolicyRule::SelfApproval,
                                "initiator cannot approve their own transaction",
                            ));
                        }

                        let vote = self.ledger.cast_vote(subject, Vote::approve(approver_id, mfa_verified), true);
                        let counted = self.ledger.counted_approvals(subject, tx.requires_mfa);
                        tx.current_approvals = counted.min(tx.requires_approvals);
                        tx.updated_at = now;

                        let mut quorum_reached = false;
                        let mut change = None;
                        if counted >= tx.requires_approvals {
                            let next = self.post_quorum_status(&tx);
                            let from = self.transition(&mut tx, next, now);
                            quorum_reached = true;
                            change = Some(Change { snapshot: tx.clone(), from: Some(from) });
                        }
                        let outcome = ApprovalOutcome {
                            transaction: tx.clone(),
                            vote,
                            duplicate: vote.is_duplicate(),
                            quorum_reached,
                            remaining_approvals: tx.remaining_approvals(),
                        };
                        (Ok(outcome), change)
                    }
                }
            }
        };

        if let Ok(outcome) = &result {
            self.publish_vote(subject, approver_id, crate::approvals::ApprovalDecision::Approved, outcome.vote, now);
        }
        if let Some(change) = change {
            self.after_change(change);
        }
        result
    }

    /// Single veto: any decided rejection is final.
    pub fn reject(&self, id: Uuid, approver_id: &str, reason: &str) -> EngineResult<Transaction> {
        if reason.trim().is_empty() {
            return Err(EngineError::Validation("rejection reason is required".into()));
        }
        if approver_id.trim().is_empty() {
            return Err(EngineError::Validation("approver_id must not be empty".into()));
        }
        let handle = self.handle(id)?;
        let subject = ApprovalSubject::Transaction(id);
        let now = self.clock.now();

        let (snapshot, vote, change) = {
            let mut tx = handle.lock().expect("transaction mutex poisoned");
            match tx.status {
                TransactionStatus::Rejected => return Ok(tx.clone()),
                TransactionStatus::Pending | TransactionStatus::Approved => {
                    let vote = self.ledger.cast_vote(subject, Vote::reject(approver_id, reason), true);
                    let from = self.transition(&mut tx, TransactionStatus::Rejected, now);
                    tx.rejection_reason = Some(reason.to_string());
                    tx.current_approvals = self
                        .ledger
                        .counted_approvals(subject, tx.requires_mfa)
                        .min(tx.requires_approvals);
                    self.policies.release(tx.wallet_id, tx.id);
                    let change = Change { snapshot: tx.clone(), from: Some(from) };
                    (tx.clone(), vote, change)
                }
                _ => return Err(invalid(&tx, "reject")),
            }
        };

        self.publish_vote(subject, approver_id, crate::approvals::ApprovalDecision::Rejected, vote, now);
        self.after_change(change);
        Ok(snapshot)
    }

    pub fn cancel(&self, id: Uuid, reason: Option<&str>) -> EngineResult<Transaction> {
        let handle = self.handle(id)?;
        let now = self.clock.now();
        let change = {
            let mut tx = handle.lock().expect("transaction mutex poisoned");
            match tx.status {
                TransactionStatus::Cancelled => return Ok(tx.clone()),
                TransactionStatus::Pending | TransactionStatus::Approved => {
                    let from = self.transition(&mut tx, TransactionStatus::Cancelled, now);
                    tx.cancellation_reason = reason.map(str::to_string);
                    self.policies.release(tx.wallet_id, tx.id);
                    Change { snapshot: tx.clone(), from: Some(from) }
                }
                _ => return Err(invalid(&tx, "cancel")),
            }
        };
        let snapshot = change.snapshot.clone();
        self.after_change(change);
        Ok(snapshot)
    }

    /// Start a fresh approval round for a failed transaction. Repeating the
    /// call before the new round has any votes returns the transaction unchanged.
    pub fn retry(&self, id: Uuid) -> EngineResult<Transaction> {
        let handle = self.handle(id)?;
        let subject = ApprovalSubject::Transaction(id);
        let now = self.clock.now();
        let change = {
            let mut tx = handle.lock().expect("transaction mutex poisoned");
            if tx.status == TransactionStatus::Pending && tx.attempt > 1 {
                // a repeated retry before anyone has voted on the new round is a no-op
                let tally = self.ledger.tally(subject, false);
                if tally.approved + tally.rejected + tally.pending == 0 {
                    return Ok(tx.clone());
                }
            }
            if tx.status != TransactionStatus::Failed {
                return Err(invalid(&tx, "retry"));
            }
            let admission = Admission {
                transaction_id: tx.id,
                wallet_id: tx.wallet_id,
                amount: tx.amount,
                currency: tx.currency.clone(),
                to_address: tx.to_address.clone(),
                outbound: tx.tx_type.is_outbound(),
                internal: tx.internal,
            };
            let grant = self
                .policies
                .admit_all(std::slice::from_ref(&admission))?
                .pop()
                .ok_or_else(|| EngineError::Validation("retry admission produced no grant".into()))?;

            self.ledger.start_round(subject);
            tx.attempt += 1;
            tx.requires_approvals = self
                .policies
                .required_approvals(grant.min_approvers, tx.risk_score);
            tx.requires_mfa = grant.require_mfa;
            tx.current_approvals = 0;
            tx.error_message = None;
            tx.tx_hash = None;
            tx.actual_fee = None;

            let next = if tx.requires_approvals == 0 {
                self.post_quorum_status(&tx)
            } else {
                TransactionStatus::Pending
            };
            let from = self.transition(&mut tx, next, now);
            tracing::info!(transaction_id = %id, attempt = tx.attempt, "Transaction retried");
            Change { snapshot: tx.clone(), from: Some(from) }
        };
        let snapshot = change.snapshot.clone();
        self.after_change(change);
        Ok(snapshot)
    }

    /// Move an approved transaction to processing once execution is possible.
    pub fn promote(&self, id: Uuid) -> EngineResult<bool> {
        let handle = self.handle(id)?;
        let now = self.clock.now();
        let change = {
            let mut tx = handle.lock().expect("transaction mutex poisoned");
            if tx.status != TransactionStatus::Approved || !self.gate.ready(&tx) {
                return Ok(false);
            }
            let from = self.transition(&mut tx, TransactionStatus::Processing, now);
            Change { snapshot: tx.clone(), from: Some(from) }
        };
        self.after_change(change);
        Ok(true)
    }

    /// Record the on-chain hash reported by the broadcaster.
    pub fn record_broadcast(&self, id: Uuid, tx_hash: &str) -> EngineResult<Transaction> {
        if tx_hash.trim().is_empty() {
            return Err(EngineError::Validation("tx_hash must not be empty".into()));
        }
        let handle = self.handle(id)?;
        let mut tx = handle.lock().expect("transaction mutex poisoned");
        if tx.status != TransactionStatus::Processing {
            return Err(invalid(&tx, "record_broadcast"));
        }
        match tx.tx_hash.as_deref() {
            Some(existing) if existing == tx_hash => {}
            Some(_) => return Err(invalid(&tx, "record_broadcast")),
            None => {
                tx.tx_hash = Some(tx_hash.to_string());
                tx.updated_at = self.clock.now();
                tracing::info!(transaction_id = %id, tx_hash, "Broadcast recorded");
            }
        }
        Ok(tx.clone())
    }

    pub fn complete(
        &self,
        id: Uuid,
        actual_fee: Option<Amount>,
        tx_hash: Option<&str>,
    ) -> EngineResult<Transaction> {
        let handle = self.handle(id)?;
        let now = self.clock.now();
        let change = {
            let mut tx = handle.lock().expect("transaction mutex poisoned");
            match tx.status {
                TransactionStatus::Completed
                    if tx_hash.is_none() || tx.tx_hash.as_deref() == tx_hash =>
                {
                    return Ok(tx.clone());
                }
                TransactionStatus::Processing => {
                    if let (Some(existing), Some(reported)) = (tx.tx_hash.as_deref(), tx_hash) {
                        if existing != reported {
                            return Err(invalid(&tx, "complete"));
                        }
                    }
                    let from = self.transition(&mut tx, TransactionStatus::Completed, now);
                    if let Some(hash) = tx_hash {
                        tx.tx_hash = Some(hash.to_string());
                    }
                    tx.actual_fee = actual_fee;
                    Change { snapshot: tx.clone(), from: Some(from) }
                }
                _ => return Err(invalid(&tx, "complete")),
            }
        };
        let snapshot = change.snapshot.clone();
        self.after_change(change);
        Ok(snapshot)
    }

    pub fn mark_failed(&self, id: Uuid, error: &str) -> EngineResult<Transaction> {
        let handle = self.handle(id)?;
        let now = self.clock.now();
        let change = {
            let mut tx = handle.lock().expect("transaction mutex poisoned");
            match tx.status {
                TransactionStatus::Failed if tx.error_message.as_deref() == Some(error) => {
                    return Ok(tx.clone());
                }
                TransactionStatus::Processing => {
                    let from = self.transition(&mut tx, TransactionStatus::Failed, now);
                    tx.error_message = Some(error.to_string());
                    self.policies.release(tx.wallet_id, tx.id);
                    tracing::error!(transaction_id = %id, attempt = tx.attempt, error, "Transaction execution failed");
                    Change { snapshot: tx.clone(), from: Some(from) }
                }
                _ => return Err(invalid(&tx, "fail")),
            }
        };
        let snapshot = change.snapshot.clone();
        self.after_change(change);
        Ok(snapshot)
    }

    /// Cancel pending transactions past their expiry. Returns how many were cancelled.
    pub fn expire_stale(&self) -> usize {
        let now = self.clock.now();
        let handles: Vec<_> = self.transactions.iter().map(|e| e.value().clone()).collect();
        let mut expired = 0;
        for handle in handles {
            let change = {
                let mut tx = handle.lock().expect("transaction mutex poisoned");
                if tx.status != TransactionStatus::Pending || !tx.expires_at.is_some_and(|at| now >= at) {
                    continue;
                }
                let from = self.transition(&mut tx, TransactionStatus::Cancelled, now);
                tx.cancellation_reason = Some("expired".to_string());
                self.policies.release(tx.wallet_id, tx.id);
                Change { snapshot: tx.clone(), from: Some(from) }
            };
            expired += 1;
            self.after_change(change);
        }
        expired
    }

    pub fn get(&self, id: Uuid) -> EngineResult<Transaction> {
        let handle = self.handle(id)?;
        let tx = handle.lock().expect("transaction mutex poisoned");
        Ok(tx.clone())
    }

    /// Filtered listing, newest first.
    pub fn list(&self, filter: &TransactionFilter, page: PageRequest) -> Page<Transaction> {
        let mut items = self.snapshots(|tx| filter.matches(tx));
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Page::from_vec(items, page)
    }

    /// Every vote on the transaction across all rounds.
    pub fn approvals(&self, id: Uuid) -> EngineResult<Vec<TransactionApproval>> {
        self.handle(id)?;
        Ok(self.ledger.history(ApprovalSubject::Transaction(id)))
    }

    /// Approved transactions waiting for the execution gate.
    pub fn awaiting_execution(&self) -> Vec<Uuid> {
        self.snapshots(|tx| tx.status == TransactionStatus::Approved)
            .into_iter()
            .map(|tx| tx.id)
            .collect()
    }

    /// Processing transactions with a known on-chain hash.
    pub fn processing_hashes(&self) -> Vec<(Uuid, String)> {
        self.snapshots(|tx| tx.status == TransactionStatus::Processing && tx.tx_hash.is_some())
            .into_iter()
            .filter_map(|tx| tx.tx_hash.map(|hash| (tx.id, hash)))
            .collect()
    }

    pub fn stats(&self) -> TransactionStats {
        let mut by_status = BTreeMap::new();
        let all = self.snapshots(|_| true);
        for tx in &all {
            *by_status.entry(tx.status.as_str()).or_insert(0) += 1;
        }
        TransactionStats {
            total: all.len(),
            by_status,
        }
    }

    fn snapshots(&self, keep: impl Fn(&Transaction) -> bool) -> Vec<Transaction> {
        let handles: Vec<_> = self.transactions.iter().map(|e| e.value().clone()).collect();
        handles
            .iter()
            .filter_map(|handle| {
                let tx = handle.lock().expect("transaction mutex poisoned");
                keep(&tx).then(|| tx.clone())
            })
            .collect()
    }

    fn handle(&self, id: Uuid) -> EngineResult<Arc<Mutex<Transaction>>> {
        self.transactions
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| EngineError::not_found(ENTITY, id))
    }

    fn post_quorum_status(&self, tx: &Transaction) -> TransactionStatus {
        if self.gate.ready(tx) {
            TransactionStatus::Processing
        } else {
            TransactionStatus::Approved
        }
    }

    fn transition(&self, tx: &mut Transaction, to: TransactionStatus, now: DateTime<Utc>) -> TransactionStatus {
        let from = tx.status;
        tx.status = to;
        tx.updated_at = now;
        from
    }

    fn publish_vote(
        &self,
        subject: ApprovalSubject,
        approver_id: &str,
        decision: crate::approvals::ApprovalDecision,
        outcome: VoteOutcome,
        at: DateTime<Utc>,
    ) {
        if outcome.is_duplicate() {
            return;
        }
        self.events.publish(EngineEvent::ApprovalRecorded {
            subject,
            approver_id: approver_id.to_string(),
            decision,
            outcome,
            at,
        });
    }

    fn after_change(&self, change: Change) {
        let tx = &change.snapshot;
        if change.from == Some(tx.status) {
            return;
        }
        let from = change.from.map(|s| s.as_str()).unwrap_or("none");
        tracing::info!(
            transaction_id = %tx.id,
            from,
            to = tx.status.as_str(),
            current_approvals = tx.current_approvals,
            requires_approvals = tx.requires_approvals,
            "Transaction status changed"
        );
        metrics::record_transition(ENTITY, from, tx.status.as_str());
        self.events.publish(EngineEvent::TransactionStatusChanged {
            transaction_id: tx.id,
            wallet_id: tx.wallet_id,
            batch_id: tx.batch_id,
            from: change.from,
            to: tx.status,
            at: tx.updated_at,
        });

        if let Some(batch_id) = tx.batch_id {
            self.batches.refresh(batch_id, self);
        }
        if tx.status == TransactionStatus::Processing {
            let _ = self.queue.send(tx.id);
        }
    }
}

impl MemberStatusSource for TransactionService {
    fn member_statuses(&self, ids: &[Uuid]) -> Vec<TransactionStatus> {
        ids.iter()
            .filter_map(|id| self.get(*id).ok().map(|tx| tx.status))
            .collect()
    }
}

fn invalid(tx: &Transaction, action: &'static str) -> EngineError {
    EngineError::InvalidStateTransition {
        entity: ENTITY,
        id: tx.id,
        from: tx.status.as_str().to_string(),
        action,
    }
}

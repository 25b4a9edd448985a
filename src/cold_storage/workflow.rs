//! Cold storage workflow.
//!
//! # Responsibilities
//! - Freeze the per-type rules (waiting period, approvers, physical check) at creation
//! - Refuse approvals until the waiting period has elapsed
//! - Gate approvals on physical verification and MPC availability
//! - Count each distinct approver once
//!
//! # Timer
//! Waiting periods are never awaited. Every access promotes a due request
//! lazily, and [`crate::cold_storage::timer::ColdStorageTimer`] sweeps in the
//! background so idle requests also move on time.

use arc_swap::ArcSwap;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::approvals::{ApprovalDecision, ApprovalLedger, ApprovalSubject, TransactionApproval, Vote};
use crate::clock::Clock;
use crate::cold_storage::types::{
    ColdApprovalOutcome, ColdStorageFilter, ColdStorageRequest, ColdStorageRequestType,
    ColdStorageStatus, NewColdStorageRequest,
};
use crate::config::{ColdStorageRule, RuntimeSettings};
use crate::engine::events::{EngineEvent, EventBus};
use crate::error::{EngineError, EngineResult, PolicyRule};
use crate::mpc::ThresholdOracle;
use crate::observability::metrics;
use crate::pagination::{Page, PageRequest};

const ENTITY: &str = "cold_storage";

type Transition = (Option<ColdStorageStatus>, ColdStorageStatus);

pub struct ColdStorageWorkflow {
    requests: DashMap<Uuid, Arc<Mutex<ColdStorageRequest>>>,
    ledger: Arc<ApprovalLedger>,
    oracle: Arc<dyn ThresholdOracle>,
    events: EventBus,
    settings: Arc<ArcSwap<RuntimeSettings>>,
    clock: Arc<dyn Clock>,
}

impl ColdStorageWorkflow {
    pub fn new(
        ledger: Arc<ApprovalLedger>,
        oracle: Arc<dyn ThresholdOracle>,
        events: EventBus,
        settings: Arc<ArcSwap<RuntimeSettings>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            requests: DashMap::new(),
            ledger,
            oracle,
            events,
            settings,
            clock,
        }
    }

    pub fn create(&self, new: NewColdStorageRequest) -> EngineResult<ColdStorageRequest> {
        if new.requested_by.trim().is_empty() {
            return Err(EngineError::Validation("requested_by must not be empty".into()));
        }
        if new.request_type.moves_funds() {
            if new.amount.is_none_or(|a| a.is_zero()) {
                return Err(EngineError::Validation("amount must be positive".into()));
            }
            if new.currency.as_deref().is_none_or(|c| c.trim().is_empty()) {
                return Err(EngineError::Validation("currency is required".into()));
            }
        }

        let rule = self.rule_for(new.request_type);
        let now = self.clock.now();
        let waiting_period_ends_at = i64::try_from(rule.waiting_period_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|d| now.checked_add_signed(d))
            .ok_or_else(|| {
                EngineError::Validation(format!(
                    "waiting_period_secs {} out of range",
                    rule.waiting_period_secs
                ))
            })?;
        let mut request = ColdStorageRequest {
            id: Uuid::new_v4(),
            wallet_id: new.wallet_id,
            request_type: new.request_type,
            amount: new.amount,
            currency: new.currency.map(|c| c.to_ascii_uppercase()),
            destination_address: new.destination_address,
            requested_by: new.requested_by,
            reason: new.reason,
            status: ColdStorageStatus::Pending,
            required_approvers: rule.required_approvers,
            current_approvers: 0,
            approver_ids: Vec::new(),
            waiting_period_secs: rule.waiting_period_secs,
            waiting_period_ends_at,
            physical_verification_required: rule.physical_verification_required,
            physical_verification_completed: false,
            verified_by: None,
            verified_at: None,
            rejected_by: None,
            rejection_reason: None,
            tx_hash: None,
            created_at: now,
            updated_at: now,
            approved_at: None,
            completed_at: None,
        };

        let mut transitions = vec![(None, ColdStorageStatus::Pending)];
        request.status = ColdStorageStatus::WaitingPeriod;
        transitions.push((Some(ColdStorageStatus::Pending), ColdStorageStatus::WaitingPeriod));
        if let Some(t) = promote_if_due(&mut request, now) {
            transitions.push(t);
        }

        tracing::info!(
            request_id = %request.id,
            wallet_id = %request.wallet_id,
            request_type = ?request.request_type,
            waiting_period_ends_at = %request.waiting_period_ends_at,
            required_approvers = request.required_approvers,
            "Cold storage request created"
        );
        self.requests
            .insert(request.id, Arc::new(Mutex::new(request.clone())));
        self.publish(&request, &transitions);
        Ok(request)
    }

    pub fn approve(&self, id: Uuid, approver_id: &str, mfa_verified: bool) -> EngineResult<ColdApprovalOutcome> {
        if approver_id.trim().is_empty() {
            return Err(EngineError::Validation("approver_id must not be empty".into()));
        }
        let handle = self.handle(id)?;
        let subject = ApprovalSubject::ColdStorage(id);
        let now = self.clock.now();
        let mut transitions = Vec::new();

        let result = {
            let mut request = handle.lock().expect("cold storage mutex poisoned");
            transitions.extend(promote_if_due(&mut request, now));
            self.approve_locked(&mut request, subject, approver_id, mfa_verified, now, &mut transitions)
                .map(|duplicate| ColdApprovalOutcome {
                    request: request.clone(),
                    duplicate,
                    remaining_approvals: request.remaining_approvals(),
                })
        };

        if let Ok(outcome) = &result {
            if !outcome.duplicate {
                self.events.publish(EngineEvent::ApprovalRecorded {
                    subject,
                    approver_id: approver_id.to_string(),
                    decision: ApprovalDecision::Approved,
                    outcome: crate::approvals::VoteOutcome::Recorded,
                    at: now,
                });
            }
        }
        if !transitions.is_empty() {
            let snapshot = self.get_unpromoted(id)?;
            self.publish(&snapshot, &transitions);
        }
        result
    }

    /// Returns whether the approver was already counted.
    fn approve_locked(
        &self,
        request: &mut ColdStorageRequest,
        subject: ApprovalSubject,
        approver_id: &str,
        mfa_verified: bool,
        now: DateTime<Utc>,
        transitions: &mut Vec<Transition>,
    ) -> EngineResult<bool> {
        let already = request.approver_ids.iter().any(|a| a == approver_id);
        match request.status {
            ColdStorageStatus::Pending | ColdStorageStatus::WaitingPeriod => {
                Err(EngineError::WaitingPeriodActive {
                    ends_at: request.waiting_period_ends_at,
                })
            }
            ColdStorageStatus::Rejected | ColdStorageStatus::Completed => Err(invalid(request, "approve")),
            ColdStorageStatus::Approved => {
                if !already {
                    self.ledger.cast_vote(subject, Vote::approve(approver_id, mfa_verified), false);
                }
                Ok(already)
            }
            ColdStorageStatus::ReadyForApproval => {
                if already {
                    return Ok(true);
                }
                if !self.settings.load().policy.allow_self_approval && request.requested_by == approver_id {
                    metrics::record_policy_violation(PolicyRule::SelfApproval.as_str());
                    return Err(EngineError::policy(
                        PolicyRule::SelfApproval,
                        "requester cannot approve their own cold storage request",
                    ));
                }
                if request.physical_verification_required && !request.physical_verification_completed {
                    return Err(EngineError::VerificationRequired { request_id: request.id });
                }
                if request.request_type.requires_signing() {
                    self.oracle.ensure_available(request.wallet_id)?;
                }

                self.ledger.cast_vote(subject, Vote::approve(approver_id, mfa_verified), true);
                request.approver_ids.push(approver_id.to_string());
                request.current_approvers =
                    (request.approver_ids.len() as u32).min(request.required_approvers);
                request.updated_at = now;
                tracing::info!(
                    request_id = %request.id,
                    approver_id,
                    current = request.current_approvers,
                    required = request.required_approvers,
                    "Cold storage approval recorded"
                );

                if request.current_approvers >= request.required_approvers {
                    request.status = ColdStorageStatus::Approved;
                    request.approved_at = Some(now);
                    transitions.push((Some(ColdStorageStatus::ReadyForApproval), ColdStorageStatus::Approved));
                }
                Ok(false)
            }
        }
    }

    /// Any decided rejection is terminal.
    pub fn reject(&self, id: Uuid, approver_id: &str, reason: &str) -> EngineResult<ColdStorageRequest> {
        if reason.trim().is_empty() {
            return Err(EngineError::Validation("rejection reason is required".into()));
        }
        let handle = self.handle(id)?;
        let now = self.clock.now();
        let mut transitions = Vec::new();
        let snapshot = {
            let mut request = handle.lock().expect("cold storage mutex poisoned");
            transitions.extend(promote_if_due(&mut request, now));
            match request.status {
                ColdStorageStatus::Rejected => return Ok(request.clone()),
                ColdStorageStatus::WaitingPeriod | ColdStorageStatus::ReadyForApproval => {
                    self.ledger
                        .cast_vote(ApprovalSubject::ColdStorage(id), Vote::reject(approver_id, reason), true);
                    transitions.push((Some(request.status), ColdStorageStatus::Rejected));
                    request.status = ColdStorageStatus::Rejected;
                    request.rejected_by = Some(approver_id.to_string());
                    request.rejection_reason = Some(reason.to_string());
                    request.updated_at = now;
                    request.clone()
                }
                _ => return Err(invalid(&request, "reject")),
            }
        };
        self.publish(&snapshot, &transitions);
        Ok(snapshot)
    }

    /// Record the physical verification step.
    pub fn verify_physical(&self, id: Uuid, verifier_id: &str) -> EngineResult<ColdStorageRequest> {
        if verifier_id.trim().is_empty() {
            return Err(EngineError::Validation("verifier_id must not be empty".into()));
        }
        let handle = self.handle(id)?;
        let now = self.clock.now();
        let mut transitions = Vec::new();
        let snapshot = {
            let mut request = handle.lock().expect("cold storage mutex poisoned");
            transitions.extend(promote_if_due(&mut request, now));
            if !request.physical_verification_required {
                return Err(EngineError::Validation(format!(
                    "request {} does not require physical verification",
                    id
                )));
            }
            match request.status {
                ColdStorageStatus::WaitingPeriod | ColdStorageStatus::ReadyForApproval => {
                    if !request.physical_verification_completed {
                        request.physical_verification_completed = true;
                        request.verified_by = Some(verifier_id.to_string());
                        request.verified_at = Some(now);
                        request.updated_at = now;
                        tracing::info!(request_id = %id, verifier_id, "Physical verification completed");
                    }
                    request.clone()
                }
                _ => return Err(invalid(&request, "verify")),
            }
        };
        self.publish(&snapshot, &transitions);
        Ok(snapshot)
    }

    /// Reported by the signing collaborator once the approved request executed.
    pub fn complete(&self, id: Uuid, tx_hash: Option<&str>) -> EngineResult<ColdStorageRequest> {
        let handle = self.handle(id)?;
        let now = self.clock.now();
        let snapshot = {
            let mut request = handle.lock().expect("cold storage mutex poisoned");
            match request.status {
                ColdStorageStatus::Completed if tx_hash.is_none() || request.tx_hash.as_deref() == tx_hash => {
                    return Ok(request.clone());
                }
                ColdStorageStatus::Approved => {
                    request.status = ColdStorageStatus::Completed;
                    request.tx_hash = tx_hash.map(str::to_string);
                    request.completed_at = Some(now);
                    request.updated_at = now;
                    request.clone()
                }
                _ => return Err(invalid(&request, "complete")),
            }
        };
        self.publish(
            &snapshot,
            &[(Some(ColdStorageStatus::Approved), ColdStorageStatus::Completed)],
        );
        Ok(snapshot)
    }

    /// Promote every request whose waiting period elapsed. Returns how many moved.
    pub fn tick(&self) -> usize {
        let now = self.clock.now();
        let handles: Vec<_> = self.requests.iter().map(|e| e.value().clone()).collect();
        let mut promoted = 0;
        for handle in handles {
            let moved = {
                let mut request = handle.lock().expect("cold storage mutex poisoned");
                promote_if_due(&mut request, now).map(|t| (request.clone(), t))
            };
            if let Some((snapshot, transition)) = moved {
                promoted += 1;
                self.publish(&snapshot, &[transition]);
            }
        }
        promoted
    }

    pub fn get(&self, id: Uuid) -> EngineResult<ColdStorageRequest> {
        let handle = self.handle(id)?;
        let now = self.clock.now();
        let (snapshot, transition) = {
            let mut request = handle.lock().expect("cold storage mutex poisoned");
            let t = promote_if_due(&mut request, now);
            (request.clone(), t)
        };
        if let Some(t) = transition {
            self.publish(&snapshot, &[t]);
        }
        Ok(snapshot)
    }

    /// Filtered listing, newest first.
    pub fn list(&self, filter: &ColdStorageFilter, page: PageRequest) -> Page<ColdStorageRequest> {
        self.tick();
        let handles: Vec<_> = self.requests.iter().map(|e| e.value().clone()).collect();
        let mut items: Vec<_> = handles
            .iter()
            .filter_map(|handle| {
                let request = handle.lock().expect("cold storage mutex poisoned");
                filter.matches(&request).then(|| request.clone())
            })
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Page::from_vec(items, page)
    }

    pub fn approvals(&self, id: Uuid) -> EngineResult<Vec<TransactionApproval>> {
        self.handle(id)?;
        Ok(self.ledger.history(ApprovalSubject::ColdStorage(id)))
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    fn rule_for(&self, request_type: ColdStorageRequestType) -> ColdStorageRule {
        let settings = self.settings.load();
        match request_type {
            ColdStorageRequestType::Withdrawal => settings.cold_storage.withdrawal.clone(),
            ColdStorageRequestType::ColdToWarmTransfer => settings.cold_storage.cold_to_warm_transfer.clone(),
            ColdStorageRequestType::KeyRecovery => settings.cold_storage.key_recovery.clone(),
        }
    }

    fn get_unpromoted(&self, id: Uuid) -> EngineResult<ColdStorageRequest> {
        let handle = self.handle(id)?;
        let request = handle.lock().expect("cold storage mutex poisoned");
        Ok(request.clone())
    }

    fn handle(&self, id: Uuid) -> EngineResult<Arc<Mutex<ColdStorageRequest>>> {
        self.requests
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| EngineError::not_found("cold storage request", id))
    }

    fn publish(&self, request: &ColdStorageRequest, transitions: &[Transition]) {
        for (from, to) in transitions {
            let from_label = from.map(|s| s.as_str()).unwrap_or("none");
            tracing::info!(
                request_id = %request.id,
                from = from_label,
                to = to.as_str(),
                "Cold storage status changed"
            );
            metrics::record_transition(ENTITY, from_label, to.as_str());
            self.events.publish(EngineEvent::ColdStorageStatusChanged {
                request_id: request.id,
                wallet_id: request.wallet_id,
                from: *from,
                to: *to,
                at: request.updated_at,
            });
        }
    }
}

fn promote_if_due(request: &mut ColdStorageRequest, now: DateTime<Utc>) -> Option<Transition> {
    if request.status == ColdStorageStatus::WaitingPeriod && now >= request.waiting_period_ends_at {
        request.status = ColdStorageStatus::ReadyForApproval;
        request.updated_at = now;
        Some((Some(ColdStorageStatus::WaitingPeriod), ColdStorageStatus::ReadyForApproval))
    } else {
        None
    }
}

fn invalid(request: &ColdStorageRequest, action: &'static str) -> EngineError {
    EngineError::InvalidStateTransition {
        entity: ENTITY,
        id: request.id,
        from: request.status.as_str().to_string(),
        action,
    }
}

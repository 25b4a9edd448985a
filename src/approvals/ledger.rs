//! Approval ledger.
//!
//! # Responsibilities
//! - Keep exactly one live record per (subject, approver) in the current round
//! - Replace a prior decision when the same approver votes differently
//! - Count distinct approvals toward quorum, honouring the MFA requirement
//! - Retain closed rounds for audit
//!
//! # Concurrency
//! Each call is atomic per subject (DashMap shard lock). Callers that need
//! "cast vote, then evaluate quorum, then transition" as one step hold the
//! subject entity's own lock around the sequence; the ledger never decides
//! transitions on its own.

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;

use crate::approvals::types::{
    ApprovalDecision, ApprovalSubject, Tally, TransactionApproval, Vote, VoteOutcome,
};
use crate::clock::Clock;
use crate::observability::metrics;

#[derive(Debug)]
struct SubjectVotes {
    round: u32,
    current: HashMap<String, TransactionApproval>,
    archived: Vec<TransactionApproval>,
}

impl Default for SubjectVotes {
    fn default() -> Self {
        Self {
            round: 1,
            current: HashMap::new(),
            archived: Vec::new(),
        }
    }
}

/// Ledger of approval decisions for transactions and cold storage requests.
pub struct ApprovalLedger {
    subjects: DashMap<ApprovalSubject, SubjectVotes>,
    clock: Arc<dyn Clock>,
}

impl ApprovalLedger {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            subjects: DashMap::new(),
            clock,
        }
    }

    /// Upsert the approver's vote for the current round.
    ///
    /// `counted` is false when the subject is already past quorum gating and
    /// the vote is kept for audit only.
    pub fn cast_vote(&self, subject: ApprovalSubject, vote: Vote, counted: bool) -> VoteOutcome {
        let now = self.clock.now();
        let mut votes = self.subjects.entry(subject).or_default();
        let round = votes.round;

        let outcome = match votes.current.get_mut(&vote.approver_id) {
            Some(existing) => {
                let mfa_upgrade = vote.mfa_verified && !existing.mfa_verified;
                if existing.decision == vote.decision && !mfa_upgrade {
                    VoteOutcome::Unchanged
                } else {
                    let previous = existing.decision;
                    existing.decision = vote.decision;
                    existing.mfa_verified = vote.mfa_verified;
                    existing.reason = vote.reason.clone();
                    existing.counted = existing.counted || counted;
                    existing.decided_at = now;
                    existing.revision += 1;
                    VoteOutcome::Replaced { previous }
                }
            }
            None => {
                votes.current.insert(
                    vote.approver_id.clone(),
                    TransactionApproval {
                        subject,
                        approver_id: vote.approver_id.clone(),
                        round,
                        decision: vote.decision,
                        mfa_verified: vote.mfa_verified,
                        counted,
                        reason: vote.reason.clone(),
                        decided_at: now,
                        revision: 1,
                    },
                );
                VoteOutcome::Recorded
            }
        };

        metrics::record_vote(subject.label(), vote.decision.as_str(), outcome.as_str());
        tracing::debug!(
            subject = subject.label(),
            subject_id = %subject.id(),
            approver_id = %vote.approver_id,
            decision = vote.decision.as_str(),
            outcome = outcome.as_str(),
            counted,
            "Vote cast"
        );
        outcome
    }

    /// Vote counts for the current round.
    pub fn tally(&self, subject: ApprovalSubject, require_mfa: bool) -> Tally {
        let mut tally = Tally::default();
        if let Some(votes) = self.subjects.get(&subject) {
            for record in votes.current.values() {
                match record.decision {
                    ApprovalDecision::Approved => {
                        tally.approved += 1;
                        if record.counted && (!require_mfa || record.mfa_verified) {
                            tally.counted_approved += 1;
                        }
                    }
                    ApprovalDecision::Rejected => tally.rejected += 1,
                    ApprovalDecision::Pending => tally.pending += 1,
                }
            }
        }
        tally
    }

    /// Distinct approvals that count toward quorum.
    pub fn counted_approvals(&self, subject: ApprovalSubject, require_mfa: bool) -> u32 {
        self.tally(subject, require_mfa).counted_approved
    }

    /// True when counted approvals reach `requires`.
    pub fn quorum_met(&self, subject: ApprovalSubject, requires: u32, require_mfa: bool) -> bool {
        self.counted_approvals(subject, require_mfa) >= requires
    }

    /// The approver's live vote in the current round.
    pub fn vote_of(&self, subject: ApprovalSubject, approver_id: &str) -> Option<TransactionApproval> {
        self.subjects
            .get(&subject)
            .and_then(|votes| votes.current.get(approver_id).cloned())
    }

    /// Every vote ever recorded, oldest round first.
    pub fn history(&self, subject: ApprovalSubject) -> Vec<TransactionApproval> {
        let Some(votes) = self.subjects.get(&subject) else {
            return Vec::new();
        };
        let mut all: Vec<_> = votes
            .archived
            .iter()
            .chain(votes.current.values())
            .cloned()
            .collect();
        all.sort_by(|a, b| a.round.cmp(&b.round).then(a.decided_at.cmp(&b.decided_at)));
        all
    }

    /// Close the current round; its votes stay in history.
    pub fn start_round(&self, subject: ApprovalSubject) -> u32 {
        let mut votes = self.subjects.entry(subject).or_default();
        let closed: Vec<_> = votes.current.drain().map(|(_, v)| v).collect();
        votes.archived.extend(closed);
        votes.round += 1;
        votes.round
    }

    pub fn round(&self, subject: ApprovalSubject) -> u32 {
        self.subjects.get(&subject).map(|v| v.round).unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use uuid::Uuid;

    fn ledger() -> ApprovalLedger {
        ApprovalLedger::new(Arc::new(ManualClock::starting_now()))
    }

    #[test]
    fn test_repeat_vote_is_not_double_counted() {
        let ledger = ledger();
        let subject = ApprovalSubject::Transaction(Uuid::new_v4());

        assert_eq!(ledger.cast_vote(subject, Vote::approve("alice", false), true), VoteOutcome::Recorded);
        assert_eq!(ledger.cast_vote(subject, Vote::approve("alice", false), true), VoteOutcome::Unchanged);
        assert_eq!(ledger.counted_approvals(subject, false), 1);
    }

    #[test]
    fn test_latest_decision_replaces_previous() {
        let ledger = ledger();
        let subject = ApprovalSubject::Transaction(Uuid::new_v4());

        ledger.cast_vote(subject, Vote::approve("alice", false), true);
        let outcome = ledger.cast_vote(subject, Vote::reject("alice", "wrong address"), true);
        assert_eq!(
            outcome,
            VoteOutcome::Replaced { previous: ApprovalDecision::Approved }
        );

        let tally = ledger.tally(subject, false);
        assert_eq!(tally.approved, 0);
        assert_eq!(tally.rejected, 1);
        assert_eq!(ledger.vote_of(subject, "alice").unwrap().revision, 2);
    }

    #[test]
    fn test_mfa_requirement_filters_quorum() {
        let ledger = ledger();
        let subject = ApprovalSubject::Transaction(Uuid::new_v4());

        ledger.cast_vote(subject, Vote::approve("alice", true), true);
        ledger.cast_vote(subject, Vote::approve("bob", false), true);
        assert!(ledger.quorum_met(subject, 2, false));
        assert!(!ledger.quorum_met(subject, 2, true));

        // bob re-approves with MFA: replaces, still one record
        let outcome = ledger.cast_vote(subject, Vote::approve("bob", true), true);
        assert!(matches!(outcome, VoteOutcome::Replaced { .. }));
        assert!(ledger.quorum_met(subject, 2, true));
    }

    #[test]
    fn test_audit_only_votes_do_not_count() {
        let ledger = ledger();
        let subject = ApprovalSubject::Transaction(Uuid::new_v4());

        ledger.cast_vote(subject, Vote::approve("carol", false), false);
        let tally = ledger.tally(subject, false);
        assert_eq!(tally.approved, 1);
        assert_eq!(tally.counted_approved, 0);
    }

    #[test]
    fn test_new_round_archives_votes() {
        let ledger = ledger();
        let subject = ApprovalSubject::Transaction(Uuid::new_v4());

        ledger.cast_vote(subject, Vote::approve("alice", false), true);
        assert_eq!(ledger.start_round(subject), 2);
        assert_eq!(ledger.counted_approvals(subject, false), 0);

        // alice may vote again in the new round
        assert_eq!(ledger.cast_vote(subject, Vote::approve("alice", false), true), VoteOutcome::Recorded);

        let history = ledger.history(subject);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].round, 1);
        assert_eq!(history[1].round, 2);
    }
}

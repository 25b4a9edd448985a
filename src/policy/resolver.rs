//! Policy resolver.
//!
//! # Responsibilities
//! - Store wallet policies and pool policies
//! - Merge them into an [`EffectivePolicy`] (wallet first, then pool policies
//!   by descending priority, first match per field)
//! - Check and reserve daily allowance atomically with admission
//!
//! # Inheritance
//! A wallet sees pool policies attached to itself as a parent (scope
//! `parent_only`/`both`, wallet-wide) and pool policies of its direct active
//! parent (scope `children_only`/`both`, wallet-wide or bound to the linking
//! relationship). Grandparents are not consulted.
//!
//! # Lock order
//! Usage locks are taken in ascending wallet id order. Callers may hold a
//! transaction lock while calling in; the resolver never calls back out.

use arc_swap::ArcSwap;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use crate::amount::Amount;
use crate::clock::Clock;
use crate::config::schema::MAX_PERIOD_SECS;
use crate::config::RuntimeSettings;
use crate::error::{EngineError, EngineResult, PolicyRule};
use crate::observability::metrics;
use crate::pagination::{Page, PageRequest};
use crate::policy::allowance::{window_start, DailyUsage};
use crate::policy::types::{
    Admission, EffectivePolicy, FieldSources, Grant, NewPoolPolicy, PolicyRules, PolicySource,
    PoolPolicy, PoolPolicyFilter, WalletPolicy,
};
use crate::pools::PoolHierarchy;

pub struct PolicyResolver {
    wallets: DashMap<Uuid, WalletPolicy>,
    pool_policies: DashMap<Uuid, PoolPolicy>,
    usage: DashMap<Uuid, Arc<Mutex<DailyUsage>>>,
    sequence: AtomicU64,
    pools: Arc<PoolHierarchy>,
    settings: Arc<ArcSwap<RuntimeSettings>>,
    clock: Arc<dyn Clock>,
}

impl PolicyResolver {
    pub fn new(
        pools: Arc<PoolHierarchy>,
        settings: Arc<ArcSwap<RuntimeSettings>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            wallets: DashMap::new(),
            pool_policies: DashMap::new(),
            usage: DashMap::new(),
            sequence: AtomicU64::new(0),
            pools,
            settings,
            clock,
        }
    }

    /// Create or replace a wallet's own policy. The window anchor survives updates.
    pub fn set_wallet_policy(&self, wallet_id: Uuid, rules: PolicyRules) -> EngineResult<WalletPolicy> {
        validate_rules(&rules)?;
        let now = self.clock.now();
        let policy = match self.wallets.get(&wallet_id) {
            Some(existing) => WalletPolicy {
                wallet_id,
                rules,
                last_reset_at: existing.last_reset_at,
                updated_at: now,
            },
            // keep the window already in force so earlier reservations still count
            None => WalletPolicy {
                wallet_id,
                rules,
                last_reset_at: window_start(
                    DateTime::<Utc>::UNIX_EPOCH,
                    self.settings.load().policy.daily_window_secs,
                    now,
                ),
                updated_at: now,
            },
        };
        self.wallets.insert(wallet_id, policy.clone());
        tracing::info!(wallet_id = %wallet_id, "Wallet policy updated");
        Ok(policy)
    }

    pub fn wallet_policy(&self, wallet_id: Uuid) -> Option<WalletPolicy> {
        self.wallets.get(&wallet_id).map(|p| p.clone())
    }

    pub fn create_pool_policy(&self, request: NewPoolPolicy) -> EngineResult<PoolPolicy> {
        if request.name.trim().is_empty() {
            return Err(EngineError::Validation("policy name must not be empty".into()));
        }
        validate_rules(&request.rules)?;
        if let Some(relationship_id) = request.relationship_id {
            let relationship = self.pools.get(relationship_id)?;
            if relationship.parent_wallet_id != request.parent_wallet_id {
                return Err(EngineError::Validation(format!(
                    "relationship {} does not belong to parent wallet {}",
                    relationship_id, request.parent_wallet_id
                )));
            }
        }

        let policy = PoolPolicy {
            id: Uuid::new_v4(),
            parent_wallet_id: request.parent_wallet_id,
            relationship_id: request.relationship_id,
            name: request.name,
            applies_to: request.applies_to,
            priority: request.priority,
            is_enforced: request.is_enforced,
            rules: request.rules,
            created_at: self.clock.now(),
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
        };
        self.pool_policies.insert(policy.id, policy.clone());
        tracing::info!(
            policy_id = %policy.id,
            parent_wallet_id = %policy.parent_wallet_id,
            priority = policy.priority,
            enforced = policy.is_enforced,
            "Pool policy created"
        );
        Ok(policy)
    }

    pub fn list_pool_policies(&self, filter: &PoolPolicyFilter, page: PageRequest) -> Page<PoolPolicy> {
        let mut items: Vec<_> = self
            .pool_policies
            .iter()
            .filter(|p| filter.parent_wallet_id.is_none_or(|w| p.parent_wallet_id == w))
            .filter(|p| filter.relationship_id.is_none_or(|r| p.relationship_id == Some(r)))
            .map(|p| p.clone())
            .collect();
        items.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.sequence.cmp(&b.sequence)));
        Page::from_vec(items, page)
    }

    /// Effective policy for a wallet, including remaining daily allowance.
    pub fn resolve(&self, wallet_id: Uuid) -> EffectivePolicy {
        let now = self.clock.now();
        let mut effective = self.merge(wallet_id, now);
        if let Some(usage) = self.usage.get(&wallet_id).map(|u| u.clone()) {
            let mut usage = usage.lock().expect("daily usage mutex poisoned");
            usage.roll(effective.window_started_at);
            for (currency, spent) in usage.spent_by_currency() {
                effective.spent_today.insert(currency.clone(), *spent);
                if let Some(limit) = effective.daily_limit {
                    effective
                        .remaining_daily
                        .insert(currency.clone(), limit.saturating_sub(*spent));
                }
            }
        }
        effective
    }

    /// Validate every admission and reserve allowance for all of them, or none.
    pub fn admit_all(&self, admissions: &[Admission]) -> EngineResult<Vec<Grant>> {
        let now = self.clock.now();

        let mut policies: HashMap<Uuid, EffectivePolicy> = HashMap::new();
        for admission in admissions {
            policies
                .entry(admission.wallet_id)
                .or_insert_with(|| self.merge(admission.wallet_id, now));
        }

        let wallets: BTreeSet<Uuid> = admissions
            .iter()
            .filter(|a| a.outbound)
            .map(|a| a.wallet_id)
            .collect();
        let handles: Vec<(Uuid, Arc<Mutex<DailyUsage>>)> = wallets
            .iter()
            .map(|w| (*w, self.usage.entry(*w).or_default().clone()))
            .collect();
        let mut guards: BTreeMap<Uuid, MutexGuard<'_, DailyUsage>> = BTreeMap::new();
        for (wallet_id, handle) in &handles {
            let mut guard = handle.lock().expect("daily usage mutex poisoned");
            if let Some(policy) = policies.get(wallet_id) {
                guard.roll(policy.window_started_at);
            }
            guards.insert(*wallet_id, guard);
        }

        let mut pending: HashMap<(Uuid, String), Amount> = HashMap::new();
        let mut cooldown_checked: BTreeSet<Uuid> = BTreeSet::new();
        for (index, admission) in admissions.iter().enumerate() {
            if !admission.outbound {
                continue;
            }
            let (Some(policy), Some(usage)) =
                (policies.get(&admission.wallet_id), guards.get(&admission.wallet_id))
            else {
                continue;
            };
            let currency = admission.currency.to_ascii_uppercase();
            let key = (admission.wallet_id, currency.clone());
            let batched = pending.get(&key).copied().unwrap_or_default();

            let checked = self.check(admission, policy, usage, batched, &currency, now, &mut cooldown_checked);
            if let Err(err) = checked {
                if let EngineError::PolicyViolation { rule, reason } = &err {
                    metrics::record_policy_violation(rule.as_str());
                    tracing::warn!(
                        wallet_id = %admission.wallet_id,
                        transaction_id = %admission.transaction_id,
                        rule = rule.as_str(),
                        member = index,
                        reason = %reason,
                        "Admission rejected by policy"
                    );
                }
                return Err(err);
            }
            *pending.entry(key).or_default() += admission.amount;
        }

        for admission in admissions.iter().filter(|a| a.outbound) {
            if let Some(usage) = guards.get_mut(&admission.wallet_id) {
                usage.reserve(
                    admission.transaction_id,
                    &admission.currency.to_ascii_uppercase(),
                    admission.amount,
                );
                usage.last_admitted_at = Some(now);
            }
        }

        Ok(admissions
            .iter()
            .map(|a| {
                let policy = &policies[&a.wallet_id];
                Grant {
                    min_approvers: policy.min_approvers,
                    require_mfa: policy.require_mfa,
                }
            })
            .collect())
    }

    /// Return a transaction's reservation if its window is still open.
    pub fn release(&self, wallet_id: Uuid, transaction_id: Uuid) {
        let Some(handle) = self.usage.get(&wallet_id).map(|u| u.clone()) else {
            return;
        };
        let window = self.merge(wallet_id, self.clock.now()).window_started_at;
        let mut usage = handle.lock().expect("daily usage mutex poisoned");
        usage.roll(window);
        if let Some(amount) = usage.release(transaction_id) {
            tracing::debug!(
                wallet_id = %wallet_id,
                transaction_id = %transaction_id,
                amount = %amount,
                "Daily allowance released"
            );
        }
    }

    /// Risk escalation raises the requirement, never lowers it.
    pub fn required_approvals(&self, min_approvers: u32, risk_score: u8) -> u32 {
        let settings = self.settings.load();
        if risk_score >= settings.risk.escalation_threshold {
            min_approvers.max(settings.risk.escalated_min_approvers)
        } else {
            min_approvers
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn check(
        &self,
        admission: &Admission,
        policy: &EffectivePolicy,
        usage: &DailyUsage,
        batched: Amount,
        currency: &str,
        now: DateTime<Utc>,
        cooldown_checked: &mut BTreeSet<Uuid>,
    ) -> EngineResult<()> {
        if let Some(limit) = policy.per_tx_limit {
            if admission.amount > limit {
                return Err(EngineError::policy(
                    PolicyRule::PerTransactionLimit,
                    format!("amount {} exceeds per-transaction limit {}", admission.amount, limit),
                ));
            }
        }

        if let Some(limit) = policy.daily_limit {
            let remaining = limit.saturating_sub(usage.spent(currency) + batched);
            if admission.amount > remaining {
                return Err(EngineError::policy(
                    PolicyRule::DailyLimit,
                    format!(
                        "amount {} exceeds remaining daily allowance {} {}",
                        admission.amount, remaining, currency
                    ),
                ));
            }
        }

        if let Some(whitelist) = policy.address_whitelist.as_ref().filter(|_| !admission.internal) {
            let allowed = admission
                .to_address
                .as_deref()
                .is_some_and(|to| whitelist.iter().any(|w| w.eq_ignore_ascii_case(to)));
            if !allowed {
                return Err(EngineError::policy(
                    PolicyRule::Whitelist,
                    format!(
                        "destination {} is not whitelisted",
                        admission.to_address.as_deref().unwrap_or("<none>")
                    ),
                ));
            }
        }

        if let Some(cooldown) = policy.cooldown_secs {
            if cooldown_checked.insert(admission.wallet_id) {
                if let Some(last) = usage.last_admitted_at {
                    let ready_at = i64::try_from(cooldown)
                        .ok()
                        .and_then(Duration::try_seconds)
                        .and_then(|d| last.checked_add_signed(d))
                        .ok_or_else(|| {
                            EngineError::Validation(format!("cooldown_secs {} out of range", cooldown))
                        })?;
                    if now < ready_at {
                        return Err(EngineError::policy(
                            PolicyRule::Cooldown,
                            format!("wallet cooling down until {}", ready_at),
                        ));
                    }
                }
            }
        }

        Ok(())
    }

    /// Field-wise merge without usage data.
    fn merge(&self, wallet_id: Uuid, now: DateTime<Utc>) -> EffectivePolicy {
        let settings = self.settings.load();
        let own = self.wallets.get(&wallet_id).map(|p| p.clone());
        let candidates = self.candidates(wallet_id);

        let mut effective = EffectivePolicy {
            wallet_id,
            min_approvers: settings.policy.default_min_approvers,
            daily_limit: None,
            per_tx_limit: None,
            address_whitelist: None,
            cooldown_secs: None,
            require_mfa: false,
            sources: FieldSources::default(),
            applied_policies: Vec::new(),
            inert_policies: Vec::new(),
            window_started_at: now,
            spent_today: BTreeMap::new(),
            remaining_daily: BTreeMap::new(),
        };

        let mut layers: Vec<(PolicySource, &PolicyRules)> = Vec::new();
        if let Some(own) = &own {
            layers.push((PolicySource::Wallet, &own.rules));
        }
        for candidate in &candidates {
            if candidate.is_enforced {
                effective.applied_policies.push(candidate.id);
                layers.push((PolicySource::Pool { policy_id: candidate.id }, &candidate.rules));
            } else {
                effective.inert_policies.push(candidate.id);
            }
        }

        let mut set = FieldSet::default();
        for (source, rules) in layers {
            if let (false, Some(v)) = (set.min_approvers, rules.min_approvers) {
                effective.min_approvers = v;
                effective.sources.min_approvers = source;
                set.min_approvers = true;
            }
            if let (false, Some(v)) = (set.daily_limit, rules.daily_limit) {
                effective.daily_limit = Some(v);
                effective.sources.daily_limit = source;
                set.daily_limit = true;
            }
            if let (false, Some(v)) = (set.per_tx_limit, rules.per_tx_limit) {
                effective.per_tx_limit = Some(v);
                effective.sources.per_tx_limit = source;
                set.per_tx_limit = true;
            }
            if let (false, Some(v)) = (set.address_whitelist, rules.address_whitelist.as_ref()) {
                effective.address_whitelist = Some(v.clone());
                effective.sources.address_whitelist = source;
                set.address_whitelist = true;
            }
            if let (false, Some(v)) = (set.cooldown_secs, rules.cooldown_secs) {
                effective.cooldown_secs = Some(v);
                effective.sources.cooldown_secs = source;
                set.cooldown_secs = true;
            }
            if let (false, Some(v)) = (set.require_mfa, rules.require_mfa) {
                effective.require_mfa = v;
                effective.sources.require_mfa = source;
                set.require_mfa = true;
            }
        }

        let anchor = own.map(|p| p.last_reset_at).unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        effective.window_started_at = window_start(anchor, settings.policy.daily_window_secs, now);
        effective
    }

    /// Pool policies that apply to the wallet, highest priority first.
    fn candidates(&self, wallet_id: Uuid) -> Vec<PoolPolicy> {
        let parent_link = self.pools.active_parent(wallet_id);
        let mut out: Vec<PoolPolicy> = self
            .pool_policies
            .iter()
            .filter(|p| {
                let as_parent = p.parent_wallet_id == wallet_id
                    && p.applies_to.covers_parent()
                    && p.relationship_id.is_none();
                let as_child = parent_link.as_ref().is_some_and(|link| {
                    p.parent_wallet_id == link.parent_wallet_id
                        && p.applies_to.covers_children()
                        && p.relationship_id.is_none_or(|r| r == link.id)
                });
                as_parent || as_child
            })
            .map(|p| p.clone())
            .collect();
        out.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.sequence.cmp(&b.sequence)));
        out
    }
}

#[derive(Default)]
struct FieldSet {
    min_approvers: bool,
    daily_limit: bool,
    per_tx_limit: bool,
    address_whitelist: bool,
    cooldown_secs: bool,
    require_mfa: bool,
}

fn validate_rules(rules: &PolicyRules) -> EngineResult<()> {
    if rules.cooldown_secs.is_some_and(|c| c > MAX_PERIOD_SECS) {
        return Err(EngineError::Validation(format!(
            "cooldown_secs must not exceed {}",
            MAX_PERIOD_SECS
        )));
    }
    if let (Some(per_tx), Some(daily)) = (rules.per_tx_limit, rules.daily_limit) {
        if per_tx > daily {
            return Err(EngineError::Validation(format!(
                "per_tx_limit {} exceeds daily_limit {}",
                per_tx, daily
            )));
        }
    }
    if rules
        .address_whitelist
        .as_ref()
        .is_some_and(|list| list.iter().any(|a| a.trim().is_empty()))
    {
        return Err(EngineError::Validation("whitelist entries must not be empty".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::engine::events::EventBus;
    use crate::pools::{NewRelationship, PermissionLevel};
    use crate::policy::types::PolicyScope;

    struct Fixture {
        resolver: PolicyResolver,
        pools: Arc<PoolHierarchy>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::starting_now());
        let pools = Arc::new(PoolHierarchy::new(16, clock.clone(), EventBus::new(16)));
        let settings = Arc::new(ArcSwap::from_pointee(RuntimeSettings::default()));
        let resolver = PolicyResolver::new(pools.clone(), settings, clock.clone());
        Fixture { resolver, pools, clock }
    }

    fn withdrawal(wallet_id: Uuid, amount: u64) -> Admission {
        Admission {
            transaction_id: Uuid::new_v4(),
            wallet_id,
            amount: Amount::from(amount),
            currency: "BTC".into(),
            to_address: Some("bc1qdest".into()),
            outbound: true,
            internal: false,
        }
    }

    fn pool_policy(parent: Uuid, scope: PolicyScope, priority: i32, rules: PolicyRules) -> NewPoolPolicy {
        NewPoolPolicy {
            parent_wallet_id: parent,
            relationship_id: None,
            name: format!("p{}", priority),
            applies_to: scope,
            priority,
            is_enforced: true,
            rules,
        }
    }

    #[test]
    fn test_wallet_policy_wins_then_priority() {
        let f = fixture();
        let (parent, child) = (Uuid::new_v4(), Uuid::new_v4());
        f.pools
            .create_relationship(NewRelationship {
                parent_wallet_id: parent,
                child_wallet_id: child,
                relation_type: "sub_account".into(),
                permission_level: PermissionLevel::Full,
            })
            .unwrap();

        f.resolver
            .set_wallet_policy(child, PolicyRules { min_approvers: Some(2), ..Default::default() })
            .unwrap();
        let low = f
            .resolver
            .create_pool_policy(pool_policy(
                parent,
                PolicyScope::ChildrenOnly,
                1,
                PolicyRules { min_approvers: Some(5), cooldown_secs: Some(10), ..Default::default() },
            ))
            .unwrap();
        let high = f
            .resolver
            .create_pool_policy(pool_policy(
                parent,
                PolicyScope::Both,
                9,
                PolicyRules { cooldown_secs: Some(60), ..Default::default() },
            ))
            .unwrap();

        let eff = f.resolver.resolve(child);
        assert_eq!(eff.min_approvers, 2);
        assert_eq!(eff.sources.min_approvers, PolicySource::Wallet);
        assert_eq!(eff.cooldown_secs, Some(60));
        assert_eq!(eff.sources.cooldown_secs, PolicySource::Pool { policy_id: high.id });
        assert_eq!(eff.applied_policies, vec![high.id, low.id]);

        // children_only does not reach the parent itself
        let parent_eff = f.resolver.resolve(parent);
        assert_eq!(parent_eff.applied_policies, vec![high.id]);
    }

    #[test]
    fn test_equal_priority_older_wins() {
        let f = fixture();
        let wallet = Uuid::new_v4();
        let first = f
            .resolver
            .create_pool_policy(pool_policy(
                wallet,
                PolicyScope::ParentOnly,
                3,
                PolicyRules { min_approvers: Some(4), ..Default::default() },
            ))
            .unwrap();
        f.resolver
            .create_pool_policy(pool_policy(
                wallet,
                PolicyScope::ParentOnly,
                3,
                PolicyRules { min_approvers: Some(7), ..Default::default() },
            ))
            .unwrap();

        let eff = f.resolver.resolve(wallet);
        assert_eq!(eff.min_approvers, 4);
        assert_eq!(eff.sources.min_approvers, PolicySource::Pool { policy_id: first.id });
    }

    #[test]
    fn test_inert_policy_is_reported_not_enforced() {
        let f = fixture();
        let wallet = Uuid::new_v4();
        let mut request = pool_policy(
            wallet,
            PolicyScope::Both,
            1,
            PolicyRules { per_tx_limit: Some(Amount::from(1u64)), ..Default::default() },
        );
        request.is_enforced = false;
        let inert = f.resolver.create_pool_policy(request).unwrap();

        let eff = f.resolver.resolve(wallet);
        assert_eq!(eff.inert_policies, vec![inert.id]);
        assert!(eff.per_tx_limit.is_none());
        assert!(f.resolver.admit_all(&[withdrawal(wallet, 100)]).is_ok());
    }

    #[test]
    fn test_daily_limit_reserve_and_release() {
        let f = fixture();
        let wallet = Uuid::new_v4();
        f.resolver
            .set_wallet_policy(wallet, PolicyRules { daily_limit: Some(Amount::from(100u64)), ..Default::default() })
            .unwrap();

        let first = withdrawal(wallet, 60);
        f.resolver.admit_all(std::slice::from_ref(&first)).unwrap();
        assert_eq!(f.resolver.resolve(wallet).remaining_for("btc"), Some(Amount::from(40u64)));

        let err = f.resolver.admit_all(&[withdrawal(wallet, 50)]).unwrap_err();
        assert!(matches!(err, EngineError::PolicyViolation { rule: PolicyRule::DailyLimit, .. }));

        f.resolver.release(wallet, first.transaction_id);
        f.resolver.admit_all(&[withdrawal(wallet, 50)]).unwrap();

        // a new window starts from zero
        f.clock.advance(Duration::days(1));
        assert_eq!(f.resolver.resolve(wallet).remaining_for("BTC"), Some(Amount::from(100u64)));
    }

    #[test]
    fn test_first_wallet_policy_keeps_current_window() {
        let f = fixture();
        let (parent, child) = (Uuid::new_v4(), Uuid::new_v4());
        f.pools
            .create_relationship(NewRelationship {
                parent_wallet_id: parent,
                child_wallet_id: child,
                relation_type: "sub_account".into(),
                permission_level: PermissionLevel::Full,
            })
            .unwrap();
        f.resolver
            .create_pool_policy(pool_policy(
                parent,
                PolicyScope::ChildrenOnly,
                1,
                PolicyRules { daily_limit: Some(Amount::from(100u64)), ..Default::default() },
            ))
            .unwrap();

        f.resolver.admit_all(&[withdrawal(child, 80)]).unwrap();
        f.resolver
            .set_wallet_policy(child, PolicyRules { min_approvers: Some(2), ..Default::default() })
            .unwrap();

        assert_eq!(f.resolver.resolve(child).remaining_for("BTC"), Some(Amount::from(20u64)));
        let err = f.resolver.admit_all(&[withdrawal(child, 80)]).unwrap_err();
        assert!(matches!(err, EngineError::PolicyViolation { rule: PolicyRule::DailyLimit, .. }));
    }

    #[test]
    fn test_batch_admission_is_all_or_nothing() {
        let f = fixture();
        let wallet = Uuid::new_v4();
        f.resolver
            .set_wallet_policy(wallet, PolicyRules { daily_limit: Some(Amount::from(100u64)), ..Default::default() })
            .unwrap();

        let err = f
            .resolver
            .admit_all(&[withdrawal(wallet, 40), withdrawal(wallet, 40), withdrawal(wallet, 40)])
            .unwrap_err();
        assert!(matches!(err, EngineError::PolicyViolation { rule: PolicyRule::DailyLimit, .. }));
        assert_eq!(f.resolver.resolve(wallet).remaining_for("BTC"), Some(Amount::from(100u64)));
    }

    #[test]
    fn test_whitelist_and_internal_bypass() {
        let f = fixture();
        let wallet = Uuid::new_v4();
        f.resolver
            .set_wallet_policy(
                wallet,
                PolicyRules { address_whitelist: Some(vec!["0xAbC".into()]), ..Default::default() },
            )
            .unwrap();

        let mut tx = withdrawal(wallet, 1);
        tx.to_address = Some("0xabc".into());
        assert!(f.resolver.admit_all(&[tx.clone()]).is_ok());

        tx.to_address = Some("0xdef".into());
        let err = f.resolver.admit_all(&[tx.clone()]).unwrap_err();
        assert!(matches!(err, EngineError::PolicyViolation { rule: PolicyRule::Whitelist, .. }));

        tx.internal = true;
        assert!(f.resolver.admit_all(&[tx]).is_ok());
    }

    #[test]
    fn test_cooldown_counts_batch_once() {
        let f = fixture();
        let wallet = Uuid::new_v4();
        f.resolver
            .set_wallet_policy(wallet, PolicyRules { cooldown_secs: Some(300), ..Default::default() })
            .unwrap();

        f.resolver
            .admit_all(&[withdrawal(wallet, 1), withdrawal(wallet, 1)])
            .unwrap();
        let err = f.resolver.admit_all(&[withdrawal(wallet, 1)]).unwrap_err();
        assert!(matches!(err, EngineError::PolicyViolation { rule: PolicyRule::Cooldown, .. }));

        f.clock.advance(Duration::seconds(301));
        assert!(f.resolver.admit_all(&[withdrawal(wallet, 1)]).is_ok());
    }

    #[test]
    fn test_oversized_cooldown_rejected() {
        let f = fixture();
        let wallet = Uuid::new_v4();
        let err = f
            .resolver
            .set_wallet_policy(wallet, PolicyRules { cooldown_secs: Some(u64::MAX), ..Default::default() })
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let err = f
            .resolver
            .create_pool_policy(pool_policy(
                wallet,
                PolicyScope::Both,
                1,
                PolicyRules { cooldown_secs: Some(MAX_PERIOD_SECS + 1), ..Default::default() },
            ))
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        f.resolver
            .set_wallet_policy(wallet, PolicyRules { cooldown_secs: Some(MAX_PERIOD_SECS), ..Default::default() })
            .unwrap();
        f.resolver.admit_all(&[withdrawal(wallet, 1)]).unwrap();
        let err = f.resolver.admit_all(&[withdrawal(wallet, 1)]).unwrap_err();
        assert!(matches!(err, EngineError::PolicyViolation { rule: PolicyRule::Cooldown, .. }));
    }

    #[test]
    fn test_risk_escalation_only_raises() {
        let f = fixture();
        assert_eq!(f.resolver.required_approvals(1, 69), 1);
        assert_eq!(f.resolver.required_approvals(1, 70), 3);
        assert_eq!(f.resolver.required_approvals(5, 95), 5);
    }

    #[test]
    fn test_relationship_policy_must_match_parent() {
        let f = fixture();
        let (parent, child, stranger) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let rel = f
            .pools
            .create_relationship(NewRelationship {
                parent_wallet_id: parent,
                child_wallet_id: child,
                relation_type: "sub_account".into(),
                permission_level: PermissionLevel::Limited,
            })
            .unwrap();

        let mut request = pool_policy(stranger, PolicyScope::ChildrenOnly, 1, PolicyRules::default());
        request.relationship_id = Some(rel.id);
        assert!(matches!(
            f.resolver.create_pool_policy(request),
            Err(EngineError::Validation(_))
        ));
    }
}

//! MPC key share registry.
//!
//! The engine never touches key material. The MPC collaborator reports which
//! shares are online; the registry answers whether a wallet can currently
//! reach its signing threshold.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{EngineError, EngineResult};

/// One key share as reported by the MPC collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MpcKeyShare {
    pub wallet_id: Uuid,
    pub share_index: u16,
    /// `t` of a `t`-of-`n` scheme.
    pub threshold: u16,
    pub total_shares: u16,
    pub online: bool,
    #[serde(default)]
    pub last_seen_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThresholdStatus {
    pub wallet_id: Uuid,
    pub threshold: u16,
    pub total_shares: u16,
    pub online: u16,
    pub available: bool,
}

/// Source of signing availability.
pub trait ThresholdOracle: Send + Sync {
    fn threshold_status(&self, wallet_id: Uuid) -> ThresholdStatus;

    /// Fail with `ThresholdUnavailable` unless at least `t` shares are online.
    fn ensure_available(&self, wallet_id: Uuid) -> EngineResult<()> {
        let status = self.threshold_status(wallet_id);
        if status.available {
            Ok(())
        } else {
            Err(EngineError::ThresholdUnavailable {
                wallet_id,
                online: status.online,
                threshold: status.threshold,
            })
        }
    }
}

/// In-memory share state keyed by wallet.
pub struct ShareRegistry {
    wallets: DashMap<Uuid, BTreeMap<u16, MpcKeyShare>>,
    clock: Arc<dyn Clock>,
}

impl ShareRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            wallets: DashMap::new(),
            clock,
        }
    }

    /// Upsert a share's state.
    ///
    /// Every share of a wallet must agree on `t` and `n`.
    pub fn report(&self, mut share: MpcKeyShare) -> EngineResult<ThresholdStatus> {
        if share.threshold == 0 || share.threshold > share.total_shares {
            return Err(EngineError::Validation(format!(
                "threshold {} must be within 1..={}",
                share.threshold, share.total_shares
            )));
        }
        if share.share_index >= share.total_shares {
            return Err(EngineError::Validation(format!(
                "share_index {} out of range for {} shares",
                share.share_index, share.total_shares
            )));
        }

        let wallet_id = share.wallet_id;
        {
            let mut shares = self.wallets.entry(wallet_id).or_default();
            if let Some(existing) = shares.values().next() {
                if existing.threshold != share.threshold || existing.total_shares != share.total_shares {
                    return Err(EngineError::Validation(format!(
                        "wallet {} is registered as {}-of-{}",
                        wallet_id, existing.threshold, existing.total_shares
                    )));
                }
            }
            if share.online {
                share.last_seen_at = Some(self.clock.now());
            }
            tracing::debug!(
                wallet_id = %wallet_id,
                share_index = share.share_index,
                online = share.online,
                "Key share reported"
            );
            shares.insert(share.share_index, share);
        }

        Ok(self.threshold_status(wallet_id))
    }

    pub fn shares(&self, wallet_id: Uuid) -> Vec<MpcKeyShare> {
        self.wallets
            .get(&wallet_id)
            .map(|shares| shares.values().cloned().collect())
            .unwrap_or_default()
    }
}

impl ThresholdOracle for ShareRegistry {
    fn threshold_status(&self, wallet_id: Uuid) -> ThresholdStatus {
        let Some(shares) = self.wallets.get(&wallet_id) else {
            return ThresholdStatus {
                wallet_id,
                threshold: 0,
                total_shares: 0,
                online: 0,
                available: false,
            };
        };

        let (threshold, total_shares) = shares
            .values()
            .next()
            .map(|s| (s.threshold, s.total_shares))
            .unwrap_or((0, 0));
        let online = shares.values().filter(|s| s.online).count() as u16;

        ThresholdStatus {
            wallet_id,
            threshold,
            total_shares,
            online,
            available: threshold > 0 && online >= threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn share(wallet_id: Uuid, index: u16, online: bool) -> MpcKeyShare {
        MpcKeyShare {
            wallet_id,
            share_index: index,
            threshold: 2,
            total_shares: 3,
            online,
            last_seen_at: None,
        }
    }

    #[test]
    fn test_unknown_wallet_is_unavailable() {
        let registry = ShareRegistry::new(Arc::new(ManualClock::starting_now()));
        let wallet = Uuid::new_v4();
        let err = registry.ensure_available(wallet).unwrap_err();
        assert!(matches!(err, EngineError::ThresholdUnavailable { online: 0, .. }));
    }

    #[test]
    fn test_threshold_tracks_online_shares() {
        let registry = ShareRegistry::new(Arc::new(ManualClock::starting_now()));
        let wallet = Uuid::new_v4();

        registry.report(share(wallet, 0, true)).unwrap();
        assert!(!registry.threshold_status(wallet).available);

        let status = registry.report(share(wallet, 1, true)).unwrap();
        assert!(status.available);
        assert_eq!(status.online, 2);

        let status = registry.report(share(wallet, 1, false)).unwrap();
        assert!(!status.available);
        assert_eq!(registry.shares(wallet).len(), 2);
    }

    #[test]
    fn test_inconsistent_scheme_rejected() {
        let registry = ShareRegistry::new(Arc::new(ManualClock::starting_now()));
        let wallet = Uuid::new_v4();
        registry.report(share(wallet, 0, true)).unwrap();

        let mut other = share(wallet, 1, true);
        other.threshold = 3;
        assert!(matches!(registry.report(other), Err(EngineError::Validation(_))));

        let mut bad_index = share(wallet, 5, true);
        bad_index.share_index = 5;
        assert!(registry.report(bad_index).is_err());
    }
}

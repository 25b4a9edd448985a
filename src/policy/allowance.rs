//! Daily allowance accounting.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use crate::amount::Amount;

/// Start of the window containing `now` for windows anchored at `anchor`.
pub fn window_start(anchor: DateTime<Utc>, window_secs: u64, now: DateTime<Utc>) -> DateTime<Utc> {
    if now <= anchor || window_secs == 0 {
        return anchor;
    }
    let window = window_secs as i64;
    let elapsed = (now - anchor).num_seconds();
    anchor + Duration::seconds(elapsed - elapsed % window)
}

/// Reservations of one wallet inside the current window.
#[derive(Debug, Default)]
pub struct DailyUsage {
    pub window_start: Option<DateTime<Utc>>,
    /// Keyed by upper-cased currency code.
    spent: HashMap<String, Amount>,
    entries: HashMap<Uuid, (String, Amount)>,
    pub last_admitted_at: Option<DateTime<Utc>>,
}

impl DailyUsage {
    /// Drop reservations from an older window. Never moves backwards.
    pub fn roll(&mut self, window_start: DateTime<Utc>) {
        match self.window_start {
            Some(current) if current >= window_start => {}
            _ => {
                self.window_start = Some(window_start);
                self.spent.clear();
                self.entries.clear();
            }
        }
    }

    pub fn spent(&self, currency: &str) -> Amount {
        self.spent.get(currency).copied().unwrap_or_default()
    }

    pub fn spent_by_currency(&self) -> impl Iterator<Item = (&String, &Amount)> {
        self.spent.iter()
    }

    pub fn reserve(&mut self, transaction_id: Uuid, currency: &str, amount: Amount) {
        *self.spent.entry(currency.to_string()).or_default() += amount;
        self.entries.insert(transaction_id, (currency.to_string(), amount));
    }

    /// Give back a reservation made in the current window. Returns the released amount.
    pub fn release(&mut self, transaction_id: Uuid) -> Option<Amount> {
        let (currency, amount) = self.entries.remove(&transaction_id)?;
        if let Some(spent) = self.spent.get_mut(&currency) {
            *spent = spent.saturating_sub(amount);
        }
        Some(amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_window_start_aligns_to_anchor() {
        let anchor = Utc.with_ymd_and_hms(2024, 1, 1, 6, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 3, 5, 59, 0).unwrap();
        assert_eq!(
            window_start(anchor, 86_400, now),
            Utc.with_ymd_and_hms(2024, 1, 2, 6, 0, 0).unwrap()
        );
        assert_eq!(window_start(anchor, 86_400, anchor), anchor);
    }

    #[test]
    fn test_roll_clears_old_window() {
        let t0 = Utc::now();
        let mut usage = DailyUsage::default();
        usage.roll(t0);
        let tx = Uuid::new_v4();
        usage.reserve(tx, "BTC", Amount::from(5u64));
        assert_eq!(usage.spent("BTC"), Amount::from(5u64));

        // same window keeps reservations
        usage.roll(t0);
        assert_eq!(usage.spent("BTC"), Amount::from(5u64));

        usage.roll(t0 + Duration::days(1));
        assert_eq!(usage.spent("BTC"), Amount::ZERO);
        assert!(usage.release(tx).is_none());
    }

    #[test]
    fn test_release_returns_allowance() {
        let mut usage = DailyUsage::default();
        usage.roll(Utc::now());
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        usage.reserve(a, "ETH", Amount::from(3u64));
        usage.reserve(b, "ETH", Amount::from(4u64));
        assert_eq!(usage.release(a), Some(Amount::from(3u64)));
        assert_eq!(usage.release(a), None);
        assert_eq!(usage.spent("ETH"), Amount::from(4u64));
    }
}

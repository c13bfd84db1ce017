use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BillingError;
use crate::models::plan::PlanCode;

/// Per-user subscription record, embedded on the user row.
///
/// Invariant: `plan == Free` if and only if `expiry_date` is `None`. A paid
/// plan whose expiry has passed is stale and must be run through
/// [`Subscription::normalize`] before any other component reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub plan: PlanCode,
    /// What the user actually paid for the current term. Upgrade credit is
    /// computed from this, not from the catalog price.
    pub current_price: Decimal,
    pub start_date: Option<DateTime<Utc>>,
    pub expiry_date: Option<DateTime<Utc>>,
}

/// Result of a prorated upgrade-price calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpgradeQuote {
    pub final_price: Decimal,
    pub credit_applied: Decimal,
}

impl Default for Subscription {
    fn default() -> Self {
        Self::free()
    }
}

impl Subscription {
    pub fn free() -> Self {
        Self {
            plan: PlanCode::Free,
            current_price: Decimal::ZERO,
            start_date: None,
            expiry_date: None,
        }
    }

    /// Start a fresh full term of `plan` at `now`. A mid-cycle upgrade goes
    /// through here too: the old term is replaced, remaining days are not
    /// stacked onto the new expiry.
    pub fn paid_term(plan: PlanCode, now: DateTime<Utc>) -> Result<Self, BillingError> {
        let duration = plan
            .duration_days()
            .ok_or_else(|| BillingError::NotPurchasable(plan.to_string()))?;
        Ok(Self {
            plan,
            current_price: plan.list_price(),
            start_date: Some(now),
            expiry_date: Some(now + Duration::days(duration)),
        })
    }

    /// Lazy-expiry normalization: a lapsed paid plan collapses back to Free.
    /// Pure and idempotent; the caller persists the result if it changed.
    pub fn normalize(&self, now: DateTime<Utc>) -> Subscription {
        match self.expiry_date {
            Some(expiry) if self.plan != PlanCode::Free && now > expiry => Subscription::free(),
            _ => self.clone(),
        }
    }

    pub fn is_paid_active(&self, now: DateTime<Utc>) -> bool {
        self.plan != PlanCode::Free && self.expiry_date.map_or(false, |expiry| expiry > now)
    }

    pub fn days_until_expiry(&self, now: DateTime<Utc>) -> Option<i64> {
        self.expiry_date.map(|expiry| (expiry - now).num_days())
    }

    /// Prorated quote for moving to `target` at `now`.
    ///
    /// `self` must already be normalized. Credit is the daily value of the
    /// current plan times the whole days left on it, floored so a fractional
    /// rupee is never credited; the clamp to the plan's own duration keeps an
    /// inconsistently-edited expiry from crediting more than was paid.
    pub fn upgrade_quote(
        &self,
        target: PlanCode,
        now: DateTime<Utc>,
    ) -> Result<UpgradeQuote, BillingError> {
        if target == PlanCode::Free {
            return Err(BillingError::NotPurchasable(target.to_string()));
        }
        let list_price = target.list_price();

        let (duration, expiry) = match (self.plan.duration_days(), self.expiry_date) {
            (Some(duration), Some(expiry)) => (duration, expiry),
            // No active paid term: full list price, nothing to credit.
            _ => {
                return Ok(UpgradeQuote {
                    final_price: list_price,
                    credit_applied: Decimal::ZERO,
                })
            }
        };

        let days_left = (expiry - now).num_days().clamp(0, duration);
        let daily_rate = self.current_price / Decimal::from(duration);
        let credit = (daily_rate * Decimal::from(days_left)).floor();
        let final_price = (list_price - credit).max(Decimal::ZERO);

        Ok(UpgradeQuote {
            final_price,
            credit_applied: credit,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct SubscriptionStatusResponse {
    pub user_id: Uuid,
    pub plan: PlanCode,
    pub plan_name: &'static str,
    pub plan_rank: u8,
    pub current_price: Decimal,
    pub start_date: Option<DateTime<Utc>>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub days_until_expiry: Option<i64>,
    pub is_paid_active: bool,
}

impl SubscriptionStatusResponse {
    pub fn new(user_id: Uuid, subscription: &Subscription, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            plan: subscription.plan,
            plan_name: subscription.plan.display_name(),
            plan_rank: subscription.plan.rank(),
            current_price: subscription.current_price,
            start_date: subscription.start_date,
            expiry_date: subscription.expiry_date,
            days_until_expiry: subscription.days_until_expiry(now),
            is_paid_active: subscription.is_paid_active(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active(plan: PlanCode, price: i64, days_left: i64, now: DateTime<Utc>) -> Subscription {
        let duration = plan.duration_days().unwrap();
        Subscription {
            plan,
            current_price: Decimal::from(price),
            start_date: Some(now - Duration::days(duration - days_left)),
            expiry_date: Some(now + Duration::days(days_left)),
        }
    }

    #[test]
    fn test_free_subscription_has_no_expiry() {
        let sub = Subscription::free();
        assert_eq!(sub.plan, PlanCode::Free);
        assert_eq!(sub.expiry_date, None);
        assert_eq!(sub.current_price, Decimal::ZERO);
    }

    #[test]
    fn test_normalize_resets_lapsed_plan() {
        let now = Utc::now();
        let stale = Subscription {
            plan: PlanCode::Monthly,
            current_price: Decimal::from(199),
            start_date: Some(now - Duration::days(31)),
            expiry_date: Some(now - Duration::seconds(1)),
        };

        let normalized = stale.normalize(now);
        assert_eq!(normalized, Subscription::free());
    }

    #[test]
    fn test_normalize_keeps_active_plan() {
        let now = Utc::now();
        let sub = active(PlanCode::Monthly, 199, 15, now);
        assert_eq!(sub.normalize(now), sub);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let now = Utc::now();
        let stale = active(PlanCode::Yearly, 1499, 10, now).normalize(now + Duration::days(20));
        let later = now + Duration::days(20);
        assert_eq!(stale.normalize(later), stale.normalize(later).normalize(later));
    }

    #[test]
    fn test_quote_monthly_to_yearly_mid_cycle() {
        // 15 of 30 days left at 199: daily rate 6.63, credit 99, 1499 - 99.
        let now = Utc::now();
        let sub = active(PlanCode::Monthly, 199, 15, now);

        let quote = sub.upgrade_quote(PlanCode::Yearly, now).unwrap();
        assert_eq!(quote.credit_applied, Decimal::from(99));
        assert_eq!(quote.final_price, Decimal::from(1400));
    }

    #[test]
    fn test_quote_from_free_is_list_price() {
        let now = Utc::now();
        let quote = Subscription::free().upgrade_quote(PlanCode::Monthly, now).unwrap();
        assert_eq!(quote.final_price, Decimal::from(199));
        assert_eq!(quote.credit_applied, Decimal::ZERO);
    }

    #[test]
    fn test_quote_never_credits_more_than_paid() {
        // Expiry 400 days out on a 365-day plan only happens via a bad
        // manual edit; days left are clamped to the plan's own duration.
        let now = Utc::now();
        let sub = active(PlanCode::Yearly, 1499, 400, now);

        let quote = sub.upgrade_quote(PlanCode::Yearly, now).unwrap();
        assert!(quote.credit_applied <= sub.current_price);
        assert!(quote.final_price >= Decimal::ZERO);
    }

    #[test]
    fn test_quote_lapsed_term_yields_no_credit() {
        let now = Utc::now();
        let sub = active(PlanCode::Monthly, 199, -3, now);
        let quote = sub.upgrade_quote(PlanCode::Yearly, now).unwrap();
        assert_eq!(quote.credit_applied, Decimal::ZERO);
        assert_eq!(quote.final_price, Decimal::from(1499));
    }

    #[test]
    fn test_credit_shrinks_as_time_passes() {
        let now = Utc::now();
        let sub = active(PlanCode::SixMonth, 899, 120, now);

        let mut previous = sub.upgrade_quote(PlanCode::Yearly, now).unwrap().credit_applied;
        for day in [10, 40, 90, 120, 150] {
            let later = now + Duration::days(day);
            let credit = sub.upgrade_quote(PlanCode::Yearly, later).unwrap().credit_applied;
            assert!(credit <= previous);
            previous = credit;
        }
    }

    #[test]
    fn test_quote_for_free_target_is_rejected() {
        let now = Utc::now();
        assert!(Subscription::free().upgrade_quote(PlanCode::Free, now).is_err());
    }

    #[test]
    fn test_paid_term_replaces_rather_than_extends() {
        let now = Utc::now();
        let sub = Subscription::paid_term(PlanCode::Yearly, now).unwrap();
        assert_eq!(sub.plan, PlanCode::Yearly);
        assert_eq!(sub.current_price, Decimal::from(1499));
        assert_eq!(sub.expiry_date, Some(now + Duration::days(365)));
        assert!(sub.is_paid_active(now));
    }

    #[test]
    fn test_paid_term_rejects_free() {
        assert!(Subscription::paid_term(PlanCode::Free, Utc::now()).is_err());
    }
}

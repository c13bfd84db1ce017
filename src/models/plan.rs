use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::BillingError;

/// Closed set of subscription tiers. Plan identity lives here and nowhere
/// else; free-text plan names are converted once at the boundary via
/// [`PlanCode::classify`] and never substring-matched in business logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanCode {
    Free,
    Monthly,
    SixMonth,
    Yearly,
}

impl PlanCode {
    pub const PAID: [PlanCode; 3] = [PlanCode::Monthly, PlanCode::SixMonth, PlanCode::Yearly];

    /// Term length in days. `Free` has no term.
    pub fn duration_days(&self) -> Option<i64> {
        match self {
            PlanCode::Free => None,
            PlanCode::Monthly => Some(30),
            PlanCode::SixMonth => Some(180),
            PlanCode::Yearly => Some(365),
        }
    }

    /// Catalog price in whole rupees.
    pub fn list_price(&self) -> Decimal {
        match self {
            PlanCode::Free => Decimal::ZERO,
            PlanCode::Monthly => Decimal::from(199),
            PlanCode::SixMonth => Decimal::from(899),
            PlanCode::Yearly => Decimal::from(1499),
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            PlanCode::Free => "Free",
            PlanCode::Monthly => "Monthly Plan",
            PlanCode::SixMonth => "6-Month Plan",
            PlanCode::Yearly => "Yearly Plan",
        }
    }

    /// Ordering used by the UI to grey out plans at or below the active tier.
    pub fn rank(&self) -> u8 {
        match self {
            PlanCode::Free => 0,
            PlanCode::Monthly => 1,
            PlanCode::SixMonth => 2,
            PlanCode::Yearly => 3,
        }
    }

    /// Resolve a plan name to its code. Accepts the canonical snake_case
    /// codes and the legacy display names, exact match only: a name like
    /// "6-Month Plan" must never fall through to `Monthly` because it
    /// happens to contain "Month".
    pub fn classify(name: &str) -> Result<PlanCode, BillingError> {
        match name.trim() {
            "free" | "Free" => Ok(PlanCode::Free),
            "monthly" | "Monthly Plan" => Ok(PlanCode::Monthly),
            "six_month" | "6-Month Plan" => Ok(PlanCode::SixMonth),
            "yearly" | "Yearly Plan" => Ok(PlanCode::Yearly),
            other => Err(BillingError::UnknownPlan(other.to_string())),
        }
    }
}

impl std::fmt::Display for PlanCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanCode::Free => write!(f, "free"),
            PlanCode::Monthly => write!(f, "monthly"),
            PlanCode::SixMonth => write!(f, "six_month"),
            PlanCode::Yearly => write!(f, "yearly"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_entries() {
        assert_eq!(PlanCode::Monthly.duration_days(), Some(30));
        assert_eq!(PlanCode::SixMonth.duration_days(), Some(180));
        assert_eq!(PlanCode::Yearly.duration_days(), Some(365));
        assert_eq!(PlanCode::Free.duration_days(), None);

        assert_eq!(PlanCode::Monthly.list_price(), Decimal::from(199));
        assert_eq!(PlanCode::SixMonth.list_price(), Decimal::from(899));
        assert_eq!(PlanCode::Yearly.list_price(), Decimal::from(1499));
        assert_eq!(PlanCode::Free.list_price(), Decimal::ZERO);
    }

    #[test]
    fn test_classify_exact_display_names() {
        assert_eq!(PlanCode::classify("Monthly Plan").unwrap(), PlanCode::Monthly);
        assert_eq!(PlanCode::classify("6-Month Plan").unwrap(), PlanCode::SixMonth);
        assert_eq!(PlanCode::classify("Yearly Plan").unwrap(), PlanCode::Yearly);
        assert_eq!(PlanCode::classify("yearly").unwrap(), PlanCode::Yearly);
    }

    #[test]
    fn test_classify_rejects_partial_names() {
        // The legacy substring matcher would have accepted all of these.
        assert!(PlanCode::classify("Month").is_err());
        assert!(PlanCode::classify("6-Month").is_err());
        assert!(PlanCode::classify("Yearly Plan Deluxe").is_err());
        assert!(PlanCode::classify("").is_err());
    }

    #[test]
    fn test_rank_ordering() {
        assert!(PlanCode::Free.rank() < PlanCode::Monthly.rank());
        assert!(PlanCode::Monthly.rank() < PlanCode::SixMonth.rank());
        assert!(PlanCode::SixMonth.rank() < PlanCode::Yearly.rank());
    }
}

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::plan::PlanCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Created,
    Paid,
    Failed,
}

/// Append-only log entry for a gateway transaction.
///
/// Rows are never mutated after insert, with one exception: `user_id` is
/// cleared when the purchasing account is deleted. Payment rows are financial
/// history, not user data, so they outlive the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    #[serde(rename = "payment_record_id", with = "crate::models::common::uuid_string")]
    pub id: Uuid,
    /// Cleared (not cascaded) when the account is deleted.
    #[serde(default, with = "crate::models::common::uuid_string_opt")]
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub gateway_order_id: Option<String>,
    /// Gateway payment id, e.g. `pay_Kz456...`. Absent while the order is
    /// still open; `free_<millis>` for a fully-credited upgrade.
    #[serde(default)]
    pub gateway_payment_id: Option<String>,
    pub status: PaymentStatus,
    pub amount_paid: Decimal,
    pub plan_purchased: PlanCode,
    #[serde(default)]
    pub receipt_email: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PaymentRecord {
    /// Entry written when a gateway order is opened, before any money moves.
    pub fn order_opened(
        user_id: Uuid,
        order_id: String,
        amount_due: Decimal,
        plan: PlanCode,
        email: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: Some(user_id),
            gateway_order_id: Some(order_id),
            gateway_payment_id: None,
            status: PaymentStatus::Created,
            amount_paid: amount_due,
            plan_purchased: plan,
            receipt_email: Some(email.to_string()),
            created_at: Utc::now(),
        }
    }

    pub fn confirmed(
        user_id: Uuid,
        order_id: Option<String>,
        payment_id: String,
        amount_paid: Decimal,
        plan: PlanCode,
        email: &str,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: Some(user_id),
            gateway_order_id: order_id,
            gateway_payment_id: Some(payment_id),
            status: PaymentStatus::Paid,
            amount_paid,
            plan_purchased: plan,
            receipt_email: Some(email.to_string()),
            created_at: now,
        }
    }

    pub fn failed(
        user_id: Uuid,
        order_id: Option<String>,
        payment_id: String,
        plan: PlanCode,
        email: &str,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: Some(user_id),
            gateway_order_id: order_id,
            gateway_payment_id: Some(payment_id),
            status: PaymentStatus::Failed,
            amount_paid: Decimal::ZERO,
            plan_purchased: plan,
            receipt_email: Some(email.to_string()),
            created_at: now,
        }
    }
}

/// Identifier recorded for upgrades fully covered by credit, where no
/// gateway order ever exists.
pub fn synthetic_payment_id(now: DateTime<Utc>) -> String {
    format!("free_{}", now.timestamp_millis())
}

#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutRequest {
    pub user_id: Uuid,
    /// Plan code or legacy display name, classified at this boundary.
    #[validate(length(min = 1, message = "Plan is required"))]
    pub plan: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckoutResponse {
    /// Credit covered the whole price; the plan switch already happened.
    FreeUpgrade {
        payment_id: String,
        credit_applied: Decimal,
    },
    /// Gateway order opened; the client completes payment and the gateway
    /// callback lands on the confirm endpoint.
    OrderCreated {
        order_id: String,
        amount_due: Decimal,
        credit_applied: Decimal,
        currency: String,
    },
}

/// Gateway callback payload, delivered after checkout completes. The
/// signature covers `"{order_id}|{payment_id}"`.
#[derive(Debug, Deserialize)]
pub struct PaymentConfirmation {
    pub user_id: Uuid,
    pub plan: String,
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub razorpay_signature: String,
    pub amount: Decimal,
    /// "paid" or "failed" as reported by the gateway.
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirmed_record_is_paid_and_linked() {
        let user_id = Uuid::new_v4();
        let record = PaymentRecord::confirmed(
            user_id,
            Some("order_Kz123".to_string()),
            "pay_Kz456".to_string(),
            Decimal::from(1400),
            PlanCode::Yearly,
            "jane@example.com",
            Utc::now(),
        );
        assert_eq!(record.status, PaymentStatus::Paid);
        assert_eq!(record.user_id, Some(user_id));
        assert_eq!(record.plan_purchased, PlanCode::Yearly);
        assert_eq!(record.amount_paid, Decimal::from(1400));
    }

    #[test]
    fn test_synthetic_payment_id_shape() {
        let id = synthetic_payment_id(Utc::now());
        assert!(id.starts_with("free_"));
        assert!(id["free_".len()..].chars().all(|c| c.is_ascii_digit()));
    }
}

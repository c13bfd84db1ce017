use anyhow::anyhow;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::BillingError;
use crate::models::{
    payment::{synthetic_payment_id, CheckoutResponse, PaymentRecord},
    plan::PlanCode,
    subscription::{Subscription, UpgradeQuote},
    user::User,
};
use crate::services::{
    database::DatabaseService, notifier::ReceiptNotifier, razorpay::RazorpayClient,
};

/// Orchestrates every subscription read and transition. All expiry checks,
/// quotes, and payment confirmations go through here so the lazy-expiry and
/// proration rules exist in exactly one place.
#[derive(Clone)]
pub struct SubscriptionLedger {
    db: DatabaseService,
    gateway: RazorpayClient,
    notifier: ReceiptNotifier,
    currency: String,
}

impl SubscriptionLedger {
    pub fn new(
        db: DatabaseService,
        gateway: RazorpayClient,
        notifier: ReceiptNotifier,
        currency: String,
    ) -> Self {
        Self {
            db,
            gateway,
            notifier,
            currency,
        }
    }

    /// Fetch the user with lazy expiry applied. A lapsed term is reset to
    /// Free and written back before anything else sees it. The write-back is
    /// conditional on the state that was read, so it can never clobber a
    /// payment confirmation that landed in between; on a miss the row is
    /// re-read and re-evaluated.
    pub async fn load_effective_user(
        &self,
        user_id: &Uuid,
        now: DateTime<Utc>,
    ) -> Result<User, BillingError> {
        for _ in 0..3 {
            let user = self
                .db
                .get_user(user_id)
                .await?
                .ok_or(BillingError::UserNotFound)?;

            let normalized = user.subscription.normalize(now);
            if normalized == user.subscription {
                return Ok(user);
            }

            log::info!("Subscription for {} lapsed; resetting to free", user.email);
            if let Some(updated) = self
                .db
                .normalize_subscription(user_id, &user.subscription, &normalized)
                .await?
            {
                return Ok(updated);
            }
        }

        Err(BillingError::Storage(anyhow!(
            "subscription for {} kept changing while lazy expiry was applied",
            user_id
        )))
    }

    pub async fn get_effective_subscription(
        &self,
        user_id: &Uuid,
        now: DateTime<Utc>,
    ) -> Result<Subscription, BillingError> {
        Ok(self.load_effective_user(user_id, now).await?.subscription)
    }

    pub async fn get_upgrade_quote(
        &self,
        user_id: &Uuid,
        target: PlanCode,
        now: DateTime<Utc>,
    ) -> Result<UpgradeQuote, BillingError> {
        let user = self.load_effective_user(user_id, now).await?;
        user.subscription.upgrade_quote(target, now)
    }

    /// Start a purchase. A fully-credited upgrade is applied immediately
    /// with a synthetic payment id; otherwise a gateway order is opened for
    /// exactly the quoted price and nothing local changes until the
    /// confirmation callback arrives.
    pub async fn begin_checkout(
        &self,
        user_id: &Uuid,
        target: PlanCode,
        now: DateTime<Utc>,
    ) -> Result<CheckoutResponse, BillingError> {
        let user = self.load_effective_user(user_id, now).await?;
        let quote = user.subscription.upgrade_quote(target, now)?;

        if quote.final_price.is_zero() {
            let payment_id = synthetic_payment_id(now);
            self.confirm_payment(user_id, target, &payment_id, None, Decimal::ZERO, now)
                .await?;
            return Ok(CheckoutResponse::FreeUpgrade {
                payment_id,
                credit_applied: quote.credit_applied,
            });
        }

        let receipt = format!("txn_{}", now.timestamp_millis());
        let order = self
            .gateway
            .create_order(quote.final_price, &self.currency, &receipt)
            .await
            .map_err(BillingError::GatewayUnavailable)?;

        log::info!(
            "Opened order {} for {} paise ({} -> {})",
            order.order_id,
            order.amount_minor,
            user.subscription.plan,
            target
        );

        let opened = PaymentRecord::order_opened(
            user.id,
            order.order_id.clone(),
            quote.final_price,
            target,
            &user.email,
        );
        self.db.create_payment(&opened).await?;

        Ok(CheckoutResponse::OrderCreated {
            order_id: order.order_id,
            amount_due: quote.final_price,
            credit_applied: quote.credit_applied,
            currency: order.currency,
        })
    }

    /// Record a successful payment and replace the active term with a full
    /// new term of `target`. Idempotent on `gateway_payment_id`: duplicate
    /// webhook deliveries return the already-applied state untouched.
    pub async fn confirm_payment(
        &self,
        user_id: &Uuid,
        target: PlanCode,
        gateway_payment_id: &str,
        gateway_order_id: Option<String>,
        amount_paid: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(Subscription, PaymentRecord), BillingError> {
        if let Some(existing) = self
            .db
            .get_paid_payment_by_gateway_id(gateway_payment_id)
            .await?
        {
            log::info!(
                "Duplicate confirmation for {}; transition already applied",
                gateway_payment_id
            );
            let subscription = self.get_effective_subscription(user_id, now).await?;
            return Ok((subscription, existing));
        }

        let user = self
            .db
            .get_user(user_id)
            .await?
            .ok_or(BillingError::UserNotFound)?;

        // The new term carries the catalog price, not the credited amount
        // actually charged: the next upgrade's credit is based on list value.
        let subscription = Subscription::paid_term(target, now)?;
        let record = PaymentRecord::confirmed(
            user.id,
            gateway_order_id,
            gateway_payment_id.to_string(),
            amount_paid,
            target,
            &user.email,
            now,
        );

        let applied = self
            .db
            .apply_paid_transition(user_id, &subscription, &record)
            .await?;

        // A cancelled transition left nothing behind. It lost either to a
        // concurrent delivery of the same payment, which is a duplicate and
        // answered with the already-applied state, or to an account deletion.
        let (user, record) = match applied {
            Some(applied) => applied,
            None => {
                if let Some(existing) = self
                    .db
                    .get_paid_payment_by_gateway_id(gateway_payment_id)
                    .await?
                {
                    log::info!(
                        "Confirmation for {} lost a concurrent-delivery race; transition already applied",
                        gateway_payment_id
                    );
                    let subscription = self.get_effective_subscription(user_id, now).await?;
                    return Ok((subscription, existing));
                }
                if self.db.get_user(user_id).await?.is_none() {
                    return Err(BillingError::UserNotFound);
                }
                return Err(BillingError::InconsistentWrite);
            }
        };

        let notifier = self.notifier.clone();
        let payment_id = gateway_payment_id.to_string();
        let plan_name = target.display_name();
        tokio::spawn(async move {
            notifier
                .send_payment_receipt(&user.email, &user.first_name, &payment_id, amount_paid, plan_name)
                .await;
        });

        Ok((subscription, record))
    }

    /// Log a failed gateway payment. No subscription state changes. The row
    /// only links accounts that actually exist.
    pub async fn record_failed_payment(
        &self,
        user_id: &Uuid,
        target: PlanCode,
        gateway_payment_id: &str,
        gateway_order_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<PaymentRecord, BillingError> {
        let user = self
            .db
            .get_user(user_id)
            .await?
            .ok_or(BillingError::UserNotFound)?;

        let record = PaymentRecord::failed(
            user.id,
            gateway_order_id,
            gateway_payment_id.to_string(),
            target,
            &user.email,
            now,
        );
        Ok(self.db.create_payment(&record).await?)
    }
}

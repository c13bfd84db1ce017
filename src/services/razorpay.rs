use anyhow::{anyhow, Result};
use hmac::{Hmac, Mac};
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use sha2::Sha256;

use crate::config::RazorpayConfig;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone)]
pub struct GatewayOrder {
    pub order_id: String,
    pub amount_minor: u64,
    pub currency: String,
}

/// Razorpay Orders API collaborator. Owns order creation and callback
/// signature checks; it never touches subscription state.
#[derive(Clone)]
pub struct RazorpayClient {
    client: Client,
    config: RazorpayConfig,
}

impl RazorpayClient {
    pub fn new(config: RazorpayConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Open an order for `amount` rupees. Gateway amounts are in paise, so
    /// the conversion to minor units happens here and nowhere else.
    pub async fn create_order(
        &self,
        amount: Decimal,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder> {
        let amount_minor = to_minor_units(amount)?;

        let payload = json!({
            "amount": amount_minor,
            "currency": currency,
            "receipt": receipt,
        });

        log::info!("Creating gateway order for {} {} ({})", amount, currency, receipt);

        let response = self
            .client
            .post(format!("{}/v1/orders", self.config.api_base))
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(anyhow!("Order creation failed: {}", error_text));
        }

        let order: Value = response.json().await?;
        let order_id = order["id"]
            .as_str()
            .ok_or_else(|| anyhow!("No order id in gateway response"))?;

        log::info!("Gateway order created: {}", order_id);

        Ok(GatewayOrder {
            order_id: order_id.to_string(),
            amount_minor,
            currency: currency.to_string(),
        })
    }

    /// Verify the checkout callback signature: HMAC-SHA256 of
    /// `"{order_id}|{payment_id}"` keyed with the API secret.
    pub fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        let mut mac = match HmacSha256::new_from_slice(self.config.key_secret.as_bytes()) {
            Ok(mac) => mac,
            Err(_) => return false,
        };

        mac.update(format!("{}|{}", order_id, payment_id).as_bytes());
        let expected = hex::encode(mac.finalize().into_bytes());

        expected == signature
    }
}

/// Whole-rupee amount to paise.
pub fn to_minor_units(amount: Decimal) -> Result<u64> {
    (amount * Decimal::from(100))
        .to_u64()
        .ok_or_else(|| anyhow!("Amount {} cannot be expressed in minor units", amount))
}

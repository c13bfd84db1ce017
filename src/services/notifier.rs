use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::json;

/// Payment-receipt notification. Best-effort: a delivery failure is logged
/// and never rolls back the payment it announces.
#[derive(Clone)]
pub struct ReceiptNotifier {
    client: Client,
    webhook_url: Option<String>,
}

impl ReceiptNotifier {
    pub fn new(webhook_url: Option<String>) -> Self {
        Self {
            client: Client::new(),
            webhook_url,
        }
    }

    pub async fn send_payment_receipt(
        &self,
        email: &str,
        first_name: &str,
        payment_id: &str,
        amount: Decimal,
        plan_name: &str,
    ) {
        let Some(url) = &self.webhook_url else {
            log::info!(
                "Payment receipt (log only): {} paid {} for {} ({})",
                email,
                amount,
                plan_name,
                payment_id
            );
            return;
        };

        let payload = json!({
            "email": email,
            "first_name": first_name,
            "payment_id": payment_id,
            "amount": amount,
            "plan_name": plan_name,
        });

        let result = self.client.post(url).json(&payload).send().await;
        match result {
            Ok(response) if response.status().is_success() => {
                log::info!("Payment receipt delivered for {}", payment_id);
            }
            Ok(response) => {
                log::warn!(
                    "Payment receipt for {} rejected with status {}",
                    payment_id,
                    response.status()
                );
            }
            Err(err) => {
                log::warn!("Payment receipt for {} failed: {}", payment_id, err);
            }
        }
    }
}

use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub razorpay: RazorpayConfig,
    pub app: AppConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RazorpayConfig {
    pub api_base: String,
    pub key_id: String,
    pub key_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub currency: String,
    /// Account promoted to admin at startup. Replaces the legacy
    /// "first registered user becomes admin" bootstrap.
    pub admin_email: Option<String>,
    /// Where payment receipts are POSTed; logged-only when unset.
    pub receipt_webhook_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        Ok(Config {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "file://quizgenix.db".to_string()),

            razorpay: RazorpayConfig {
                api_base: env::var("RAZORPAY_API_BASE")
                    .unwrap_or_else(|_| "https://api.razorpay.com".to_string()),
                key_id: env::var("RAZORPAY_KEY_ID")?,
                key_secret: env::var("RAZORPAY_KEY_SECRET")?,
            },

            app: AppConfig {
                currency: env::var("BILLING_CURRENCY").unwrap_or_else(|_| "INR".to_string()),
                admin_email: env::var("ADMIN_EMAIL").ok(),
                receipt_webhook_url: env::var("RECEIPT_WEBHOOK_URL").ok(),
            },
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            currency: "INR".to_string(),
            admin_email: None,
            receipt_webhook_url: None,
        }
    }
}

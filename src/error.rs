use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

use crate::models::common::ApiResponse;

/// Failures surfaced by the billing core and its HTTP handlers.
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("unknown plan: {0}")]
    UnknownPlan(String),

    #[error("plan {0} cannot be purchased")]
    NotPurchasable(String),

    #[error("user not found")]
    UserNotFound,

    #[error("email already registered")]
    EmailTaken,

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("payment signature verification failed")]
    InvalidSignature,

    /// Gateway order creation failed. Retryable; no local state was changed.
    #[error("payment gateway unavailable")]
    GatewayUnavailable(#[source] anyhow::Error),

    /// The subscription update and payment insert did not both apply.
    #[error("subscription and payment writes were not applied together")]
    InconsistentWrite,

    #[error("storage failure: {0}")]
    Storage(#[from] anyhow::Error),
}

impl ResponseError for BillingError {
    fn status_code(&self) -> StatusCode {
        match self {
            BillingError::UnknownPlan(_)
            | BillingError::NotPurchasable(_)
            | BillingError::Invalid(_) => StatusCode::BAD_REQUEST,
            BillingError::UserNotFound => StatusCode::NOT_FOUND,
            BillingError::EmailTaken => StatusCode::CONFLICT,
            BillingError::InvalidSignature => StatusCode::UNAUTHORIZED,
            BillingError::GatewayUnavailable(_) => StatusCode::BAD_GATEWAY,
            BillingError::InconsistentWrite | BillingError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        if self.status_code().is_server_error() {
            log::error!("request failed: {:#}", self);
        }
        HttpResponse::build(self.status_code()).json(ApiResponse::<()>::error(self.to_string()))
    }
}

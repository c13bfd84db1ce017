use actix_web::web::{Data, Json, Path, Query};
use actix_web::{get, post, HttpResponse};
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::error::BillingError;
use crate::models::{
    common::{ApiResponse, PaginationQuery},
    payment::{CheckoutRequest, PaymentConfirmation},
    plan::PlanCode,
};
use crate::services::{
    database::DatabaseService, ledger::SubscriptionLedger, razorpay::RazorpayClient,
};

#[post("/checkout")]
pub async fn checkout(
    ledger: Data<SubscriptionLedger>,
    payload: Json<CheckoutRequest>,
) -> Result<HttpResponse, BillingError> {
    payload
        .validate()
        .map_err(|e| BillingError::Invalid(e.to_string()))?;

    let target = PlanCode::classify(&payload.plan)?;
    let response = ledger
        .begin_checkout(&payload.user_id, target, Utc::now())
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(response)))
}

/// Gateway callback after checkout. The signature is verified before the
/// ledger runs; a redelivered callback is acknowledged without re-applying
/// the transition.
#[post("/confirm")]
pub async fn confirm_payment(
    ledger: Data<SubscriptionLedger>,
    gateway: Data<RazorpayClient>,
    payload: Json<PaymentConfirmation>,
) -> Result<HttpResponse, BillingError> {
    let payload = payload.into_inner();

    if !gateway.verify_signature(
        &payload.razorpay_order_id,
        &payload.razorpay_payment_id,
        &payload.razorpay_signature,
    ) {
        return Err(BillingError::InvalidSignature);
    }

    let target = PlanCode::classify(&payload.plan)?;
    let now = Utc::now();

    if payload.status != "paid" {
        let record = ledger
            .record_failed_payment(
                &payload.user_id,
                target,
                &payload.razorpay_payment_id,
                Some(payload.razorpay_order_id),
                now,
            )
            .await?;
        return Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
            record,
            "Payment failure recorded".to_string(),
        )));
    }

    let (subscription, record) = ledger
        .confirm_payment(
            &payload.user_id,
            target,
            &payload.razorpay_payment_id,
            Some(payload.razorpay_order_id),
            payload.amount,
            now,
        )
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(serde_json::json!({
        "subscription": subscription,
        "payment": record,
    }))))
}

#[get("/history")]
pub async fn list_payments(
    db: Data<DatabaseService>,
    query: Query<PaginationQuery>,
) -> Result<HttpResponse, BillingError> {
    let page = db.list_payments(Some(query.into_inner())).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(page)))
}

#[get("/history/{user_id}")]
pub async fn list_user_payments(
    db: Data<DatabaseService>,
    path: Path<Uuid>,
    query: Query<PaginationQuery>,
) -> Result<HttpResponse, BillingError> {
    let page = db
        .get_payments_by_user(&path.into_inner(), Some(query.into_inner()))
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(page)))
}

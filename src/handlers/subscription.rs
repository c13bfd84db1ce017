use actix_web::web::{Data, Path};
use actix_web::{get, HttpResponse};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::error::BillingError;
use crate::models::{
    common::ApiResponse, plan::PlanCode, subscription::SubscriptionStatusResponse,
};
use crate::services::ledger::SubscriptionLedger;

#[derive(Debug, Serialize)]
pub struct UpgradeQuoteResponse {
    pub target_plan: PlanCode,
    pub target_plan_name: &'static str,
    pub list_price: Decimal,
    pub credit_applied: Decimal,
    pub final_price: Decimal,
}

#[derive(Debug, Serialize)]
pub struct PlanListing {
    pub plan: PlanCode,
    pub plan_name: &'static str,
    pub plan_rank: u8,
    pub duration_days: Option<i64>,
    pub list_price: Decimal,
}

#[get("/plans")]
pub async fn list_plans() -> HttpResponse {
    let plans: Vec<PlanListing> = PlanCode::PAID
        .iter()
        .map(|plan| PlanListing {
            plan: *plan,
            plan_name: plan.display_name(),
            plan_rank: plan.rank(),
            duration_days: plan.duration_days(),
            list_price: plan.list_price(),
        })
        .collect();
    HttpResponse::Ok().json(ApiResponse::success(plans))
}

#[get("/{user_id}")]
pub async fn get_subscription_status(
    ledger: Data<SubscriptionLedger>,
    path: Path<Uuid>,
) -> Result<HttpResponse, BillingError> {
    let user_id = path.into_inner();
    let now = Utc::now();
    let subscription = ledger.get_effective_subscription(&user_id, now).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(SubscriptionStatusResponse::new(
        user_id,
        &subscription,
        now,
    ))))
}

#[get("/{user_id}/quote/{plan}")]
pub async fn get_upgrade_quote(
    ledger: Data<SubscriptionLedger>,
    path: Path<(Uuid, String)>,
) -> Result<HttpResponse, BillingError> {
    let (user_id, plan) = path.into_inner();
    let target = PlanCode::classify(&plan)?;
    let quote = ledger.get_upgrade_quote(&user_id, target, Utc::now()).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(UpgradeQuoteResponse {
        target_plan: target,
        target_plan_name: target.display_name(),
        list_price: target.list_price(),
        credit_applied: quote.credit_applied,
        final_price: quote.final_price,
    })))
}

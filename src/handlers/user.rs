use actix_web::web::{Data, Json, Path};
use actix_web::{delete, get, post, HttpResponse};
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::error::BillingError;
use crate::models::{common::ApiResponse, user::CreateUserRequest};
use crate::services::{database::DatabaseService, ledger::SubscriptionLedger};

#[post("/register")]
pub async fn register_user(
    db: Data<DatabaseService>,
    payload: Json<CreateUserRequest>,
) -> Result<HttpResponse, BillingError> {
    payload
        .validate()
        .map_err(|e| BillingError::Invalid(e.to_string()))?;

    if db.get_user_by_email(&payload.email).await?.is_some() {
        return Err(BillingError::EmailTaken);
    }

    let user = db.create_user(payload.into_inner()).await?;
    log::info!("Registered user {}", user.email);
    Ok(HttpResponse::Created().json(ApiResponse::success(user)))
}

#[get("/{user_id}")]
pub async fn get_user(
    ledger: Data<SubscriptionLedger>,
    path: Path<Uuid>,
) -> Result<HttpResponse, BillingError> {
    // Reading an account counts as "seeing" it, so lazy expiry applies here.
    let user = ledger.load_effective_user(&path.into_inner(), Utc::now()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(user)))
}

#[delete("/{user_id}")]
pub async fn delete_user(
    db: Data<DatabaseService>,
    path: Path<Uuid>,
) -> Result<HttpResponse, BillingError> {
    let user_id = path.into_inner();
    if !db.delete_user(&user_id).await? {
        return Err(BillingError::UserNotFound);
    }
    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        user_id,
        "User deleted; payment history retained without a user link".to_string(),
    )))
}

use actix_web::web::Data;
use actix_web::HttpResponse;

use crate::models::common::ApiResponse;
use crate::services::database::DatabaseService;

pub async fn health_check(db: Data<DatabaseService>) -> HttpResponse {
    match db.health_check().await {
        Ok(()) => HttpResponse::Ok().json(ApiResponse::success("healthy")),
        Err(err) => {
            log::error!("Health check failed: {}", err);
            HttpResponse::ServiceUnavailable().json(ApiResponse::<()>::error(err.to_string()))
        }
    }
}

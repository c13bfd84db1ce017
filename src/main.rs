mod config;
mod error;
mod handlers;
mod models;
mod services;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use std::env;

use services::{
    database::DatabaseService, ledger::SubscriptionLedger, notifier::ReceiptNotifier,
    razorpay::RazorpayClient,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = config::Config::from_env().expect("Failed to load configuration");

    let database_service = DatabaseService::new(&config.database_url)
        .await
        .expect("Failed to initialize database");

    if let Some(admin_email) = &config.app.admin_email {
        let admin = database_service
            .ensure_admin(admin_email)
            .await
            .expect("Failed to provision admin account");
        log::info!("Admin account provisioned: {}", admin.email);
    }

    let razorpay_client = RazorpayClient::new(config.razorpay.clone());
    let notifier = ReceiptNotifier::new(config.app.receipt_webhook_url.clone());
    let ledger = SubscriptionLedger::new(
        database_service.clone(),
        razorpay_client.clone(),
        notifier,
        config.app.currency.clone(),
    );

    let port = env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let bind_address = format!("0.0.0.0:{}", port);

    log::info!("Starting QuizGenix billing server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .supports_credentials(),
            )
            .app_data(web::Data::new(database_service.clone()))
            .app_data(web::Data::new(razorpay_client.clone()))
            .app_data(web::Data::new(ledger.clone()))
            .service(
                web::scope("/api/v1")
                    .service(
                        web::scope("/users")
                            .service(handlers::user::register_user)
                            .service(handlers::user::get_user)
                            .service(handlers::user::delete_user),
                    )
                    .service(
                        web::scope("/subscriptions")
                            .service(handlers::subscription::list_plans)
                            .service(handlers::subscription::get_upgrade_quote)
                            .service(handlers::subscription::get_subscription_status),
                    )
                    .service(
                        web::scope("/payments")
                            .service(handlers::payment::checkout)
                            .service(handlers::payment::confirm_payment)
                            .service(handlers::payment::list_payments)
                            .service(handlers::payment::list_user_payments),
                    )
                    .route("/health", web::get().to(handlers::health::health_check)),
            )
    })
    .bind(&bind_address)?
    .run()
    .await
}

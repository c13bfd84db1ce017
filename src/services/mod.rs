pub mod database;
pub mod ledger;
pub mod notifier;
pub mod razorpay;

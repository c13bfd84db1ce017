pub mod common;
pub mod payment;
pub mod plan;
pub mod subscription;
pub mod user;

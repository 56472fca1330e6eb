// billing-backend/src/service/mod.rs
pub mod account_service;
pub mod event_bus;
pub mod migration_service;
pub mod subscription_service;

// billing-backend/src/api/handlers/mod.rs
pub mod account_handler;
pub mod catalog_handler;
pub mod migration_handler;
pub mod subscription_handler;

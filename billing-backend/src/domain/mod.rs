// billing-backend/src/domain/mod.rs
pub mod account_model;
pub mod bundle_model;
pub mod migration;
pub mod subscription;
pub mod subscription_event_model;
pub mod subscription_model;

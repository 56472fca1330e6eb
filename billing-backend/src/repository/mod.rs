// billing-backend/src/repository/mod.rs
pub mod account_repository;
pub mod bundle_repository;
pub mod subscription_repository;

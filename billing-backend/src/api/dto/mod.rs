// billing-backend/src/api/dto/mod.rs
pub mod account_dto;
pub mod migration_dto;
pub mod subscription_dto;

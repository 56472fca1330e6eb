// billing-backend/src/api/mod.rs
use crate::catalog::VersionedCatalog;
use crate::config::AppConfig;
use crate::service::{
    account_service::AccountService, migration_service::MigrationService,
    subscription_service::SubscriptionService,
};
use axum::http::{header, HeaderValue, Method};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, timeout::TimeoutLayer};

pub mod dto;
pub mod handlers;

/// アプリケーション状態
#[derive(Clone)]
pub struct AppState {
    pub account_service: Arc<AccountService>,
    pub subscription_service: Arc<SubscriptionService>,
    pub migration_service: Arc<MigrationService>,
    pub catalog: Arc<VersionedCatalog>,
}

/// 全エンドポイントを束ねたルーター
pub fn app_router(app_state: AppState) -> Router {
    Router::new()
        .merge(handlers::account_handler::account_router(app_state.clone()))
        .merge(handlers::subscription_handler::subscription_router(
            app_state.clone(),
        ))
        .merge(handlers::migration_handler::migration_router(
            app_state.clone(),
        ))
        .merge(handlers::catalog_handler::catalog_router(app_state))
}

/// リクエストボディの上限（移行リクエストを想定して大きめ）
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// CORS ミドルウェア設定
pub fn cors_layer(config: &AppConfig) -> Result<CorsLayer, String> {
    let origin = config
        .cors_allowed_origin
        .parse::<HeaderValue>()
        .map_err(|_| format!("Invalid CORS origin: {}", config.cors_allowed_origin))?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(3600)))
}

/// CORS・ボディサイズ上限・タイムアウトを適用したルーター
pub fn with_http_layers(router: Router, config: &AppConfig) -> Result<Router, String> {
    Ok(router
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(cors_layer(config)?))
}

// billing-backend/src/api/handlers/catalog_handler.rs

use crate::api::AppState;
use crate::catalog::versioned::CatalogSummary;
use crate::error::AppResult;
use crate::types::ApiResponse;
use axum::{extract::State, routing::get, Router};

/// 読み込み済みカタログのバージョン一覧
pub async fn get_catalog_handler(
    State(app_state): State<AppState>,
) -> AppResult<ApiResponse<CatalogSummary>> {
    Ok(ApiResponse::success(app_state.catalog.summary()))
}

pub fn catalog_router(app_state: AppState) -> Router {
    Router::new()
        .route("/catalog", get(get_catalog_handler))
        .with_state(app_state)
}

// src/error.rs

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::DbErr;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;
use validator::ValidationErrors;

/// カタログの読み込み・解決時のエラー
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Catalog I/O error: {0}")]
    Io(String),

    #[error("Catalog parse error: {0}")]
    Parse(String),

    #[error("Invalid catalog: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Trying to move to unlimited time period")]
    UnlimitedDuration,

    #[error("No catalog version in effect at {0}")]
    NoCatalogVersion(String),

    #[error("Plan not found: {0}")]
    PlanNotFound(String),

    #[error("Phase not found: {0}")]
    PhaseNotFound(String),

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Price list not found: {0}")]
    PriceListNotFound(String),
}

/// サブスクリプションAPI（作成・変更・キャンセル・移行）のエラー
#[derive(Error, Debug)]
pub enum SubscriptionApiError {
    #[error("Database error: {0}")]
    Db(#[from] DbErr),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("Account not found: {0}")]
    AccountNotFound(Uuid),

    #[error("Bundle not found: {0}")]
    BundleNotFound(Uuid),

    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(Uuid),

    #[error("Bundle {0} already has an active base subscription")]
    BaseAlreadyExists(Uuid),

    #[error("Bundle {0} has no active base subscription")]
    NoActiveBase(Uuid),

    #[error("Add-on {addon} is not available for product {base}")]
    AddOnNotAvailable { addon: String, base: String },

    #[error("Product {product} is a {actual} product, not {requested}")]
    CategoryMismatch {
        product: String,
        requested: String,
        actual: String,
    },

    #[error("Subscription {0} is cancelled")]
    SubscriptionCancelled(Uuid),

    #[error("Subscription {0} has no pending cancellation")]
    NoPendingCancel(Uuid),

    #[error("Requested date {0} is in the future")]
    RequestedDateInFuture(String),

    #[error("Invalid migration: {0}")]
    InvalidMigration(String),

    #[error("Bundle key already exists for account: {0}")]
    BundleKeyExists(String),

    #[error("Account key already exists: {0}")]
    AccountKeyExists(String),

    #[error("Corrupted subscription event: {0}")]
    CorruptedEvent(String),
}

pub type SubscriptionApiResult<T> = Result<T, SubscriptionApiError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    DbErr(#[from] DbErr),

    #[error("Item not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Multiple validation errors")]
    ValidationErrors(Vec<String>),

    #[error("Failed to parse UUID: {0}")]
    UuidError(#[from] uuid::Error),

    #[error("Validation failed")]
    ValidationFailure(#[from] ValidationErrors),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    InternalServerError(String),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    SubscriptionApi(#[from] SubscriptionApiError),
}

impl AppError {
    /// ドメインエラーを汎用のHTTPエラー分類に寄せる
    fn normalize(self) -> Self {
        match self {
            AppError::SubscriptionApi(err) => match err {
                SubscriptionApiError::Db(db_err) => AppError::DbErr(db_err),
                SubscriptionApiError::Catalog(catalog_err) => AppError::Catalog(catalog_err),
                SubscriptionApiError::AccountNotFound(_)
                | SubscriptionApiError::BundleNotFound(_)
                | SubscriptionApiError::SubscriptionNotFound(_) => {
                    AppError::NotFound(err.to_string())
                }
                SubscriptionApiError::BaseAlreadyExists(_)
                | SubscriptionApiError::SubscriptionCancelled(_)
                | SubscriptionApiError::BundleKeyExists(_)
                | SubscriptionApiError::AccountKeyExists(_) => AppError::Conflict(err.to_string()),
                SubscriptionApiError::CorruptedEvent(_) => {
                    AppError::InternalServerError(err.to_string())
                }
                other => AppError::BadRequest(other.to_string()),
            },
            AppError::Catalog(err) => match err {
                CatalogError::Io(_) | CatalogError::Parse(_) | CatalogError::Validation(_) => {
                    AppError::InternalServerError(err.to_string())
                }
                CatalogError::PlanNotFound(_)
                | CatalogError::PhaseNotFound(_)
                | CatalogError::ProductNotFound(_)
                | CatalogError::PriceListNotFound(_) => AppError::NotFound(err.to_string()),
                other => AppError::BadRequest(other.to_string()),
            },
            other => other,
        }
    }
}

// axum でエラーをHTTPレスポンスに変換するための実装
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_response) = match self.normalize() {
            AppError::DbErr(db_err) => {
                tracing::error!(error = ?db_err, "Database error");

                let status = match db_err {
                    DbErr::RecordNotFound(_) => StatusCode::NOT_FOUND,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };

                let (message, details) = match &db_err {
                    DbErr::RecordNotFound(entity) => (
                        "The requested resource was not found".to_string(),
                        Some(json!({ "entity": entity })),
                    ),
                    DbErr::Exec(_) => (
                        "A database operation failed".to_string(),
                        Some(json!({ "operation": "exec" })),
                    ),
                    DbErr::Query(_) => (
                        "A database query failed".to_string(),
                        Some(json!({ "operation": "query" })),
                    ),
                    _ => ("A database error occurred".to_string(), None),
                };

                (
                    status,
                    ErrorResponse::new(message, "database_error").with_details(details),
                )
            }
            AppError::NotFound(message) => (
                StatusCode::NOT_FOUND,
                ErrorResponse::new(message, "not_found"),
            ),
            AppError::ValidationError(message) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new(message, "validation_error"),
            ),
            AppError::ValidationErrors(errors) => {
                let mut field_errors = HashMap::new();
                for error in &errors {
                    if let Some((field, message)) = error.split_once(": ") {
                        field_errors
                            .entry(field.to_string())
                            .or_insert_with(Vec::new)
                            .push(message.to_string());
                    }
                }
                let errors_array: Vec<serde_json::Value> =
                    errors.iter().map(|e| json!({"message": e})).collect();
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse {
                        validation_errors: Some(field_errors),
                        errors: Some(errors_array),
                        ..ErrorResponse::new("Validation failed".to_string(), "validation_errors")
                    },
                )
            }
            AppError::UuidError(err) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new(format!("Invalid UUID: {}", err), "invalid_uuid"),
            ),
            AppError::ValidationFailure(errors) => {
                let field_errors: HashMap<String, Vec<String>> = errors
                    .field_errors()
                    .into_iter()
                    .map(|(field, errors)| {
                        let messages = errors
                            .iter()
                            .map(|e| {
                                e.message
                                    .as_ref()
                                    .map_or_else(|| "Invalid value".to_string(), |m| m.to_string())
                            })
                            .collect();
                        (field.to_string(), messages)
                    })
                    .collect();
                let errors_array: Vec<serde_json::Value> = field_errors
                    .iter()
                    .flat_map(|(field, messages)| {
                        messages
                            .iter()
                            .map(move |msg| json!({"message": format!("{}: {}", field, msg)}))
                    })
                    .collect();
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse {
                        validation_errors: Some(field_errors),
                        errors: Some(errors_array),
                        ..ErrorResponse::new("Validation failed".to_string(), "validation_errors")
                    },
                )
            }
            AppError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new(message, "bad_request"),
            ),
            AppError::Conflict(message) => (
                StatusCode::CONFLICT,
                ErrorResponse::new(message, "conflict"),
            ),
            AppError::InternalServerError(message) => {
                tracing::error!(error = %message, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new(
                        "An internal server error occurred".to_string(),
                        "internal_server_error",
                    ),
                )
            }
            // normalize() で分類済み
            AppError::Catalog(err) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new(err.to_string(), "catalog_error"),
            ),
            AppError::SubscriptionApi(err) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new(err.to_string(), "subscription_error"),
            ),
        };

        (status, Json(error_response)).into_response()
    }
}

// Result 型のエイリアス
pub type AppResult<T> = Result<T, AppError>;

/// 統一的なエラーレスポンス構造
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_errors: Option<HashMap<String, Vec<String>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<serde_json::Value>>,
    pub error_type: String,
}

impl ErrorResponse {
    fn new(message: String, error_type: &str) -> Self {
        Self {
            success: false,
            error: message.clone(),
            message,
            details: None,
            validation_errors: None,
            errors: None,
            error_type: error_type.to_string(),
        }
    }

    fn with_details(mut self, details: Option<serde_json::Value>) -> Self {
        self.details = details;
        self
    }
}

use crate::error::AppError;
use axum::{
    extract::{FromRequestParts, Path},
    http::request::Parts,
};
use uuid::Uuid;

/// URLパスからUUIDパラメータ名を推測する
fn extract_uuid_param_name(path: &str) -> Option<&'static str> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    // IDの直前のセグメントからパラメータ名を決める
    segments.windows(2).find_map(|pair| match pair[0] {
        "accounts" => Some("account_id"),
        "bundles" => Some("bundle_id"),
        "subscriptions" => Some("subscription_id"),
        _ => None,
    })
}

/// パスパラメータからUUIDを抽出し、検証を行う
#[derive(Debug, Clone, Copy)]
pub struct ValidatedUuid(pub Uuid);

impl<S> FromRequestParts<S> for ValidatedUuid
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(uuid_str) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|e| {
                let param_name = extract_uuid_param_name(parts.uri.path()).unwrap_or("id");
                AppError::BadRequest(format!("Missing path parameter '{}': {}", param_name, e))
            })?;

        let uuid = Uuid::parse_str(&uuid_str).map_err(|_| {
            let param_name = extract_uuid_param_name(parts.uri.path()).unwrap_or("id");
            AppError::BadRequest(format!(
                "Invalid UUID format for '{}': '{}'",
                param_name, uuid_str
            ))
        })?;

        Ok(ValidatedUuid(uuid))
    }
}

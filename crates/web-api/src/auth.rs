//! REST 请求的 Bearer 凭证提取与校验。

use application::Identity;
use axum::http::HeaderMap;

use crate::error::ApiError;
use crate::state::AppState;

/// 从 `Authorization: Bearer <token>` 提取凭证并交给身份校验器。
///
/// 校验失败统一返回 401，不区分失败原因。
pub async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Identity, ApiError> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("missing authorization header"))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::unauthorized("invalid authorization header format"))?;

    state
        .identity
        .verify(token)
        .await
        .map_err(|_| ApiError::unauthorized("unauthorized"))
}

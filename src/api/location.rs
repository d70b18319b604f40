use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use serde::Deserialize;

use crate::cache::models::location::LatestLocation;
use crate::error::AppError;
use crate::infrastructure::auth::Claims;
use crate::location::{LocationHistory, DEFAULT_HISTORY_LIMIT};
use crate::result::ApiEnvelope;
use crate::AppState;

/// 历史查询单次上限
const MAX_HISTORY_LIMIT: usize = 1000;

#[derive(Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    /// 游标，"-"表示从头读取
    #[serde(default)]
    pub after: Option<String>,
}

#[derive(Deserialize)]
pub struct CurrentQuery {
    #[serde(default)]
    pub user_id: Option<String>,
}

/// 校验请求者是否属于该家庭
async fn authorize(state: &AppState, claims: &Claims, family_id: &str) -> Result<(), AppError> {
    let families = state.families.get_user_families(&claims.sub).await;
    if families.iter().any(|f| f == family_id) {
        Ok(())
    } else {
        Err(AppError::UnauthorizedFamily)
    }
}

/// 查询家庭位置历史，支持按成员过滤与游标续读
pub async fn family_history(
    State(state): State<AppState>,
    Path(family_id): Path<String>,
    Query(query): Query<HistoryQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiEnvelope<LocationHistory>>, AppError> {
    authorize(&state, &claims, &family_id).await?;

    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .min(MAX_HISTORY_LIMIT);
    let after = query.after.as_deref().unwrap_or("-");

    let history = state
        .location_service
        .history(&family_id, query.user_id.as_deref(), limit, after)
        .await
        .map_err(|e| {
            tracing::error!("History read failed for {}: {}", family_id, e);
            AppError::TransientBackend
        })?;

    Ok(Json(ApiEnvelope::ok(history)))
}

/// 查询家庭全员当前位置；带user_id时只查单个成员（含日志恢复路径）
pub async fn family_current(
    State(state): State<AppState>,
    Path(family_id): Path<String>,
    Query(query): Query<CurrentQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiEnvelope<Vec<LatestLocation>>>, AppError> {
    authorize(&state, &claims, &family_id).await?;

    let locations = match query.user_id.as_deref() {
        Some(user_id) => state
            .location_service
            .latest_location(&family_id, user_id)
            .await
            .into_iter()
            .collect(),
        None => state.location_service.all_current(&family_id).await,
    };

    Ok(Json(ApiEnvelope::ok(locations)))
}

use axum::extract::State;
use axum::{Extension, Json};

use crate::database::models::GhostModes;
use crate::infrastructure::auth::Claims;
use crate::result::ApiEnvelope;
use crate::AppState;

/// 查询自己的隐身配置
pub async fn my_ghost_modes(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Json<ApiEnvelope<GhostModes>> {
    let modes = state.ghost.modes_of(&claims.sub).await;
    Json(ApiEnvelope::ok(modes))
}

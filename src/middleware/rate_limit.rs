use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::AppError;
use crate::infrastructure::auth::Claims;
use crate::AppState;

/// REST接口的固定窗口速率限制
/// 计数按已认证用户，窗口与阈值来自配置；
/// 计数器故障时放行，限流不应成为可用性瓶颈
pub async fn rate_limit(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    // 认证中间件先行，扩展里必有声明
    let user_id = request
        .extensions()
        .get::<Claims>()
        .map(|c| c.sub.clone())
        .unwrap_or_else(|| "anonymous".to_string());

    let key = format!("rate_limit:{}", user_id);

    // 使用INCR和EXPIRE实现计数器
    match state.store.incr(&key).await {
        Ok(count) => {
            if count == 1 {
                // 窗口内首次请求，设置过期时间
                if let Err(e) = state
                    .store
                    .expire(&key, state.config.rate_limit_window().as_secs() as i64)
                    .await
                {
                    tracing::warn!("Rate limit expire failed for {}: {}", key, e);
                }
            }

            if count > state.config.rate_limit_requests as i64 {
                return Err(AppError::RateLimited.into_response());
            }
        }
        Err(e) => {
            tracing::warn!("Rate limit counter failed for {}: {}", key, e);
        }
    }

    Ok(next.run(request).await)
}

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::AppError;
use crate::infrastructure::auth::extract_bearer;
use crate::AppState;

/// REST接口的认证中间件
/// 校验Bearer令牌并把声明注入请求扩展
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    // 从请求头获取Authorization
    let token = match extract_bearer(request.headers(), None) {
        Some(t) => t,
        None => return Err(AppError::Unauthenticated.into_response()),
    };

    // 验证token
    let claims = match state.verifier.verify(&token) {
        Ok(c) => c,
        Err(_) => return Err(AppError::Unauthenticated.into_response()),
    };

    // 注入用户声明到请求扩展
    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}

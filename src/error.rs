use axum::Json;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::result::ApiEnvelope;

#[derive(Debug)]
pub enum AppError {
    /// 缺失或无效的Bearer令牌
    Unauthenticated,
    /// 已认证但访问了不属于自己的家庭
    UnauthorizedFamily,
    /// 请求负载格式错误
    BadInput(String),
    /// KV/日志/总线后端暂时不可用
    TransientBackend,
    /// 记录源未配置，写操作无法完成
    RepositoryUnavailable,
    /// 速率限制触发
    RateLimited,
    InternalServerError,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, msg) = match self {
            AppError::Unauthenticated => (StatusCode::UNAUTHORIZED, "未授权访问".to_string()),
            AppError::UnauthorizedFamily => (
                StatusCode::FORBIDDEN,
                "Unauthorized family access".to_string(),
            ),
            AppError::BadInput(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::TransientBackend => (
                StatusCode::SERVICE_UNAVAILABLE,
                "存储后端暂时不可用".to_string(),
            ),
            AppError::RepositoryUnavailable => {
                (StatusCode::SERVICE_UNAVAILABLE, "记录源未配置".to_string())
            }
            AppError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "请求过于频繁".to_string()),
            AppError::InternalServerError => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "内部服务器错误".to_string(),
            ),
        };

        // 错误同样走统一响应壳，code取HTTP状态码
        let body = Json(ApiEnvelope::<()>::fail(status.as_u16() as i32, msg));

        (status, body).into_response()
    }
}

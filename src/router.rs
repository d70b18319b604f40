use axum::{middleware, routing::get, Router};

use crate::api;
use crate::gateway;
use crate::middleware::auth::auth_middleware;
use crate::middleware::rate_limit::rate_limit;
use crate::AppState;

// 创建主路由
// /ws 的认证在网关握手流程内完成，REST面走认证+限流中间件
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route(
            "/families/:family_id/locations/history",
            get(api::location::family_history),
        )
        .route(
            "/families/:family_id/locations/current",
            get(api::location::family_current),
        )
        .route("/users/me/ghost-mode", get(api::ghost::my_ghost_modes))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let api_routes = Router::new()
        .route("/health", get(api::health::health))
        .merge(protected);

    Router::new()
        .route("/ws", get(gateway::ws_handler))
        .nest("/api", api_routes)
        .with_state(state)
}

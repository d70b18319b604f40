use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use famlink_backend::bus::BusDispatcher;
use famlink_backend::config::Config;
use famlink_backend::router::create_router;
use famlink_backend::AppState;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("famlink_backend=info")),
        )
        .init();

    let config = Config::from_env();

    // 初始化KV/流存储与各服务，连接不可用则启动失败
    let state = match AppState::initialize(config.clone()).await {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("Failed to initialize backend connections: {}", e);
            std::process::exit(1);
        }
    };

    // 建立总线模式订阅，把总线事件转投给本实例的socket
    let dispatcher = BusDispatcher::new(
        state.hub.clone(),
        state.rooms.clone(),
        state.sessions.clone(),
    );
    dispatcher.start().await;

    let cors = CorsLayer::permissive();
    let app = create_router(state).layer(cors);

    let addr = config.listen_addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Server is running on {}", addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("Server error: {}", e);
    }
}

/// 等待停机信号；停机时listener关闭，存活socket随连接自然结束
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Shutdown signal received");
}

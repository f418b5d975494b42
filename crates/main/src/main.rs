//! 主应用程序入口
//!
//! 组装存储、总线、注册表与 Web 服务；启动时补订历史房间，
//! 并运行把总线事件扇出到本地连接的投递泵。

use std::sync::Arc;

use application::{ChatService, ChatServiceDependencies, RoomBus, RoomRegistry, SystemClock};
use config::AppConfig;
use infrastructure::{create_pg_pool, PgChatMessageRepository, RedisRoomBus};
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = AppConfig::from_env_with_defaults();
    config.validate()?;

    tracing::info!(
        database = config.database.url.split('@').next_back().unwrap_or("unknown"),
        "连接数据库"
    );
    let pg_pool = create_pg_pool(&config.database.url, config.database.max_connections).await?;

    // 运行迁移
    sqlx::migrate!("../../migrations").run(&pg_pool).await?;

    let (redis_bus, mut deliveries) = RedisRoomBus::connect(&config.redis).await?;
    let redis_bus = Arc::new(redis_bus);
    let bus: Arc<dyn RoomBus> = redis_bus.clone();

    let chat_service = Arc::new(ChatService::new(ChatServiceDependencies {
        message_repository: Arc::new(PgChatMessageRepository::new(pg_pool)),
        bus: bus.clone(),
        clock: Arc::new(SystemClock),
    }));

    // 启动即订阅所有出现过消息的房间，别的进程经 HTTP 发的消息
    // 也能到达本地连接
    let rooms = chat_service.active_rooms().await?;
    tracing::info!(rooms = rooms.len(), "subscribing to known rooms");
    for room in rooms {
        if let Err(err) = bus.ensure_subscribed(&room).await {
            tracing::warn!(room = %room, error = %err, "startup subscription failed");
        }
    }

    let registry = Arc::new(RoomRegistry::new());
    let jwt_service = Arc::new(JwtService::new(config.jwt.clone()));

    // 投递泵：把总线收到的事件扇出给本地房间成员
    let pump = tokio::spawn({
        let registry = registry.clone();
        async move {
            while let Some((room, event)) = deliveries.recv().await {
                let delivered = registry.deliver(&room, &event).await;
                tracing::debug!(room = %room, delivered, "fanned out room event");
            }
        }
    });

    let state = AppState::new(chat_service, bus, registry, jwt_service);
    let app = router(state, &config.server.allowed_origins);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("聊天服务器启动在 http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    redis_bus.shutdown().await;
    pump.abort();
    tracing::info!("服务器已退出");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}

//! 主应用程序入口
//!
//! 加载配置、连接 PostgreSQL 与 Redis，装配事件分发器并启动 Axum 服务。

use std::sync::Arc;

use application::{EventDispatcher, EventDispatcherDependencies, PresenceRegistry};
use config::AppConfig;
use infrastructure::Infrastructure;
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load()?;
    tracing::info!(
        database = %config.database.url.rsplit('@').next().unwrap_or("unknown"),
        redis = %config.redis.url,
        "配置加载完成"
    );

    let infrastructure = Infrastructure::connect(&config).await?;

    // 在线表只存在于本进程内
    let presence = Arc::new(PresenceRegistry::new());
    let deps = EventDispatcherDependencies::assemble(
        infrastructure.core_ports(),
        presence,
        config.shake.clone(),
        config.friendship.clone(),
    );
    let state = AppState::new(Arc::new(EventDispatcher::new(deps)));

    let app = router(state);
    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!("服务启动在 http://{}", address);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("服务已停止");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "无法监听关闭信号");
        std::future::pending::<()>().await;
    }
}

use std::{net::SocketAddr, sync::Arc};

use application::{
    memory::{InMemoryGeoStore, InMemoryKeyValueStore, InMemoryStorage},
    Clock, CorePorts, EventDispatcher, EventDispatcherDependencies, PresenceRegistry,
    SystemClock,
};
use axum::Router;
use config::{FriendshipConfig, ShakeConfig};
use domain::UserId;
use tokio::{net::TcpListener, sync::oneshot};
use web_api::{router, AppState};

/// 基于内存适配器的完整路由
pub fn build_router() -> (Router, Arc<InMemoryStorage>) {
    let storage = Arc::new(InMemoryStorage::new());
    for (id, name) in [(1, "Alice"), (2, "Bob"), (3, "Carol")] {
        storage.add_user(UserId(id), Some(name));
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let ports = CorePorts {
        chat_repository: storage.clone(),
        message_repository: storage.clone(),
        friendship_repository: storage.clone(),
        file_repository: storage.clone(),
        user_repository: storage.clone(),
        shake_repository: storage.clone(),
        geo_store: Arc::new(InMemoryGeoStore::new()),
        intent_store: Arc::new(InMemoryKeyValueStore::new(clock.clone())),
        clock,
    };
    let deps = EventDispatcherDependencies::assemble(
        ports,
        Arc::new(PresenceRegistry::new()),
        ShakeConfig::default(),
        FriendshipConfig::default(),
    );
    let state = AppState::new(Arc::new(EventDispatcher::new(deps)));

    (router(state), storage)
}

/// 在随机端口启动服务，发送信号后优雅关闭
pub async fn spawn_server(router: Router) -> (SocketAddr, oneshot::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .ok();
    });

    (addr, shutdown_tx)
}

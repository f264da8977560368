//! Web API 层。
//!
//! 提供 Axum 路由：`/ws` 把 WebSocket 连接绑定到应用层的事件分发器，
//! `/health` 报告在线连接数。

mod error;
mod routes;
mod state;
mod ws_connection;

pub use error::ApiError;
pub use routes::router;
pub use state::AppState;

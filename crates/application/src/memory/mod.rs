//! 内存适配器
//!
//! 为每个端口提供进程内实现，供单元测试和 WebSocket 流程测试使用，
//! 也可以在没有 PostgreSQL/Redis 的环境下启动服务。

mod connection;
mod storage;
mod stores;

pub use connection::RecordingConnection;
pub use storage::InMemoryStorage;
pub use stores::{InMemoryGeoStore, InMemoryKeyValueStore};

//! 基础设施层实现。
//!
//! 提供 PostgreSQL 仓储、Redis 地理索引与 TTL 存储、数据库迁移，
//! 实现应用/领域层定义的端口，并由 [`Infrastructure`] 统一装配。

pub mod builder;
pub mod migrations;
pub mod redis_store;
pub mod repository;

pub use builder::{Infrastructure, InfrastructureError};
pub use migrations::MIGRATOR;
pub use redis_store::{connect_redis, RedisGeoStore, RedisKeyValueStore};
pub use repository::{
    create_pg_pool, PgChatRepository, PgFileRepository, PgFriendshipRepository,
    PgMessageRepository, PgShakeRepository, PgStorage, PgUserRepository,
};

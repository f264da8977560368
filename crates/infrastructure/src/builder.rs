use std::sync::Arc;

use application::{CorePorts, SystemClock};
use config::AppConfig;
use thiserror::Error;
use tracing::info;

use crate::{
    migrations::MIGRATOR,
    redis_store::{connect_redis, RedisGeoStore, RedisKeyValueStore},
    repository::{create_pg_pool, PgStorage},
};

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

#[derive(Clone)]
pub struct Infrastructure {
    pub storage: Arc<PgStorage>,
    pub geo_store: Arc<RedisGeoStore>,
    pub intent_store: Arc<RedisKeyValueStore>,
}

impl Infrastructure {
    /// 连接数据库与 Redis，并执行迁移
    pub async fn connect(config: &AppConfig) -> Result<Self, InfrastructureError> {
        let pool = create_pg_pool(&config.database.url, config.database.max_connections).await?;
        MIGRATOR.run(&pool).await?;
        info!("数据库迁移完成");

        let redis = connect_redis(&config.redis.url).await?;

        Ok(Self {
            storage: Arc::new(PgStorage::new(pool)),
            geo_store: Arc::new(RedisGeoStore::new(redis.clone(), config.redis.geo_key.clone())),
            intent_store: Arc::new(RedisKeyValueStore::new(redis)),
        })
    }

    /// 以系统时钟组装应用层所需的全部端口
    pub fn core_ports(&self) -> CorePorts {
        CorePorts {
            chat_repository: self.storage.chat_repository.clone(),
            message_repository: self.storage.message_repository.clone(),
            friendship_repository: self.storage.friendship_repository.clone(),
            file_repository: self.storage.file_repository.clone(),
            user_repository: self.storage.user_repository.clone(),
            shake_repository: self.storage.shake_repository.clone(),
            geo_store: self.geo_store.clone(),
            intent_store: self.intent_store.clone(),
            clock: Arc::new(SystemClock),
        }
    }
}

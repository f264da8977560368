use std::time::Duration;

use async_trait::async_trait;
use domain::{RepositoryResult, UserId};

/// 带过期时间的键值存储端口，用于短期意图标记
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> RepositoryResult<()>;

    /// 读取未过期的值
    async fn get(&self, key: &str) -> RepositoryResult<Option<String>>;

    async fn delete(&self, key: &str) -> RepositoryResult<()>;
}

/// 用户摇一摇意图的键
pub fn shake_intent_key(user_id: UserId) -> String {
    format!("shake:intent:{}", user_id)
}

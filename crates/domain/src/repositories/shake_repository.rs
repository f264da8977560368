//! 摇一摇事件Repository接口定义

use async_trait::async_trait;
use chrono::Duration;

use crate::entities::shake::ShakeEvent;
use crate::errors::RepositoryResult;
use crate::value_objects::ChatPair;

#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait ShakeRepository: Send + Sync {
    /// 该无序用户对最近一次事件
    async fn latest_for_pair(&self, pair: ChatPair) -> RepositoryResult<Option<ShakeEvent>>;

    /// 记录新事件，`user_a` 为发起者
    ///
    /// 检查与写入是原子的：该用户对在 `cooldown` 内已有事件时返回
    /// [`RepositoryError::Conflict`](crate::errors::RepositoryError::Conflict)，不写入。
    async fn create(&self, event: ShakeEvent, cooldown: Duration)
        -> RepositoryResult<ShakeEvent>;
}

//! 好友关系Repository接口定义

use async_trait::async_trait;

use crate::entities::friendship::Friendship;
use crate::errors::RepositoryResult;
use crate::value_objects::UserId;

/// 好友关系Repository接口
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait FriendshipRepository: Send + Sync {
    /// 两个用户之间的关系（不区分方向）
    async fn find_between(&self, a: UserId, b: UserId) -> RepositoryResult<Option<Friendship>>;

    /// 写入待处理请求；两人之间已有任何记录时不重复插入，返回已有记录
    async fn create_pending(
        &self,
        follower: UserId,
        followed: UserId,
    ) -> RepositoryResult<Friendship>;

    /// 将 follower→followed 的待处理请求标记为已确认，无此请求返回 `NotFound`
    async fn confirm(&self, follower: UserId, followed: UserId) -> RepositoryResult<Friendship>;

    /// 删除 follower→followed 的待处理请求，返回是否删除了记录
    async fn remove_pending(&self, follower: UserId, followed: UserId) -> RepositoryResult<bool>;

    /// 已确认好友的ID列表
    async fn list_confirmed(&self, user: UserId) -> RepositoryResult<Vec<UserId>>;
}

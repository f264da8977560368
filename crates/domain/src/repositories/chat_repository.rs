//! 会话Repository接口定义

use async_trait::async_trait;

use crate::deletion::DeleteFor;
use crate::entities::chat::Chat;
use crate::errors::RepositoryResult;
use crate::value_objects::{ChatId, ChatPair, Timestamp, UserId};

/// 会话Repository接口
///
/// 存储层必须对无序参与者对施加唯一约束，并在冲突时返回 `RepositoryError::Conflict`。
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait ChatRepository: Send + Sync {
    /// 按无序参与者对查找会话
    async fn find_by_pair(&self, pair: ChatPair) -> RepositoryResult<Option<Chat>>;

    /// 批量按ID查找，未找到的ID直接忽略
    async fn find_by_ids(&self, ids: &[ChatId]) -> RepositoryResult<Vec<Chat>>;

    /// 创建空删除集合的新会话
    async fn create(&self, pair: ChatPair, now: Timestamp) -> RepositoryResult<Chat>;

    /// 覆盖写入删除集合
    async fn update_delete_for(
        &self,
        id: ChatId,
        delete_for: DeleteFor,
        deleted_at: Option<Timestamp>,
    ) -> RepositoryResult<()>;

    /// 用户参与的全部会话（不过滤可见性）
    async fn list_for_user(&self, user: UserId) -> RepositoryResult<Vec<Chat>>;
}

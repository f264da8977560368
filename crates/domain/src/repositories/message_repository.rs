//! 消息Repository接口定义

use async_trait::async_trait;

use crate::deletion::DeleteFor;
use crate::entities::message::{Message, NewMessage};
use crate::errors::RepositoryResult;
use crate::value_objects::{ChatId, MessageId, Timestamp};

/// 消息Repository接口
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// 持久化新消息，返回带存储分配ID的完整消息
    async fn create(&self, message: NewMessage) -> RepositoryResult<Message>;

    /// 根据ID查找消息
    async fn find_by_id(&self, id: MessageId) -> RepositoryResult<Option<Message>>;

    /// 给定会话的全部消息，按发送时间升序
    async fn list_by_chats(&self, chat_ids: &[ChatId]) -> RepositoryResult<Vec<Message>>;

    /// 覆盖写入删除集合
    async fn update_delete_for(
        &self,
        id: MessageId,
        delete_for: DeleteFor,
        deleted_at: Option<Timestamp>,
    ) -> RepositoryResult<()>;

    /// 记录已读时间
    async fn mark_read(&self, id: MessageId, read_at: Timestamp) -> RepositoryResult<()>;
}

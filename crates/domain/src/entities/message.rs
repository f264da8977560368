//! 消息实体定义
//!
//! 消息属于唯一一个会话，`reply_id` 只会指向同一会话中更早的消息。

use serde::{Deserialize, Serialize};

use crate::deletion::{DeleteFor, DeleteScope};
use crate::value_objects::{ChatId, FileId, MessageContent, MessageId, Timestamp, UserId};

/// 已持久化的消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub content: MessageContent,
    pub reply_id: Option<MessageId>,
    /// 附件，保持发送时的顺序
    pub file_ids: Vec<FileId>,
    pub send_at: Timestamp,
    pub read_at: Option<Timestamp>,
    pub delete_for: DeleteFor,
}

impl Message {
    pub fn is_visible_to(&self, user: UserId) -> bool {
        !self.delete_for.hides_for(user)
    }

    /// 对 `reader` 而言是否未读：对方发送、未读且对其可见
    pub fn is_unread_for(&self, reader: UserId) -> bool {
        self.sender_id != reader && self.read_at.is_none() && self.is_visible_to(reader)
    }

    pub fn mark_deleted(&mut self, user: UserId, scope: DeleteScope) -> bool {
        self.delete_for.apply(user, scope)
    }
}

/// 待持久化的消息，ID 由存储分配
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub content: MessageContent,
    pub reply_id: Option<MessageId>,
    pub file_ids: Vec<FileId>,
    pub send_at: Timestamp,
}

impl NewMessage {
    /// 以存储分配的ID生成完整消息
    pub fn into_message(self, id: MessageId) -> Message {
        Message {
            id,
            chat_id: self.chat_id,
            sender_id: self.sender_id,
            content: self.content,
            reply_id: self.reply_id,
            file_ids: self.file_ids,
            send_at: self.send_at,
            read_at: None,
            delete_for: DeleteFor::new(),
        }
    }
}

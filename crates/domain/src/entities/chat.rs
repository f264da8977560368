//! 会话实体定义
//!
//! 两个用户之间至多一个会话，首次发消息时惰性创建。

use serde::{Deserialize, Serialize};

use crate::deletion::{DeleteFor, DeleteScope};
use crate::entities::message::Message;
use crate::value_objects::{ChatId, ChatPair, Timestamp, UserId};

/// 一对一会话
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: ChatId,
    pub participant_a: UserId,
    pub participant_b: UserId,
    /// 对哪些用户隐藏（可包含"所有人"哨兵）
    pub delete_for: DeleteFor,
    pub created_at: Timestamp,
    /// 最近一次软删除的时间
    pub deleted_at: Option<Timestamp>,
}

impl Chat {
    pub fn new(id: ChatId, participant_a: UserId, participant_b: UserId, now: Timestamp) -> Self {
        Self {
            id,
            participant_a,
            participant_b,
            delete_for: DeleteFor::new(),
            created_at: now,
            deleted_at: None,
        }
    }

    pub fn pair(&self) -> ChatPair {
        ChatPair::new(self.participant_a, self.participant_b)
    }

    pub fn involves(&self, user: UserId) -> bool {
        self.participant_a == user || self.participant_b == user
    }

    /// 对方用户；与自己的会话返回自己
    pub fn counterpart_of(&self, user: UserId) -> Option<UserId> {
        if self.participant_a == user {
            Some(self.participant_b)
        } else if self.participant_b == user {
            Some(self.participant_a)
        } else {
            None
        }
    }

    pub fn is_soft_deleted(&self) -> bool {
        !self.delete_for.is_empty()
    }

    pub fn is_visible_to(&self, user: UserId) -> bool {
        self.involves(user) && !self.delete_for.hides_for(user)
    }

    pub fn deletion_state(&self) -> DeletionState {
        if self.delete_for.hides_for_everyone() {
            DeletionState::HiddenForEveryone
        } else if self.delete_for.is_empty() {
            DeletionState::Visible
        } else {
            DeletionState::HiddenForUsers
        }
    }

    /// 应用删除规则，发生变化时记录删除时间
    pub fn mark_deleted(&mut self, user: UserId, scope: DeleteScope, now: Timestamp) -> bool {
        let changed = self.delete_for.apply(user, scope);
        if changed {
            self.deleted_at = Some(now);
        }
        changed
    }
}

/// 一对用户之间会话的删除状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeletionState {
    /// 会话尚不存在
    Absent,
    Visible,
    /// 仅对部分参与者隐藏，新消息到达时可恢复
    HiddenForUsers,
    /// 终态：对所有人隐藏
    HiddenForEveryone,
}

impl DeletionState {
    pub fn is_soft_deleted(&self) -> bool {
        matches!(self, Self::HiddenForUsers | Self::HiddenForEveryone)
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::HiddenForUsers)
    }
}

/// 会话列表条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    pub chat_id: ChatId,
    pub counterpart_id: UserId,
    pub last_message: Option<Message>,
    pub unread_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn chat() -> Chat {
        Chat::new(ChatId(1), UserId(10), UserId(20), Utc::now())
    }

    #[test]
    fn counterpart_resolves_both_directions() {
        let chat = chat();
        assert_eq!(chat.counterpart_of(UserId(10)), Some(UserId(20)));
        assert_eq!(chat.counterpart_of(UserId(20)), Some(UserId(10)));
        assert_eq!(chat.counterpart_of(UserId(30)), None);
    }

    #[test]
    fn visibility_follows_delete_set() {
        let mut chat = chat();
        assert_eq!(chat.deletion_state(), DeletionState::Visible);

        assert!(chat.mark_deleted(UserId(10), DeleteScope::OnlyMe, Utc::now()));
        assert!(!chat.is_visible_to(UserId(10)));
        assert!(chat.is_visible_to(UserId(20)));
        assert_eq!(chat.deletion_state(), DeletionState::HiddenForUsers);
        assert!(chat.deleted_at.is_some());

        assert!(chat.mark_deleted(UserId(20), DeleteScope::Everyone, Utc::now()));
        assert!(!chat.is_visible_to(UserId(20)));
        assert_eq!(chat.deletion_state(), DeletionState::HiddenForEveryone);
    }
}

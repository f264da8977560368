//! 会话生命周期
//!
//! 负责会话的存在性判断、惰性创建、软删除与恢复，以及面向单个用户的可见性过滤。

use std::sync::Arc;

use domain::{
    Chat, ChatId, ChatPair, ChatRepository, ChatSummary, DeleteScope, DeletionState,
    MessageRepository, RepositoryError, UserId,
};

use serde::Serialize;

use crate::{clock::Clock, error::ApplicationError};

/// 一次批量删除的结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionReport {
    /// 删除集合发生变化的会话数
    pub chats_updated: usize,
    /// 删除集合发生变化的消息数
    pub messages_updated: usize,
    /// 不存在或调用者未参与的会话
    pub skipped: Vec<ChatId>,
}

pub struct ChatLifecycleManager {
    chats: Arc<dyn ChatRepository>,
    messages: Arc<dyn MessageRepository>,
    clock: Arc<dyn Clock>,
}

impl ChatLifecycleManager {
    pub fn new(
        chats: Arc<dyn ChatRepository>,
        messages: Arc<dyn MessageRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            chats,
            messages,
            clock,
        }
    }

    async fn find(&self, u1: UserId, u2: UserId) -> Result<Option<Chat>, ApplicationError> {
        Ok(self.chats.find_by_pair(ChatPair::new(u1, u2)).await?)
    }

    pub async fn exists(&self, u1: UserId, u2: UserId) -> Result<bool, ApplicationError> {
        Ok(self.find(u1, u2).await?.is_some())
    }

    pub async fn deletion_state(
        &self,
        u1: UserId,
        u2: UserId,
    ) -> Result<DeletionState, ApplicationError> {
        Ok(self
            .find(u1, u2)
            .await?
            .map(|chat| chat.deletion_state())
            .unwrap_or(DeletionState::Absent))
    }

    /// 删除集合非空（无论是哨兵还是单个用户）即视为软删除
    pub async fn is_soft_deleted(&self, u1: UserId, u2: UserId) -> Result<bool, ApplicationError> {
        Ok(self.deletion_state(u1, u2).await?.is_soft_deleted())
    }

    /// 清空删除集合，返回是否有变化
    pub async fn recover(&self, u1: UserId, u2: UserId) -> Result<bool, ApplicationError> {
        let Some(mut chat) = self.find(u1, u2).await? else {
            return Ok(false);
        };
        if chat.delete_for.is_empty() {
            return Ok(false);
        }

        chat.delete_for.clear();
        self.chats
            .update_delete_for(chat.id, chat.delete_for, None)
            .await?;

        tracing::info!(chat_id = %chat.id, user_a = %u1, user_b = %u2, "会话已恢复");
        Ok(true)
    }

    /// 幂等地获取或创建会话，参数顺序无关
    ///
    /// 并发创建同一对用户的会话时，存储层唯一约束会让后到者收到冲突，
    /// 此时重新读取并返回先到者创建的会话。
    pub async fn get_or_create(&self, u1: UserId, u2: UserId) -> Result<ChatId, ApplicationError> {
        let pair = ChatPair::new(u1, u2);
        if let Some(chat) = self.chats.find_by_pair(pair).await? {
            return Ok(chat.id);
        }

        match self.chats.create(pair, self.clock.now()).await {
            Ok(chat) => {
                tracing::info!(chat_id = %chat.id, pair = %pair, "创建新会话");
                Ok(chat.id)
            }
            Err(RepositoryError::Conflict(reason)) => {
                tracing::debug!(pair = %pair, reason = %reason, "并发创建会话冲突，读取已存在的会话");
                self.chats
                    .find_by_pair(pair)
                    .await?
                    .map(|chat| chat.id)
                    .ok_or_else(|| ApplicationError::Conflict(reason))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// 按范围删除会话，并把相同规则级联到这些会话的全部消息
    pub async fn delete_for_user(
        &self,
        chat_ids: &[ChatId],
        user: UserId,
        scope: DeleteScope,
    ) -> Result<DeletionReport, ApplicationError> {
        let now = self.clock.now();
        let mut report = DeletionReport::default();

        let found = self.chats.find_by_ids(chat_ids).await?;
        let mut affected = Vec::new();
        for id in chat_ids {
            match found.iter().find(|chat| chat.id == *id) {
                Some(chat) if chat.involves(user) => {
                    if !affected.iter().any(|c: &Chat| c.id == chat.id) {
                        affected.push(chat.clone());
                    }
                }
                _ => report.skipped.push(*id),
            }
        }

        for chat in affected.iter_mut() {
            if chat.mark_deleted(user, scope, now) {
                self.chats
                    .update_delete_for(chat.id, chat.delete_for.clone(), chat.deleted_at)
                    .await?;
                report.chats_updated += 1;
            }
        }

        let affected_ids: Vec<ChatId> = affected.iter().map(|chat| chat.id).collect();
        if !affected_ids.is_empty() {
            let messages = self.messages.list_by_chats(&affected_ids).await?;
            for mut message in messages {
                if message.mark_deleted(user, scope) {
                    self.messages
                        .update_delete_for(message.id, message.delete_for, Some(now))
                        .await?;
                    report.messages_updated += 1;
                }
            }
        }

        tracing::info!(
            user_id = %user,
            scope = ?scope,
            chats = report.chats_updated,
            messages = report.messages_updated,
            skipped = report.skipped.len(),
            "会话删除完成"
        );
        Ok(report)
    }

    /// 未读数：对方发送、未读且对 `user` 可见的消息数
    pub async fn unread_count(&self, chat_id: ChatId, user: UserId) -> Result<u64, ApplicationError> {
        let chat = self
            .chats
            .find_by_ids(&[chat_id])
            .await?
            .into_iter()
            .next()
            .filter(|chat| chat.involves(user))
            .ok_or_else(|| ApplicationError::not_found("chat", chat_id))?;

        let messages = self.messages.list_by_chats(&[chat.id]).await?;
        Ok(messages.iter().filter(|m| m.is_unread_for(user)).count() as u64)
    }

    /// 对 `user` 可见的会话列表，最近有消息的排在前面
    pub async fn visible_chats(&self, user: UserId) -> Result<Vec<ChatSummary>, ApplicationError> {
        let chats: Vec<Chat> = self
            .chats
            .list_for_user(user)
            .await?
            .into_iter()
            .filter(|chat| chat.is_visible_to(user))
            .collect();
        if chats.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<ChatId> = chats.iter().map(|chat| chat.id).collect();
        let messages = self.messages.list_by_chats(&ids).await?;

        let mut summaries: Vec<(ChatSummary, domain::Timestamp)> = chats
            .into_iter()
            .filter_map(|chat| {
                let counterpart_id = chat.counterpart_of(user)?;
                let in_chat = messages.iter().filter(|m| m.chat_id == chat.id);
                let last_message = in_chat
                    .clone()
                    .filter(|m| m.is_visible_to(user))
                    .max_by(|a, b| a.send_at.cmp(&b.send_at).then(a.id.cmp(&b.id)))
                    .cloned();
                let unread_count = in_chat.filter(|m| m.is_unread_for(user)).count() as u64;
                let activity = last_message
                    .as_ref()
                    .map(|m| m.send_at)
                    .unwrap_or(chat.created_at);
                Some((
                    ChatSummary {
                        chat_id: chat.id,
                        counterpart_id,
                        last_message,
                        unread_count,
                    },
                    activity,
                ))
            })
            .collect();

        summaries.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(summaries.into_iter().map(|(summary, _)| summary).collect())
    }
}

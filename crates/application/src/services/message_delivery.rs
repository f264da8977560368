//! 消息投递
//!
//! 会话获取或创建、软删除恢复、附件与回复解析、持久化，
//! 然后先回执发送者，再尽力通知接收者。

use std::sync::Arc;

use domain::{
    ChatId, FileId, FileRepository, MessageContent, MessageId, MessageRepository,
    NewMessage, StoredFile, Timestamp, UserId, UserRepository,
};
use serde::{Deserialize, Serialize};

use crate::{
    clock::Clock,
    error::ApplicationError,
    events::{outbound, Ack, ServerEvent},
    presence::{ConnectionHandle, NotifyOutcome, PresenceRegistry},
    services::chat_lifecycle::ChatLifecycleManager,
};

#[derive(Debug, Clone)]
pub struct SendMessageRequest {
    pub sender_id: UserId,
    pub recipient_id: UserId,
    pub content: String,
    pub reply_id: Option<MessageId>,
    pub file_ids: Vec<FileId>,
}

/// 被回复消息的上下文，随消息一起回显
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyContext {
    pub message_id: MessageId,
    pub content: MessageContent,
    pub author_id: UserId,
    pub author_name: String,
}

/// 回执与通知共用的消息载荷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub sender_name: String,
    pub recipient_id: UserId,
    pub content: MessageContent,
    pub send_at: Timestamp,
    pub read_at: Option<Timestamp>,
    pub files: Vec<StoredFile>,
    pub reply: Option<ReplyContext>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryResult {
    pub message: MessagePayload,
    pub recipient: NotifyOutcome,
}

/// 列表失效通知的载荷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidationPayload {
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<ChatId>,
}

pub struct MessageDeliveryDependencies {
    pub lifecycle: Arc<ChatLifecycleManager>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub file_repository: Arc<dyn FileRepository>,
    pub user_repository: Arc<dyn UserRepository>,
    pub presence: Arc<PresenceRegistry>,
    pub clock: Arc<dyn Clock>,
}

pub struct MessageDelivery {
    deps: MessageDeliveryDependencies,
}

impl MessageDelivery {
    pub fn new(deps: MessageDeliveryDependencies) -> Self {
        Self { deps }
    }

    async fn display_name(&self, user_id: UserId) -> Result<String, ApplicationError> {
        let profile = self.deps.user_repository.find_profile(user_id).await?;
        Ok(profile
            .map(|profile| profile.display_name())
            .unwrap_or_else(|| format!("user:{user_id}")))
    }

    /// 按请求顺序解析附件，未知文件静默丢弃
    async fn resolve_files(&self, file_ids: &[FileId]) -> Result<Vec<StoredFile>, ApplicationError> {
        if file_ids.is_empty() {
            return Ok(Vec::new());
        }
        let found = self.deps.file_repository.find_many(file_ids).await?;
        let mut resolved = Vec::with_capacity(found.len());
        for id in file_ids {
            if resolved.iter().any(|f: &StoredFile| f.id == *id) {
                continue;
            }
            if let Some(file) = found.iter().find(|f| f.id == *id) {
                resolved.push(file.clone());
            }
        }
        if resolved.len() < file_ids.len() {
            tracing::debug!(
                requested = file_ids.len(),
                resolved = resolved.len(),
                "部分附件无法解析，已丢弃"
            );
        }
        Ok(resolved)
    }

    /// 解析被回复消息；不存在或不在同一会话时丢弃回复引用
    async fn resolve_reply(
        &self,
        chat_id: ChatId,
        reply_id: MessageId,
    ) -> Result<Option<ReplyContext>, ApplicationError> {
        let replied = self.deps.message_repository.find_by_id(reply_id).await?;
        match replied {
            Some(message) if message.chat_id == chat_id => {
                let author_name = self.display_name(message.sender_id).await?;
                Ok(Some(ReplyContext {
                    message_id: message.id,
                    content: message.content,
                    author_id: message.sender_id,
                    author_name,
                }))
            }
            _ => {
                tracing::warn!(chat_id = %chat_id, reply_id = %reply_id, "回复的消息不存在或不属于该会话，忽略回复引用");
                Ok(None)
            }
        }
    }

    /// 发送消息
    ///
    /// 持久化成功后先向 `caller` 推送 `message-sent` 回执，再通知接收者。
    /// 任何持久化失败都以错误返回，此时不推送任何事件；
    /// 消息一旦写入即视为已投递，之后的步骤不会再返回错误。
    pub async fn send_message(
        &self,
        caller: &dyn ConnectionHandle,
        request: SendMessageRequest,
    ) -> Result<DeliveryResult, ApplicationError> {
        let SendMessageRequest {
            sender_id,
            recipient_id,
            content,
            reply_id,
            file_ids,
        } = request;

        let files = self.resolve_files(&file_ids).await?;
        let content = if files.is_empty() {
            MessageContent::new(content)?
        } else {
            MessageContent::with_attachments(content)?
        };

        // 写入前解析全部展示信息，持久化之后不再有可失败的查询
        let sender_name = self.display_name(sender_id).await?;

        let lifecycle = &self.deps.lifecycle;
        if lifecycle
            .deletion_state(sender_id, recipient_id)
            .await?
            .is_recoverable()
        {
            lifecycle.recover(sender_id, recipient_id).await?;
        }
        let chat_id = lifecycle.get_or_create(sender_id, recipient_id).await?;

        let reply = match reply_id {
            Some(id) => self.resolve_reply(chat_id, id).await?,
            None => None,
        };

        let message = self
            .deps
            .message_repository
            .create(NewMessage {
                chat_id,
                sender_id,
                content,
                reply_id: reply.as_ref().map(|r| r.message_id),
                file_ids: files.iter().map(|f| f.id).collect(),
                send_at: self.deps.clock.now(),
            })
            .await?;

        let payload = MessagePayload {
            id: message.id,
            chat_id,
            sender_id,
            sender_name,
            recipient_id,
            content: message.content,
            send_at: message.send_at,
            read_at: message.read_at,
            files,
            reply,
        };

        tracing::debug!(
            message_id = %payload.id,
            chat_id = %chat_id,
            sender_id = %sender_id,
            recipient_id = %recipient_id,
            "消息已持久化"
        );

        let ack = ServerEvent::ack(outbound::MESSAGE_SENT, Ack::ok_with(&payload));
        if let Err(err) = caller.emit(&ack) {
            tracing::warn!(sender_id = %sender_id, error = %err, "发送者连接已断开，回执丢失");
        }

        let notification = ServerEvent::with_payload(outbound::MESSAGE_RECEIVED, &payload);
        let recipient = self.deps.presence.notify(recipient_id, &notification);

        Ok(DeliveryResult {
            message: payload,
            recipient,
        })
    }

    /// 通知对方刷新某个会话的消息列表
    pub fn invalidate_messages(
        &self,
        sender_id: UserId,
        recipient_id: UserId,
        chat_id: ChatId,
    ) -> NotifyOutcome {
        let event = ServerEvent::with_payload(
            outbound::MESSAGES_LIST_INVALIDATED,
            &InvalidationPayload {
                user_id: sender_id,
                chat_id: Some(chat_id),
            },
        );
        self.deps.presence.notify(recipient_id, &event)
    }

    /// 通知对方刷新会话列表
    pub fn invalidate_chats(&self, sender_id: UserId, recipient_id: UserId) -> NotifyOutcome {
        let event = ServerEvent::with_payload(
            outbound::CHAT_LIST_INVALIDATED,
            &InvalidationPayload {
                user_id: sender_id,
                chat_id: None,
            },
        );
        self.deps.presence.notify(recipient_id, &event)
    }
}

//! 已读回执
//!
//! 按对方分组逐条推送 `message-read`，全部推送尝试完成后再持久化已读时间。
//! 单条持久化失败不会影响其他条目。

use std::sync::Arc;

use domain::{ChatId, MessageId, MessageRepository, Timestamp, UserId};
use serde::{Deserialize, Serialize};

use crate::{
    events::{outbound, ServerEvent},
    presence::{NotifyOutcome, PresenceRegistry},
};

/// 客户端上报的一条已读记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    pub message_id: MessageId,
    pub chat_id: ChatId,
    /// 消息的发送方，即需要被通知的一方
    pub counterpart_id: UserId,
    pub read_at: Timestamp,
}

/// 推送给发送方的已读通知
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageReadNotice {
    pub message_id: MessageId,
    pub chat_id: ChatId,
    pub reader_id: UserId,
    pub read_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptDelivery {
    pub counterpart: UserId,
    pub outcome: NotifyOutcome,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceiptReport {
    /// 每个对方一条，按首次出现顺序
    pub deliveries: Vec<ReceiptDelivery>,
    pub persisted: usize,
    pub failed: Vec<MessageId>,
}

pub struct ReadReceiptBroadcaster {
    messages: Arc<dyn MessageRepository>,
    presence: Arc<PresenceRegistry>,
}

impl ReadReceiptBroadcaster {
    pub fn new(messages: Arc<dyn MessageRepository>, presence: Arc<PresenceRegistry>) -> Self {
        Self { messages, presence }
    }

    pub async fn mark_read(&self, reader: UserId, receipts: Vec<ReadReceipt>) -> ReadReceiptReport {
        let mut groups: Vec<(UserId, Vec<&ReadReceipt>)> = Vec::new();
        for receipt in &receipts {
            match groups.iter_mut().find(|(id, _)| *id == receipt.counterpart_id) {
                Some((_, items)) => items.push(receipt),
                None => groups.push((receipt.counterpart_id, vec![receipt])),
            }
        }

        let mut report = ReadReceiptReport::default();
        for (counterpart, items) in &groups {
            let mut outcome = NotifyOutcome::RecipientOffline;
            for receipt in items {
                let notice = MessageReadNotice {
                    message_id: receipt.message_id,
                    chat_id: receipt.chat_id,
                    reader_id: reader,
                    read_at: receipt.read_at,
                };
                let event = ServerEvent::with_payload(outbound::MESSAGE_READ, &notice);
                if self.presence.notify(*counterpart, &event).is_delivered() {
                    outcome = NotifyOutcome::Delivered;
                }
            }
            report.deliveries.push(ReceiptDelivery {
                counterpart: *counterpart,
                outcome,
                count: items.len(),
            });
        }

        for receipt in &receipts {
            match self.messages.mark_read(receipt.message_id, receipt.read_at).await {
                Ok(()) => report.persisted += 1,
                Err(err) => {
                    tracing::warn!(
                        reader_id = %reader,
                        message_id = %receipt.message_id,
                        error = %err,
                        "已读状态持久化失败"
                    );
                    report.failed.push(receipt.message_id);
                }
            }
        }

        tracing::debug!(
            reader_id = %reader,
            counterparts = report.deliveries.len(),
            persisted = report.persisted,
            failed = report.failed.len(),
            "已读回执处理完成"
        );
        report
    }
}

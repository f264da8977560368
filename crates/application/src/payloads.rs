//! 入站事件载荷
//!
//! 先做结构校验（`validator`），再交给领域值对象做语义校验。

use chrono::{DateTime, Utc};
use domain::{ChatId, Coordinate, DeleteScope, FileId, MessageId, UserId};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::error::ApplicationError;
use crate::services::{ReadReceipt, SendMessageRequest};

/// 入站帧：`{ "event": <name>, "data": <payload> }`
#[derive(Debug, Deserialize)]
pub struct InboundFrame {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    #[validate(range(min = 1))]
    pub recipient_id: i64,
    #[serde(default)]
    #[validate(length(max = 4096))]
    pub content: String,
    #[validate(range(min = 1))]
    pub reply_id: Option<i64>,
    #[serde(default)]
    #[validate(length(max = 32))]
    pub file_ids: Vec<Uuid>,
}

impl SendMessagePayload {
    pub fn into_request(self, sender_id: UserId) -> Result<SendMessageRequest, ApplicationError> {
        self.validate()?;
        Ok(SendMessageRequest {
            sender_id,
            recipient_id: UserId::parse(self.recipient_id)?,
            content: self.content,
            reply_id: self.reply_id.map(MessageId),
            file_ids: self.file_ids.into_iter().map(FileId).collect(),
        })
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct FriendPayload {
    #[validate(range(min = 1))]
    pub friend_id: i64,
}

impl FriendPayload {
    pub fn friend(self) -> Result<UserId, ApplicationError> {
        self.validate()?;
        Ok(UserId::parse(self.friend_id)?)
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceiptPayload {
    #[validate(range(min = 1))]
    pub message_id: i64,
    #[validate(range(min = 1))]
    pub chat_id: i64,
    #[validate(range(min = 1))]
    pub counterpart_id: i64,
    pub read_at: DateTime<Utc>,
}

impl ReadReceiptPayload {
    pub fn into_receipt(self) -> Result<ReadReceipt, ApplicationError> {
        self.validate()?;
        Ok(ReadReceipt {
            message_id: MessageId(self.message_id),
            chat_id: ChatId(self.chat_id),
            counterpart_id: UserId::parse(self.counterpart_id)?,
            read_at: self.read_at,
        })
    }
}

/// `[lng, lat]`
#[derive(Debug, Deserialize)]
pub struct PositionPayload(pub f64, pub f64);

impl PositionPayload {
    pub fn coordinate(self) -> Result<Coordinate, ApplicationError> {
        Ok(Coordinate::new(self.0, self.1)?)
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DeleteChatsPayload {
    #[validate(length(min = 1, max = 500))]
    pub chat_ids: Vec<i64>,
    pub scope: DeleteScope,
}

impl DeleteChatsPayload {
    pub fn into_parts(self) -> Result<(Vec<ChatId>, DeleteScope), ApplicationError> {
        self.validate()?;
        Ok((self.chat_ids.into_iter().map(ChatId).collect(), self.scope))
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RefreshMessagesPayload {
    #[validate(range(min = 1))]
    pub recipient_id: i64,
    #[validate(range(min = 1))]
    pub chat_id: i64,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RefreshChatsPayload {
    #[validate(range(min = 1))]
    pub recipient_id: i64,
}

/// 解析 JSON 载荷，失败归为校验错误
pub fn parse<T: serde::de::DeserializeOwned>(data: serde_json::Value) -> Result<T, ApplicationError> {
    serde_json::from_value(data).map_err(|err| ApplicationError::validation(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn send_message_payload_rejects_sentinel_recipient() {
        let payload: SendMessagePayload = parse(json!({ "recipientId": 0, "content": "hi" })).unwrap();
        let err = payload.into_request(UserId(1)).unwrap_err();
        assert_eq!(err.code(), "VALIDATION");
    }

    #[test]
    fn delete_scope_uses_kebab_case() {
        let payload: DeleteChatsPayload =
            parse(json!({ "chatIds": [1, 2], "scope": "only-me" })).unwrap();
        let (ids, scope) = payload.into_parts().unwrap();
        assert_eq!(ids, vec![ChatId(1), ChatId(2)]);
        assert_eq!(scope, DeleteScope::OnlyMe);

        assert!(parse::<DeleteChatsPayload>(json!({ "chatIds": [1], "scope": "all" })).is_err());
    }

    #[test]
    fn position_is_lng_lat_pair() {
        let payload: PositionPayload = parse(json!([37.61, 55.75])).unwrap();
        let coordinate = payload.coordinate().unwrap();
        assert_eq!(coordinate.longitude, 37.61);
        assert!(parse::<PositionPayload>(json!([1.0])).is_err());
        assert!(parse::<PositionPayload>(json!([200.0, 0.0])).unwrap().coordinate().is_err());
    }
}

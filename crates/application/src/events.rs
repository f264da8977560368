//! 推送给客户端的事件与回执信封
//!
//! 所有帧都是 `{ "event": <name>, "data": <payload> }` 形式的 JSON。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApplicationError;

/// 入站事件名
pub mod inbound {
    pub const SEND_MESSAGE: &str = "send-message";
    pub const FRIEND_REQUEST: &str = "friend-request";
    pub const FRIEND_ACCEPT: &str = "friend-accept";
    pub const FRIEND_CANCEL: &str = "friend-cancel";
    pub const MARK_READ: &str = "mark-read";
    pub const UPDATE_POSITION: &str = "update-position";
    pub const SHAKE_INTENT: &str = "shake-intent";
    pub const SHAKE: &str = "shake";
    pub const DELETE_CHATS: &str = "delete-chats";
    pub const ONLINE_USERS: &str = "online-users";
    pub const LIST_CHATS: &str = "list-chats";
    pub const REFRESH_MESSAGES: &str = "refresh-messages";
    pub const REFRESH_CHATS: &str = "refresh-chats";
}

/// 出站事件名
pub mod outbound {
    pub const MESSAGE_SENT: &str = "message-sent";
    pub const MESSAGE_RECEIVED: &str = "message-received";
    pub const FRIEND_REQUEST_RECEIVED: &str = "friend-request-received";
    pub const FRIEND_REQUEST_ACCEPTED: &str = "friend-request-accepted";
    pub const FRIEND_REQUEST_CANCELLED: &str = "friend-request-cancelled";
    pub const MESSAGE_READ: &str = "message-read";
    pub const FRIEND_POSITION_UPDATED: &str = "friend-position-updated";
    pub const SHAKE_MATCHED: &str = "shake-matched";
    pub const ONLINE_USERS: &str = "online-users";
    pub const CHAT_LIST: &str = "chat-list";
    pub const MESSAGES_LIST_INVALIDATED: &str = "messages-list-invalidated";
    pub const CHAT_LIST_INVALIDATED: &str = "chat-list-invalidated";
    pub const ERROR: &str = "error";
}

/// 推送给单个连接的事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerEvent {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl ServerEvent {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// 序列化任意载荷；载荷无法表示为 JSON 时记录错误并以 `null` 代替
    pub fn with_payload<T: Serialize>(event: impl Into<String>, payload: &T) -> Self {
        let event = event.into();
        let data = serde_json::to_value(payload).unwrap_or_else(|err| {
            tracing::error!(event = %event, error = %err, "事件载荷序列化失败");
            Value::Null
        });
        Self { event, data }
    }

    pub fn ack(event: impl Into<String>, ack: Ack) -> Self {
        Self::with_payload(event, &ack)
    }

    /// 无法解析入站帧时返回给调用者的错误事件
    pub fn error(err: &ApplicationError) -> Self {
        Self::with_payload(outbound::ERROR, &AckError::from(err))
    }

    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// 统一的回执信封
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<AckError>,
}

impl Ack {
    pub fn ok() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
        }
    }

    pub fn ok_with<T: Serialize>(data: &T) -> Self {
        match serde_json::to_value(data) {
            Ok(value) => Self {
                success: true,
                data: Some(value),
                error: None,
            },
            Err(err) => {
                tracing::error!(error = %err, "回执数据序列化失败");
                Self::ok()
            }
        }
    }

    pub fn failed(err: &ApplicationError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(AckError::from(err)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckError {
    pub code: String,
    pub message: String,
}

impl From<&ApplicationError> for AckError {
    fn from(err: &ApplicationError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

//! 事件分发器
//!
//! 与传输层无关：接收某个连接上的原始文本帧，解析、校验后路由到对应编排器，
//! 并保证每个变更类操作只向调用者发出一次回执（成功或失败）。

use std::sync::Arc;

use config::{FriendshipConfig, ShakeConfig};
use domain::{
    ChatRepository, FileRepository, FriendshipRepository, MessageRepository, ShakeRepository,
    UserId, UserRepository,
};
use serde::Serialize;
use serde_json::Value;

use crate::{
    clock::Clock,
    error::ApplicationError,
    events::{inbound, outbound, Ack, ServerEvent},
    geo::GeoStore,
    kv::KeyValueStore,
    payloads::{
        parse, DeleteChatsPayload, FriendPayload, InboundFrame, PositionPayload,
        ReadReceiptPayload, RefreshChatsPayload, RefreshMessagesPayload, SendMessagePayload,
    },
    presence::{ConnectionHandle, ConnectionId, NotifyOutcome, PresenceRegistry},
    services::{
        ChatLifecycleManager, FriendshipSignal, FriendshipSignaling, MessageDelivery,
        MessageDeliveryDependencies, ProximityDependencies, ProximityEngine,
        ReadReceiptBroadcaster, ReadReceipt,
    },
};

/// 编排器依赖的全部外部端口
#[derive(Clone)]
pub struct CorePorts {
    pub chat_repository: Arc<dyn ChatRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub friendship_repository: Arc<dyn FriendshipRepository>,
    pub file_repository: Arc<dyn FileRepository>,
    pub user_repository: Arc<dyn UserRepository>,
    pub shake_repository: Arc<dyn ShakeRepository>,
    pub geo_store: Arc<dyn GeoStore>,
    pub intent_store: Arc<dyn KeyValueStore>,
    pub clock: Arc<dyn Clock>,
}

pub struct EventDispatcherDependencies {
    pub presence: Arc<PresenceRegistry>,
    pub lifecycle: Arc<ChatLifecycleManager>,
    pub delivery: Arc<MessageDelivery>,
    pub friendships: Arc<FriendshipSignaling>,
    pub receipts: Arc<ReadReceiptBroadcaster>,
    pub proximity: Arc<ProximityEngine>,
}

impl EventDispatcherDependencies {
    /// 由端口和配置构造所有编排器，共享同一个在线注册表
    pub fn assemble(
        ports: CorePorts,
        presence: Arc<PresenceRegistry>,
        shake: ShakeConfig,
        friendship: FriendshipConfig,
    ) -> Self {
        let lifecycle = Arc::new(ChatLifecycleManager::new(
            ports.chat_repository.clone(),
            ports.message_repository.clone(),
            ports.clock.clone(),
        ));
        let delivery = Arc::new(MessageDelivery::new(MessageDeliveryDependencies {
            lifecycle: lifecycle.clone(),
            message_repository: ports.message_repository.clone(),
            file_repository: ports.file_repository.clone(),
            user_repository: ports.user_repository.clone(),
            presence: presence.clone(),
            clock: ports.clock.clone(),
        }));
        let friendships = Arc::new(FriendshipSignaling::new(
            ports.friendship_repository.clone(),
            ports.user_repository.clone(),
            presence.clone(),
            friendship,
        ));
        let receipts = Arc::new(ReadReceiptBroadcaster::new(
            ports.message_repository.clone(),
            presence.clone(),
        ));
        let proximity = Arc::new(ProximityEngine::new(ProximityDependencies {
            geo_store: ports.geo_store,
            intent_store: ports.intent_store,
            friendship_repository: ports.friendship_repository,
            shake_repository: ports.shake_repository,
            presence: presence.clone(),
            clock: ports.clock,
            config: shake,
        }));

        Self {
            presence,
            lifecycle,
            delivery,
            friendships,
            receipts,
            proximity,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FriendAckData {
    friend_id: UserId,
    notified: Option<NotifyOutcome>,
}

impl From<FriendshipSignal> for FriendAckData {
    fn from(signal: FriendshipSignal) -> Self {
        Self {
            friend_id: signal.counterpart,
            notified: signal.notified,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ShakeAckData {
    matched: Vec<UserId>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PositionAckData {
    notified_friends: usize,
}

pub struct EventDispatcher {
    deps: EventDispatcherDependencies,
}

impl EventDispatcher {
    pub fn new(deps: EventDispatcherDependencies) -> Self {
        Self { deps }
    }

    pub fn presence(&self) -> &Arc<PresenceRegistry> {
        &self.deps.presence
    }

    /// 连接建立
    pub fn connect(&self, user_id: UserId, handle: Arc<dyn ConnectionHandle>) {
        self.deps.presence.register(user_id, handle);
    }

    /// 连接断开；进行中的处理不会被中断
    pub fn disconnect(&self, connection_id: ConnectionId) -> Option<UserId> {
        self.deps.presence.deregister(connection_id)
    }

    /// 处理一条入站文本帧
    pub async fn dispatch(&self, user_id: UserId, caller: &dyn ConnectionHandle, frame: &str) {
        let frame: InboundFrame = match serde_json::from_str(frame) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::debug!(user_id = %user_id, error = %err, "无法解析入站帧");
                let err = ApplicationError::validation(format!("malformed frame: {err}"));
                reply(caller, ServerEvent::error(&err));
                return;
            }
        };

        tracing::debug!(user_id = %user_id, event = %frame.event, "收到事件");
        let InboundFrame { event, data } = frame;
        match event.as_str() {
            inbound::SEND_MESSAGE => self.send_message(user_id, caller, data).await,
            inbound::FRIEND_REQUEST | inbound::FRIEND_ACCEPT | inbound::FRIEND_CANCEL => {
                let result = self.friend_action(&event, user_id, data).await;
                acknowledge(caller, user_id, &event, result);
            }
            inbound::MARK_READ => {
                let result = self.mark_read(user_id, data).await;
                acknowledge(caller, user_id, &event, result);
            }
            inbound::UPDATE_POSITION => {
                let result = self.update_position(user_id, data).await;
                acknowledge(caller, user_id, &event, result);
            }
            inbound::SHAKE_INTENT => {
                let result = self.deps.proximity.mark_shake_intent(user_id).await;
                acknowledge(caller, user_id, &event, result.map(|()| Value::Null));
            }
            inbound::SHAKE => {
                let result = self.deps.proximity.handle_shake(user_id).await.map(|outcome| {
                    to_value(&ShakeAckData {
                        matched: outcome
                            .matched
                            .iter()
                            .map(|event| event.partner_of(user_id))
                            .collect(),
                    })
                });
                acknowledge(caller, user_id, &event, result);
            }
            inbound::DELETE_CHATS => {
                let result = self.delete_chats(user_id, data).await;
                acknowledge(caller, user_id, &event, result);
            }
            inbound::ONLINE_USERS => {
                let result = parse::<Vec<i64>>(data).map(|ids| {
                    let ids: Vec<UserId> = ids.into_iter().map(UserId).collect();
                    to_value(&self.deps.presence.which_online(&ids))
                });
                acknowledge(caller, user_id, outbound::ONLINE_USERS, result);
            }
            inbound::LIST_CHATS => {
                let result = self
                    .deps
                    .lifecycle
                    .visible_chats(user_id)
                    .await
                    .map(|chats| to_value(&chats));
                acknowledge(caller, user_id, outbound::CHAT_LIST, result);
            }
            inbound::REFRESH_MESSAGES => {
                if let Err(err) = self.refresh_messages(user_id, data) {
                    reply(caller, ServerEvent::error(&err));
                }
            }
            inbound::REFRESH_CHATS => {
                if let Err(err) = self.refresh_chats(user_id, data) {
                    reply(caller, ServerEvent::error(&err));
                }
            }
            other => {
                tracing::debug!(user_id = %user_id, event = %other, "未知事件");
                let err = ApplicationError::validation(format!("unknown event: {other}"));
                reply(caller, ServerEvent::error(&err));
            }
        }
    }

    /// 成功回执由投递服务在通知接收者之前发出，这里只负责失败回执
    async fn send_message(&self, user_id: UserId, caller: &dyn ConnectionHandle, data: Value) {
        let result = match parse::<SendMessagePayload>(data)
            .and_then(|payload| payload.into_request(user_id))
        {
            Ok(request) => self.deps.delivery.send_message(caller, request).await.map(|_| ()),
            Err(err) => Err(err),
        };

        if let Err(err) = result {
            log_failure(user_id, inbound::SEND_MESSAGE, &err);
            reply(caller, ServerEvent::ack(outbound::MESSAGE_SENT, Ack::failed(&err)));
        }
    }

    async fn friend_action(
        &self,
        event: &str,
        user_id: UserId,
        data: Value,
    ) -> Result<Value, ApplicationError> {
        let friend = parse::<FriendPayload>(data)?.friend()?;
        let signals = &self.deps.friendships;
        let signal = match event {
            inbound::FRIEND_REQUEST => signals.request_friend(user_id, friend).await?,
            inbound::FRIEND_ACCEPT => signals.accept_friend(user_id, friend).await?,
            _ => signals.cancel_outgoing(user_id, friend).await?,
        };
        Ok(to_value(&FriendAckData::from(signal)))
    }

    async fn mark_read(&self, user_id: UserId, data: Value) -> Result<Value, ApplicationError> {
        let receipts = parse::<Vec<ReadReceiptPayload>>(data)?
            .into_iter()
            .map(ReadReceiptPayload::into_receipt)
            .collect::<Result<Vec<ReadReceipt>, _>>()?;
        let report = self.deps.receipts.mark_read(user_id, receipts).await;
        Ok(to_value(&report))
    }

    async fn update_position(&self, user_id: UserId, data: Value) -> Result<Value, ApplicationError> {
        let coordinate = parse::<PositionPayload>(data)?.coordinate()?;
        let notified = self
            .deps
            .proximity
            .update_position(user_id, coordinate)
            .await?;
        Ok(to_value(&PositionAckData {
            notified_friends: notified.len(),
        }))
    }

    async fn delete_chats(&self, user_id: UserId, data: Value) -> Result<Value, ApplicationError> {
        let (chat_ids, scope) = parse::<DeleteChatsPayload>(data)?.into_parts()?;
        let report = self
            .deps
            .lifecycle
            .delete_for_user(&chat_ids, user_id, scope)
            .await?;
        Ok(to_value(&report))
    }

    fn refresh_messages(&self, user_id: UserId, data: Value) -> Result<(), ApplicationError> {
        let payload = parse::<RefreshMessagesPayload>(data)?;
        validator::Validate::validate(&payload)?;
        self.deps.delivery.invalidate_messages(
            user_id,
            UserId::parse(payload.recipient_id)?,
            domain::ChatId(payload.chat_id),
        );
        Ok(())
    }

    fn refresh_chats(&self, user_id: UserId, data: Value) -> Result<(), ApplicationError> {
        let payload = parse::<RefreshChatsPayload>(data)?;
        validator::Validate::validate(&payload)?;
        self.deps
            .delivery
            .invalidate_chats(user_id, UserId::parse(payload.recipient_id)?);
        Ok(())
    }
}

fn to_value<T: Serialize>(data: &T) -> Value {
    serde_json::to_value(data).unwrap_or(Value::Null)
}

fn log_failure(user_id: UserId, event: &str, err: &ApplicationError) {
    match err {
        ApplicationError::Validation(_) | ApplicationError::NotFound { .. } => {
            tracing::debug!(user_id = %user_id, event = %event, error = %err, "请求被拒绝");
        }
        _ => tracing::error!(user_id = %user_id, event = %event, error = %err, "事件处理失败"),
    }
}

fn reply(caller: &dyn ConnectionHandle, event: ServerEvent) {
    if let Err(err) = caller.emit(&event) {
        tracing::warn!(event = %event.event, error = %err, "调用者连接已断开，回执丢失");
    }
}

fn acknowledge(
    caller: &dyn ConnectionHandle,
    user_id: UserId,
    event: &str,
    result: Result<Value, ApplicationError>,
) {
    let ack = match result {
        Ok(Value::Null) => Ack::ok(),
        Ok(data) => Ack::ok_with(&data),
        Err(err) => {
            log_failure(user_id, event, &err);
            Ack::failed(&err)
        }
    };
    reply(caller, ServerEvent::ack(event, ack));
}

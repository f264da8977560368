//! 服务测试共用的内存环境

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use config::{FriendshipConfig, ShakeConfig};
use domain::{
    ChatId, FriendshipStatus, Message, MessageContent, MessageRepository, NewMessage, UserId,
};

use crate::{
    clock::{Clock, ManualClock},
    dispatcher::{CorePorts, EventDispatcher, EventDispatcherDependencies},
    memory::{InMemoryGeoStore, InMemoryKeyValueStore, InMemoryStorage, RecordingConnection},
    presence::PresenceRegistry,
};

pub(crate) struct Harness {
    pub storage: Arc<InMemoryStorage>,
    pub geo: Arc<InMemoryGeoStore>,
    pub clock: Arc<ManualClock>,
    pub presence: Arc<PresenceRegistry>,
    pub deps: EventDispatcherDependencies,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ShakeConfig::default(), FriendshipConfig::default())
    }

    pub fn with_config(shake: ShakeConfig, friendship: FriendshipConfig) -> Self {
        let storage = Arc::new(InMemoryStorage::new());
        let geo = Arc::new(InMemoryGeoStore::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        ));
        let intents = Arc::new(InMemoryKeyValueStore::new(clock.clone()));
        let presence = Arc::new(PresenceRegistry::new());

        let ports = CorePorts {
            chat_repository: storage.clone(),
            message_repository: storage.clone(),
            friendship_repository: storage.clone(),
            file_repository: storage.clone(),
            user_repository: storage.clone(),
            shake_repository: storage.clone(),
            geo_store: geo.clone(),
            intent_store: intents,
            clock: clock.clone(),
        };
        let deps =
            EventDispatcherDependencies::assemble(ports, presence.clone(), shake, friendship);

        for (id, name) in [(1, "Alice"), (2, "Bob"), (3, "Carol"), (4, "Dave")] {
            storage.add_user(UserId(id), Some(name));
        }

        Self {
            storage,
            geo,
            clock,
            presence,
            deps,
        }
    }

    pub fn connect(&self, user: i64) -> Arc<RecordingConnection> {
        let conn = RecordingConnection::new();
        self.presence.register(UserId(user), conn.clone());
        conn
    }

    pub fn befriend(&self, a: i64, b: i64) {
        self.storage
            .add_friendship(UserId(a), UserId(b), FriendshipStatus::Confirmed);
    }

    /// 直接写入一条消息，绕过投递流程
    pub async fn seed_message(&self, chat_id: ChatId, sender: i64, content: &str) -> Message {
        let message = NewMessage {
            chat_id,
            sender_id: UserId(sender),
            content: MessageContent::new(content).unwrap(),
            reply_id: None,
            file_ids: Vec::new(),
            send_at: self.clock.now(),
        };
        let message = MessageRepository::create(self.storage.as_ref(), message)
            .await
            .unwrap();
        self.clock.advance(chrono::Duration::seconds(1));
        message
    }

    pub fn into_dispatcher(self) -> (EventDispatcher, Arc<InMemoryStorage>, Arc<ManualClock>) {
        let storage = self.storage.clone();
        let clock = self.clock.clone();
        (EventDispatcher::new(self.deps), storage, clock)
    }
}

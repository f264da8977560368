//! 应用层实现。
//!
//! 这里提供围绕领域模型的用例编排：在线用户注册表、会话生命周期、
//! 消息投递、好友信令、已读回执与"摇一摇"匹配，以及把入站事件路由到
//! 这些编排器的事件分发器。外部适配器（存储、地理索引、TTL 键值存储、
//! 连接句柄）通过 trait 抽象，内存实现位于 [`memory`]。

pub mod clock;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod geo;
pub mod kv;
pub mod memory;
pub mod payloads;
pub mod presence;
pub mod services;

pub use clock::{Clock, ManualClock, SystemClock};
pub use dispatcher::{CorePorts, EventDispatcher, EventDispatcherDependencies};
pub use error::ApplicationError;
pub use events::{Ack, AckError, ServerEvent};
pub use geo::GeoStore;
pub use kv::KeyValueStore;
pub use presence::{ConnectionHandle, ConnectionId, EmitError, NotifyOutcome, PresenceRegistry};
pub use services::{
    ChatLifecycleManager, DeletionReport, DeliveryResult, FriendshipSignal, FriendshipSignaling,
    MessageDelivery, MessageDeliveryDependencies, ProximityDependencies, ProximityEngine,
    ReadReceipt, ReadReceiptBroadcaster, ReadReceiptReport, SendMessageRequest, ShakeOutcome,
};

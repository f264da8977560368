//! 在线用户注册表
//!
//! 进程内的双向映射：用户 → 连接句柄，连接 → 用户。
//! 同一用户重复注册时后到的连接生效（不做多端分发），
//! 断开事件只携带连接本身，因此需要反向索引。

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use domain::UserId;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::events::ServerEvent;

/// 单条连接的唯一标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EmitError {
    #[error("connection closed")]
    Closed,
    #[error("failed to encode event: {0}")]
    Encode(String),
}

/// 传输层提供的连接句柄，`emit` 不得阻塞
pub trait ConnectionHandle: Send + Sync {
    fn id(&self) -> ConnectionId;

    fn emit(&self, event: &ServerEvent) -> Result<(), EmitError>;
}

/// 尽力而为通知的结果：不排队、不重试
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotifyOutcome {
    Delivered,
    RecipientOffline,
}

impl NotifyOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

#[derive(Default)]
struct Registry {
    by_user: HashMap<UserId, Arc<dyn ConnectionHandle>>,
    by_connection: HashMap<ConnectionId, UserId>,
}

/// 在线用户注册表，由进程根显式构造并注入各编排器
#[derive(Default)]
pub struct PresenceRegistry {
    inner: RwLock<Registry>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 注册连接，返回被顶替的旧连接
    pub fn register(
        &self,
        user_id: UserId,
        handle: Arc<dyn ConnectionHandle>,
    ) -> Option<Arc<dyn ConnectionHandle>> {
        let connection_id = handle.id();
        let mut registry = self.write();
        let previous = registry.by_user.insert(user_id, handle);
        if let Some(old) = &previous {
            registry.by_connection.remove(&old.id());
        }
        registry.by_connection.insert(connection_id, user_id);
        drop(registry);

        if previous.is_some() {
            tracing::info!(user_id = %user_id, connection_id = %connection_id, "新连接顶替旧连接");
        } else {
            tracing::info!(user_id = %user_id, connection_id = %connection_id, "用户上线");
        }
        previous
    }

    /// 按连接注销；连接未知（或已被顶替）时为空操作
    pub fn deregister(&self, connection_id: ConnectionId) -> Option<UserId> {
        let mut registry = self.write();
        let user_id = registry.by_connection.remove(&connection_id)?;
        let owns_entry = registry
            .by_user
            .get(&user_id)
            .map(|handle| handle.id() == connection_id)
            .unwrap_or(false);
        if owns_entry {
            registry.by_user.remove(&user_id);
        }
        drop(registry);

        tracing::info!(user_id = %user_id, connection_id = %connection_id, "用户下线");
        Some(user_id)
    }

    pub fn get(&self, user_id: UserId) -> Option<Arc<dyn ConnectionHandle>> {
        self.read().by_user.get(&user_id).cloned()
    }

    pub fn is_online(&self, user_id: UserId) -> bool {
        self.read().by_user.contains_key(&user_id)
    }

    /// 过滤出在线用户，保持输入顺序并去重
    pub fn which_online(&self, user_ids: &[UserId]) -> Vec<UserId> {
        let registry = self.read();
        let mut seen = HashSet::new();
        user_ids
            .iter()
            .copied()
            .filter(|id| registry.by_user.contains_key(id) && seen.insert(*id))
            .collect()
    }

    pub fn online_count(&self) -> usize {
        self.read().by_user.len()
    }

    /// 向在线用户推送事件；对方不在线或推送失败都视为离线
    pub fn notify(&self, user_id: UserId, event: &ServerEvent) -> NotifyOutcome {
        let Some(handle) = self.get(user_id) else {
            tracing::debug!(user_id = %user_id, event = %event.event, "接收方不在线，跳过通知");
            return NotifyOutcome::RecipientOffline;
        };

        match handle.emit(event) {
            Ok(()) => NotifyOutcome::Delivered,
            Err(err) => {
                tracing::warn!(
                    user_id = %user_id,
                    event = %event.event,
                    error = %err,
                    "推送通知失败，按离线处理"
                );
                NotifyOutcome::RecipientOffline
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::RecordingConnection;
    use serde_json::json;

    #[test]
    fn register_then_deregister_clears_presence() {
        let registry = PresenceRegistry::new();
        let conn = RecordingConnection::new();
        registry.register(UserId(1), conn.clone());

        assert!(registry.is_online(UserId(1)));
        assert_eq!(registry.deregister(conn.id()), Some(UserId(1)));
        assert!(registry.get(UserId(1)).is_none());
        assert_eq!(registry.online_count(), 0);

        // 重复注销为空操作
        assert_eq!(registry.deregister(conn.id()), None);
    }

    #[test]
    fn last_connection_wins() {
        let registry = PresenceRegistry::new();
        let first = RecordingConnection::new();
        let second = RecordingConnection::new();

        registry.register(UserId(1), first.clone());
        let replaced = registry.register(UserId(1), second.clone());
        assert_eq!(replaced.map(|h| h.id()), Some(first.id()));

        // 旧连接迟到的断开事件不能移除新连接
        assert_eq!(registry.deregister(first.id()), None);
        assert_eq!(registry.get(UserId(1)).map(|h| h.id()), Some(second.id()));

        let outcome = registry.notify(UserId(1), &ServerEvent::new("ping", json!({})));
        assert_eq!(outcome, NotifyOutcome::Delivered);
        assert_eq!(second.events().len(), 1);
        assert!(first.events().is_empty());
    }

    #[test]
    fn which_online_filters_and_dedupes() {
        let registry = PresenceRegistry::new();
        registry.register(UserId(3), RecordingConnection::new());
        registry.register(UserId(1), RecordingConnection::new());

        let online = registry.which_online(&[UserId(1), UserId(2), UserId(3), UserId(1)]);
        assert_eq!(online, vec![UserId(1), UserId(3)]);
    }

    #[test]
    fn failed_emit_reports_offline() {
        let registry = PresenceRegistry::new();
        let conn = RecordingConnection::new();
        registry.register(UserId(5), conn.clone());
        conn.close();

        let outcome = registry.notify(UserId(5), &ServerEvent::new("ping", json!(null)));
        assert_eq!(outcome, NotifyOutcome::RecipientOffline);
        assert_eq!(
            registry.notify(UserId(6), &ServerEvent::new("ping", json!(null))),
            NotifyOutcome::RecipientOffline
        );
    }
}

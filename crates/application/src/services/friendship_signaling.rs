//! 好友信令
//!
//! 先持久化状态变化，再在对方在线时推送通知；持久化失败时不发送任何通知。

use std::sync::Arc;

use config::FriendshipConfig;
use domain::{FriendshipRepository, RepositoryError, UserId, UserRepository};
use serde::{Deserialize, Serialize};

use crate::{
    error::ApplicationError,
    events::{outbound, ServerEvent},
    presence::{NotifyOutcome, PresenceRegistry},
};

/// 推送给对方的好友事件载荷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendshipNotice {
    /// 发起操作的用户
    pub user_id: UserId,
    pub user_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FriendshipSignal {
    pub counterpart: UserId,
    /// `None` 表示按配置抑制了通知
    pub notified: Option<NotifyOutcome>,
}

pub struct FriendshipSignaling {
    friendships: Arc<dyn FriendshipRepository>,
    users: Arc<dyn UserRepository>,
    presence: Arc<PresenceRegistry>,
    config: FriendshipConfig,
}

impl FriendshipSignaling {
    pub fn new(
        friendships: Arc<dyn FriendshipRepository>,
        users: Arc<dyn UserRepository>,
        presence: Arc<PresenceRegistry>,
        config: FriendshipConfig,
    ) -> Self {
        Self {
            friendships,
            users,
            presence,
            config,
        }
    }

    async fn ensure_counterpart(&self, from: UserId, to: UserId) -> Result<(), ApplicationError> {
        if from == to {
            return Err(ApplicationError::validation("cannot befriend yourself"));
        }
        if self.users.find_profile(to).await?.is_none() {
            return Err(ApplicationError::not_found("user", to));
        }
        Ok(())
    }

    /// 在写入之前解析发起者的展示名
    async fn notice_from(&self, from: UserId) -> Result<FriendshipNotice, ApplicationError> {
        let user_name = self
            .users
            .find_profile(from)
            .await?
            .map(|profile| profile.display_name())
            .unwrap_or_else(|| format!("user:{from}"));
        Ok(FriendshipNotice {
            user_id: from,
            user_name,
        })
    }

    fn push(&self, to: UserId, event: &str, notice: &FriendshipNotice) -> NotifyOutcome {
        self.presence
            .notify(to, &ServerEvent::with_payload(event, notice))
    }

    /// 发送好友请求
    ///
    /// 两人之间已有记录时不会重复写入；是否仍通知对方由
    /// `notify_duplicate_requests` 决定。
    pub async fn request_friend(
        &self,
        from: UserId,
        to: UserId,
    ) -> Result<FriendshipSignal, ApplicationError> {
        self.ensure_counterpart(from, to).await?;
        let notice = self.notice_from(from).await?;

        let existing = self.friendships.find_between(from, to).await?;
        self.friendships.create_pending(from, to).await?;

        let notified = if existing.is_some() && !self.config.notify_duplicate_requests {
            tracing::debug!(from = %from, to = %to, "重复的好友请求，按配置不再通知");
            None
        } else {
            Some(self.push(to, outbound::FRIEND_REQUEST_RECEIVED, &notice))
        };

        tracing::info!(from = %from, to = %to, duplicate = existing.is_some(), "好友请求已记录");
        Ok(FriendshipSignal {
            counterpart: to,
            notified,
        })
    }

    /// 接受 `to` 发来的好友请求
    pub async fn accept_friend(
        &self,
        from: UserId,
        to: UserId,
    ) -> Result<FriendshipSignal, ApplicationError> {
        self.ensure_counterpart(from, to).await?;
        let notice = self.notice_from(from).await?;

        match self.friendships.confirm(to, from).await {
            Ok(_) => {}
            Err(RepositoryError::NotFound) => {
                return Err(ApplicationError::not_found("friend request", to));
            }
            Err(err) => return Err(err.into()),
        }

        let notified = self.push(to, outbound::FRIEND_REQUEST_ACCEPTED, &notice);
        tracing::info!(from = %from, to = %to, "好友请求已接受");
        Ok(FriendshipSignal {
            counterpart: to,
            notified: Some(notified),
        })
    }

    /// 撤回发给 `to` 的待处理请求；没有待处理请求时同样通知对方刷新
    pub async fn cancel_outgoing(
        &self,
        from: UserId,
        to: UserId,
    ) -> Result<FriendshipSignal, ApplicationError> {
        self.ensure_counterpart(from, to).await?;
        let notice = self.notice_from(from).await?;

        let removed = self.friendships.remove_pending(from, to).await?;
        let notified = self.push(to, outbound::FRIEND_REQUEST_CANCELLED, &notice);

        tracing::info!(from = %from, to = %to, removed, "好友请求已撤回");
        Ok(FriendshipSignal {
            counterpart: to,
            notified: Some(notified),
        })
    }
}

//! "摇一摇"匹配
//!
//! 不保存显式状态机，每次 `handle_shake` 都由三个可独立测试的查询重新推导：
//! 半径内的好友、对方是否持有未过期的意图、该用户对是否已过冷却期。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use config::{ShakeConfig, MAX_COOLDOWN_SECONDS};
use domain::{
    ChatPair, Coordinate, FriendshipRepository, RepositoryError, ShakeEvent, ShakeRepository,
    Timestamp, UserId,
};
use serde::{Deserialize, Serialize};

use crate::{
    clock::Clock,
    error::ApplicationError,
    events::{outbound, ServerEvent},
    geo::GeoStore,
    kv::{shake_intent_key, KeyValueStore},
    presence::PresenceRegistry,
};

/// 推送给在线好友的位置更新
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionNotice {
    pub user_id: UserId,
    pub longitude: f64,
    pub latitude: f64,
}

/// 匹配成功通知
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShakeMatchNotice {
    /// 匹配到的另一方
    pub user_id: UserId,
    pub matched_at: Timestamp,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShakeOutcome {
    pub matched: Vec<ShakeEvent>,
}

impl ShakeOutcome {
    pub fn is_empty(&self) -> bool {
        self.matched.is_empty()
    }
}

pub struct ProximityDependencies {
    pub geo_store: Arc<dyn GeoStore>,
    pub intent_store: Arc<dyn KeyValueStore>,
    pub friendship_repository: Arc<dyn FriendshipRepository>,
    pub shake_repository: Arc<dyn ShakeRepository>,
    pub presence: Arc<PresenceRegistry>,
    pub clock: Arc<dyn Clock>,
    pub config: ShakeConfig,
}

pub struct ProximityEngine {
    deps: ProximityDependencies,
}

impl ProximityEngine {
    pub fn new(deps: ProximityDependencies) -> Self {
        Self { deps }
    }

    /// 写入坐标并推送给在线的已确认好友，返回收到推送的好友
    pub async fn update_position(
        &self,
        user_id: UserId,
        coordinate: Coordinate,
    ) -> Result<Vec<UserId>, ApplicationError> {
        self.deps.geo_store.upsert(user_id, coordinate).await?;

        let friends = self.deps.friendship_repository.list_confirmed(user_id).await?;
        let event = ServerEvent::with_payload(
            outbound::FRIEND_POSITION_UPDATED,
            &PositionNotice {
                user_id,
                longitude: coordinate.longitude,
                latitude: coordinate.latitude,
            },
        );

        let delivered: Vec<UserId> = friends
            .into_iter()
            .filter(|friend| self.deps.presence.notify(*friend, &event).is_delivered())
            .collect();

        tracing::debug!(user_id = %user_id, notified = delivered.len(), "位置已更新");
        Ok(delivered)
    }

    /// 记录摇一摇意图，在配置的 TTL 后自动失效
    pub async fn mark_shake_intent(&self, user_id: UserId) -> Result<(), ApplicationError> {
        let ttl = StdDuration::from_millis(self.deps.config.intent_ttl_ms);
        self.deps
            .intent_store
            .set_with_ttl(&shake_intent_key(user_id), "1", ttl)
            .await?;
        tracing::debug!(user_id = %user_id, ttl_ms = self.deps.config.intent_ttl_ms, "记录摇一摇意图");
        Ok(())
    }

    /// 半径内的已确认好友，按距离升序；用户没有坐标时返回 `None`
    pub async fn nearby_friends(
        &self,
        user_id: UserId,
    ) -> Result<Option<Vec<UserId>>, ApplicationError> {
        let Some(center) = self.deps.geo_store.position(user_id).await? else {
            return Ok(None);
        };

        let nearby = self
            .deps
            .geo_store
            .search_radius(center, self.deps.config.radius_meters)
            .await?;
        let friends: HashSet<UserId> = self
            .deps
            .friendship_repository
            .list_confirmed(user_id)
            .await?
            .into_iter()
            .collect();

        Ok(Some(
            nearby
                .into_iter()
                .filter(|id| *id != user_id && friends.contains(id))
                .collect(),
        ))
    }

    pub async fn has_live_intent(&self, user_id: UserId) -> Result<bool, ApplicationError> {
        Ok(self
            .deps
            .intent_store
            .get(&shake_intent_key(user_id))
            .await?
            .is_some())
    }

    fn cooldown(&self) -> Duration {
        Duration::seconds(self.deps.config.cooldown_seconds.clamp(0, MAX_COOLDOWN_SECONDS))
    }

    /// 该无序用户对最近一次匹配是否已超过冷却期（没有记录视为已过）
    pub async fn cooldown_elapsed(&self, a: UserId, b: UserId) -> Result<bool, ApplicationError> {
        let latest = self
            .deps
            .shake_repository
            .latest_for_pair(ChatPair::new(a, b))
            .await?;
        let cooldown = self.cooldown();
        Ok(latest
            .map(|event| !event.is_cooling_down(self.deps.clock.now(), cooldown))
            .unwrap_or(true))
    }

    /// 检测并记录匹配，通知发起者
    ///
    /// 默认只通知发起者；`notify_matched_friend` 打开时同时通知被匹配的好友。
    pub async fn handle_shake(&self, user_id: UserId) -> Result<ShakeOutcome, ApplicationError> {
        let Some(candidates) = self.nearby_friends(user_id).await? else {
            tracing::debug!(user_id = %user_id, "没有坐标，忽略摇一摇");
            return Ok(ShakeOutcome::default());
        };

        let mut outcome = ShakeOutcome::default();
        for friend in candidates {
            if !self.has_live_intent(friend).await? {
                continue;
            }
            if !self.cooldown_elapsed(user_id, friend).await? {
                tracing::debug!(user_id = %user_id, friend_id = %friend, "仍在冷却期内");
                continue;
            }

            let event = ShakeEvent::new(user_id, friend, self.deps.clock.now());
            let event = match self.deps.shake_repository.create(event, self.cooldown()).await {
                Ok(event) => event,
                // 并发的另一次摇一摇已在冷却期内写入
                Err(RepositoryError::Conflict(reason)) => {
                    tracing::debug!(user_id = %user_id, friend_id = %friend, reason = %reason, "并发匹配冲突，跳过");
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            self.deps.presence.notify(
                user_id,
                &ServerEvent::with_payload(
                    outbound::SHAKE_MATCHED,
                    &ShakeMatchNotice {
                        user_id: friend,
                        matched_at: event.created_at,
                    },
                ),
            );
            if self.deps.config.notify_matched_friend {
                self.deps.presence.notify(
                    friend,
                    &ServerEvent::with_payload(
                        outbound::SHAKE_MATCHED,
                        &ShakeMatchNotice {
                            user_id,
                            matched_at: event.created_at,
                        },
                    ),
                );
            }

            tracing::info!(user_id = %user_id, friend_id = %friend, "摇一摇匹配成功");
            outcome.matched.push(event);
        }

        Ok(outcome)
    }
}

//! 位置与"摇一摇"事件
//!
//! 坐标只保留最新值，不记录轨迹；摇一摇事件持久化，仅用于限流。

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::value_objects::{ChatPair, Coordinate, Timestamp, UserId};

/// 用户当前位置
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPosition {
    pub user_id: UserId,
    pub coordinate: Coordinate,
}

/// 两位好友之间成功匹配的一次摇一摇
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShakeEvent {
    pub user_a: UserId,
    pub user_b: UserId,
    pub created_at: Timestamp,
}

impl ShakeEvent {
    pub fn new(user_a: UserId, user_b: UserId, created_at: Timestamp) -> Self {
        Self {
            user_a,
            user_b,
            created_at,
        }
    }

    pub fn pair(&self) -> ChatPair {
        ChatPair::new(self.user_a, self.user_b)
    }

    /// 事件中的另一方
    pub fn partner_of(&self, user: UserId) -> UserId {
        if self.user_a == user {
            self.user_b
        } else {
            self.user_a
        }
    }

    /// `now` 时刻是否仍处于冷却期
    pub fn is_cooling_down(&self, now: Timestamp, cooldown: Duration) -> bool {
        now - self.created_at < cooldown
    }
}

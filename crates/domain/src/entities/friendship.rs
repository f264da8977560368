//! 好友关系实体
//!
//! 每对用户只存一条有向记录：`follower` 发起请求，`followed` 接收请求。
//! 确认后的关系在语义上是对称的。

use serde::{Deserialize, Serialize};

use crate::value_objects::UserId;

/// 好友关系状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FriendshipStatus {
    /// 请求待处理
    Pending,
    /// 已确认
    Confirmed,
}

impl FriendshipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "confirmed" => Some(Self::Confirmed),
            _ => None,
        }
    }
}

/// 好友关系
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Friendship {
    pub follower_id: UserId,
    pub followed_id: UserId,
    pub status: FriendshipStatus,
}

impl Friendship {
    pub fn pending(follower_id: UserId, followed_id: UserId) -> Self {
        Self {
            follower_id,
            followed_id,
            status: FriendshipStatus::Pending,
        }
    }

    pub fn involves(&self, user: UserId) -> bool {
        self.follower_id == user || self.followed_id == user
    }

    /// 关系中的另一方
    pub fn other(&self, user: UserId) -> Option<UserId> {
        if self.follower_id == user {
            Some(self.followed_id)
        } else if self.followed_id == user {
            Some(self.follower_id)
        } else {
            None
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == FriendshipStatus::Confirmed
    }

    pub fn confirm(&mut self) {
        self.status = FriendshipStatus::Confirmed;
    }
}

//! 软删除集合
//!
//! 会话与消息都带有一个 `delete_for` 集合，元素为用户ID或"所有人"哨兵。
//! 哨兵一旦写入即为终态：无论集合里还有哪些用户，记录对双方都不可见。

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::value_objects::UserId;

/// 存储与传输中代表"所有人"的哨兵值
pub const EVERYONE_SENTINEL: i64 = 0;

/// 删除集合中的单个元素
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeleteMarker {
    Everyone,
    User(UserId),
}

impl DeleteMarker {
    pub fn from_raw(raw: i64) -> Self {
        if raw == EVERYONE_SENTINEL {
            Self::Everyone
        } else {
            Self::User(UserId(raw))
        }
    }

    pub fn to_raw(self) -> i64 {
        match self {
            Self::Everyone => EVERYONE_SENTINEL,
            Self::User(user) => user.0,
        }
    }
}

impl Serialize for DeleteMarker {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.to_raw())
    }
}

impl<'de> Deserialize<'de> for DeleteMarker {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        i64::deserialize(deserializer).map(Self::from_raw)
    }
}

/// 删除范围：仅自己可见性 / 对所有人
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeleteScope {
    OnlyMe,
    Everyone,
}

/// 有序、去重的删除集合
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeleteFor(Vec<DeleteMarker>);

impl DeleteFor {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn everyone() -> Self {
        Self(vec![DeleteMarker::Everyone])
    }

    /// 从存储中的整数数组还原
    pub fn from_raw(raw: &[i64]) -> Self {
        let mut set = Self::new();
        for value in raw {
            let marker = DeleteMarker::from_raw(*value);
            if !set.0.contains(&marker) {
                set.0.push(marker);
            }
        }
        set
    }

    pub fn to_raw(&self) -> Vec<i64> {
        self.0.iter().map(|marker| marker.to_raw()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn markers(&self) -> &[DeleteMarker] {
        &self.0
    }

    pub fn hides_for_everyone(&self) -> bool {
        self.0.contains(&DeleteMarker::Everyone)
    }

    /// 对指定用户是否不可见：哨兵优先，其次看用户自己的条目
    pub fn hides_for(&self, user: UserId) -> bool {
        self.hides_for_everyone() || self.0.contains(&DeleteMarker::User(user))
    }

    /// 按删除规则更新集合，返回集合是否发生变化
    ///
    /// - 已包含哨兵：保持不变
    /// - 范围为所有人：替换为仅含哨兵
    /// - 否则追加该用户（已存在则不变）
    pub fn apply(&mut self, user: UserId, scope: DeleteScope) -> bool {
        if self.hides_for_everyone() {
            return false;
        }
        match scope {
            DeleteScope::Everyone => {
                self.0 = vec![DeleteMarker::Everyone];
                true
            }
            DeleteScope::OnlyMe => {
                let marker = DeleteMarker::User(user);
                if self.0.contains(&marker) {
                    false
                } else {
                    self.0.push(marker);
                    true
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

impl fmt::Display for DeleteFor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_raw())
    }
}

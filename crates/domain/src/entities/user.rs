//! 用户资料
//!
//! 核心只关心显示名称，用于通知中展示发送者和被回复者。

use serde::{Deserialize, Serialize};

use crate::value_objects::UserId;

/// 用户公开资料
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    /// 显示名称（可能未设置）
    pub name: Option<String>,
}

impl UserProfile {
    pub fn new(id: UserId, name: Option<String>) -> Self {
        Self { id, name }
    }

    /// 用于展示的名称，未设置时退化为用户ID
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) if !name.trim().is_empty() => name.clone(),
            _ => format!("user:{}", self.id),
        }
    }
}

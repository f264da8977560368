//! 领域实体定义
//!
//! 包含系统的核心实体：会话、消息、好友关系、摇一摇事件、文件与用户资料。

pub mod chat;
pub mod file;
pub mod friendship;
pub mod message;
pub mod shake;
pub mod user;

// 重新导出核心实体
pub use chat::{Chat, ChatSummary, DeletionState};
pub use file::StoredFile;
pub use friendship::{Friendship, FriendshipStatus};
pub use message::{Message, NewMessage};
pub use shake::{GeoPosition, ShakeEvent};
pub use user::UserProfile;

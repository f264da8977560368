//! Repository接口定义
//!
//! 持久化协作方的抽象接口：内层定义接口，基础设施层实现接口。

pub mod chat_repository;
pub mod file_repository;
pub mod friendship_repository;
pub mod message_repository;
pub mod shake_repository;
pub mod user_repository;

// 重新导出所有Repository特征
pub use chat_repository::ChatRepository;
pub use file_repository::FileRepository;
pub use friendship_repository::FriendshipRepository;
pub use message_repository::MessageRepository;
pub use shake_repository::ShakeRepository;
pub use user_repository::UserRepository;

#[cfg(feature = "testing")]
pub use chat_repository::MockChatRepository;
#[cfg(feature = "testing")]
pub use file_repository::MockFileRepository;
#[cfg(feature = "testing")]
pub use friendship_repository::MockFriendshipRepository;
#[cfg(feature = "testing")]
pub use message_repository::MockMessageRepository;
#[cfg(feature = "testing")]
pub use shake_repository::MockShakeRepository;
#[cfg(feature = "testing")]
pub use user_repository::MockUserRepository;

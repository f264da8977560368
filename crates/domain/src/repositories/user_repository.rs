//! 用户Repository接口定义

use async_trait::async_trait;

use crate::entities::user::UserProfile;
use crate::errors::RepositoryResult;
use crate::value_objects::UserId;

#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// 查找用户公开资料
    async fn find_profile(&self, id: UserId) -> RepositoryResult<Option<UserProfile>>;
}

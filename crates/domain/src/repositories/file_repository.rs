//! 文件Repository接口定义

use async_trait::async_trait;

use crate::entities::file::StoredFile;
use crate::errors::RepositoryResult;
use crate::value_objects::FileId;

#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait FileRepository: Send + Sync {
    /// 批量查找文件，未知ID被忽略，返回顺序不作保证
    async fn find_many(&self, ids: &[FileId]) -> RepositoryResult<Vec<StoredFile>>;
}

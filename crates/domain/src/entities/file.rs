//! 文件记录
//!
//! 文件的上传与存储由外部协作方负责，这里只描述消息附件需要的元数据。

use serde::{Deserialize, Serialize};

use crate::value_objects::{FileId, UserId};

/// 已存储的文件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    pub id: FileId,
    pub owner_id: UserId,
    /// 原始文件名
    pub name: String,
    pub mime_type: String,
    /// 文件大小（字节）
    pub size: i64,
}

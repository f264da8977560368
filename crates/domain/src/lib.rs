//! 实时在线、会话生命周期与"摇一摇"匹配的核心领域模型
//!
//! 包含用户标识、会话、消息、好友关系、地理坐标等实体，
//! 软删除集合的规则，以及持久化协作方的仓储接口。

pub mod deletion;
pub mod entities;
pub mod errors;
pub mod repositories;
pub mod value_objects;

// 重新导出常用类型
pub use deletion::*;
pub use entities::*;
pub use errors::*;
pub use repositories::*;
pub use value_objects::*;

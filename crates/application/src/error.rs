use domain::{DomainError, RepositoryError};
use thiserror::Error;

/// 应用层错误，每个变体对应一个稳定的错误码，随失败回执返回给客户端
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApplicationError {
    /// 载荷格式错误或值对象校验失败，在编排开始前拒绝
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("{resource} not found: {id}")]
    NotFound { resource: String, id: String },
    #[error("conflict: {0}")]
    Conflict(String),
    /// 存储或地理索引暂时不可用，核心内部不重试
    #[error("transient failure: {0}")]
    Transient(String),
}

impl ApplicationError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(resource: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.to_string(),
        }
    }

    /// 回执中使用的错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::Transient(_) => "TRANSIENT",
        }
    }
}

impl From<DomainError> for ApplicationError {
    fn from(value: DomainError) -> Self {
        ApplicationError::Validation(value.to_string())
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::NotFound => ApplicationError::not_found("record", "unknown"),
            RepositoryError::Conflict(message) => ApplicationError::Conflict(message),
            RepositoryError::Storage(message) => ApplicationError::Transient(message),
        }
    }
}

impl From<validator::ValidationErrors> for ApplicationError {
    fn from(value: validator::ValidationErrors) -> Self {
        ApplicationError::Validation(value.to_string())
    }
}

//! 领域错误定义
//!
//! 领域层的错误只有两类：入参校验失败和访问被拒绝。
//! 两者都必须在任何副作用之前被拒绝。

use thiserror::Error;

/// 领域错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// 校验错误
    #[error("validation failed: {field}: {message}")]
    Validation { field: String, message: String },

    /// 访问拒绝（例如发送者不是房间成员）
    #[error("access denied: {action}")]
    AccessDenied { action: String },
}

impl DomainError {
    pub fn validation_error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn access_denied(action: impl Into<String>) -> Self {
        Self::AccessDenied {
            action: action.into(),
        }
    }
}

/// 领域结果类型
pub type DomainResult<T> = Result<T, DomainError>;

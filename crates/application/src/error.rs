use std::time::Duration;

use domain::DomainError;
use thiserror::Error;

use crate::fanout::PushError;
use crate::ports::StorageError;

/// 对终端用户展示的统一翻译失败文案。
/// 服务商的原始错误只进日志，永远不转发给用户。
pub const TRANSLATION_FAILED_MESSAGE: &str = "translation failed, please try again later";

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("rate limit exceeded")]
    RateLimited { retry_after: Option<Duration> },

    /// 所有服务商与重试都已耗尽。展示文案固定，
    /// 各服务商的最后一次错误保留在字段里用于诊断。
    #[error("{TRANSLATION_FAILED_MESSAGE}")]
    TranslationFailed {
        provider_errors: Vec<(String, String)>,
    },

    #[error("push error: {0}")]
    Push(#[from] PushError),
}

impl ApplicationError {
    pub fn rate_limited(retry_after: Option<Duration>) -> Self {
        Self::RateLimited { retry_after }
    }
}

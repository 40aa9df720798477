use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::DomainError;
use crate::language::LanguageCode;
use crate::message::MAX_MESSAGE_LENGTH;

/// 一次翻译请求。
///
/// 服务商优先级顺序由编排器配置决定，不在请求里携带。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationRequest {
    pub text: String,
    pub source: LanguageCode,
    pub target: LanguageCode,
}

impl TranslationRequest {
    pub fn new(
        text: impl Into<String>,
        source: LanguageCode,
        target: LanguageCode,
    ) -> Result<Self, DomainError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(DomainError::validation_error(
                "text",
                "text must not be empty",
            ));
        }
        if text.chars().count() > MAX_MESSAGE_LENGTH {
            return Err(DomainError::validation_error(
                "text",
                format!("text must not exceed {MAX_MESSAGE_LENGTH} characters"),
            ));
        }
        Ok(Self { text, source, target })
    }

    /// 源语言缺省为自动检测。
    pub fn auto(text: impl Into<String>, target: LanguageCode) -> Result<Self, DomainError> {
        Self::new(text, LanguageCode::auto(), target)
    }
}

/// 翻译结束后返回给调用方的结果。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationOutcome {
    pub translated_text: String,
    /// 实际使用的服务商；同语言短路时为 `none`。
    pub provider_used: String,
    /// 所有服务商累计的分发次数。
    pub attempts: u32,
    pub cached: bool,
}

impl TranslationOutcome {
    /// 同语言短路：原文即译文，零次服务商调用。
    pub fn short_circuit(text: String) -> Self {
        Self {
            translated_text: text,
            provider_used: "none".to_string(),
            attempts: 0,
            cached: false,
        }
    }
}

/// 服务商调用失败的分类。
///
/// 瞬时错误（超时、5xx、限流、响应格式异常）对同一服务商重试；
/// 永久错误（无效密钥、其他 4xx）立即切换到下一个服务商。
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProviderError {
    #[error("transient provider error: {detail}")]
    Transient { detail: String },

    #[error("permanent provider error: {detail}")]
    Permanent { detail: String },
}

impl ProviderError {
    pub fn transient(detail: impl Into<String>) -> Self {
        Self::Transient { detail: detail.into() }
    }

    pub fn permanent(detail: impl Into<String>) -> Self {
        Self::Permanent { detail: detail.into() }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    pub fn detail(&self) -> &str {
        match self {
            Self::Transient { detail } | Self::Permanent { detail } => detail,
        }
    }
}

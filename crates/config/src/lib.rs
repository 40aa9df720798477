//! 统一配置中心
//!
//! 提供应用的全局配置管理，包括：
//! - 服务器绑定
//! - 翻译服务商（顺序、地址、超时、重试）
//! - 限流配额（消息 / 服务商）
//! - 翻译缓存
//! - 投递策略

use serde::{Deserialize, Serialize};
use std::env;

/// 全局应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// 服务器配置
    pub server: ServerConfig,
    /// 翻译管线配置
    pub translation: TranslationConfig,
    /// 限流配置
    pub rate_limit: RateLimitConfig,
    /// 投递策略配置
    pub delivery: DeliveryConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// 翻译管线配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationConfig {
    /// 服务商优先级顺序，逗号分隔（例如 "mymemory,libretranslate"）
    pub provider_order: Vec<String>,
    /// MyMemory API 地址
    pub mymemory_base_url: String,
    /// LibreTranslate API 地址
    pub libretranslate_base_url: String,
    /// LibreTranslate API 密钥（可选）
    pub libretranslate_api_key: Option<String>,
    /// 单次服务商调用超时（秒）
    pub request_timeout_secs: u64,
    /// 同一服务商的最大重试次数
    pub max_retries: u32,
    /// 两次重试之间的固定间隔（毫秒）
    pub retry_delay_ms: u64,
    /// 翻译缓存条目上限
    pub cache_max_entries: usize,
    /// 翻译缓存条目存活时间（秒）
    pub cache_ttl_secs: u64,
}

/// 限流配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// 每个 用户+IP 在窗口内允许的消息数
    pub messages_per_window: u32,
    /// 消息限流窗口长度（秒）
    pub message_window_secs: u64,
    /// 每个翻译服务商在窗口内允许的请求数
    pub provider_requests_per_window: u32,
    /// 服务商限流窗口长度（秒）
    pub provider_window_secs: u64,
}

/// 投递策略配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// 多人房间统一翻译到的公共语言
    pub group_language: String,
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

impl AppConfig {
    /// 从环境变量加载配置。
    /// 对于关键配置（LIBRETRANSLATE_API_KEY 已设置但为空等）不做兜底，
    /// 服务商地址缺失时 panic，确保生产环境不会静默退回公共测试端点。
    pub fn from_env() -> Self {
        let mut config = Self::from_env_with_defaults();
        config.translation.mymemory_base_url = env::var("MYMEMORY_BASE_URL")
            .expect("MYMEMORY_BASE_URL environment variable is required for production safety");
        config.translation.libretranslate_base_url = env::var("LIBRETRANSLATE_BASE_URL")
            .expect("LIBRETRANSLATE_BASE_URL environment variable is required for production safety");
        config
    }

    /// 从环境变量加载配置，开发环境版本。
    /// 所有缺失项使用默认值，仅用于测试和开发。
    pub fn from_env_with_defaults() -> Self {
        let provider_order = env::var("TRANSLATION_PROVIDERS")
            .unwrap_or_else(|_| "mymemory,libretranslate".to_string())
            .split(',')
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
                port: env_parsed("SERVER_PORT", 8080),
            },
            translation: TranslationConfig {
                provider_order,
                mymemory_base_url: env::var("MYMEMORY_BASE_URL")
                    .unwrap_or_else(|_| "https://api.mymemory.translated.net".to_string()),
                libretranslate_base_url: env::var("LIBRETRANSLATE_BASE_URL")
                    .unwrap_or_else(|_| "https://libretranslate.com".to_string()),
                libretranslate_api_key: env::var("LIBRETRANSLATE_API_KEY").ok(),
                request_timeout_secs: env_parsed("TRANSLATION_TIMEOUT_SECS", 30),
                max_retries: env_parsed("TRANSLATION_MAX_RETRIES", 3),
                retry_delay_ms: env_parsed("TRANSLATION_RETRY_DELAY_MS", 1000),
                cache_max_entries: env_parsed("TRANSLATION_CACHE_MAX_ENTRIES", 1000),
                cache_ttl_secs: env_parsed("TRANSLATION_CACHE_TTL_SECS", 3600),
            },
            rate_limit: RateLimitConfig {
                messages_per_window: env_parsed("RATE_LIMIT_MESSAGES", 30),
                message_window_secs: env_parsed("RATE_LIMIT_MESSAGE_WINDOW_SECS", 60),
                provider_requests_per_window: env_parsed("RATE_LIMIT_PROVIDER_REQUESTS", 60),
                provider_window_secs: env_parsed("RATE_LIMIT_PROVIDER_WINDOW_SECS", 60),
            },
            delivery: DeliveryConfig {
                group_language: env::var("GROUP_TRANSLATION_LANGUAGE")
                    .unwrap_or_else(|_| "en".to_string()),
            },
        }
    }

    /// 验证配置有效性。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.translation.provider_order.is_empty() {
            return Err(ConfigError::InvalidTranslationConfig(
                "at least one translation provider must be configured".to_string(),
            ));
        }

        for provider in &self.translation.provider_order {
            if provider != "mymemory" && provider != "libretranslate" {
                return Err(ConfigError::InvalidTranslationConfig(format!(
                    "unknown translation provider: {provider}"
                )));
            }
        }

        if self.translation.max_retries == 0 {
            return Err(ConfigError::InvalidTranslationConfig(
                "max_retries must be greater than 0".to_string(),
            ));
        }

        if self.translation.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidTranslationConfig(
                "request timeout must be greater than 0".to_string(),
            ));
        }

        if self.translation.cache_max_entries == 0 {
            return Err(ConfigError::InvalidTranslationConfig(
                "cache_max_entries must be greater than 0".to_string(),
            ));
        }

        if self.rate_limit.messages_per_window == 0
            || self.rate_limit.provider_requests_per_window == 0
        {
            return Err(ConfigError::InvalidRateLimitConfig(
                "rate limit quotas must be greater than 0".to_string(),
            ));
        }

        if self.rate_limit.message_window_secs == 0 || self.rate_limit.provider_window_secs == 0 {
            return Err(ConfigError::InvalidRateLimitConfig(
                "rate limit windows must be greater than 0".to_string(),
            ));
        }

        if self.delivery.group_language.trim().is_empty() {
            return Err(ConfigError::InvalidDeliveryConfig(
                "group_language must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid translation configuration: {0}")]
    InvalidTranslationConfig(String),
    #[error("Invalid rate limit configuration: {0}")]
    InvalidRateLimitConfig(String),
    #[error("Invalid delivery configuration: {0}")]
    InvalidDeliveryConfig(String),
    #[error("Environment variable error: {0}")]
    EnvVarError(#[from] std::env::VarError),
}

impl Default for AppConfig {
    /// 默认配置使用开发环境版本。
    fn default() -> Self {
        Self::from_env_with_defaults()
    }
}

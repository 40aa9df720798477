//! 翻译服务商 HTTP 适配器
//!
//! 每个服务商负责自己的请求格式、超时和错误分类：
//! 超时、429、5xx、响应格式异常归为瞬时错误，其余 4xx 归为永久错误。

mod libretranslate;
mod mymemory;

use std::time::Duration;

use domain::ProviderError;

pub use libretranslate::LibreTranslateProvider;
pub use mymemory::MyMemoryProvider;

/// 服务商公共配置。
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub base_url: String,
    pub timeout: Duration,
}

impl ProviderSettings {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }
}

/// 按 HTTP 状态码分类失败。
fn classify_status(provider: &str, status: reqwest::StatusCode, body: &str) -> ProviderError {
    let detail = format!("{provider}: HTTP {status}: {body}");
    if status.as_u16() == 429 || status.is_server_error() {
        ProviderError::transient(detail)
    } else {
        ProviderError::permanent(detail)
    }
}

/// reqwest 传输层错误一律视为瞬时（超时、连接失败）。
fn classify_transport(provider: &str, err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::transient(format!("{provider}: request timed out"))
    } else {
        ProviderError::transient(format!("{provider}: transport error: {err}"))
    }
}

fn build_client(timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::permanent(format!("failed to build http client: {e}")))
}

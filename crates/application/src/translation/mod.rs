//! 翻译编排管线
//!
//! 多服务商按优先级尝试，瞬时失败原地重试，永久失败立即切换，
//! 短 TTL 缓存吸收重复文本，服务商配额由限流器把关。

mod cache;
mod orchestrator;
mod provider;

pub use cache::{CacheStats, TranslationCache};
pub use orchestrator::{TranslationOrchestrator, TranslationPolicy};
pub use provider::TranslationProvider;

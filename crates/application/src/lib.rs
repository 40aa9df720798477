//! 应用层实现。
//!
//! 这里提供围绕领域模型的用例服务：连接注册表、房间扇出、
//! 限流、翻译编排和投递协调，以及对外部协作方
//! （房间成员、消息存储、语言偏好、离线补发）的端口抽象。

pub mod delivery;
pub mod error;
pub mod fanout;
pub mod ports;
pub mod rate_limiter;
pub mod registry;
pub mod translation;

pub use delivery::{
    DeliveryCoordinator, DeliveryCoordinatorDependencies, SendMessageRequest, SendOutcome,
};
pub use error::{ApplicationError, TRANSLATION_FAILED_MESSAGE};
pub use fanout::{ConnectionPush, DeliveryReport, PushError, RoomFanout};
pub use ports::{
    Clock, MessageStore, NotifyError, OfflineNotifier, PreferenceStore, RoomDirectory,
    StorageError, SystemClock,
};
pub use rate_limiter::{RateLimitDecision, SlidingWindowLimiter};
pub use registry::{ConnectionHandle, ConnectionRegistry};
pub use translation::{
    CacheStats, TranslationCache, TranslationOrchestrator, TranslationPolicy, TranslationProvider,
};

//! 基础设施层。
//!
//! 应用层端口的具体适配器：外部翻译服务商的 HTTP 客户端、
//! 内存版的房间/消息/偏好存储、日志版离线补发通道，
//! 以及写入连接出站通道的传输推送。

pub mod memory;
pub mod notifier;
pub mod providers;
pub mod push;

pub use memory::{InMemoryMessageStore, InMemoryPreferenceStore, InMemoryRoomDirectory};
pub use notifier::LoggingOfflineNotifier;
pub use providers::{LibreTranslateProvider, MyMemoryProvider, ProviderSettings};
pub use push::ChannelConnectionPush;

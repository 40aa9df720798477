//! 聊天翻译系统核心领域模型
//!
//! 包含用户/房间/连接标识、消息载荷、翻译请求与结果等核心类型，
//! 以及相关的校验规则。领域层不依赖任何运行时或传输细节。

pub mod errors;
pub mod language;
pub mod message;
pub mod translation;
pub mod value_objects;

pub use errors::{DomainError, DomainResult};
pub use language::{LanguageCode, LanguageOption, SUPPORTED_LANGUAGES};
pub use message::{MessageId, MessagePayload, NewMessageEvent, OnlineUsersEvent, ServerEvent};
pub use translation::{ProviderError, TranslationOutcome, TranslationRequest};
pub use value_objects::{ConnectionId, RoomId, Timestamp, UserId, MAX_ROOM_ID_LENGTH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;
use crate::language::LanguageCode;
use crate::value_objects::{RoomId, Timestamp, UserId};

/// 消息内容最大长度，对齐翻译管线的输入上限。
pub const MAX_MESSAGE_LENGTH: usize = 5000;

/// 消息持久化后由存储协作方分配的标识。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub Uuid);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 一条待投递的消息载荷。
///
/// 构造一次之后不再变更；交给扇出之后任何组件都不得修改它。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub sender_id: UserId,
    pub room_id: RoomId,
    pub text: String,
    pub translated_text: Option<String>,
    pub target_language: Option<LanguageCode>,
    pub created_at: Timestamp,
    pub reply_to: Option<MessageId>,
}

impl MessagePayload {
    pub fn new(
        sender_id: UserId,
        room_id: RoomId,
        text: impl Into<String>,
        created_at: Timestamp,
        reply_to: Option<MessageId>,
    ) -> Result<Self, DomainError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(DomainError::validation_error(
                "text",
                "message must not be empty",
            ));
        }
        if text.chars().count() > MAX_MESSAGE_LENGTH {
            return Err(DomainError::validation_error(
                "text",
                format!("message must not exceed {MAX_MESSAGE_LENGTH} characters"),
            ));
        }
        Ok(Self {
            sender_id,
            room_id,
            text,
            translated_text: None,
            target_language: None,
            created_at,
            reply_to,
        })
    }

    /// 附带翻译结果的变体，仍然返回一个新的不可变载荷。
    pub fn with_translation(mut self, translated: String, target: LanguageCode) -> Self {
        self.translated_text = Some(translated);
        self.target_language = Some(target);
        self
    }
}

/// `new_message` 事件的线上格式，字段名是对外兼容面的一部分。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessageEvent {
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub message: String,
    pub translated_message: Option<String>,
    pub target_language: Option<LanguageCode>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: Timestamp,
}

impl From<&MessagePayload> for NewMessageEvent {
    fn from(payload: &MessagePayload) -> Self {
        Self {
            room_id: payload.room_id.clone(),
            sender_id: payload.sender_id.clone(),
            message: payload.text.clone(),
            translated_message: payload.translated_text.clone(),
            target_language: payload.target_language.clone(),
            created_at: payload.created_at,
        }
    }
}

/// `online_users` 事件：当前在线用户快照。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnlineUsersEvent {
    pub users: Vec<UserId>,
}

/// 服务端推送给客户端的所有事件。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    NewMessage(NewMessageEvent),
    OnlineUsers(OnlineUsersEvent),
    /// 私聊房间解析完成的回执，携带推导出的房间标识。
    RoomJoined { room_id: RoomId },
    Error { code: String, message: String },
    Pong,
}

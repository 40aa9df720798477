//! 对外部协作方的端口定义
//!
//! 房间成员、消息持久化、语言偏好和离线补发通道都由外部系统拥有，
//! 应用层只通过这些 trait 与它们交互，便于在测试中注入内存实现。

use std::collections::HashSet;

use async_trait::async_trait;
use domain::{LanguageCode, MessageId, MessagePayload, RoomId, Timestamp, UserId};
use thiserror::Error;

/// 存储协作方错误
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StorageError {
    #[error("resource not found: {resource}")]
    NotFound { resource: String },
    #[error("storage failure: {message}")]
    Storage { message: String },
}

impl StorageError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound { resource: resource.into() }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage { message: message.into() }
    }
}

/// 房间成员存储。成员关系由外部持久化，核心只读取。
#[async_trait]
pub trait RoomDirectory: Send + Sync {
    /// 解析房间的全部参与者。
    async fn participants(&self, room: &RoomId) -> Result<HashSet<UserId>, StorageError>;

    /// 获取或创建两人私聊房间，推导是确定性的、与参数顺序无关。
    async fn get_or_create_private_room(
        &self,
        a: &UserId,
        b: &UserId,
    ) -> Result<RoomId, StorageError>;
}

/// 消息持久化。分配消息 ID 属于存储方的职责。
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn persist(&self, payload: &MessagePayload) -> Result<MessageId, StorageError>;

    /// 按时间顺序返回最近的消息。
    async fn list_recent(
        &self,
        room: &RoomId,
        limit: usize,
    ) -> Result<Vec<MessagePayload>, StorageError>;
}

/// 用户语言偏好查询，未设置时返回默认语言。
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn preferred_language(&self, user: &UserId) -> Result<LanguageCode, StorageError>;
}

/// 离线补发通道错误
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("offline notification failed: {0}")]
    Failed(String),
}

/// 离线用户的保底投递通道（推送通知 / 可靠队列）。
///
/// 尽力而为：返回 `false` 表示该用户没有注册任何投递端点。
#[async_trait]
pub trait OfflineNotifier: Send + Sync {
    async fn notify_offline(&self, user: &UserId, summary: &str) -> Result<bool, NotifyError>;
}

/// 时间源，测试中注入固定时钟。
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// 系统时钟
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        time::OffsetDateTime::now_utc()
    }
}

//! 内存适配器
//!
//! 房间成员、消息和语言偏好的内存实现，用于本地运行和集成测试。
//! 生产部署把这些端口换成真正的持久化协作方即可，核心逻辑不受影响。

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use application::{MessageStore, PreferenceStore, RoomDirectory, StorageError};
use domain::{LanguageCode, MessageId, MessagePayload, RoomId, UserId};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// 内存房间目录。
///
/// 私聊房间按成员对推导，首次访问时登记两名成员。
#[derive(Debug, Default)]
pub struct InMemoryRoomDirectory {
    rooms: Mutex<HashMap<RoomId, HashSet<UserId>>>,
}

impl InMemoryRoomDirectory {
    /// 预置一个房间及其成员（群聊房间没有推导规则，只能显式登记）。
    pub fn insert_room(&self, room: RoomId, members: impl IntoIterator<Item = UserId>) {
        lock(&self.rooms).insert(room, members.into_iter().collect());
    }
}

#[async_trait]
impl RoomDirectory for InMemoryRoomDirectory {
    async fn participants(&self, room: &RoomId) -> Result<HashSet<UserId>, StorageError> {
        lock(&self.rooms)
            .get(room)
            .cloned()
            .ok_or_else(|| StorageError::not_found(format!("room {}", room.as_str())))
    }

    async fn get_or_create_private_room(
        &self,
        a: &UserId,
        b: &UserId,
    ) -> Result<RoomId, StorageError> {
        let room = RoomId::private_pair(a, b);
        lock(&self.rooms)
            .entry(room.clone())
            .or_insert_with(|| HashSet::from([a.clone(), b.clone()]));
        Ok(room)
    }
}

/// 内存消息存储，按房间分桶、按写入顺序保存。
#[derive(Debug, Default)]
pub struct InMemoryMessageStore {
    messages: Mutex<HashMap<RoomId, Vec<MessagePayload>>>,
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn persist(&self, payload: &MessagePayload) -> Result<MessageId, StorageError> {
        lock(&self.messages)
            .entry(payload.room_id.clone())
            .or_default()
            .push(payload.clone());
        Ok(MessageId(Uuid::new_v4()))
    }

    async fn list_recent(
        &self,
        room: &RoomId,
        limit: usize,
    ) -> Result<Vec<MessagePayload>, StorageError> {
        let messages = lock(&self.messages);
        let bucket = messages.get(room).map(Vec::as_slice).unwrap_or_default();
        let start = bucket.len().saturating_sub(limit);
        Ok(bucket[start..].to_vec())
    }
}

/// 内存语言偏好存储，未设置的用户回落到默认语言。
#[derive(Debug, Default)]
pub struct InMemoryPreferenceStore {
    preferences: Mutex<HashMap<UserId, LanguageCode>>,
}

impl InMemoryPreferenceStore {
    pub fn set_preference(&self, user: UserId, language: LanguageCode) {
        lock(&self.preferences).insert(user, language);
    }
}

#[async_trait]
impl PreferenceStore for InMemoryPreferenceStore {
    async fn preferred_language(&self, user: &UserId) -> Result<LanguageCode, StorageError> {
        Ok(lock(&self.preferences)
            .get(user)
            .cloned()
            .unwrap_or_else(LanguageCode::default_preference))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    #[tokio::test]
    async fn private_room_derivation_is_order_independent() {
        let directory = InMemoryRoomDirectory::default();
        let a = user("alice");
        let b = user("bob");

        let first = directory.get_or_create_private_room(&a, &b).await.unwrap();
        let second = directory.get_or_create_private_room(&b, &a).await.unwrap();
        assert_eq!(first, second);

        let members = directory.participants(&first).await.unwrap();
        assert_eq!(members, HashSet::from([a, b]));
    }

    #[tokio::test]
    async fn unknown_room_is_not_found() {
        let directory = InMemoryRoomDirectory::default();
        let room = RoomId::new("missing").unwrap();
        assert!(directory.participants(&room).await.is_err());
    }

    #[tokio::test]
    async fn list_recent_returns_newest_tail_in_order() {
        let store = InMemoryMessageStore::default();
        let room = RoomId::new("general").unwrap();
        for i in 0..5 {
            let payload = MessagePayload::new(
                user("alice"),
                room.clone(),
                format!("message {i}"),
                time::OffsetDateTime::now_utc(),
                None,
            )
            .unwrap();
            store.persist(&payload).await.unwrap();
        }

        let recent = store.list_recent(&room, 3).await.unwrap();
        let texts: Vec<_> = recent.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["message 2", "message 3", "message 4"]);
    }

    #[tokio::test]
    async fn missing_preference_falls_back_to_default() {
        let store = InMemoryPreferenceStore::default();
        let language = store.preferred_language(&user("carol")).await.unwrap();
        assert_eq!(language, LanguageCode::default_preference());
    }
}

//! 连接注册表
//!
//! 维护逻辑用户到其全部存活连接（多设备）的映射。
//! 这是进程内唯一的连接事实来源：注册表独占持有规范句柄集合，
//! 其他组件只拿到快照克隆，克隆里共享的只有出站发送端，
//! 断开之后残留的克隆握着的是已关闭的通道，不会让句柄泄漏。
//!
//! 并发约定：同一用户的增删由该用户的内部锁串行化，
//! 不相关用户的连接/断开在外层读锁下互不干扰；
//! 外层写锁只在插入或删除用户键时短暂持有。

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError, RwLock};

use domain::{ConnectionId, ServerEvent, Timestamp, UserId};
use tokio::sync::mpsc;

/// 一条存活传输连接的句柄，一个设备一条。
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    user_id: UserId,
    connection_id: ConnectionId,
    created_at: Timestamp,
    sender: mpsc::UnboundedSender<ServerEvent>,
}

impl ConnectionHandle {
    pub fn new(
        user_id: UserId,
        connection_id: ConnectionId,
        created_at: Timestamp,
        sender: mpsc::UnboundedSender<ServerEvent>,
    ) -> Self {
        Self {
            user_id,
            connection_id,
            created_at,
            sender,
        }
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// 向该连接的出站通道推送一个事件。
    pub fn send(&self, event: ServerEvent) -> Result<(), ServerEvent> {
        self.sender.send(event).map_err(|e| e.0)
    }
}

/// 用户 → 存活连接集合 的进程内注册表。
///
/// 不变量：用户键存在当且仅当其连接集合非空；空集合被立即剪除。
/// 所有方法都只做内存操作，不会阻塞在 I/O 上。
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    users: RwLock<HashMap<UserId, Mutex<Vec<ConnectionHandle>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册一条连接。同一连接 ID 重复注册是无操作。
    pub fn register(&self, handle: ConnectionHandle) {
        let user_id = handle.user_id.clone();

        {
            let users = self.users.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(slot) = users.get(&user_id) {
                let mut connections = slot.lock().unwrap_or_else(PoisonError::into_inner);
                if connections
                    .iter()
                    .any(|c| c.connection_id == handle.connection_id)
                {
                    tracing::debug!(
                        user_id = %user_id,
                        connection_id = %handle.connection_id,
                        "duplicate register ignored"
                    );
                    return;
                }
                connections.push(handle);
                return;
            }
        }

        // 用户键不存在，需要外层写锁插入
        let mut users = self.users.write().unwrap_or_else(PoisonError::into_inner);
        let slot = users
            .entry(user_id.clone())
            .or_insert_with(|| Mutex::new(Vec::new()));
        let mut connections = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if !connections
            .iter()
            .any(|c| c.connection_id == handle.connection_id)
        {
            connections.push(handle);
        }
    }

    /// 注销一条连接。幂等：注销不存在的连接是无操作，仅记 debug 日志。
    pub fn unregister(&self, user_id: &UserId, connection_id: ConnectionId) {
        let became_empty = {
            let users = self.users.read().unwrap_or_else(PoisonError::into_inner);
            match users.get(user_id) {
                Some(slot) => {
                    let mut connections = slot.lock().unwrap_or_else(PoisonError::into_inner);
                    let before = connections.len();
                    connections.retain(|c| c.connection_id != connection_id);
                    if connections.len() == before {
                        tracing::debug!(
                            user_id = %user_id,
                            connection_id = %connection_id,
                            "unregister of unknown connection ignored"
                        );
                    }
                    connections.is_empty()
                }
                None => {
                    tracing::debug!(
                        user_id = %user_id,
                        connection_id = %connection_id,
                        "unregister for unknown user ignored"
                    );
                    false
                }
            }
        };

        if became_empty {
            // 写锁下复查空集，避免跟并发 register 竞争时丢连接
            let mut users = self.users.write().unwrap_or_else(PoisonError::into_inner);
            let still_empty = users
                .get(user_id)
                .map(|slot| {
                    slot.lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .is_empty()
                })
                .unwrap_or(false);
            if still_empty {
                users.remove(user_id);
            }
        }
    }

    /// 该用户全部存活连接的快照，离线用户返回空集而不是错误。
    pub fn connections_for(&self, user_id: &UserId) -> Vec<ConnectionHandle> {
        let users = self.users.read().unwrap_or_else(PoisonError::into_inner);
        users
            .get(user_id)
            .map(|slot| slot.lock().unwrap_or_else(PoisonError::into_inner).clone())
            .unwrap_or_default()
    }

    pub fn is_online(&self, user_id: &UserId) -> bool {
        !self.connections_for(user_id).is_empty()
    }

    /// 当前在线用户快照。
    pub fn online_users(&self) -> Vec<UserId> {
        let users = self.users.read().unwrap_or_else(PoisonError::into_inner);
        users
            .iter()
            .filter(|(_, slot)| {
                !slot
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .is_empty()
            })
            .map(|(user, _)| user.clone())
            .collect()
    }

    /// 所有用户的连接总数。
    pub fn connection_count(&self) -> usize {
        let users = self.users.read().unwrap_or_else(PoisonError::into_inner);
        users
            .values()
            .map(|slot| slot.lock().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }
}

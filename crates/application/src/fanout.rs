//! 房间内消息扇出
//!
//! 给定房间和发送者，解析参与者并把消息投递到除发送者以外
//! 每个参与者的每台设备上，返回一份投递清点。
//! 单条连接的推送失败只计数，不中断其余投递。

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{MessagePayload, NewMessageEvent, RoomId, ServerEvent, UserId};
use futures::future::join_all;
use thiserror::Error;

use crate::ports::RoomDirectory;
use crate::registry::{ConnectionHandle, ConnectionRegistry};

#[derive(Debug, Error)]
pub enum PushError {
    #[error("push failed: {0}")]
    Failed(String),
}

impl PushError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// 传输层推送端口。扇出对每条连接只做这一件事，
/// 具体的帧格式由传输协作方负责。
#[async_trait]
pub trait ConnectionPush: Send + Sync {
    async fn push(&self, handle: &ConnectionHandle, event: ServerEvent) -> Result<(), PushError>;
}

/// 一次广播的投递清点。
///
/// 部分连接不可达不是错误：持久化已经成功，
/// 离线参与者交由保底通道补偿。
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryReport {
    /// 成功送达的连接数
    pub delivered_connections: u32,
    /// 推送失败的连接数
    pub failed_connections: u32,
    /// 房间参与者总数（含发送者）
    pub total_participants: u32,
    /// 没有任何存活连接的参与者
    pub offline_participants: Vec<UserId>,
}

/// 房间扇出器。
pub struct RoomFanout {
    registry: Arc<ConnectionRegistry>,
    rooms: Arc<dyn RoomDirectory>,
    push: Arc<dyn ConnectionPush>,
}

impl RoomFanout {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        rooms: Arc<dyn RoomDirectory>,
        push: Arc<dyn ConnectionPush>,
    ) -> Self {
        Self { registry, rooms, push }
    }

    /// 向房间广播一条消息。
    ///
    /// 发送者按 UserId 整体排除（覆盖其所有设备）；
    /// 其余参与者的每台设备恰好收到一份。
    /// 各连接的推送并发发起，清点在全部推送完成之后返回。
    pub async fn broadcast(
        &self,
        room: &RoomId,
        sender: &UserId,
        payload: &MessagePayload,
    ) -> Result<DeliveryReport, crate::error::ApplicationError> {
        let participants = self.rooms.participants(room).await?;
        self.broadcast_to(&participants, sender, payload).await
    }

    /// 已解析参与者集合的广播入口，避免调用方重复解析成员。
    pub async fn broadcast_to(
        &self,
        participants: &HashSet<UserId>,
        sender: &UserId,
        payload: &MessagePayload,
    ) -> Result<DeliveryReport, crate::error::ApplicationError> {
        let event = ServerEvent::NewMessage(NewMessageEvent::from(payload));

        let mut offline_participants = Vec::new();
        let mut targets: Vec<ConnectionHandle> = Vec::new();

        for participant in participants {
            if participant == sender {
                continue;
            }
            let connections = self.registry.connections_for(participant);
            if connections.is_empty() {
                offline_participants.push(participant.clone());
            } else {
                targets.extend(connections);
            }
        }

        // 扇出/收拢屏障：并发推送，全部结束后再清点
        let pushes = targets.iter().map(|handle| {
            let event = event.clone();
            async move { self.push.push(handle, event).await }
        });
        let results = join_all(pushes).await;

        let mut delivered = 0u32;
        let mut failed = 0u32;
        for (handle, result) in targets.iter().zip(results) {
            match result {
                Ok(()) => delivered += 1,
                Err(err) => {
                    failed += 1;
                    tracing::warn!(
                        connection_id = %handle.connection_id(),
                        user_id = %handle.user_id(),
                        error = %err,
                        "push failed, continuing fanout"
                    );
                }
            }
        }

        Ok(DeliveryReport {
            delivered_connections: delivered,
            failed_connections: failed,
            total_participants: participants.len() as u32,
            offline_participants,
        })
    }
}

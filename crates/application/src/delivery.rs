//! 投递协调器
//!
//! 把一次发送串成完整链路：校验 → 限流 → 翻译策略 → 持久化 →
//! 房间扇出 → 离线保底补发，并负责在连接/断开时向所有在线连接
//! 广播 `online_users` 快照。
//!
//! 持久化失败对本次发送是致命的；扇出与补发失败只降级记录，
//! 消息此时已经落库，下次拉取/重连即可补齐。

use std::sync::Arc;

use domain::{
    ConnectionId, DomainError, LanguageCode, MessageId, MessagePayload, NewMessageEvent,
    OnlineUsersEvent, RoomId, ServerEvent, TranslationRequest, UserId,
};
use futures::future::join_all;

use crate::error::ApplicationError;
use crate::fanout::{ConnectionPush, DeliveryReport, RoomFanout};
use crate::ports::{Clock, MessageStore, OfflineNotifier, PreferenceStore, RoomDirectory};
use crate::rate_limiter::SlidingWindowLimiter;
use crate::registry::{ConnectionHandle, ConnectionRegistry};
use crate::translation::TranslationOrchestrator;

/// 一次发送请求。
#[derive(Debug, Clone)]
pub struct SendMessageRequest {
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub text: String,
    pub reply_to: Option<MessageId>,
    /// 消息限流键的一部分（用户+IP）；缺省记为 unknown。
    pub client_ip: Option<String>,
}

/// 发送结束后返回给调用方的结果。
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub message_id: MessageId,
    pub payload: MessagePayload,
    pub report: DeliveryReport,
}

/// 协调器的全部依赖，构造注入，便于测试替换。
pub struct DeliveryCoordinatorDependencies {
    pub registry: Arc<ConnectionRegistry>,
    pub fanout: Arc<RoomFanout>,
    pub orchestrator: Arc<TranslationOrchestrator>,
    pub rooms: Arc<dyn RoomDirectory>,
    pub messages: Arc<dyn MessageStore>,
    pub preferences: Arc<dyn PreferenceStore>,
    pub notifier: Arc<dyn OfflineNotifier>,
    pub message_limiter: Arc<SlidingWindowLimiter>,
    pub push: Arc<dyn ConnectionPush>,
    pub clock: Arc<dyn Clock>,
    /// 多人房间统一翻译到的公共语言
    pub group_language: LanguageCode,
}

pub struct DeliveryCoordinator {
    registry: Arc<ConnectionRegistry>,
    fanout: Arc<RoomFanout>,
    orchestrator: Arc<TranslationOrchestrator>,
    rooms: Arc<dyn RoomDirectory>,
    messages: Arc<dyn MessageStore>,
    preferences: Arc<dyn PreferenceStore>,
    notifier: Arc<dyn OfflineNotifier>,
    message_limiter: Arc<SlidingWindowLimiter>,
    push: Arc<dyn ConnectionPush>,
    clock: Arc<dyn Clock>,
    group_language: LanguageCode,
}

impl DeliveryCoordinator {
    pub fn new(deps: DeliveryCoordinatorDependencies) -> Self {
        Self {
            registry: deps.registry,
            fanout: deps.fanout,
            orchestrator: deps.orchestrator,
            rooms: deps.rooms,
            messages: deps.messages,
            preferences: deps.preferences,
            notifier: deps.notifier,
            message_limiter: deps.message_limiter,
            push: deps.push,
            clock: deps.clock,
            group_language: deps.group_language,
        }
    }

    /// 发送一条消息。
    ///
    /// 扇出一旦开始就跑到底，不做中途取消，避免部分投递的歧义。
    pub async fn send_message(
        &self,
        request: SendMessageRequest,
    ) -> Result<SendOutcome, ApplicationError> {
        // 校验在任何副作用之前完成
        let mut payload = MessagePayload::new(
            request.sender_id.clone(),
            request.room_id.clone(),
            request.text,
            self.clock.now(),
            request.reply_to,
        )?;

        let participants = self.rooms.participants(&request.room_id).await?;
        if !participants.contains(&request.sender_id) {
            return Err(DomainError::access_denied(
                "sender is not a participant of the room",
            )
            .into());
        }

        let limiter_key = format!(
            "{}:{}",
            request.sender_id,
            request.client_ip.as_deref().unwrap_or("unknown")
        );
        let decision = self.message_limiter.check(&limiter_key);
        if !decision.allowed {
            return Err(ApplicationError::rate_limited(decision.retry_after));
        }

        // 翻译失败降级为投递原文，消息本身照常发送
        if let Some((source, target)) = self.target_language_for(&participants, &request.sender_id).await? {
            let translation = TranslationRequest::new(payload.text.clone(), source, target.clone())?;
            match self.orchestrator.translate(translation).await {
                Ok(outcome) => {
                    payload = payload.with_translation(outcome.translated_text, target);
                }
                Err(err) => {
                    tracing::warn!(
                        room_id = %request.room_id,
                        sender_id = %request.sender_id,
                        error = %err,
                        "translation failed, delivering untranslated"
                    );
                }
            }
        }

        // 持久化失败对发送是致命的
        let message_id = self.messages.persist(&payload).await?;

        let report = self
            .fanout
            .broadcast_to(&participants, &request.sender_id, &payload)
            .await?;

        tracing::info!(
            room_id = %request.room_id,
            sender_id = %request.sender_id,
            message_id = %message_id,
            delivered = report.delivered_connections,
            offline = report.offline_participants.len(),
            "message dispatched"
        );

        // 保底通道对调用方是即发即忘：不阻塞响应，失败只记日志
        if !report.offline_participants.is_empty() {
            self.dispatch_offline_notifications(&request.sender_id, &report.offline_participants);
        }

        Ok(SendOutcome {
            message_id,
            payload,
            report,
        })
    }

    /// 翻译策略，集中在一处便于产品侧调整：
    /// 两人房间只在双方偏好不同时翻成接收方语言；
    /// 多人房间统一翻成配置的公共语言，而不是按人各翻一份。
    async fn target_language_for(
        &self,
        participants: &std::collections::HashSet<UserId>,
        sender: &UserId,
    ) -> Result<Option<(LanguageCode, LanguageCode)>, ApplicationError> {
        let sender_pref = self.preferences.preferred_language(sender).await?;

        let target = if participants.len() == 2 {
            match participants.iter().find(|p| *p != sender) {
                Some(receiver) => {
                    let receiver_pref = self.preferences.preferred_language(receiver).await?;
                    (receiver_pref != sender_pref).then_some(receiver_pref)
                }
                None => None,
            }
        } else if participants.len() > 2 && self.group_language != sender_pref {
            Some(self.group_language.clone())
        } else {
            None
        };

        Ok(target.map(|t| (sender_pref, t)))
    }

    fn dispatch_offline_notifications(&self, sender: &UserId, offline: &[UserId]) {
        let notifier = Arc::clone(&self.notifier);
        let sender = sender.clone();
        let offline = offline.to_vec();
        tokio::spawn(async move {
            let summary = format!("New message from {sender}");
            for user in offline {
                match notifier.notify_offline(&user, &summary).await {
                    Ok(true) => {
                        tracing::debug!(user_id = %user, "offline notification dispatched");
                    }
                    Ok(false) => {
                        tracing::debug!(user_id = %user, "no registered delivery endpoint");
                    }
                    Err(err) => {
                        tracing::warn!(
                            user_id = %user,
                            error = %err,
                            "offline notification failed"
                        );
                    }
                }
            }
        });
    }

    /// 连接建立：登记句柄并向所有在线连接广播最新的在线用户列表。
    pub async fn connect(&self, handle: ConnectionHandle) {
        let user_id = handle.user_id().clone();
        self.registry.register(handle);
        tracing::info!(user_id = %user_id, "connection registered");
        self.broadcast_presence().await;
    }

    /// 连接断开：幂等注销并广播在线用户列表。
    pub async fn disconnect(&self, user_id: &UserId, connection_id: ConnectionId) {
        self.registry.unregister(user_id, connection_id);
        tracing::info!(user_id = %user_id, connection_id = %connection_id, "connection unregistered");
        self.broadcast_presence().await;
    }

    /// 两人私聊房间的确定性解析。
    pub async fn open_private_room(
        &self,
        a: &UserId,
        b: &UserId,
    ) -> Result<RoomId, ApplicationError> {
        Ok(self.rooms.get_or_create_private_room(a, b).await?)
    }

    /// 给单条刚建立的连接补发当前在线列表。
    pub async fn send_presence_snapshot(&self, handle: &ConnectionHandle) {
        let event = ServerEvent::OnlineUsers(OnlineUsersEvent {
            users: self.registry.online_users(),
        });
        if let Err(err) = self.push.push(handle, event).await {
            tracing::warn!(
                connection_id = %handle.connection_id(),
                error = %err,
                "presence snapshot push failed"
            );
        }
    }

    async fn broadcast_presence(&self) {
        let users = self.registry.online_users();
        let event = ServerEvent::OnlineUsers(OnlineUsersEvent { users: users.clone() });

        let mut targets = Vec::new();
        for user in &users {
            targets.extend(self.registry.connections_for(user));
        }

        let pushes = targets.iter().map(|handle| {
            let event = event.clone();
            async move { (handle, self.push.push(handle, event).await) }
        });
        for (handle, result) in join_all(pushes).await {
            if let Err(err) = result {
                tracing::debug!(
                    connection_id = %handle.connection_id(),
                    error = %err,
                    "presence push failed"
                );
            }
        }
    }

    /// 供只读接口使用的消息历史。
    pub async fn recent_messages(
        &self,
        room_id: &RoomId,
        limit: usize,
    ) -> Result<Vec<NewMessageEvent>, ApplicationError> {
        let messages = self.messages.list_recent(room_id, limit).await?;
        Ok(messages.iter().map(NewMessageEvent::from).collect())
    }
}

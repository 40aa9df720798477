//! 发送链路端到端测试
//!
//! 用内存协作方把协调器完整链路跑起来：
//! 多设备翻译投递、离线保底补发、降级与拒绝路径。

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use application::{
    ApplicationError, Clock, ConnectionHandle, ConnectionPush, ConnectionRegistry,
    DeliveryCoordinator, DeliveryCoordinatorDependencies, MessageStore, NotifyError,
    OfflineNotifier, PreferenceStore, PushError, RoomDirectory, RoomFanout, SendMessageRequest,
    SlidingWindowLimiter, StorageError, TranslationCache, TranslationOrchestrator,
    TranslationPolicy, TranslationProvider,
};
use domain::{
    ConnectionId, LanguageCode, MessageId, MessagePayload, ProviderError, RoomId, ServerEvent,
    Timestamp, TranslationRequest, UserId,
};

fn user(id: &str) -> UserId {
    UserId::new(id).unwrap()
}

fn lang(code: &str) -> LanguageCode {
    LanguageCode::new(code).unwrap()
}

struct FixedClock;

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        time::OffsetDateTime::UNIX_EPOCH
    }
}

/// 直接写入句柄出站通道的推送实现。
struct ChannelPush;

#[async_trait]
impl ConnectionPush for ChannelPush {
    async fn push(&self, handle: &ConnectionHandle, event: ServerEvent) -> Result<(), PushError> {
        handle
            .send(event)
            .map_err(|_| PushError::failed("connection channel closed"))
    }
}

#[derive(Default)]
struct MemoryRoomDirectory {
    rooms: Mutex<HashMap<RoomId, HashSet<UserId>>>,
}

impl MemoryRoomDirectory {
    fn with_room(room: &RoomId, members: &[UserId]) -> Arc<Self> {
        let directory = Self::default();
        directory
            .rooms
            .lock()
            .unwrap()
            .insert(room.clone(), members.iter().cloned().collect());
        Arc::new(directory)
    }
}

#[async_trait]
impl RoomDirectory for MemoryRoomDirectory {
    async fn participants(&self, room: &RoomId) -> Result<HashSet<UserId>, StorageError> {
        self.rooms
            .lock()
            .unwrap()
            .get(room)
            .cloned()
            .ok_or_else(|| StorageError::not_found(format!("room {room}")))
    }

    async fn get_or_create_private_room(
        &self,
        a: &UserId,
        b: &UserId,
    ) -> Result<RoomId, StorageError> {
        let room = RoomId::private_pair(a, b);
        self.rooms
            .lock()
            .unwrap()
            .entry(room.clone())
            .or_insert_with(|| [a.clone(), b.clone()].into_iter().collect());
        Ok(room)
    }
}

#[derive(Default)]
struct MemoryMessageStore {
    messages: Mutex<Vec<(MessageId, MessagePayload)>>,
}

impl MemoryMessageStore {
    fn stored(&self) -> Vec<MessagePayload> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .map(|(_, payload)| payload.clone())
            .collect()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn persist(&self, payload: &MessagePayload) -> Result<MessageId, StorageError> {
        let id = MessageId(Uuid::new_v4());
        self.messages.lock().unwrap().push((id, payload.clone()));
        Ok(id)
    }

    async fn list_recent(
        &self,
        room: &RoomId,
        limit: usize,
    ) -> Result<Vec<MessagePayload>, StorageError> {
        let messages = self.messages.lock().unwrap();
        let mut recent: Vec<MessagePayload> = messages
            .iter()
            .filter(|(_, p)| &p.room_id == room)
            .map(|(_, p)| p.clone())
            .collect();
        let skip = recent.len().saturating_sub(limit);
        Ok(recent.split_off(skip))
    }
}

/// 总是失败的存储，用于验证持久化失败对发送是致命的。
struct FailingMessageStore;

#[async_trait]
impl MessageStore for FailingMessageStore {
    async fn persist(&self, _payload: &MessagePayload) -> Result<MessageId, StorageError> {
        Err(StorageError::storage("disk full"))
    }

    async fn list_recent(
        &self,
        _room: &RoomId,
        _limit: usize,
    ) -> Result<Vec<MessagePayload>, StorageError> {
        Ok(Vec::new())
    }
}

#[derive(Default)]
struct MemoryPreferenceStore {
    preferences: Mutex<HashMap<UserId, LanguageCode>>,
}

impl MemoryPreferenceStore {
    fn with(prefs: &[(&UserId, &str)]) -> Arc<Self> {
        let store = Self::default();
        {
            let mut map = store.preferences.lock().unwrap();
            for (user, code) in prefs {
                map.insert((*user).clone(), lang(code));
            }
        }
        Arc::new(store)
    }
}

#[async_trait]
impl PreferenceStore for MemoryPreferenceStore {
    async fn preferred_language(&self, user: &UserId) -> Result<LanguageCode, StorageError> {
        Ok(self
            .preferences
            .lock()
            .unwrap()
            .get(user)
            .cloned()
            .unwrap_or_else(LanguageCode::default_preference))
    }
}

#[derive(Default)]
struct RecordingNotifier {
    notified: Mutex<Vec<UserId>>,
    signal: tokio::sync::Notify,
}

impl RecordingNotifier {
    async fn wait_for_dispatch(&self) {
        tokio::time::timeout(Duration::from_secs(2), self.signal.notified())
            .await
            .expect("offline notification was never dispatched");
    }

    fn calls(&self) -> Vec<UserId> {
        self.notified.lock().unwrap().clone()
    }
}

#[async_trait]
impl OfflineNotifier for RecordingNotifier {
    async fn notify_offline(&self, user: &UserId, _summary: &str) -> Result<bool, NotifyError> {
        self.notified.lock().unwrap().push(user.clone());
        self.signal.notify_one();
        Ok(true)
    }
}

enum ProviderBehavior {
    Succeed(&'static str),
    FailTransient,
}

struct ScriptedProvider {
    name: &'static str,
    behavior: ProviderBehavior,
    calls: AtomicU32,
}

impl ScriptedProvider {
    fn new(name: &'static str, behavior: ProviderBehavior) -> Arc<Self> {
        Arc::new(Self {
            name,
            behavior,
            calls: AtomicU32::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranslationProvider for ScriptedProvider {
    fn name(&self) -> &str {
        self.name
    }

    async fn translate(&self, _request: &TranslationRequest) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            ProviderBehavior::Succeed(text) => Ok(text.to_string()),
            ProviderBehavior::FailTransient => Err(ProviderError::transient("gateway timeout")),
        }
    }
}

struct TestEnv {
    registry: Arc<ConnectionRegistry>,
    coordinator: DeliveryCoordinator,
    store: Arc<MemoryMessageStore>,
    notifier: Arc<RecordingNotifier>,
}

impl TestEnv {
    fn open_connection(&self, user: &UserId) -> (ConnectionId, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ConnectionHandle::new(
            user.clone(),
            ConnectionId::generate(),
            time::OffsetDateTime::UNIX_EPOCH,
            tx,
        );
        let id = handle.connection_id();
        self.registry.register(handle);
        (id, rx)
    }
}

fn build_env(
    rooms: Arc<MemoryRoomDirectory>,
    preferences: Arc<MemoryPreferenceStore>,
    providers: Vec<Arc<ScriptedProvider>>,
    message_quota: u32,
) -> TestEnv {
    let registry = Arc::new(ConnectionRegistry::new());
    let push: Arc<dyn ConnectionPush> = Arc::new(ChannelPush);
    let store = Arc::new(MemoryMessageStore::default());
    let notifier = Arc::new(RecordingNotifier::default());

    let orchestrator = Arc::new(TranslationOrchestrator::new(
        providers
            .into_iter()
            .map(|p| p as Arc<dyn TranslationProvider>)
            .collect(),
        Arc::new(SlidingWindowLimiter::new(1000, Duration::from_secs(60))),
        TranslationCache::new(100, Duration::from_secs(60)),
        TranslationPolicy {
            max_retries: 3,
            retry_delay: Duration::ZERO,
        },
    ));

    let fanout = Arc::new(RoomFanout::new(
        Arc::clone(&registry),
        rooms.clone() as Arc<dyn RoomDirectory>,
        Arc::clone(&push),
    ));

    let coordinator = DeliveryCoordinator::new(DeliveryCoordinatorDependencies {
        registry: Arc::clone(&registry),
        fanout,
        orchestrator,
        rooms: rooms as Arc<dyn RoomDirectory>,
        messages: store.clone() as Arc<dyn MessageStore>,
        preferences: preferences as Arc<dyn PreferenceStore>,
        notifier: notifier.clone() as Arc<dyn OfflineNotifier>,
        message_limiter: Arc::new(SlidingWindowLimiter::new(
            message_quota,
            Duration::from_secs(60),
        )),
        push,
        clock: Arc::new(FixedClock),
        group_language: lang("en"),
    });

    TestEnv {
        registry,
        coordinator,
        store,
        notifier,
    }
}

fn send_request(room: &RoomId, sender: &UserId, text: &str) -> SendMessageRequest {
    SendMessageRequest {
        room_id: room.clone(),
        sender_id: sender.clone(),
        text: text.to_string(),
        reply_to: None,
        client_ip: Some("127.0.0.1".to_string()),
    }
}

fn expect_new_message(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> domain::NewMessageEvent {
    match rx.try_recv().expect("expected a pushed event") {
        ServerEvent::NewMessage(event) => event,
        other => panic!("expected new_message, got {other:?}"),
    }
}

#[tokio::test]
async fn two_device_recipient_gets_translated_message_on_every_device() {
    let alice = user("alice"); // 偏好 es，两台设备
    let bob = user("bob"); // 偏好 en，发送者
    let room = RoomId::private_pair(&alice, &bob);

    let provider = ScriptedProvider::new(
        "mymemory",
        ProviderBehavior::Succeed("Hola, ¿cómo estás?"),
    );
    let env = build_env(
        MemoryRoomDirectory::with_room(&room, &[alice.clone(), bob.clone()]),
        MemoryPreferenceStore::with(&[(&alice, "es"), (&bob, "en")]),
        vec![provider],
        100,
    );

    let (_, mut alice_first) = env.open_connection(&alice);
    let (_, mut alice_second) = env.open_connection(&alice);
    let (_, mut bob_rx) = env.open_connection(&bob);

    let outcome = env
        .coordinator
        .send_message(send_request(&room, &bob, "Hello, how are you?"))
        .await
        .unwrap();

    assert_eq!(outcome.report.delivered_connections, 2);
    assert!(outcome.report.offline_participants.is_empty());

    for rx in [&mut alice_first, &mut alice_second] {
        let event = expect_new_message(rx);
        assert_eq!(event.message, "Hello, how are you?");
        assert_eq!(event.translated_message.as_deref(), Some("Hola, ¿cómo estás?"));
        assert_eq!(event.target_language, Some(lang("es")));
        assert_eq!(event.sender_id, bob);
        assert!(rx.try_recv().is_err(), "each device gets exactly one copy");
    }

    // 发送者自己的连接什么都收不到
    assert!(bob_rx.try_recv().is_err());
}

#[tokio::test]
async fn same_preference_pair_skips_translation_entirely() {
    let alice = user("alice");
    let bob = user("bob");
    let room = RoomId::private_pair(&alice, &bob);

    let provider = ScriptedProvider::new("mymemory", ProviderBehavior::Succeed("unused"));
    let env = build_env(
        MemoryRoomDirectory::with_room(&room, &[alice.clone(), bob.clone()]),
        MemoryPreferenceStore::with(&[(&alice, "en"), (&bob, "en")]),
        vec![provider.clone()],
        100,
    );

    let (_, mut alice_rx) = env.open_connection(&alice);
    env.open_connection(&bob);

    env.coordinator
        .send_message(send_request(&room, &bob, "hello"))
        .await
        .unwrap();

    assert_eq!(provider.calls(), 0);
    let event = expect_new_message(&mut alice_rx);
    assert!(event.translated_message.is_none());
    assert!(event.target_language.is_none());
}

#[tokio::test]
async fn offline_recipient_is_handed_to_the_guaranteed_channel_once() {
    let alice = user("alice");
    let bob = user("bob");
    let room = RoomId::private_pair(&alice, &bob);

    let provider = ScriptedProvider::new("mymemory", ProviderBehavior::Succeed("hola"));
    let env = build_env(
        MemoryRoomDirectory::with_room(&room, &[alice.clone(), bob.clone()]),
        MemoryPreferenceStore::with(&[(&alice, "en"), (&bob, "en")]),
        vec![provider],
        100,
    );

    // alice 没有任何存活连接
    env.open_connection(&bob);

    let outcome = env
        .coordinator
        .send_message(send_request(&room, &bob, "are you there?"))
        .await
        .unwrap();

    assert_eq!(outcome.report.delivered_connections, 0);
    assert_eq!(outcome.report.offline_participants, vec![alice.clone()]);

    env.notifier.wait_for_dispatch().await;
    assert_eq!(env.notifier.calls(), vec![alice]);
}

#[tokio::test]
async fn translation_failure_degrades_to_untranslated_delivery() {
    let alice = user("alice");
    let bob = user("bob");
    let room = RoomId::private_pair(&alice, &bob);

    let provider = ScriptedProvider::new("mymemory", ProviderBehavior::FailTransient);
    let env = build_env(
        MemoryRoomDirectory::with_room(&room, &[alice.clone(), bob.clone()]),
        MemoryPreferenceStore::with(&[(&alice, "es"), (&bob, "en")]),
        vec![provider.clone()],
        100,
    );

    let (_, mut alice_rx) = env.open_connection(&alice);

    let outcome = env
        .coordinator
        .send_message(send_request(&room, &bob, "hello"))
        .await
        .unwrap();

    // 所有重试耗尽，但消息仍然送达且已落库
    assert_eq!(provider.calls(), 3);
    assert_eq!(outcome.report.delivered_connections, 1);
    assert_eq!(env.store.stored().len(), 1);

    let event = expect_new_message(&mut alice_rx);
    assert_eq!(event.message, "hello");
    assert!(event.translated_message.is_none());
}

#[tokio::test]
async fn group_room_translates_once_to_the_common_language() {
    let alice = user("alice");
    let bob = user("bob");
    let carol = user("carol");
    let room = RoomId::new("group:trip").unwrap();

    let provider = ScriptedProvider::new("mymemory", ProviderBehavior::Succeed("hello everyone"));
    let env = build_env(
        MemoryRoomDirectory::with_room(&room, &[alice.clone(), bob.clone(), carol.clone()]),
        MemoryPreferenceStore::with(&[(&alice, "fr"), (&bob, "es"), (&carol, "ja")]),
        vec![provider.clone()],
        100,
    );

    let (_, mut bob_rx) = env.open_connection(&bob);
    let (_, mut carol_rx) = env.open_connection(&carol);

    // 群聊不按人各翻一份：只翻一次到配置的公共语言 en
    env.coordinator
        .send_message(send_request(&room, &alice, "salut tout le monde"))
        .await
        .unwrap();

    assert_eq!(provider.calls(), 1);
    for rx in [&mut bob_rx, &mut carol_rx] {
        let event = expect_new_message(rx);
        assert_eq!(event.translated_message.as_deref(), Some("hello everyone"));
        assert_eq!(event.target_language, Some(lang("en")));
    }
}

#[tokio::test]
async fn non_participant_sender_is_rejected_before_any_side_effect() {
    let alice = user("alice");
    let bob = user("bob");
    let mallory = user("mallory");
    let room = RoomId::private_pair(&alice, &bob);

    let provider = ScriptedProvider::new("mymemory", ProviderBehavior::Succeed("hola"));
    let env = build_env(
        MemoryRoomDirectory::with_room(&room, &[alice.clone(), bob.clone()]),
        MemoryPreferenceStore::default().into(),
        vec![provider],
        100,
    );

    let err = env
        .coordinator
        .send_message(send_request(&room, &mallory, "hi"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ApplicationError::Domain(domain::DomainError::AccessDenied { .. })
    ));
    assert!(env.store.stored().is_empty());
}

#[tokio::test]
async fn rate_limited_sender_is_rejected_without_persisting() {
    let alice = user("alice");
    let bob = user("bob");
    let room = RoomId::private_pair(&alice, &bob);

    let provider = ScriptedProvider::new("mymemory", ProviderBehavior::Succeed("hola"));
    let env = build_env(
        MemoryRoomDirectory::with_room(&room, &[alice.clone(), bob.clone()]),
        MemoryPreferenceStore::with(&[(&alice, "en"), (&bob, "en")]),
        vec![provider],
        1,
    );

    env.open_connection(&alice);

    env.coordinator
        .send_message(send_request(&room, &bob, "first"))
        .await
        .unwrap();
    let err = env
        .coordinator
        .send_message(send_request(&room, &bob, "second"))
        .await
        .unwrap_err();

    assert!(matches!(err, ApplicationError::RateLimited { .. }));
    assert_eq!(env.store.stored().len(), 1);
}

#[tokio::test]
async fn persistence_failure_is_fatal_to_the_send() {
    let alice = user("alice");
    let bob = user("bob");
    let room = RoomId::private_pair(&alice, &bob);

    let registry = Arc::new(ConnectionRegistry::new());
    let push: Arc<dyn ConnectionPush> = Arc::new(ChannelPush);
    let rooms = MemoryRoomDirectory::with_room(&room, &[alice.clone(), bob.clone()]);
    let fanout = Arc::new(RoomFanout::new(
        Arc::clone(&registry),
        rooms.clone() as Arc<dyn RoomDirectory>,
        Arc::clone(&push),
    ));
    let orchestrator = Arc::new(TranslationOrchestrator::new(
        Vec::new(),
        Arc::new(SlidingWindowLimiter::new(10, Duration::from_secs(60))),
        TranslationCache::new(10, Duration::from_secs(60)),
        TranslationPolicy::default(),
    ));
    let coordinator = DeliveryCoordinator::new(DeliveryCoordinatorDependencies {
        registry: Arc::clone(&registry),
        fanout,
        orchestrator,
        rooms: rooms as Arc<dyn RoomDirectory>,
        messages: Arc::new(FailingMessageStore),
        preferences: Arc::new(MemoryPreferenceStore::default()),
        notifier: Arc::new(RecordingNotifier::default()),
        message_limiter: Arc::new(SlidingWindowLimiter::new(100, Duration::from_secs(60))),
        push,
        clock: Arc::new(FixedClock),
        group_language: lang("en"),
    });

    // 接收方在线，但持久化失败必须让整个发送失败
    let (tx, mut alice_rx) = mpsc::unbounded_channel();
    registry.register(ConnectionHandle::new(
        alice.clone(),
        ConnectionId::generate(),
        time::OffsetDateTime::UNIX_EPOCH,
        tx,
    ));

    let err = coordinator
        .send_message(send_request(&room, &bob, "hello"))
        .await
        .unwrap_err();

    assert!(matches!(err, ApplicationError::Storage(_)));
    assert!(alice_rx.try_recv().is_err(), "no fanout after a fatal persist");
}

#[tokio::test]
async fn presence_broadcast_reaches_every_live_connection() {
    let alice = user("alice");
    let bob = user("bob");
    let room = RoomId::private_pair(&alice, &bob);

    let provider = ScriptedProvider::new("mymemory", ProviderBehavior::Succeed("hola"));
    let env = build_env(
        MemoryRoomDirectory::with_room(&room, &[alice.clone(), bob.clone()]),
        MemoryPreferenceStore::default().into(),
        vec![provider],
        100,
    );

    let (_, mut alice_rx) = env.open_connection(&alice);

    // bob 通过协调器接入，alice 应当收到包含两人的在线快照
    let (tx, mut bob_rx) = mpsc::unbounded_channel();
    env.coordinator
        .connect(ConnectionHandle::new(
            bob.clone(),
            ConnectionId::generate(),
            time::OffsetDateTime::UNIX_EPOCH,
            tx,
        ))
        .await;

    let snapshot = match alice_rx.try_recv().unwrap() {
        ServerEvent::OnlineUsers(event) => event,
        other => panic!("expected online_users, got {other:?}"),
    };
    let users: HashSet<UserId> = snapshot.users.into_iter().collect();
    assert_eq!(users, [alice, bob].into_iter().collect());
    assert!(matches!(
        bob_rx.try_recv().unwrap(),
        ServerEvent::OnlineUsers(_)
    ));
}

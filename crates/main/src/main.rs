//! 主应用程序入口
//!
//! 按配置组装翻译服务商、限流器、连接注册表和投递协调器，
//! 启动 Axum Web API 服务。

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use application::{
    ConnectionPush, ConnectionRegistry, DeliveryCoordinator, DeliveryCoordinatorDependencies,
    RoomDirectory, RoomFanout, SlidingWindowLimiter, SystemClock, TranslationCache,
    TranslationOrchestrator, TranslationPolicy, TranslationProvider,
};
use config::AppConfig;
use domain::LanguageCode;
use infrastructure::{
    ChannelConnectionPush, InMemoryMessageStore, InMemoryPreferenceStore, InMemoryRoomDirectory,
    LibreTranslateProvider, LoggingOfflineNotifier, MyMemoryProvider, ProviderSettings,
};
use web_api::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 读取环境变量配置
    let config = AppConfig::from_env_with_defaults();
    config.validate().context("invalid configuration")?;

    let (orchestrator, provider_limiter) = build_orchestrator(&config)?;

    // 端口适配器：成员/消息/偏好走内存实现，生产部署替换为持久化协作方
    let registry = Arc::new(ConnectionRegistry::new());
    let rooms: Arc<dyn RoomDirectory> = Arc::new(InMemoryRoomDirectory::default());
    let push: Arc<dyn ConnectionPush> = Arc::new(ChannelConnectionPush);
    let fanout = Arc::new(RoomFanout::new(
        Arc::clone(&registry),
        Arc::clone(&rooms),
        Arc::clone(&push),
    ));

    let message_window = Duration::from_secs(config.rate_limit.message_window_secs);
    let message_limiter = Arc::new(SlidingWindowLimiter::new(
        config.rate_limit.messages_per_window,
        message_window,
    ));
    let group_language = LanguageCode::new(&config.delivery.group_language)
        .context("invalid group translation language")?;

    let coordinator = Arc::new(DeliveryCoordinator::new(DeliveryCoordinatorDependencies {
        registry,
        fanout,
        orchestrator: Arc::clone(&orchestrator),
        rooms,
        messages: Arc::new(InMemoryMessageStore::default()),
        preferences: Arc::new(InMemoryPreferenceStore::default()),
        notifier: Arc::new(LoggingOfflineNotifier),
        message_limiter: Arc::clone(&message_limiter),
        push,
        clock: Arc::new(SystemClock),
        group_language,
    }));

    // HTTP 翻译接口与消息发送共用同一套配额参数，但各自独立计数
    let translate_limiter = Arc::new(SlidingWindowLimiter::new(
        config.rate_limit.messages_per_window,
        message_window,
    ));

    // 定期回收限流器里窗口已完全过期的空闲键
    let limiters = [
        Arc::clone(&message_limiter),
        Arc::clone(&translate_limiter),
        provider_limiter,
    ];
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(300));
        loop {
            tick.tick().await;
            for limiter in &limiters {
                limiter.evict_idle();
            }
        }
    });

    let state = AppState::new(coordinator, orchestrator, translate_limiter);
    let app = router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("linguachat server listening on http://{addr}");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// 按配置的优先级顺序组装翻译服务商和编排器。
/// 服务商限流器另行返回一份句柄，供空闲键回收任务使用。
fn build_orchestrator(
    config: &AppConfig,
) -> anyhow::Result<(Arc<TranslationOrchestrator>, Arc<SlidingWindowLimiter>)> {
    let translation = &config.translation;
    let timeout = Duration::from_secs(translation.request_timeout_secs);

    let mut providers: Vec<Arc<dyn TranslationProvider>> = Vec::new();
    for name in &translation.provider_order {
        match name.as_str() {
            "mymemory" => {
                let settings =
                    ProviderSettings::new(translation.mymemory_base_url.as_str(), timeout);
                providers.push(Arc::new(MyMemoryProvider::new(settings)?));
            }
            "libretranslate" => {
                let settings =
                    ProviderSettings::new(translation.libretranslate_base_url.as_str(), timeout);
                providers.push(Arc::new(LibreTranslateProvider::new(
                    settings,
                    translation.libretranslate_api_key.clone(),
                )?));
            }
            other => anyhow::bail!("unknown translation provider: {other}"),
        }
    }

    let provider_limiter = Arc::new(SlidingWindowLimiter::new(
        config.rate_limit.provider_requests_per_window,
        Duration::from_secs(config.rate_limit.provider_window_secs),
    ));
    let cache = TranslationCache::new(
        translation.cache_max_entries,
        Duration::from_secs(translation.cache_ttl_secs),
    );
    let policy = TranslationPolicy {
        max_retries: translation.max_retries,
        retry_delay: Duration::from_millis(translation.retry_delay_ms),
    };

    let orchestrator = Arc::new(TranslationOrchestrator::new(
        providers,
        Arc::clone(&provider_limiter),
        cache,
        policy,
    ));

    Ok((orchestrator, provider_limiter))
}

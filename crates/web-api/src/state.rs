use std::sync::Arc;

use application::{DeliveryCoordinator, SlidingWindowLimiter, TranslationOrchestrator};

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<DeliveryCoordinator>,
    pub orchestrator: Arc<TranslationOrchestrator>,
    /// 独立翻译接口的限流器，与消息发送限流分开计数。
    pub translate_limiter: Arc<SlidingWindowLimiter>,
}

impl AppState {
    pub fn new(
        coordinator: Arc<DeliveryCoordinator>,
        orchestrator: Arc<TranslationOrchestrator>,
        translate_limiter: Arc<SlidingWindowLimiter>,
    ) -> Self {
        Self {
            coordinator,
            orchestrator,
            translate_limiter,
        }
    }
}

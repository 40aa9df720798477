//! 翻译编排器
//!
//! 单一的重试/回退状态机，所有调用点只依赖这个接口，
//! 不再各自散落重试逻辑。每次调用的状态流转：
//! Idle → Attempting(provider[0]) → (Retrying)* → Attempting(provider[i+1]) …
//! → Succeeded | Failed。

use std::sync::Arc;
use std::time::Duration;

use domain::{DomainError, ProviderError, TranslationOutcome, TranslationRequest};

use crate::error::ApplicationError;
use crate::rate_limiter::SlidingWindowLimiter;
use crate::translation::cache::{CacheStats, TranslationCache};
use crate::translation::provider::TranslationProvider;

/// 重试策略。间隔是固定值：瞬时限流用等待吸收，不做服务商轮换。
#[derive(Debug, Clone)]
pub struct TranslationPolicy {
    /// 同一服务商的最大尝试次数
    pub max_retries: u32,
    /// 两次尝试之间的固定间隔
    pub retry_delay: Duration,
}

impl Default for TranslationPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// 多服务商翻译编排器。
pub struct TranslationOrchestrator {
    providers: Vec<Arc<dyn TranslationProvider>>,
    provider_limiter: Arc<SlidingWindowLimiter>,
    cache: TranslationCache,
    policy: TranslationPolicy,
}

impl TranslationOrchestrator {
    pub fn new(
        providers: Vec<Arc<dyn TranslationProvider>>,
        provider_limiter: Arc<SlidingWindowLimiter>,
        cache: TranslationCache,
        policy: TranslationPolicy,
    ) -> Self {
        Self {
            providers,
            provider_limiter,
            cache,
            policy,
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    /// 翻译一段文本。
    ///
    /// 同语言请求短路返回原文，零次服务商调用；缓存命中绕过所有服务商。
    /// 每个服务商先过配额：被限流直接跳到下一个，不等待。
    /// 重试间隔是本次调用自己的非阻塞休眠，不影响其他在途调用。
    pub async fn translate(
        &self,
        request: TranslationRequest,
    ) -> Result<TranslationOutcome, ApplicationError> {
        if request.text.trim().is_empty() {
            return Err(DomainError::validation_error("text", "text must not be empty").into());
        }

        if self.is_same_language(&request) {
            return Ok(TranslationOutcome::short_circuit(request.text));
        }

        if let Some((translated, provider)) =
            self.cache.get(&request.text, &request.source, &request.target)
        {
            tracing::debug!(provider = %provider, "translation cache hit");
            return Ok(TranslationOutcome {
                translated_text: translated,
                provider_used: provider,
                attempts: 0,
                cached: true,
            });
        }

        let mut attempts = 0u32;
        let mut provider_errors: Vec<(String, String)> = Vec::new();

        for provider in &self.providers {
            let name = provider.name().to_string();

            let decision = self.provider_limiter.check(&name);
            if !decision.allowed {
                tracing::warn!(
                    provider = %name,
                    retry_after = ?decision.retry_after,
                    "provider quota exhausted, skipping to next provider"
                );
                provider_errors.push((name, "provider quota exhausted".to_string()));
                continue;
            }

            match self.try_provider(provider.as_ref(), &request, &mut attempts).await {
                Ok(translated) => {
                    self.cache.insert(
                        &request.text,
                        &request.source,
                        &request.target,
                        translated.clone(),
                        name.clone(),
                    );
                    tracing::info!(
                        provider = %name,
                        attempts,
                        target = %request.target,
                        "translation succeeded"
                    );
                    return Ok(TranslationOutcome {
                        translated_text: translated,
                        provider_used: name,
                        attempts,
                        cached: false,
                    });
                }
                Err(err) => {
                    tracing::warn!(
                        provider = %name,
                        error = %err,
                        "provider exhausted, advancing to next provider"
                    );
                    provider_errors.push((name, err.detail().to_string()));
                }
            }
        }

        tracing::error!(
            attempts,
            errors = ?provider_errors,
            "all translation providers exhausted"
        );
        Err(ApplicationError::TranslationFailed { provider_errors })
    }

    fn is_same_language(&self, request: &TranslationRequest) -> bool {
        !request.source.is_auto() && request.source == request.target
    }

    /// 对单个服务商执行"尝试 + 瞬时重试"。
    /// 永久错误不重试，立即返回让上层切换服务商。
    async fn try_provider(
        &self,
        provider: &dyn TranslationProvider,
        request: &TranslationRequest,
        attempts: &mut u32,
    ) -> Result<String, ProviderError> {
        let mut last_error = ProviderError::transient("no attempt made");

        for attempt in 1..=self.policy.max_retries {
            *attempts += 1;
            match provider.translate(request).await {
                Ok(translated) => return Ok(translated),
                Err(err) => {
                    let transient = err.is_transient();
                    tracing::debug!(
                        provider = provider.name(),
                        attempt,
                        transient,
                        error = %err,
                        "provider attempt failed"
                    );
                    last_error = err;
                    if !transient {
                        break;
                    }
                    if attempt < self.policy.max_retries {
                        tokio::time::sleep(self.policy.retry_delay).await;
                    }
                }
            }
        }

        Err(last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use domain::LanguageCode;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn lang(code: &str) -> LanguageCode {
        LanguageCode::new(code).unwrap()
    }

    fn request(text: &str, source: &str, target: &str) -> TranslationRequest {
        TranslationRequest::new(text, lang(source), lang(target)).unwrap()
    }

    enum Behavior {
        Succeed(&'static str),
        FailTransient,
        FailPermanent,
    }

    struct ScriptedProvider {
        name: &'static str,
        behavior: Behavior,
        calls: AtomicU32,
    }

    impl ScriptedProvider {
        fn new(name: &'static str, behavior: Behavior) -> Arc<Self> {
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
                Behavior::Succeed(text) => Ok(text.to_string()),
                Behavior::FailTransient => Err(ProviderError::transient("gateway timeout")),
                Behavior::FailPermanent => Err(ProviderError::permanent("invalid api key")),
            }
        }
    }

    fn orchestrator(
        providers: Vec<Arc<ScriptedProvider>>,
        limiter: Arc<SlidingWindowLimiter>,
    ) -> TranslationOrchestrator {
        TranslationOrchestrator::new(
            providers
                .into_iter()
                .map(|p| p as Arc<dyn TranslationProvider>)
                .collect(),
            limiter,
            TranslationCache::new(100, Duration::from_secs(60)),
            TranslationPolicy {
                max_retries: 3,
                retry_delay: Duration::ZERO,
            },
        )
    }

    fn open_limiter() -> Arc<SlidingWindowLimiter> {
        Arc::new(SlidingWindowLimiter::new(1000, Duration::from_secs(60)))
    }

    #[tokio::test]
    async fn same_language_short_circuits_without_provider_calls() {
        let provider = ScriptedProvider::new("primary", Behavior::Succeed("hola"));
        let orch = orchestrator(vec![provider.clone()], open_limiter());

        let outcome = orch.translate(request("hello", "en", "en")).await.unwrap();

        assert_eq!(outcome.translated_text, "hello");
        assert_eq!(outcome.provider_used, "none");
        assert_eq!(outcome.attempts, 0);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn failing_provider_is_retried_at_most_max_retries_times() {
        let primary = ScriptedProvider::new("primary", Behavior::FailTransient);
        let secondary = ScriptedProvider::new("secondary", Behavior::FailTransient);
        let orch = orchestrator(vec![primary.clone(), secondary.clone()], open_limiter());

        let err = orch
            .translate(request("hello", "en", "es"))
            .await
            .unwrap_err();

        assert_eq!(primary.calls(), 3);
        assert_eq!(secondary.calls(), 3);
        match err {
            ApplicationError::TranslationFailed { provider_errors } => {
                assert_eq!(provider_errors.len(), 2);
                assert_eq!(provider_errors[0].0, "primary");
                assert_eq!(provider_errors[1].0, "secondary");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn user_facing_failure_message_is_generic() {
        let primary = ScriptedProvider::new("primary", Behavior::FailTransient);
        let orch = orchestrator(vec![primary], open_limiter());

        let err = orch
            .translate(request("hello", "en", "es"))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "translation failed, please try again later");
    }

    #[tokio::test]
    async fn fallback_to_secondary_counts_all_attempts() {
        let primary = ScriptedProvider::new("primary", Behavior::FailTransient);
        let secondary = ScriptedProvider::new("secondary", Behavior::Succeed("hola"));
        let orch = orchestrator(vec![primary.clone(), secondary.clone()], open_limiter());

        let outcome = orch.translate(request("hello", "en", "es")).await.unwrap();

        assert_eq!(outcome.provider_used, "secondary");
        assert_eq!(outcome.attempts, 4);
        assert!(!outcome.cached);
        assert_eq!(outcome.translated_text, "hola");
    }

    #[tokio::test]
    async fn permanent_error_advances_without_retrying() {
        let primary = ScriptedProvider::new("primary", Behavior::FailPermanent);
        let secondary = ScriptedProvider::new("secondary", Behavior::Succeed("hola"));
        let orch = orchestrator(vec![primary.clone(), secondary.clone()], open_limiter());

        let outcome = orch.translate(request("hello", "en", "es")).await.unwrap();

        assert_eq!(primary.calls(), 1);
        assert_eq!(outcome.provider_used, "secondary");
        assert_eq!(outcome.attempts, 2);
    }

    #[tokio::test]
    async fn rate_limited_provider_is_skipped_without_waiting() {
        let primary = ScriptedProvider::new("primary", Behavior::Succeed("hola"));
        let secondary = ScriptedProvider::new("secondary", Behavior::Succeed("bonjour"));
        // 配额 1，先替 primary 消耗掉
        let limiter = Arc::new(SlidingWindowLimiter::new(1, Duration::from_secs(60)));
        assert!(limiter.check("primary").allowed);

        let orch = orchestrator(vec![primary.clone(), secondary.clone()], limiter);
        let outcome = orch.translate(request("hello", "en", "es")).await.unwrap();

        assert_eq!(primary.calls(), 0);
        assert_eq!(outcome.provider_used, "secondary");
    }

    #[tokio::test]
    async fn cache_hit_bypasses_all_providers() {
        let primary = ScriptedProvider::new("primary", Behavior::Succeed("hola"));
        let orch = orchestrator(vec![primary.clone()], open_limiter());

        let first = orch.translate(request("hello", "en", "es")).await.unwrap();
        assert!(!first.cached);
        assert_eq!(primary.calls(), 1);

        let second = orch.translate(request("hello", "en", "es")).await.unwrap();
        assert!(second.cached);
        assert_eq!(second.translated_text, "hola");
        assert_eq!(second.provider_used, "primary");
        assert_eq!(second.attempts, 0);
        assert_eq!(primary.calls(), 1);
    }

    #[tokio::test]
    async fn auto_source_is_never_treated_as_same_language() {
        let primary = ScriptedProvider::new("primary", Behavior::Succeed("hola"));
        let orch = orchestrator(vec![primary.clone()], open_limiter());

        let outcome = orch
            .translate(TranslationRequest::auto("hello", lang("es")).unwrap())
            .await
            .unwrap();

        assert_eq!(primary.calls(), 1);
        assert_eq!(outcome.provider_used, "primary");
    }
}

//! 短 TTL 翻译缓存
//!
//! 键为规范化文本 + 源语言 + 目标语言。TTL 之所以短，
//! 是因为译文在服务商模型版本之间并不保证稳定。
//! 容量到达上限时按最近访问时间淘汰最旧的 20%。

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use domain::LanguageCode;

#[derive(Debug, Clone)]
struct CacheEntry {
    translated: String,
    provider: String,
    stored_at: Instant,
    last_access: Instant,
}

/// 缓存命中情况统计。
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<u64, CacheEntry>,
    hits: u64,
    misses: u64,
}

/// 进程内翻译缓存。
pub struct TranslationCache {
    max_entries: usize,
    ttl: Duration,
    inner: Mutex<CacheInner>,
}

impl TranslationCache {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            max_entries,
            ttl,
            inner: Mutex::new(CacheInner::default()),
        }
    }

    fn key(text: &str, source: &LanguageCode, target: &LanguageCode) -> u64 {
        let mut hasher = DefaultHasher::new();
        text.trim().hash(&mut hasher);
        source.as_str().hash(&mut hasher);
        target.as_str().hash(&mut hasher);
        hasher.finish()
    }

    /// 命中返回 (译文, 当时使用的服务商)。过期条目在查找时剔除。
    pub fn get(
        &self,
        text: &str,
        source: &LanguageCode,
        target: &LanguageCode,
    ) -> Option<(String, String)> {
        let key = Self::key(text, source, target);
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let CacheInner { entries, hits, misses } = &mut *inner;

        let fresh = entries
            .get(&key)
            .map(|entry| now.duration_since(entry.stored_at) < self.ttl);
        match fresh {
            Some(true) => {
                if let Some(entry) = entries.get_mut(&key) {
                    entry.last_access = now;
                    *hits += 1;
                    Some((entry.translated.clone(), entry.provider.clone()))
                } else {
                    *misses += 1;
                    None
                }
            }
            Some(false) => {
                entries.remove(&key);
                *misses += 1;
                None
            }
            None => {
                *misses += 1;
                None
            }
        }
    }

    pub fn insert(
        &self,
        text: &str,
        source: &LanguageCode,
        target: &LanguageCode,
        translated: String,
        provider: String,
    ) {
        let key = Self::key(text, source, target);
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        if inner.entries.len() >= self.max_entries && !inner.entries.contains_key(&key) {
            Self::evict_lru(&mut inner, self.max_entries);
        }

        inner.entries.insert(
            key,
            CacheEntry {
                translated,
                provider,
                stored_at: now,
                last_access: now,
            },
        );
    }

    /// 按最近访问时间淘汰最旧的 20%（至少一条）。
    fn evict_lru(inner: &mut CacheInner, max_entries: usize) {
        let to_remove = (max_entries / 5).max(1);
        let mut by_access: Vec<(u64, Instant)> = inner
            .entries
            .iter()
            .map(|(key, entry)| (*key, entry.last_access))
            .collect();
        by_access.sort_by_key(|(_, access)| *access);

        for (key, _) in by_access.into_iter().take(to_remove) {
            inner.entries.remove(&key);
        }
        tracing::debug!(evicted = to_remove, "translation cache eviction");
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        CacheStats {
            entries: inner.entries.len(),
            hits: inner.hits,
            misses: inner.misses,
        }
    }
}

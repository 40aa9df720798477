//! 滑动窗口限流器
//!
//! 按字符串键（用户+IP、服务商名）做固定窗口长度的滑动窗口准入。
//! check 在一次锁持有内完成"测试并消费"，并发下不会超额放行；
//! 被拒绝的请求不消耗配额。

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// 一次准入判定。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// 被拒绝时，距离最早一条记录滑出窗口还需等待的时间。
    pub retry_after: Option<Duration>,
}

impl RateLimitDecision {
    fn allowed() -> Self {
        Self { allowed: true, retry_after: None }
    }

    fn denied(retry_after: Duration) -> Self {
        Self { allowed: false, retry_after: Some(retry_after) }
    }
}

/// 按键滑动窗口限流器。
///
/// 消息限流和服务商配额各自实例化一个，互不影响。
/// 键在首次使用时惰性创建，窗口自然过期后可被 `evict_idle` 回收。
pub struct SlidingWindowLimiter {
    quota: u32,
    window: Duration,
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl SlidingWindowLimiter {
    pub fn new(quota: u32, window: Duration) -> Self {
        Self {
            quota,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// 测试并消费一个配额单位，单次锁持有内原子完成。
    pub fn check(&self, key: &str) -> RateLimitDecision {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> RateLimitDecision {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let window = windows.entry(key.to_string()).or_default();

        // 把窗口外的旧记录滑出
        while let Some(front) = window.front() {
            if now.duration_since(*front) >= self.window {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() as u32 >= self.quota {
            let retry_after = window
                .front()
                .map(|front| self.window.saturating_sub(now.duration_since(*front)))
                .unwrap_or(self.window);
            return RateLimitDecision::denied(retry_after);
        }

        window.push_back(now);
        RateLimitDecision::allowed()
    }

    /// 回收窗口已完全过期的空闲键，约束内存占用。
    pub fn evict_idle(&self) {
        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        windows.retain(|_, window| {
            window
                .back()
                .map(|last| now.duration_since(*last) < self.window)
                .unwrap_or(false)
        });
    }

    /// 当前被跟踪的键数量。
    pub fn tracked_keys(&self) -> usize {
        self.windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

// rate_limit.rs — 按适配器实例限制请求间隔
//
// 每个壁纸源持有自己的 RateLimiter，绝不跨来源共享。

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};
use tracing::trace;

/// 最小请求间隔限制器
///
/// 记录上一次放行请求的单调时钟时间点。`wait()` 持有互斥锁直到放行，
/// 因此多个任务并发调用时会被串行化，两次放行之间的间隔不会小于 `interval`。
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    last_dispatch: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_dispatch: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// 挂起当前任务直到距上次放行至少经过 `interval`，然后记录本次放行时间
    ///
    /// 第一次调用立即返回。等待期间不阻塞线程，其他任务照常运行。
    pub async fn wait(&self) {
        let mut last = self.last_dispatch.lock().await;

        if let Some(prev) = *last {
            let ready_at = prev + self.interval;
            if ready_at > Instant::now() {
                trace!(delay = ?(ready_at - Instant::now()), "rate limit: waiting");
                sleep_until(ready_at).await;
            }
        }

        *last = Some(Instant::now());
    }
}

// shutdown.rs — 取消信号
// main 在收到 Ctrl+C 时触发，编排器和下载器在各自的挂起点上监听

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// 可在多个任务之间共享的取消句柄
pub type SharedShutdown = Arc<ShutdownCoordinator>;

#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    requested: AtomicBool,
    notify: Notify,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedShutdown {
        Arc::new(Self::new())
    }

    /// 请求取消，只会唤醒等待者一次
    pub fn request_shutdown(&self) {
        if !self.requested.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// 等待取消请求；已经请求过则立即返回
    pub async fn wait_for_shutdown(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // 先登记为等待者再检查标志，避免错过两者之间发出的通知
        notified.as_mut().enable();
        if self.is_shutdown_requested() {
            return;
        }
        notified.await;
    }
}

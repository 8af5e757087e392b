// download.rs — 并发受限的下载执行器
//
// 每个壁纸源配一个 Downloader：许可池限制同时进行的传输数量，
// 响应体按块写入 `<目标>.part`，完成后再改名，失败或取消时删除临时文件。

use crate::rate_limit::RateLimiter;
use crate::shutdown::SharedShutdown;
use reqwest::header::HeaderMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// 默认请求超时
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// 单个条目下载失败的原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// 候选项没有可用地址
    MissingUrl,
    /// 解析下载地址时出错（如详情页请求失败）
    Resolve(String),
    Timeout,
    Connection(String),
    /// 非 2xx 状态码
    Status(u16),
    Io(String),
    Cancelled,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::MissingUrl => write!(f, "no download URL available"),
            FailureReason::Resolve(msg) => write!(f, "could not resolve download URL: {msg}"),
            FailureReason::Timeout => write!(f, "request timed out"),
            FailureReason::Connection(msg) => write!(f, "connection error: {msg}"),
            FailureReason::Status(code) => write!(f, "HTTP {code}"),
            FailureReason::Io(msg) => write!(f, "io error: {msg}"),
            FailureReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl From<reqwest::Error> for FailureReason {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FailureReason::Timeout
        } else if let Some(status) = e.status() {
            FailureReason::Status(status.as_u16())
        } else {
            FailureReason::Connection(e.to_string())
        }
    }
}

impl From<std::io::Error> for FailureReason {
    fn from(e: std::io::Error) -> Self {
        FailureReason::Io(e.to_string())
    }
}

/// 单个候选项的最终结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Downloaded { path: PathBuf, bytes: u64 },
    /// 目标文件已存在，未发起请求
    AlreadyExists { path: PathBuf },
    Failed {
        url: Option<String>,
        reason: FailureReason,
    },
}

impl DownloadOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, DownloadOutcome::Failed { .. })
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            DownloadOutcome::Downloaded { path, .. } | DownloadOutcome::AlreadyExists { path } => {
                Some(path)
            }
            DownloadOutcome::Failed { .. } => None,
        }
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match self {
            DownloadOutcome::Failed { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

/// 下载执行器
///
/// `reqwest::Client` 内部有连接池，克隆开销很小；许可池和限流器属于本实例。
pub struct Downloader {
    client: reqwest::Client,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
    timeout: Duration,
    rate_limiter: Option<Arc<RateLimiter>>,
    shutdown: Option<SharedShutdown>,
    active: AtomicUsize,
    peak_active: AtomicUsize,
}

impl Downloader {
    /// `max_concurrent` 为 0 时按 1 处理
    pub fn new(client: reqwest::Client, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            client,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            timeout: DEFAULT_TIMEOUT,
            rate_limiter: None,
            shutdown: None,
            active: AtomicUsize::new(0),
            peak_active: AtomicUsize::new(0),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 下载请求也计入来源的请求间隔
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// 当前正在进行的传输数
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// 同时进行的传输数的历史最大值
    pub fn peak_active(&self) -> usize {
        self.peak_active.load(Ordering::SeqCst)
    }

    /// 下载 `url` 到 `destination`
    ///
    /// 目标已存在时直接返回 `AlreadyExists`，不发起请求。
    pub async fn download(&self, url: &str, destination: &Path, headers: &HeaderMap) -> DownloadOutcome {
        if fs::try_exists(destination).await.unwrap_or(false) {
            info!(path = %destination.display(), "already exists, skipping");
            return DownloadOutcome::AlreadyExists {
                path: destination.to_path_buf(),
            };
        }

        let _permit = match self.permits.acquire().await {
            Ok(permit) => permit,
            Err(_) => return self.failed(url, FailureReason::Cancelled),
        };
        let _active = ActiveGuard::enter(&self.active, &self.peak_active);
        debug!(url, active = self.active(), limit = self.max_concurrent, "download started");

        let part_path = part_path_for(destination);
        let transfer = self.transfer(url, destination, &part_path, headers);

        let result = match &self.shutdown {
            Some(shutdown) => {
                if shutdown.is_shutdown_requested() {
                    Err(FailureReason::Cancelled)
                } else {
                    tokio::select! {
                        res = transfer => res,
                        _ = shutdown.wait_for_shutdown() => Err(FailureReason::Cancelled),
                    }
                }
            }
            None => transfer.await,
        };

        match result {
            Ok(bytes) => {
                info!(url, path = %destination.display(), bytes, "downloaded");
                DownloadOutcome::Downloaded {
                    path: destination.to_path_buf(),
                    bytes,
                }
            }
            Err(reason) => {
                // 不留下截断的文件，下次运行时存在性检查才可信
                if let Err(e) = fs::remove_file(&part_path).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!(path = %part_path.display(), error = %e, "could not remove partial file");
                    }
                }
                self.failed(url, reason)
            }
        }
    }

    async fn transfer(
        &self,
        url: &str,
        destination: &Path,
        part_path: &Path,
        headers: &HeaderMap,
    ) -> Result<u64, FailureReason> {
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).await?;
        }

        if let Some(limiter) = &self.rate_limiter {
            limiter.wait().await;
        }

        let mut response = self
            .client
            .get(url)
            .headers(headers.clone())
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FailureReason::Status(status.as_u16()));
        }

        let file = File::create(part_path).await?;
        let mut writer = BufWriter::new(file);
        let mut written: u64 = 0;

        while let Some(chunk) = response.chunk().await? {
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        writer.flush().await?;
        writer.into_inner().sync_all().await?;
        fs::rename(part_path, destination).await?;

        Ok(written)
    }

    fn failed(&self, url: &str, reason: FailureReason) -> DownloadOutcome {
        warn!(url, %reason, "download failed");
        DownloadOutcome::Failed {
            url: Some(url.to_string()),
            reason,
        }
    }
}

/// 下载中的临时文件路径：`<目标>.part`
pub fn part_path_for(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}

/// 维护活跃传输计数，离开作用域时自动减一
struct ActiveGuard<'a> {
    active: &'a AtomicUsize,
}

impl<'a> ActiveGuard<'a> {
    fn enter(active: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self { active }
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

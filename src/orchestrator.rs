// orchestrator.rs — 编排器
//
// 每个来源独立走 Idle -> Listing -> Downloading -> Done，
// 多个来源并发运行；某个来源失败只记录在它自己的报告里。

use crate::download::{DownloadOutcome, Downloader, FailureReason};
use crate::error::Error;
use crate::naming::destination_for;
use crate::shutdown::SharedShutdown;
use crate::source::{Candidate, SearchOptions, WallpaperSource};
use futures_util::future::join_all;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError};
use tokio::sync::Mutex;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// 单个来源的运行阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Listing,
    Downloading,
    Done,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Idle => "idle",
            RunState::Listing => "listing",
            RunState::Downloading => "downloading",
            RunState::Done => "done",
        };
        f.write_str(s)
    }
}

/// 一次运行的输入
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub download_dir: PathBuf,
    pub search: SearchOptions,
    /// 抓取的页数，至少 1
    pub pages: u32,
    /// 每个来源最多下载的数量
    pub limit: Option<usize>,
}

/// 单个候选项的结果
#[derive(Debug, Clone)]
pub struct ItemReport {
    pub id: String,
    pub title: String,
    pub outcome: DownloadOutcome,
}

/// 单个来源的结果
#[derive(Debug, Clone)]
pub struct SourceReport {
    pub source: &'static str,
    /// 最后到达的阶段
    pub state: RunState,
    pub listed: usize,
    pub items: Vec<ItemReport>,
    /// 列表阶段的致命错误（如缺少凭据）
    pub error: Option<String>,
}

impl SourceReport {
    fn new(source: &'static str) -> Self {
        Self {
            source,
            state: RunState::Idle,
            listed: 0,
            items: Vec::new(),
            error: None,
        }
    }

    fn transition(&mut self, next: RunState) {
        info!(source = self.source, from = %self.state, to = %next, "state change");
        self.state = next;
    }
}

/// 整次运行的汇总
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub sources: Vec<SourceReport>,
}

impl RunSummary {
    fn items(&self) -> impl Iterator<Item = &ItemReport> {
        self.sources.iter().flat_map(|s| s.items.iter())
    }

    /// 本次新下载的数量
    pub fn downloaded(&self) -> usize {
        self.items()
            .filter(|i| matches!(i.outcome, DownloadOutcome::Downloaded { .. }))
            .count()
    }

    /// 因文件已存在而跳过的数量
    pub fn skipped(&self) -> usize {
        self.items()
            .filter(|i| matches!(i.outcome, DownloadOutcome::AlreadyExists { .. }))
            .count()
    }

    pub fn succeeded(&self) -> usize {
        self.downloaded() + self.skipped()
    }

    pub fn failed(&self) -> usize {
        self.items().filter(|i| !i.outcome.is_success()).count()
    }

    /// 所有成功条目的本地路径
    pub fn paths(&self) -> Vec<&Path> {
        self.items().filter_map(|i| i.outcome.path()).collect()
    }

    /// (标题, 原因) 列表
    pub fn failures(&self) -> Vec<(&str, &FailureReason)> {
        self.items()
            .filter_map(|i| i.outcome.failure().map(|r| (i.title.as_str(), r)))
            .collect()
    }

    /// 列表阶段就失败的来源
    pub fn failed_sources(&self) -> Vec<(&'static str, &str)> {
        self.sources
            .iter()
            .filter_map(|s| s.error.as_deref().map(|e| (s.source, e)))
            .collect()
    }
}

/// 来源与其专属下载器的组合
struct SourceJob {
    source: Box<dyn WallpaperSource>,
    downloader: Downloader,
}

pub struct Orchestrator {
    jobs: Vec<SourceJob>,
    shutdown: Option<SharedShutdown>,
}

impl Orchestrator {
    pub fn new(shutdown: Option<SharedShutdown>) -> Self {
        Self {
            jobs: Vec::new(),
            shutdown,
        }
    }

    /// 登记一个来源；下载器应是该来源独占的
    pub fn add_source(&mut self, source: Box<dyn WallpaperSource>, downloader: Downloader) {
        self.jobs.push(SourceJob { source, downloader });
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.jobs.iter().map(|j| j.source.name()).collect()
    }

    /// 运行所有来源并汇总结果
    pub async fn run(&self, request: &RunRequest) -> RunSummary {
        let runs = self.jobs.iter().map(|job| {
            let span = info_span!("source", name = job.source.name());
            self.run_source(job, request).instrument(span)
        });

        RunSummary {
            sources: join_all(runs).await,
        }
    }

    /// 在关闭信号到来时放弃 `fut`；返回 None 表示已取消
    async fn until_cancelled<F: Future>(&self, fut: F) -> Option<F::Output> {
        let Some(shutdown) = &self.shutdown else {
            return Some(fut.await);
        };
        if shutdown.is_shutdown_requested() {
            return None;
        }

        tokio::select! {
            output = fut => Some(output),
            _ = shutdown.wait_for_shutdown() => None,
        }
    }

    async fn run_source(&self, job: &SourceJob, request: &RunRequest) -> SourceReport {
        let mut report = SourceReport::new(job.source.name());

        report.transition(RunState::Listing);
        let candidates = match self.list_all(job.source.as_ref(), request).await {
            Ok(candidates) => candidates,
            Err(e) => {
                error!(error = %e, "listing failed");
                report.error = Some(e.to_string());
                report.transition(RunState::Done);
                return report;
            }
        };
        report.listed = candidates.len();
        info!(count = candidates.len(), "listing finished");

        report.transition(RunState::Downloading);
        let headers = job.source.download_headers();
        let headers = &headers;
        let claims = DestinationClaims::default();
        let claims = &claims;
        let downloads = candidates.iter().map(|candidate| async move {
            let outcome = self
                .fetch_one(job, candidate, &request.download_dir, headers, claims)
                .await;
            ItemReport {
                id: candidate.id.clone(),
                title: candidate.title.clone(),
                outcome,
            }
        });
        report.items = join_all(downloads).await;

        info!(
            peak_active = job.downloader.peak_active(),
            limit = job.downloader.max_concurrent(),
            "downloads finished"
        );
        report.transition(RunState::Done);
        report
    }

    /// 按页列出候选项，凑够 limit 后停止；同一 id 只保留第一次出现的
    async fn list_all(
        &self,
        source: &dyn WallpaperSource,
        request: &RunRequest,
    ) -> Result<Vec<Candidate>, Error> {
        let mut all = Vec::new();
        let mut seen = HashSet::new();

        for page in 1..=request.pages.max(1) {
            let options = SearchOptions {
                page,
                ..request.search.clone()
            };
            let Some(listed) = self.until_cancelled(source.list(&options)).await else {
                warn!(page, "cancelled during listing");
                break;
            };
            let found = match listed {
                Ok(found) => found,
                // 首页就失败视为整个来源失败，之后的页失败则保留已有结果
                Err(e) if page == 1 => return Err(e),
                Err(e) => {
                    warn!(page, error = %e, "stopping pagination");
                    break;
                }
            };

            info!(page, count = found.len(), "page listed");
            let exhausted = found.is_empty();
            let before = all.len() + found.len();
            all.extend(found.into_iter().filter(|c| seen.insert(c.id.clone())));
            if all.len() < before {
                debug!(page, dropped = before - all.len(), "dropped duplicate candidates");
            }

            if exhausted || request.limit.is_some_and(|limit| all.len() >= limit) {
                break;
            }
        }

        if let Some(limit) = request.limit {
            all.truncate(limit);
        }
        Ok(all)
    }

    async fn fetch_one(
        &self,
        job: &SourceJob,
        candidate: &Candidate,
        download_dir: &Path,
        headers: &reqwest::header::HeaderMap,
        claims: &DestinationClaims,
    ) -> DownloadOutcome {
        let cancelled = || DownloadOutcome::Failed {
            url: None,
            reason: FailureReason::Cancelled,
        };

        // 解析可能还要请求详情页并排队等待限速，必须能被关闭信号打断
        let resolved = match self.until_cancelled(job.source.resolve(candidate)).await {
            Some(resolved) => resolved,
            None => {
                debug!(id = %candidate.id, "cancelled while resolving");
                return cancelled();
            }
        };
        let url = match resolved {
            Ok(url) => url,
            Err(e) => {
                warn!(id = %candidate.id, error = %e, "could not resolve download URL");
                let reason = match e {
                    Error::MissingUrl { .. } => FailureReason::MissingUrl,
                    other => FailureReason::Resolve(other.to_string()),
                };
                return DownloadOutcome::Failed { url: None, reason };
            }
        };

        let destination = destination_for(download_dir, candidate, &url);

        // 同一目标路径同一时刻只有一个下载；后到的等前一个结束后再走存在性检查
        let slot = claims.slot(&destination);
        let Some(_claim) = self.until_cancelled(slot.lock()).await else {
            return cancelled();
        };
        job.downloader.download(&url, &destination, headers).await
    }
}

/// 单次来源运行中按目标路径加的锁
#[derive(Default)]
struct DestinationClaims {
    slots: std::sync::Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl DestinationClaims {
    fn slot(&self, destination: &Path) -> Arc<Mutex<()>> {
        // 锁内只有插入查找，不会 panic，中毒时照常取用
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(destination.to_path_buf()).or_default().clone()
    }
}

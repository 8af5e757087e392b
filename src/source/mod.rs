// source/mod.rs — 壁纸源抽象接口模块
// 定义了所有壁纸站（Wallhaven / Unsplash / Pixabay）必须实现的通用 Trait

pub mod pixabay;
pub mod unsplash;
pub mod wallhaven;

use crate::error::{Error, Result};
use crate::rate_limit::RateLimiter;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub use pixabay::PixabayClient;
pub use unsplash::UnsplashClient;
pub use wallhaven::WallhavenClient;

/// 浏览器风格的默认 User-Agent，部分站点会拒绝无 UA 的请求
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// 图片质量档位，声明顺序即优先级（越靠前越好）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Quality {
    Original,
    Full,
    Regular,
    Preview,
    Thumbnail,
}

/// 某个质量档位的下载地址；`None` 表示该档位确定不存在
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedUrl {
    pub quality: Quality,
    pub url: Option<String>,
}

impl RankedUrl {
    pub fn new(quality: Quality, url: Option<String>) -> Self {
        Self { quality, url }
    }

    /// 空字符串同样视为不存在
    fn present(&self) -> Option<&str> {
        self.url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }
}

/// 统一的候选壁纸结构
/// 不论来自哪个壁纸站，都转换成这个结构体供编排器使用
#[derive(Debug, Clone)]
pub struct Candidate {
    /// 壁纸在原站的 ID
    pub id: String,
    /// 可读标题，作为文件名主体
    pub title: String,
    /// 各质量档位的下载地址
    pub urls: Vec<RankedUrl>,
    /// 子目录名
    pub category: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub tags: Vec<String>,
    /// 来源站名称（如 "wallhaven"）
    pub source: &'static str,
    /// 详情页地址，抓取型来源在 resolve 时使用
    pub page_url: Option<String>,
    /// 来源特定的附加数据（如 Unsplash 的 download_location）
    pub extra: Option<String>,
}

impl Candidate {
    /// 优先级最高且存在的下载地址
    ///
    /// 只在某一档位确定缺失时才降级；地址存在但不可达属于下载阶段的失败。
    pub fn best_url(&self) -> Option<&str> {
        self.urls
            .iter()
            .filter_map(|ranked| ranked.present().map(|url| (ranked.quality, url)))
            .min_by_key(|(quality, _)| *quality)
            .map(|(_, url)| url)
    }
}

/// 图片方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Orientation {
    #[default]
    Landscape,
    Portrait,
    Squarish,
}

impl Orientation {
    pub fn as_str(self) -> &'static str {
        match self {
            Orientation::Landscape => "landscape",
            Orientation::Portrait => "portrait",
            Orientation::Squarish => "squarish",
        }
    }
}

/// Wallhaven 专用的过滤开关
#[derive(Debug, Clone)]
pub struct WallhavenFilters {
    /// general/anime/people，如 "111"
    pub categories: String,
    /// sfw/sketchy/nsfw，如 "100"
    pub purity: String,
    pub sorting: String,
    pub order: String,
}

impl Default for WallhavenFilters {
    fn default() -> Self {
        Self {
            categories: "111".to_string(),
            purity: "100".to_string(),
            sorting: "date_added".to_string(),
            order: "desc".to_string(),
        }
    }
}

/// 搜索参数结构体
/// 抽象了通用的搜索需求，各来源只取自己支持的部分
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub query: Option<String>,
    pub category: Option<String>,
    pub page: u32,
    /// 形如 "1920x1080"
    pub resolution: Option<String>,
    pub orientation: Orientation,
    pub wallhaven: WallhavenFilters,
}

impl SearchOptions {
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref().filter(|q| !q.trim().is_empty())
    }

    pub fn page(&self) -> u32 {
        self.page.max(1)
    }

    /// 解析后的分辨率；格式不合法时返回 None
    pub fn resolution_dims(&self) -> Option<(u32, u32)> {
        self.resolution.as_deref().and_then(parse_resolution)
    }
}

/// 解析 "WxH" / "W x H" 格式的分辨率字符串
pub fn parse_resolution(resolution: &str) -> Option<(u32, u32)> {
    let (w, h) = resolution.split_once(['x', 'X', '×'])?;
    let w = w.trim().parse::<u32>().ok()?;
    let h = h.trim().parse::<u32>().ok()?;
    (w > 0 && h > 0).then_some((w, h))
}

/// 壁纸源的抽象 Trait
/// 所有的壁纸站客户端都应该实现这个 Trait
#[async_trait]
pub trait WallpaperSource: Send + Sync {
    /// 来源名称，同时用作默认分类目录
    fn name(&self) -> &'static str;

    /// 搜索壁纸，返回统一的 Candidate 列表
    ///
    /// 每次网络请求前都会调用一次 `rate_limiter().wait()`。
    /// 单个条目解析失败只记录警告并跳过。
    async fn list(&self, options: &SearchOptions) -> Result<Vec<Candidate>>;

    /// 将候选项解析为具体的下载地址
    async fn resolve(&self, candidate: &Candidate) -> Result<String> {
        candidate
            .best_url()
            .map(str::to_string)
            .ok_or_else(|| Error::MissingUrl {
                id: candidate.id.clone(),
            })
    }

    /// 下载图片文件本身时携带的请求头
    fn download_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
        headers
    }

    /// 该实例私有的限流器，与配套的下载器共享
    fn rate_limiter(&self) -> Arc<RateLimiter>;
}

/// 可选的壁纸来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum SourceKind {
    Wallhaven,
    Unsplash,
    Pixabay,
}

impl SourceKind {
    pub const ALL: [SourceKind; 3] = [SourceKind::Wallhaven, SourceKind::Unsplash, SourceKind::Pixabay];

    pub fn name(self) -> &'static str {
        match self {
            SourceKind::Wallhaven => "wallhaven",
            SourceKind::Unsplash => "unsplash",
            SourceKind::Pixabay => "pixabay",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(name.trim()))
    }

    /// 凭据对应的环境变量
    pub fn credential_env(self) -> &'static str {
        match self {
            SourceKind::Wallhaven => "WALLHAVEN_API_KEY",
            SourceKind::Unsplash => "UNSPLASH_ACCESS_KEY",
            SourceKind::Pixabay => "PIXABAY_API_KEY",
        }
    }

    /// 没有凭据时是否完全不可用（Wallhaven 会退回网页抓取）
    pub fn requires_credential(self) -> bool {
        !matches!(self, SourceKind::Wallhaven)
    }

    pub fn default_rate_limit(self) -> Duration {
        match self {
            SourceKind::Wallhaven => Duration::from_secs(2),
            SourceKind::Unsplash | SourceKind::Pixabay => Duration::from_secs(1),
        }
    }

    pub fn default_max_concurrent(self) -> usize {
        match self {
            SourceKind::Wallhaven => 2,
            SourceKind::Unsplash | SourceKind::Pixabay => 3,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 构建某个来源实例所需的设置
#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub credential: Option<String>,
    pub rate_limit: Duration,
    pub timeout: Duration,
    /// 仅测试时覆盖站点地址
    pub base_url: Option<String>,
}

/// 根据来源类型创建客户端，每次调用都得到独立的限流器
pub fn build_source(
    kind: SourceKind,
    client: reqwest::Client,
    settings: SourceSettings,
) -> Box<dyn WallpaperSource> {
    let limiter = Arc::new(RateLimiter::new(settings.rate_limit));
    let credential = settings.credential.filter(|c| !c.trim().is_empty());

    match kind {
        SourceKind::Wallhaven => {
            let mut source = WallhavenClient::new(client, credential, limiter, settings.timeout);
            if let Some(base) = settings.base_url {
                source = source.with_base_url(base);
            }
            Box::new(source)
        }
        SourceKind::Unsplash => {
            let mut source = UnsplashClient::new(client, credential, limiter, settings.timeout);
            if let Some(base) = settings.base_url {
                source = source.with_base_url(base);
            }
            Box::new(source)
        }
        SourceKind::Pixabay => {
            let mut source = PixabayClient::new(client, credential, limiter, settings.timeout);
            if let Some(base) = settings.base_url {
                source = source.with_base_url(base);
            }
            Box::new(source)
        }
    }
}

/// 逐条反序列化列表条目，坏条目记录警告后跳过
pub(crate) fn parse_items<T: DeserializeOwned>(
    source_name: &'static str,
    items: Vec<serde_json::Value>,
) -> Vec<T> {
    items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match serde_json::from_value::<T>(item) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!(source = source_name, index, error = %e, "skipping malformed listing entry");
                None
            }
        })
        .collect()
}

/// 检查状态码，非 2xx 转为 Error::Status
pub(crate) fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(Error::Status {
            status: status.as_u16(),
            url: response.url().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(urls: Vec<RankedUrl>) -> Candidate {
        Candidate {
            id: "1".into(),
            title: "t".into(),
            urls,
            category: "c".into(),
            width: None,
            height: None,
            tags: vec![],
            source: "test",
            page_url: None,
            extra: None,
        }
    }

    #[test]
    fn absent_top_rank_falls_back_to_next() {
        let c = candidate(vec![
            RankedUrl::new(Quality::Original, None),
            RankedUrl::new(Quality::Full, Some("https://good.example/full.jpg".into())),
        ]);
        assert_eq!(c.best_url(), Some("https://good.example/full.jpg"));
    }

    #[test]
    fn highest_rank_wins_regardless_of_order() {
        let c = candidate(vec![
            RankedUrl::new(Quality::Thumbnail, Some("thumb".into())),
            RankedUrl::new(Quality::Full, Some("full".into())),
            RankedUrl::new(Quality::Preview, Some("preview".into())),
        ]);
        assert_eq!(c.best_url(), Some("full"));
    }

    #[test]
    fn empty_strings_count_as_absent() {
        let c = candidate(vec![
            RankedUrl::new(Quality::Original, Some("  ".into())),
            RankedUrl::new(Quality::Regular, Some("regular".into())),
        ]);
        assert_eq!(c.best_url(), Some("regular"));
        assert_eq!(candidate(vec![]).best_url(), None);
    }

    #[test]
    fn parses_resolution_strings() {
        assert_eq!(parse_resolution("1920x1080"), Some((1920, 1080)));
        assert_eq!(parse_resolution("3840 x 2160"), Some((3840, 2160)));
        assert_eq!(parse_resolution("wide"), None);
        assert_eq!(parse_resolution("0x10"), None);
    }

    #[test]
    fn source_kind_names_round_trip() {
        for kind in SourceKind::ALL {
            assert_eq!(SourceKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(SourceKind::from_name("Unsplash"), Some(SourceKind::Unsplash));
        assert_eq!(SourceKind::from_name("flickr"), None);
    }
}

// unsplash.rs — Unsplash API 异步客户端模块
// 负责与 Unsplash API 交互：搜索壁纸、解析下载地址
//
// 注意：根据 Unsplash API Guidelines，每次实际下载图片前
// 必须先调用 links.download_location 触发下载统计。

use super::{
    Candidate, Quality, RankedUrl, SearchOptions, WallpaperSource, check_status,
    parse_items,
};
use crate::error::{Error, Result};
use crate::rate_limit::RateLimiter;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

const NAME: &str = "unsplash";

/// Unsplash 每页最多 30 条
const MAX_PER_PAGE: u32 = 30;

/// 单张图片的数据结构
#[derive(Deserialize, Debug)]
pub struct Photo {
    /// 图片唯一标识符（如 "LBI7cgq3pbM"）
    pub id: String,

    /// 图片宽度（像素）
    #[serde(default)]
    pub width: Option<u32>,

    /// 图片高度（像素）
    #[serde(default)]
    pub height: Option<u32>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub alt_description: Option<String>,

    /// 各尺寸图片 URL 集合
    pub urls: PhotoUrls,

    /// 图片相关链接，包含触发下载统计所需的 download_location
    #[serde(default)]
    pub links: PhotoLinks,

    #[serde(default)]
    pub user: Option<User>,
}

/// 图片 URL 集合
/// Unsplash 提供多种尺寸，raw 为原始无损图片
#[derive(Deserialize, Debug)]
pub struct PhotoUrls {
    /// 原始图片 URL，不带任何处理参数
    /// 可追加 &w=3840&h=2160&fit=crop 等 Imgix 参数自定义尺寸
    pub raw: Option<String>,
    pub full: Option<String>,
    pub regular: Option<String>,
    pub small: Option<String>,
    pub thumb: Option<String>,
}

/// 图片链接集合
#[derive(Deserialize, Debug, Default)]
pub struct PhotoLinks {
    /// 触发下载统计的 API 地址（必须在下载前调用）
    pub download_location: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct User {
    pub username: Option<String>,
}

/// Unsplash API 异步客户端
///
/// Access Key 通过 `Authorization: Client-ID <key>` header 传递。
pub struct UnsplashClient {
    client: reqwest::Client,
    base_url: String,
    /// 没有 Access Key 时 list/resolve 直接失败，不发请求
    access_key: Option<String>,
    limiter: Arc<RateLimiter>,
    timeout: Duration,
}

impl UnsplashClient {
    pub fn new(
        client: reqwest::Client,
        access_key: Option<String>,
        limiter: Arc<RateLimiter>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            base_url: String::from("https://api.unsplash.com"),
            access_key,
            limiter,
            timeout,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn access_key(&self) -> Result<&str> {
        self.access_key.as_deref().ok_or(Error::MissingCredential {
            source_name: NAME,
            env_var: "UNSPLASH_ACCESS_KEY",
        })
    }

    /// 构建带 Authorization header 的请求
    /// Unsplash 使用 "Client-ID <key>" 格式，而非 Bearer token
    fn authorized_get(&self, key: &str, url: &str) -> reqwest::RequestBuilder {
        self.client
            .get(url)
            .header("Authorization", format!("Client-ID {key}"))
            .header("Accept-Version", "v1")
            .timeout(self.timeout)
    }
}

#[async_trait]
impl WallpaperSource for UnsplashClient {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn list(&self, options: &SearchOptions) -> Result<Vec<Candidate>> {
        let key = self.access_key()?;

        // 将 sorting 映射到 Unsplash 的 order_by 参数
        // Unsplash 只支持 relevant / latest，其他值降级为 relevant
        let order_by = match options.wallhaven.sorting.as_str() {
            "latest" | "date_added" => "latest",
            _ => "relevant",
        };
        let per_page = MAX_PER_PAGE.to_string();
        let page = options.page().to_string();
        let orientation = options.orientation.as_str();

        let (url, params): (String, Vec<(&str, &str)>) = match options.query() {
            Some(query) => (
                format!("{}/search/photos", self.base_url),
                vec![
                    ("query", query),
                    ("page", page.as_str()),
                    ("per_page", per_page.as_str()),
                    ("order_by", order_by),
                    ("orientation", orientation),
                    ("content_filter", "low"),
                ],
            ),
            // 没有关键词时取随机图片
            None => (
                format!("{}/photos/random", self.base_url),
                vec![("count", per_page.as_str()), ("orientation", orientation)],
            ),
        };

        self.limiter.wait().await;
        let response = self.authorized_get(key, &url).query(&params).send().await?;
        let body = check_status(response)?.text().await?;

        let category = options
            .category
            .as_deref()
            .or(options.query())
            .unwrap_or(NAME);
        parse_photos(&body, category, options.resolution_dims())
    }

    /// 选出最佳地址，并按 API Guidelines 调用 download_location 统计下载
    async fn resolve(&self, candidate: &Candidate) -> Result<String> {
        let key = self.access_key()?;
        let url = candidate
            .best_url()
            .ok_or_else(|| Error::MissingUrl {
                id: candidate.id.clone(),
            })?
            .to_string();

        if let Some(download_location) = candidate.extra.as_deref() {
            self.limiter.wait().await;
            let tracked = self
                .authorized_get(key, download_location)
                .send()
                .await
                .map_err(Error::from)
                .and_then(check_status);
            // 统计失败不影响下载本身
            if let Err(e) = tracked {
                warn!(id = %candidate.id, error = %e, "failed to register download with Unsplash");
            }
        }

        Ok(url)
    }

    fn rate_limiter(&self) -> Arc<RateLimiter> {
        self.limiter.clone()
    }
}

/// 解析 /search/photos（`results` 数组）或 /photos/random（顶层数组）的响应
pub fn parse_photos(
    body: &str,
    category: &str,
    requested: Option<(u32, u32)>,
) -> Result<Vec<Candidate>> {
    let value: serde_json::Value = serde_json::from_str(body).map_err(|e| Error::Malformed {
        source_name: NAME,
        reason: e.to_string(),
    })?;

    let items = match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut map) => match map.remove("results") {
            Some(serde_json::Value::Array(items)) => items,
            _ => {
                return Err(Error::Malformed {
                    source_name: NAME,
                    reason: "missing results array".to_string(),
                });
            }
        },
        _ => {
            return Err(Error::Malformed {
                source_name: NAME,
                reason: "unexpected response shape".to_string(),
            });
        }
    };

    Ok(parse_items::<Photo>(NAME, items)
        .into_iter()
        .map(|photo| photo_to_candidate(photo, category, requested))
        .collect())
}

fn photo_to_candidate(photo: Photo, category: &str, requested: Option<(u32, u32)>) -> Candidate {
    let base_title = photo
        .description
        .as_deref()
        .or(photo.alt_description.as_deref())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("unsplash_{}", photo.id));

    let title = match photo.user.as_ref().and_then(|u| u.username.as_deref()) {
        Some(username) if !username.is_empty() => format!("{base_title}_by_{username}"),
        _ => base_title,
    };

    // 在 raw URL 后追加尺寸参数，获取目标分辨率图片
    // fit=crop 保证裁剪到精确尺寸，cs=srgb 保证色彩空间正确
    let original = match (photo.urls.raw.as_deref(), requested) {
        (Some(raw), Some((w, h))) => {
            let sep = if raw.contains('?') { '&' } else { '?' };
            Some(format!("{raw}{sep}w={w}&h={h}&fit=crop&cs=srgb&fm=jpg"))
        }
        _ => None,
    };

    Candidate {
        title,
        urls: vec![
            RankedUrl::new(Quality::Original, original),
            RankedUrl::new(Quality::Full, photo.urls.full),
            RankedUrl::new(Quality::Regular, photo.urls.regular),
            RankedUrl::new(Quality::Preview, photo.urls.small),
            RankedUrl::new(Quality::Thumbnail, photo.urls.thumb),
        ],
        category: category.to_string(),
        width: photo.width,
        height: photo.height,
        tags: Vec::new(),
        source: NAME,
        page_url: None,
        extra: photo.links.download_location,
        id: photo.id,
    }
}

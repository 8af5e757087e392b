// pixabay.rs — Pixabay API 异步客户端模块
// API Key 以查询参数 `key` 传递，没有 Key 时不发请求

use super::{
    Candidate, Orientation, Quality, RankedUrl, SearchOptions, WallpaperSource, check_status,
    parse_items,
};
use crate::error::{Error, Result};
use crate::rate_limit::RateLimiter;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

const NAME: &str = "pixabay";

const PER_PAGE: u32 = 20;
const DEFAULT_MIN_SIZE: (u32, u32) = (1920, 1080);

#[derive(Deserialize, Debug)]
pub struct SearchResponse {
    pub hits: Vec<serde_json::Value>,
}

/// 单条搜索结果
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Hit {
    pub id: u64,
    /// 逗号分隔的标签
    #[serde(default)]
    pub tags: String,
    #[serde(rename = "previewURL")]
    pub preview_url: Option<String>,
    #[serde(rename = "webformatURL")]
    pub webformat_url: Option<String>,
    #[serde(rename = "largeImageURL")]
    pub large_image_url: Option<String>,
    /// 以下两项需要完整 API 权限才会返回
    #[serde(rename = "fullHDURL")]
    pub full_hd_url: Option<String>,
    #[serde(rename = "imageURL")]
    pub image_url: Option<String>,
    pub image_width: Option<u32>,
    pub image_height: Option<u32>,
}

pub struct PixabayClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    limiter: Arc<RateLimiter>,
    timeout: Duration,
}

impl PixabayClient {
    pub fn new(
        client: reqwest::Client,
        api_key: Option<String>,
        limiter: Arc<RateLimiter>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            base_url: String::from("https://pixabay.com/api/"),
            api_key,
            limiter,
            timeout,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or(Error::MissingCredential {
            source_name: NAME,
            env_var: "PIXABAY_API_KEY",
        })
    }
}

/// Pixabay 的方向取值为 horizontal / vertical / all
fn orientation_param(orientation: Orientation) -> &'static str {
    match orientation {
        Orientation::Landscape => "horizontal",
        Orientation::Portrait => "vertical",
        Orientation::Squarish => "all",
    }
}

#[async_trait]
impl WallpaperSource for PixabayClient {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn list(&self, options: &SearchOptions) -> Result<Vec<Candidate>> {
        let key = self.api_key()?;
        let (min_width, min_height) = options.resolution_dims().unwrap_or(DEFAULT_MIN_SIZE);

        let mut params: Vec<(&str, String)> = vec![
            ("key", key.to_string()),
            ("page", options.page().to_string()),
            ("per_page", PER_PAGE.to_string()),
            ("image_type", "photo".to_string()),
            ("orientation", orientation_param(options.orientation).to_string()),
            ("min_width", min_width.to_string()),
            ("min_height", min_height.to_string()),
        ];
        if let Some(q) = options.query() {
            params.push(("q", q.to_string()));
        }
        if let Some(category) = options.category.as_deref().filter(|c| !c.is_empty()) {
            params.push(("category", category.to_string()));
        }

        self.limiter.wait().await;
        let response = self
            .client
            .get(&self.base_url)
            .query(&params)
            .timeout(self.timeout)
            .send()
            .await?;
        let body = check_status(response)?.text().await?;

        let category = options
            .category
            .as_deref()
            .filter(|c| !c.is_empty())
            .unwrap_or(NAME);
        parse_hits(&body, category)
    }

    /// 图片地址带有与 key 绑定的签名，没有 key 时不解析
    async fn resolve(&self, candidate: &Candidate) -> Result<String> {
        self.api_key()?;
        candidate
            .best_url()
            .map(str::to_string)
            .ok_or_else(|| Error::MissingUrl {
                id: candidate.id.clone(),
            })
    }

    fn rate_limiter(&self) -> Arc<RateLimiter> {
        self.limiter.clone()
    }
}

pub fn parse_hits(body: &str, category: &str) -> Result<Vec<Candidate>> {
    let response: SearchResponse = serde_json::from_str(body).map_err(|e| Error::Malformed {
        source_name: NAME,
        reason: e.to_string(),
    })?;

    Ok(parse_items::<Hit>(NAME, response.hits)
        .into_iter()
        .map(|hit| {
            let tags: Vec<String> = hit
                .tags
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();

            let base = if tags.is_empty() {
                format!("pixabay_{}", hit.id)
            } else {
                tags.join(" ")
            };

            Candidate {
                id: hit.id.to_string(),
                title: format!("{base}_{}", hit.id),
                urls: vec![
                    RankedUrl::new(Quality::Original, hit.image_url),
                    RankedUrl::new(Quality::Full, hit.full_hd_url),
                    RankedUrl::new(Quality::Regular, hit.large_image_url),
                    RankedUrl::new(Quality::Preview, hit.webformat_url),
                    RankedUrl::new(Quality::Thumbnail, hit.preview_url),
                ],
                category: category.to_string(),
                width: hit.image_width,
                height: hit.image_height,
                tags,
                source: NAME,
                page_url: None,
                extra: None,
            }
        })
        .collect())
}

// wallhaven.rs — Wallhaven 异步客户端模块
// 有 API Key 时走 /api/v1/search，否则抓取 /search 网页

use super::{
    Candidate, Quality, RankedUrl, SearchOptions, WallpaperSource, check_status, parse_items,
    parse_resolution,
};
use crate::error::{Error, Result};
use crate::rate_limit::RateLimiter;
use async_trait::async_trait;
use reqwest::header::{HeaderValue, USER_AGENT};
use scraper::{Html, Selector};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const NAME: &str = "wallhaven";

/// Wallhaven API 搜索响应的顶层结构
///
/// 只要求 `data` 是数组，其中的条目逐个解析，坏条目不影响其余结果
#[derive(Deserialize, Debug)]
pub struct SearchResponse {
    pub data: Vec<serde_json::Value>,
}

/// 单张壁纸的数据结构
///
/// 只提取我们需要的字段，JSON 中多余的字段会被 serde 自动忽略
#[derive(Deserialize, Debug)]
pub struct Wallpaper {
    /// 壁纸唯一标识符（如 "94x38z"）
    pub id: String,

    /// 壁纸原图的直接下载 URL
    /// 格式如：https://w.wallhaven.cc/full/94/wallhaven-94x38z.jpg
    pub path: String,

    /// 详情页地址
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub dimension_x: Option<u32>,
    #[serde(default)]
    pub dimension_y: Option<u32>,

    #[serde(default)]
    pub thumbs: Thumbs,

    #[serde(default)]
    pub tags: Vec<Tag>,
}

#[derive(Deserialize, Debug, Default)]
pub struct Thumbs {
    pub large: Option<String>,
    pub small: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct Tag {
    pub name: String,
}

/// Wallhaven 异步客户端
///
/// `reqwest::Client` 内部维护连接池，应该复用而非每次请求都创建新的
pub struct WallhavenClient {
    client: reqwest::Client,
    base_url: String,
    /// 可选的 API Key
    api_key: Option<String>,
    limiter: Arc<RateLimiter>,
    timeout: Duration,
}

impl WallhavenClient {
    pub fn new(
        client: reqwest::Client,
        api_key: Option<String>,
        limiter: Arc<RateLimiter>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            base_url: String::from("https://wallhaven.cc"),
            api_key,
            limiter,
            timeout,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// 两种模式共用的查询参数
    fn search_params(&self, options: &SearchOptions) -> Vec<(&'static str, String)> {
        let filters = &options.wallhaven;
        let mut params = vec![
            ("categories", filters.categories.clone()),
            ("purity", filters.purity.clone()),
            ("sorting", filters.sorting.clone()),
            ("order", filters.order.clone()),
            ("page", options.page().to_string()),
        ];

        if let Some(q) = options.query() {
            params.push(("q", q.to_string()));
        }

        if let Some(res) = options.resolution.as_deref().filter(|r| !r.is_empty()) {
            params.push(("resolutions", res.to_string()));
        }

        params
    }

    fn category_for(options: &SearchOptions) -> String {
        options
            .category
            .as_deref()
            .or(options.query())
            .unwrap_or(NAME)
            .to_string()
    }

    async fn get(&self, url: &str, params: &[(&'static str, String)]) -> Result<reqwest::Response> {
        self.limiter.wait().await;
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, HeaderValue::from_static(super::DEFAULT_USER_AGENT))
            .query(params)
            .timeout(self.timeout)
            .send()
            .await?;
        check_status(response)
    }

    async fn list_api(&self, api_key: &str, options: &SearchOptions) -> Result<Vec<Candidate>> {
        let url = format!("{}/api/v1/search", self.base_url);
        let mut params = self.search_params(options);
        params.push(("apikey", api_key.to_string()));

        let response = self.get(&url, &params).await?;
        let body = response.text().await?;
        parse_api_response(&body, &Self::category_for(options))
    }

    async fn list_html(&self, options: &SearchOptions) -> Result<Vec<Candidate>> {
        let url = format!("{}/search", self.base_url);
        let params = self.search_params(options);

        let response = self.get(&url, &params).await?;
        let html = response.text().await?;
        Ok(parse_search_page(
            &html,
            &self.base_url,
            &Self::category_for(options),
        ))
    }
}

#[async_trait]
impl WallpaperSource for WallhavenClient {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn list(&self, options: &SearchOptions) -> Result<Vec<Candidate>> {
        match self.api_key.as_deref() {
            Some(key) => self.list_api(key, options).await,
            None => {
                debug!("no wallhaven API key, scraping search page");
                self.list_html(options).await
            }
        }
    }

    /// 有直链时直接使用，否则请求详情页读取 `img#wallpaper` 的地址
    async fn resolve(&self, candidate: &Candidate) -> Result<String> {
        if let Some(url) = candidate.best_url() {
            return Ok(url.to_string());
        }

        let page_url = candidate.page_url.as_deref().ok_or_else(|| Error::MissingUrl {
            id: candidate.id.clone(),
        })?;

        let response = self.get(page_url, &[]).await?;
        let html = response.text().await?;
        parse_detail_page(&html).ok_or_else(|| Error::MissingUrl {
            id: candidate.id.clone(),
        })
    }

    fn rate_limiter(&self) -> Arc<RateLimiter> {
        self.limiter.clone()
    }
}

/// 解析 API 搜索响应
pub fn parse_api_response(body: &str, category: &str) -> Result<Vec<Candidate>> {
    let response: SearchResponse = serde_json::from_str(body).map_err(|e| Error::Malformed {
        source_name: NAME,
        reason: e.to_string(),
    })?;

    let candidates = parse_items::<Wallpaper>(NAME, response.data)
        .into_iter()
        .map(|w| Candidate {
            title: format!("wallhaven_{}", w.id),
            urls: vec![
                RankedUrl::new(Quality::Original, Some(w.path)),
                RankedUrl::new(Quality::Preview, w.thumbs.large),
                RankedUrl::new(Quality::Thumbnail, w.thumbs.small),
            ],
            category: category.to_string(),
            width: w.dimension_x,
            height: w.dimension_y,
            tags: w.tags.into_iter().map(|t| t.name).collect(),
            source: NAME,
            page_url: w.url,
            extra: None,
            id: w.id,
        })
        .collect();

    Ok(candidates)
}

fn selector(css: &str) -> Selector {
    // 选择器均为编译期常量
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid selector {css}: {e}"))
}

/// 解析搜索结果网页
///
/// 每个 `figure[data-wallpaper-id]` 对应一张壁纸；网页上没有原图直链，
/// 下载地址留到 resolve 时从详情页获取。
pub fn parse_search_page(html: &str, base_url: &str, category: &str) -> Vec<Candidate> {
    let document = Html::parse_document(html);
    let figure_sel = selector("figure");
    let res_sel = selector("span.wall-res");

    let mut candidates = Vec::new();
    for figure in document.select(&figure_sel) {
        let Some(id) = figure
            .value()
            .attr("data-wallpaper-id")
            .map(str::trim)
            .filter(|id| !id.is_empty())
        else {
            warn!(source = NAME, "skipping figure without data-wallpaper-id");
            continue;
        };

        let dims = figure
            .select(&res_sel)
            .next()
            .map(|e| e.text().collect::<String>())
            .and_then(|text| parse_resolution(&text));

        candidates.push(Candidate {
            id: id.to_string(),
            title: format!("wallhaven_{id}"),
            urls: vec![RankedUrl::new(Quality::Original, None)],
            category: category.to_string(),
            width: dims.map(|(w, _)| w),
            height: dims.map(|(_, h)| h),
            tags: Vec::new(),
            source: NAME,
            page_url: Some(format!("{base_url}/w/{id}")),
            extra: None,
        });
    }

    candidates
}

/// 从详情页中提取原图地址
pub fn parse_detail_page(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let img_sel = selector("img#wallpaper");
    document
        .select(&img_sel)
        .next()
        .and_then(|img| img.value().attr("src"))
        .map(str::trim)
        .filter(|src| !src.is_empty())
        .map(str::to_string)
}

// config.rs — 配置管理模块
// 遵循 Unix 风格：优先从 ~/.config/wallfetch/config.toml 读取配置
//
// 优先级：命令行参数 > 环境变量 > 配置文件 > 默认值

use crate::error::{Error, Result};
use crate::source::{Orientation, SearchOptions, SourceKind, SourceSettings, WallhavenFilters};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 展开路径中的 ~ 和环境变量 ($HOME, $XDG_CONFIG_HOME 等)
/// 支持格式: ~/path, $HOME/path, ${HOME}/path
fn expand_path(path_str: &str) -> PathBuf {
    let expanded = shellexpand::full(path_str)
        .map(|p| p.into_owned())
        .unwrap_or_else(|_| shellexpand::tilde(path_str).into_owned());
    PathBuf::from(expanded)
}

/// 相对路径一律相对于 $HOME
fn resolve_dir(path_str: &str, home: &Path) -> PathBuf {
    let p = expand_path(path_str);
    if p.is_absolute() { p } else { home.join(p) }
}

/// 映射 config.toml 文件内容的嵌套结构体
#[derive(Debug, Clone, Deserialize, Serialize, Default, JsonSchema)]
pub struct ConfigFile {
    #[serde(default)]
    pub common: CommonConfig,
    #[serde(default)]
    pub search: SearchDefaults,
    #[serde(default)]
    pub source: SourceConfigs,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct CommonConfig {
    /// 壁纸保存根目录 (支持 ~、$HOME 等环境变量，相对路径则相对于 $HOME)
    #[serde(default)]
    pub download_dir: Option<String>,
    /// 默认启用的来源 (wallhaven / unsplash / pixabay)
    #[serde(default = "default_sources")]
    pub sources: Vec<String>,
    /// 同一来源两次请求的最小间隔（秒），不配置则使用各来源的默认值
    #[serde(default)]
    pub rate_limit: Option<f64>,
    /// 每个来源同时进行的下载数，不配置则使用各来源的默认值
    #[serde(default)]
    pub max_concurrent: Option<usize>,
    /// 请求超时（秒）
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub user_agent: Option<String>,
    /// 日志级别 (trace/debug/info/warn/error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for CommonConfig {
    fn default() -> Self {
        Self {
            download_dir: None,
            sources: default_sources(),
            rate_limit: None,
            max_concurrent: None,
            timeout: default_timeout(),
            user_agent: None,
            log_level: default_log_level(),
        }
    }
}

/// 默认搜索参数
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct SearchDefaults {
    #[serde(default)]
    pub query: Option<String>,
    /// 子目录名，不配置则使用关键词或来源名
    #[serde(default)]
    pub category: Option<String>,
    /// 形如 "3840x2160"
    #[serde(default)]
    pub resolution: Option<String>,
    /// landscape / portrait / squarish
    #[serde(default = "default_orientation")]
    pub orientation: String,
    #[serde(default = "default_pages")]
    pub pages: u32,
    /// 每个来源最多下载的数量
    #[serde(default)]
    pub limit: Option<usize>,
    /// Wallhaven 分类开关 (general/anime/people)
    #[serde(default = "default_categories")]
    pub categories: String,
    /// Wallhaven 纯净度开关 (sfw/sketchy/nsfw)
    #[serde(default = "default_purity")]
    pub purity: String,
    #[serde(default = "default_sorting")]
    pub sorting: String,
    #[serde(default = "default_order")]
    pub order: String,
}

impl Default for SearchDefaults {
    fn default() -> Self {
        Self {
            query: None,
            category: None,
            resolution: None,
            orientation: default_orientation(),
            pages: default_pages(),
            limit: None,
            categories: default_categories(),
            purity: default_purity(),
            sorting: default_sorting(),
            order: default_order(),
        }
    }
}

fn default_sources() -> Vec<String> {
    vec!["wallhaven".to_string()]
}
fn default_timeout() -> u64 {
    60
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_orientation() -> String {
    "landscape".to_string()
}
fn default_pages() -> u32 {
    1
}
fn default_categories() -> String {
    "111".to_string()
}
fn default_purity() -> String {
    "100".to_string()
}
fn default_sorting() -> String {
    "date_added".to_string()
}
fn default_order() -> String {
    "desc".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, JsonSchema)]
pub struct SourceConfigs {
    #[serde(default)]
    pub wallhaven: WallhavenConfig,
    #[serde(default)]
    pub unsplash: UnsplashConfig,
    #[serde(default)]
    pub pixabay: PixabayConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, JsonSchema)]
pub struct WallhavenConfig {
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, JsonSchema)]
pub struct UnsplashConfig {
    pub access_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, JsonSchema)]
pub struct PixabayConfig {
    pub api_key: Option<String>,
}

/// 命令行上显式给出的值，优先级最高
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub download_dir: Option<String>,
    pub rate_limit: Option<f64>,
    pub max_concurrent: Option<usize>,
    pub timeout: Option<u64>,
    /// 只对单一来源生效
    pub api_key: Option<String>,
}

/// 某个来源最终使用的设置
#[derive(Debug, Clone)]
pub struct SourcePlan {
    pub kind: SourceKind,
    pub settings: SourceSettings,
    pub max_concurrent: usize,
}

/// 应用全局配置项（已合并环境变量）
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// 配置文件所在路径
    pub config_path: PathBuf,
    /// 壁纸保存根目录 (优先级：ENV > TOML)
    pub download_dir: PathBuf,
    pub sources: Vec<SourceKind>,
    pub rate_limit: Option<f64>,
    pub max_concurrent: Option<usize>,
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub log_level: String,
    pub search_defaults: SearchDefaults,
    /// Wallhaven API Key (优先级：ENV > TOML)
    pub wallhaven_api_key: Option<String>,
    /// Unsplash Access Key (优先级：ENV > TOML)
    pub unsplash_access_key: Option<String>,
    /// Pixabay API Key (优先级：ENV > TOML)
    pub pixabay_api_key: Option<String>,
    home: PathBuf,
    /// 文件原始内容，保存时只写回它，环境变量里的密钥不会落盘
    file: ConfigFile,
}

impl AppConfig {
    /// 默认配置文件路径：$HOME/.config/wallfetch/config.toml
    pub fn default_path() -> PathBuf {
        home_dir(&env_var)
            .join(".config")
            .join("wallfetch")
            .join("config.toml")
    }

    /// 从配置文件和进程环境变量加载
    ///
    /// 文件不存在时使用默认值；文件存在但无法解析则报错。
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);
        let file = Self::load_config_from_file(&config_path)?;
        Self::from_parts(file, config_path, env_var)
    }

    /// 辅助函数：解析 TOML 配置文件
    fn load_config_from_file(path: &Path) -> Result<ConfigFile> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ConfigFile::default()),
            Err(e) => return Err(e.into()),
        };
        toml::from_str(&content).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// 合并文件内容与环境变量
    ///
    /// `env` 用于查询环境变量，空字符串视为未设置。
    pub fn from_parts(
        file: ConfigFile,
        config_path: PathBuf,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let lookup = |key: &str| env(key).filter(|v| !v.trim().is_empty());
        let home = home_dir(&lookup);

        // 壁纸目录：
        // 1. ENV 或配置文件给出路径时展开 ~ 和环境变量，相对路径则相对于 $HOME
        // 2. 都未配置时默认使用 $HOME/Pictures/Wallpapers
        let download_dir = match lookup("WALLFETCH_DOWNLOAD_DIR").or(file.common.download_dir.clone()) {
            Some(dir) => resolve_dir(&dir, &home),
            None => home.join("Pictures").join("Wallpapers"),
        };

        let sources = parse_sources(&file.common.sources)?;
        rate_limit_interval(file.common.rate_limit)?;
        if file.common.max_concurrent == Some(0) {
            return Err(Error::Config("max_concurrent must be at least 1".to_string()));
        }
        if file.common.timeout == 0 {
            return Err(Error::Config("timeout must be greater than 0".to_string()));
        }
        parse_orientation(&file.search.orientation)?;

        let wallhaven_api_key = lookup("WALLHAVEN_API_KEY").or(file.source.wallhaven.api_key.clone());
        let unsplash_access_key = lookup("UNSPLASH_ACCESS_KEY")
            .or_else(|| lookup("UNSPLASH_API_KEY"))
            .or(file.source.unsplash.access_key.clone());
        let pixabay_api_key = lookup("PIXABAY_API_KEY").or(file.source.pixabay.api_key.clone());

        Ok(Self {
            config_path,
            download_dir,
            sources,
            rate_limit: file.common.rate_limit,
            max_concurrent: file.common.max_concurrent,
            timeout: Duration::from_secs(file.common.timeout),
            user_agent: file.common.user_agent.clone().filter(|ua| !ua.trim().is_empty()),
            log_level: file.common.log_level.clone(),
            search_defaults: file.search.clone(),
            wallhaven_api_key,
            unsplash_access_key,
            pixabay_api_key,
            home,
            file,
        })
    }

    /// 某来源的凭据
    pub fn credential(&self, kind: SourceKind) -> Option<&str> {
        let key = match kind {
            SourceKind::Wallhaven => &self.wallhaven_api_key,
            SourceKind::Unsplash => &self.unsplash_access_key,
            SourceKind::Pixabay => &self.pixabay_api_key,
        };
        key.as_deref().filter(|k| !k.trim().is_empty())
    }

    /// 下载目录：命令行 > 配置
    pub fn download_dir_with(&self, overrides: &Overrides) -> PathBuf {
        match overrides.download_dir.as_deref() {
            Some(dir) => resolve_dir(dir, &self.home),
            None => self.download_dir.clone(),
        }
    }

    /// 计算某来源的最终设置：命令行 > 配置 > 来源默认值
    pub fn plan_source(&self, kind: SourceKind, overrides: &Overrides) -> Result<SourcePlan> {
        let rate_limit = rate_limit_interval(overrides.rate_limit.or(self.rate_limit))?
            .unwrap_or_else(|| kind.default_rate_limit());

        let max_concurrent = overrides
            .max_concurrent
            .or(self.max_concurrent)
            .unwrap_or_else(|| kind.default_max_concurrent());
        if max_concurrent == 0 {
            return Err(Error::Config("max_concurrent must be at least 1".to_string()));
        }

        let timeout = match overrides.timeout {
            Some(0) => return Err(Error::Config("timeout must be greater than 0".to_string())),
            Some(secs) => Duration::from_secs(secs),
            None => self.timeout,
        };

        let credential = overrides
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| self.credential(kind).map(str::to_string));

        Ok(SourcePlan {
            kind,
            settings: SourceSettings {
                credential,
                rate_limit,
                timeout,
                base_url: None,
            },
            max_concurrent,
        })
    }

    /// 由默认搜索参数构造 SearchOptions，调用方再叠加命令行参数
    pub fn search_options(&self) -> Result<SearchOptions> {
        let defaults = &self.search_defaults;
        Ok(SearchOptions {
            query: defaults.query.clone(),
            category: defaults.category.clone(),
            page: 1,
            resolution: defaults.resolution.clone(),
            orientation: parse_orientation(&defaults.orientation)?,
            wallhaven: WallhavenFilters {
                categories: defaults.categories.clone(),
                purity: defaults.purity.clone(),
                sorting: defaults.sorting.clone(),
                order: defaults.order.clone(),
            },
        })
    }

    /// 将配置保存回文件
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let toml_str = toml::to_string_pretty(&self.file).map_err(|e| Error::Config(e.to_string()))?;
        fs::write(&self.config_path, toml_str)?;
        Ok(())
    }

    /// 修改一个配置项，校验通过后写回文件
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut file = self.file.clone();
        apply_key(&mut file, key, value)?;
        *self = Self::from_parts(file, self.config_path.clone(), env_var)?;
        self.save()
    }

    /// 获取配置文件的 JSON Schema
    pub fn get_schema() -> String {
        let schema = schemars::schema_for!(ConfigFile);
        serde_json::to_string_pretty(&schema).unwrap_or_default()
    }

    /// 将当前生效的配置转换为 TOML 字符串，密钥只显示是否已设置
    pub fn to_toml(&self) -> String {
        let mut effective = self.file.clone();
        effective.common.download_dir = Some(self.download_dir.to_string_lossy().to_string());
        effective.source.wallhaven.api_key = self.wallhaven_api_key.as_deref().map(mask);
        effective.source.unsplash.access_key = self.unsplash_access_key.as_deref().map(mask);
        effective.source.pixabay.api_key = self.pixabay_api_key.as_deref().map(mask);

        let toml_str = toml::to_string_pretty(&effective)
            .unwrap_or_else(|_| "# Error serializing config".to_string());

        // toml 库不支持带注释序列化，所以手动插入
        toml_str.replace(
            "[source.wallhaven]",
            "# 壁纸来源配置\n# 可选来源: wallhaven (default), unsplash, pixabay\n# 环境变量 WALLHAVEN_API_KEY / UNSPLASH_ACCESS_KEY / PIXABAY_API_KEY 优先于此处\n[source.wallhaven]",
        )
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn home_dir(env: &dyn Fn(&str) -> Option<String>) -> PathBuf {
    env("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."))
}

fn mask(_secret: &str) -> String {
    "********".to_string()
}

fn parse_sources(names: &[String]) -> Result<Vec<SourceKind>> {
    let mut kinds = Vec::new();
    for name in names {
        let kind = SourceKind::from_name(name)
            .ok_or_else(|| Error::Config(format!("unknown source: {name}")))?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    if kinds.is_empty() {
        kinds.push(SourceKind::Wallhaven);
    }
    Ok(kinds)
}

fn parse_orientation(value: &str) -> Result<Orientation> {
    <Orientation as clap::ValueEnum>::from_str(value.trim(), true)
        .map_err(|_| Error::Config(format!("invalid orientation: {value}")))
}

/// 秒数转为请求间隔；负数、NaN、无穷大或超出 Duration 范围的值都视为配置错误
fn rate_limit_interval(rate_limit: Option<f64>) -> Result<Option<Duration>> {
    rate_limit
        .map(|secs| {
            Duration::try_from_secs_f64(secs).map_err(|_| {
                Error::Config(format!(
                    "rate_limit must be a non-negative number of seconds, got {secs}"
                ))
            })
        })
        .transpose()
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("invalid value for {key}: {value}")))
}

/// 空字符串表示清除该项
fn optional(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// `config set` 支持的键
pub const SETTABLE_KEYS: &[&str] = &[
    "download_dir",
    "sources",
    "rate_limit",
    "max_concurrent",
    "timeout",
    "user_agent",
    "log_level",
    "query",
    "category",
    "resolution",
    "orientation",
    "pages",
    "limit",
    "categories",
    "purity",
    "sorting",
    "order",
    "wallhaven.api_key",
    "unsplash.access_key",
    "pixabay.api_key",
];

fn apply_key(file: &mut ConfigFile, key: &str, value: &str) -> Result<()> {
    match key {
        "download_dir" => file.common.download_dir = optional(value),
        "sources" => {
            file.common.sources = value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        }
        "rate_limit" => file.common.rate_limit = optional(value).map(|v| parse_value(key, &v)).transpose()?,
        "max_concurrent" => {
            file.common.max_concurrent = optional(value).map(|v| parse_value(key, &v)).transpose()?
        }
        "timeout" => file.common.timeout = parse_value(key, value)?,
        "user_agent" => file.common.user_agent = optional(value),
        "log_level" => file.common.log_level = value.trim().to_string(),
        "query" => file.search.query = optional(value),
        "category" => file.search.category = optional(value),
        "res" | "resolution" => file.search.resolution = optional(value),
        "orientation" => file.search.orientation = value.trim().to_string(),
        "pages" => file.search.pages = parse_value(key, value)?,
        "limit" => file.search.limit = optional(value).map(|v| parse_value(key, &v)).transpose()?,
        "categories" => file.search.categories = value.trim().to_string(),
        "purity" => file.search.purity = value.trim().to_string(),
        "sorting" => file.search.sorting = value.trim().to_string(),
        "order" => file.search.order = value.trim().to_string(),
        "wallhaven.api_key" => file.source.wallhaven.api_key = optional(value),
        "unsplash.access_key" => file.source.unsplash.access_key = optional(value),
        "pixabay.api_key" => file.source.pixabay.api_key = optional(value),
        _ => {
            return Err(Error::Config(format!(
                "unknown config key: {key} (supported: {})",
                SETTABLE_KEYS.join(", ")
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn parse(toml_str: &str) -> ConfigFile {
        toml::from_str(toml_str).unwrap()
    }

    #[test]
    fn defaults_without_file_or_env() {
        let config = AppConfig::from_parts(
            ConfigFile::default(),
            PathBuf::from("/cfg/config.toml"),
            env_of(&[("HOME", "/home/u")]),
        )
        .unwrap();

        assert_eq!(config.download_dir, PathBuf::from("/home/u/Pictures/Wallpapers"));
        assert_eq!(config.sources, vec![SourceKind::Wallhaven]);
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.search_defaults.pages, 1);
        assert_eq!(config.credential(SourceKind::Unsplash), None);
    }

    #[test]
    fn env_overrides_file() {
        let file = parse(
            r#"
            [common]
            download_dir = "walls"
            [source.unsplash]
            access_key = "from-file"
            [source.pixabay]
            api_key = "pix-file"
            "#,
        );
        let config = AppConfig::from_parts(
            file,
            PathBuf::from("/cfg/config.toml"),
            env_of(&[
                ("HOME", "/home/u"),
                ("UNSPLASH_ACCESS_KEY", "from-env"),
                ("WALLFETCH_DOWNLOAD_DIR", "/data/walls"),
                ("PIXABAY_API_KEY", ""),
            ]),
        )
        .unwrap();

        assert_eq!(config.download_dir, PathBuf::from("/data/walls"));
        assert_eq!(config.credential(SourceKind::Unsplash), Some("from-env"));
        // 空环境变量不覆盖文件
        assert_eq!(config.credential(SourceKind::Pixabay), Some("pix-file"));
    }

    #[test]
    fn relative_download_dir_is_under_home() {
        let file = parse("[common]\ndownload_dir = \"walls\"\n");
        let config =
            AppConfig::from_parts(file, PathBuf::from("/c"), env_of(&[("HOME", "/home/u")])).unwrap();
        assert_eq!(config.download_dir, PathBuf::from("/home/u/walls"));
    }

    #[test]
    fn unsplash_api_key_alias_is_accepted() {
        let config = AppConfig::from_parts(
            ConfigFile::default(),
            PathBuf::from("/c"),
            env_of(&[("HOME", "/h"), ("UNSPLASH_API_KEY", "alias")]),
        )
        .unwrap();
        assert_eq!(config.credential(SourceKind::Unsplash), Some("alias"));
    }

    #[test]
    fn argument_beats_config_beats_source_default() {
        let file = parse("[common]\nrate_limit = 0.5\n");
        let config = AppConfig::from_parts(file, PathBuf::from("/c"), env_of(&[("HOME", "/h")])).unwrap();

        let plan = config.plan_source(SourceKind::Wallhaven, &Overrides::default()).unwrap();
        assert_eq!(plan.settings.rate_limit, Duration::from_millis(500));
        assert_eq!(plan.max_concurrent, 2);

        let overrides = Overrides {
            rate_limit: Some(3.0),
            max_concurrent: Some(5),
            timeout: Some(10),
            api_key: Some("cli-key".to_string()),
            ..Overrides::default()
        };
        let plan = config.plan_source(SourceKind::Pixabay, &overrides).unwrap();
        assert_eq!(plan.settings.rate_limit, Duration::from_secs(3));
        assert_eq!(plan.max_concurrent, 5);
        assert_eq!(plan.settings.timeout, Duration::from_secs(10));
        assert_eq!(plan.settings.credential.as_deref(), Some("cli-key"));
    }

    #[test]
    fn source_defaults_apply_when_unset() {
        let config =
            AppConfig::from_parts(ConfigFile::default(), PathBuf::from("/c"), env_of(&[("HOME", "/h")]))
                .unwrap();
        let plan = config.plan_source(SourceKind::Unsplash, &Overrides::default()).unwrap();
        assert_eq!(plan.settings.rate_limit, Duration::from_secs(1));
        assert_eq!(plan.max_concurrent, 3);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let env = env_of(&[("HOME", "/h")]);
        let bad_rate = parse("[common]\nrate_limit = -1.0\n");
        assert!(matches!(
            AppConfig::from_parts(bad_rate, PathBuf::from("/c"), &env),
            Err(Error::Config(_))
        ));

        let bad_source = parse("[common]\nsources = [\"flickr\"]\n");
        assert!(AppConfig::from_parts(bad_source, PathBuf::from("/c"), &env).is_err());

        let config = AppConfig::from_parts(ConfigFile::default(), PathBuf::from("/c"), &env).unwrap();
        let overrides = Overrides {
            rate_limit: Some(f64::NAN),
            ..Overrides::default()
        };
        assert!(config.plan_source(SourceKind::Wallhaven, &overrides).is_err());
    }

    #[test]
    fn rate_limit_beyond_duration_range_is_a_config_error() {
        let env = env_of(&[("HOME", "/h")]);
        let huge = parse("[common]\nrate_limit = 1e20\n");
        assert!(matches!(
            AppConfig::from_parts(huge, PathBuf::from("/c"), &env),
            Err(Error::Config(_))
        ));

        let config = AppConfig::from_parts(ConfigFile::default(), PathBuf::from("/c"), &env).unwrap();
        for secs in [1e20, f64::MAX, f64::INFINITY] {
            let overrides = Overrides {
                rate_limit: Some(secs),
                ..Overrides::default()
            };
            match config.plan_source(SourceKind::Unsplash, &overrides) {
                Err(Error::Config(msg)) => assert!(msg.contains("rate_limit"), "{msg}"),
                other => panic!("expected config error for {secs}, got {other:?}"),
            }
        }
    }

    #[test]
    fn unknown_key_error_lists_supported_keys() {
        let mut file = ConfigFile::default();
        let err = apply_key(&mut file, "theme", "dracula").unwrap_err().to_string();
        assert!(err.contains("theme"));
        for key in SETTABLE_KEYS {
            assert!(err.contains(key), "{key} missing from {err}");
        }

        // 列出的每个键都确实能设置
        for key in SETTABLE_KEYS {
            let value = match *key {
                "rate_limit" | "max_concurrent" | "timeout" | "pages" | "limit" => "2",
                "sources" => "wallhaven",
                "orientation" => "landscape",
                _ => "x",
            };
            assert!(apply_key(&mut file, key, value).is_ok(), "{key} rejected");
        }
    }

    #[test]
    fn apply_key_updates_file() {
        let mut file = ConfigFile::default();
        apply_key(&mut file, "sources", "unsplash, pixabay").unwrap();
        apply_key(&mut file, "limit", "12").unwrap();
        apply_key(&mut file, "res", "1920x1080").unwrap();
        apply_key(&mut file, "query", "").unwrap();

        assert_eq!(file.common.sources, vec!["unsplash", "pixabay"]);
        assert_eq!(file.search.limit, Some(12));
        assert_eq!(file.search.resolution.as_deref(), Some("1920x1080"));
        assert_eq!(file.search.query, None);

        assert!(apply_key(&mut file, "pages", "many").is_err());
        assert!(apply_key(&mut file, "theme", "dracula").is_err());
    }

    #[test]
    fn save_writes_file_values_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let file = parse("[search]\nquery = \"mountains\"\n");
        let config = AppConfig::from_parts(
            file,
            path.clone(),
            env_of(&[("HOME", "/h"), ("WALLHAVEN_API_KEY", "secret-env-key")]),
        )
        .unwrap();

        config.save().unwrap();
        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("mountains"));
        assert!(!written.contains("secret-env-key"));

        let reloaded = AppConfig::load_config_from_file(&path).unwrap();
        assert_eq!(reloaded.search.query.as_deref(), Some("mountains"));
    }

    #[test]
    fn broken_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[common\nsources = 1").unwrap();
        assert!(matches!(
            AppConfig::load_config_from_file(&path),
            Err(Error::Config(_))
        ));

        let missing = dir.path().join("absent.toml");
        assert!(AppConfig::load_config_from_file(&missing).is_ok());
    }

    #[test]
    fn dump_masks_credentials_and_schema_lists_sections() {
        let file = parse("[source.pixabay]\napi_key = \"pk-123\"\n");
        let config = AppConfig::from_parts(file, PathBuf::from("/c"), env_of(&[("HOME", "/h")])).unwrap();
        let dumped = config.to_toml();
        assert!(!dumped.contains("pk-123"));
        assert!(dumped.contains("[source.pixabay]"));

        let schema = AppConfig::get_schema();
        assert!(schema.contains("common"));
        assert!(schema.contains("search"));
    }
}

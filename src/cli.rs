// cli.rs — 命令行接口定义模块
// 使用 clap 的 derive 模式定义所有子命令和参数

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use wallfetch::source::{Orientation, SourceKind};

/// 多来源壁纸下载工具
///
/// 从 Wallhaven / Unsplash / Pixabay 搜索并批量下载壁纸，
/// 每个来源独立限流、限制并发。
#[derive(Parser)]
#[command(name = "wallfetch")]
#[command(version)]
#[command(author)]
#[command(about = "多来源壁纸下载工具 — 从 Wallhaven / Unsplash / Pixabay 批量获取壁纸")]
pub struct Cli {
    /// 配置文件路径（默认 ~/.config/wallfetch/config.toml）
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// 输出调试日志
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 搜索并下载壁纸
    ///
    /// 用法示例:
    ///   wallfetch fetch --query nature
    ///   wallfetch fetch -s unsplash -s pixabay -q mountains -l 10
    ///   wallfetch fetch -s wallhaven --resolution 3840x2160 -p 3
    Fetch(FetchArgs),

    /// 列出支持的来源、默认限速与凭据状态
    ///
    /// 用法示例:
    ///   wallfetch sources
    Sources,

    /// 配置管理操作
    ///
    /// 用法示例:
    ///   wallfetch config show
    ///   wallfetch config dump
    ///   wallfetch config set query "anime"
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// 生成 shell 补全脚本（支持 bash, zsh, fish, elvish, powershell）
    ///
    /// 用法示例：
    ///   wallfetch completions zsh > ~/.zsh/completions/_wallfetch
    ///   wallfetch completions fish > ~/.config/fish/completions/wallfetch.fish
    Completions {
        /// 目标 shell 类型
        shell: Shell,
    },
}

#[derive(clap::Args, Debug, Default)]
pub struct FetchArgs {
    /// 壁纸来源，可重复指定（不指定则使用配置中的 sources）
    #[arg(short, long = "source", value_enum, value_name = "SOURCE")]
    pub sources: Vec<SourceKind>,

    /// 搜索关键词（如 "nature", "anime", "landscape"）
    #[arg(short, long)]
    pub query: Option<String>,

    /// 子目录名（默认使用关键词或来源名）
    #[arg(short, long)]
    pub category: Option<String>,

    /// 每个来源最多下载的数量
    #[arg(short, long, value_name = "N")]
    pub limit: Option<usize>,

    /// 抓取的页数
    #[arg(short, long, value_name = "N")]
    pub pages: Option<u32>,

    /// 图片方向
    #[arg(long, value_enum)]
    pub orientation: Option<Orientation>,

    /// 壁纸分辨率，如 "1920x1080"
    #[arg(long, value_name = "WxH")]
    pub resolution: Option<String>,

    /// 保存目录
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<String>,

    /// 同一来源两次请求的最小间隔（秒）
    #[arg(short, long, value_name = "SECS")]
    pub rate_limit: Option<f64>,

    /// 每个来源同时进行的下载数
    #[arg(short, long, value_name = "N")]
    pub max_concurrent: Option<usize>,

    /// 请求超时（秒）
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// API Key（仅在只指定一个来源时生效）
    #[arg(short = 'k', long, value_name = "KEY")]
    pub api_key: Option<String>,
}

/// 配置管理操作
#[derive(Subcommand)]
pub enum ConfigAction {
    /// 查看当前所有配置简报
    Show,
    /// 生成配置文件对应的 JSON Schema
    Schema,
    /// 以 TOML 格式打印当前生效的完整配置
    Dump,
    /// 设置配置项的值 (如: query, resolution, sources, rate_limit)
    Set {
        /// 要设置的键
        key: String,
        /// 要设置的值（空字符串表示清除）
        value: String,
    },
}

// error.rs — 库级错误类型
// 单个条目的下载失败不走这里，而是作为 DownloadOutcome::Failed 收集进汇总

/// 壁纸源与配置层的错误
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// 该来源必须提供凭据，但未配置
    #[error("{source_name} requires a credential (set {env_var} or the config file entry)")]
    MissingCredential {
        source_name: &'static str,
        env_var: &'static str,
    },

    /// 连接失败、超时等传输层错误
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// 非 2xx 响应
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// 响应体整体结构不符合预期
    #[error("malformed response from {source_name}: {reason}")]
    Malformed {
        source_name: &'static str,
        reason: String,
    },

    /// 候选项没有任何可用的下载地址
    #[error("no download URL available for {id}")]
    MissingUrl { id: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 配置值非法
    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

//! 集成测试共用的辅助函数

#![allow(dead_code)]

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::subscriber::DefaultGuard;
use wallfetch::source::{Candidate, Quality, RankedUrl, SourceSettings};

/// 内存日志缓冲，供作用域内的 subscriber 写入
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// 为当前线程安装 subscriber；guard 被丢弃时自动卸载
    pub fn install() -> (Self, DefaultGuard) {
        let capture = Self::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let guard = tracing::subscriber::set_default(subscriber);
        (capture, guard)
    }

    pub fn contents(&self) -> String {
        let buf = self.0.lock().unwrap();
        String::from_utf8_lossy(&buf).into_owned()
    }

    pub fn count(&self, needle: &str) -> usize {
        self.contents().lines().filter(|l| l.contains(needle)).count()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// 指向 mock 服务器的来源设置，超时固定 5 秒
pub fn settings(base_url: &str, credential: Option<&str>, rate_limit: Duration) -> SourceSettings {
    SourceSettings {
        credential: credential.map(str::to_string),
        rate_limit,
        timeout: Duration::from_secs(5),
        base_url: Some(base_url.to_string()),
    }
}

/// 只有一个原图地址的候选项，落在 `tests/item_<id>` 下
pub fn candidate(id: &str, url: Option<String>) -> Candidate {
    Candidate {
        id: id.to_string(),
        title: format!("item_{id}"),
        urls: vec![RankedUrl::new(Quality::Original, url)],
        category: "tests".to_string(),
        width: None,
        height: None,
        tags: Vec::new(),
        source: "test",
        page_url: None,
        extra: None,
    }
}

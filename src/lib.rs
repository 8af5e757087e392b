// lib.rs — wallfetch 库入口
// 多来源壁纸下载：限流、并发受限的下载执行器、各站点适配器与编排器

pub mod config;
pub mod download;
pub mod error;
pub mod naming;
pub mod orchestrator;
pub mod rate_limit;
pub mod shutdown;
pub mod source;

pub use error::{Error, Result};

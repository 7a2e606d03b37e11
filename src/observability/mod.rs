//! 可观测性：tracing 订阅器初始化
//!
//! 默认级别 info，可通过 RUST_LOG 覆盖（如 `RUST_LOG=iqide=debug` 打开节点迁移日志）。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// 初始化全局订阅器；重复调用时保留已有订阅器
pub fn init() {
    let result = tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_target(true))
        .try_init();
    if result.is_err() {
        tracing::debug!("tracing subscriber already initialized");
    }
}

/// 交互式前端使用：日志写到 stderr，不打断 stdout 上的回复
pub fn init_stderr() {
    let result = tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
    if result.is_err() {
        tracing::debug!("tracing subscriber already initialized");
    }
}

//! # 德州扑克服务器
//!
//! 在 `holdem_house_core` 之上提供房间、计时、机器人调度和 WebSocket 传输。

pub mod config;
pub mod room;
pub mod store;
pub mod ws;

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// 安装日志输出，`RUST_LOG` 未设置时默认 info
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false))
        .init();
}

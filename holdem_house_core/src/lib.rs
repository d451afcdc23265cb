//! # 德州扑克核心规则引擎
//!
//! 这个 `core` crate 包含了一张德州扑克牌桌的全部规则：牌与牌堆、牌力评估、
//! 筹码账本、主池/边池管理、下注状态机以及机器人决策，
//! 还有客户端-服务器通信消息的定义。
//! 它是同步的、不做任何 I/O，计时与网络由上层 (如 `holdem_house_server`) 负责。

mod bot;
mod card;
mod config;
mod error;
mod eval;
mod logic;
mod message;
mod pot;
mod state;

pub use bot::*;
pub use card::*;
pub use config::*;
pub use error::*;
pub use eval::*;
pub use message::*;
pub use pot::*;
pub use state::*;

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 一张桌子的规则与节奏参数。
///
/// 所有数值都是策略常量而不是硬编码的规则，测试可以换成任意级别的盲注。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    pub small_blind: u32,
    pub big_blind: u32,
    /// 翻牌前加注超出跟注额的最小幅度
    pub min_raise_preflop: u32,
    /// 翻牌后加注超出跟注额的最小幅度
    pub min_raise_postflop: u32,
    pub starting_stack: u32,
    pub max_seats: usize,
    pub turn_timeout_ms: u64,
    /// 机器人"思考"的延迟
    pub bot_delay_ms: u64,
    /// 一局结束后到下一局开始的间隔
    pub next_hand_delay_ms: u64,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            small_blind: 10,
            big_blind: 20,
            min_raise_preflop: 20,
            min_raise_postflop: 10,
            starting_stack: 1000,
            max_seats: 9,
            turn_timeout_ms: 30_000,
            bot_delay_ms: 1_000,
            next_hand_delay_ms: 5_000,
        }
    }
}

impl TableConfig {
    pub fn turn_timeout(&self) -> Duration {
        Duration::from_millis(self.turn_timeout_ms)
    }

    pub fn bot_delay(&self) -> Duration {
        Duration::from_millis(self.bot_delay_ms)
    }

    pub fn next_hand_delay(&self) -> Duration {
        Duration::from_millis(self.next_hand_delay_ms)
    }
}

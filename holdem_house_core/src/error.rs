use crate::state::PlayerId;
use thiserror::Error;

/// 引擎拒绝一个请求的原因。
///
/// 所有错误都不会修改状态：调用方可以直接丢弃它 (传输层对越权/非法操作保持静默)。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("至少需要 5 张牌才能评估牌力，实际 {0} 张")]
    TooFewCards(usize),

    #[error("最多只能评估 7 张牌，实际 {0} 张")]
    TooManyCards(usize),

    #[error("牌堆已经发完")]
    DeckExhausted,

    #[error("有筹码的玩家不足两人，无法开局")]
    NotEnoughPlayers,

    #[error("座位已满")]
    TableFull,

    #[error("玩家 {0} 不在桌上")]
    UnknownPlayer(PlayerId),

    #[error("当前没有进行中的牌局")]
    NoActiveHand,

    #[error("牌局正在进行中")]
    HandInProgress,

    #[error("牌局已经结束")]
    HandFinished,

    #[error("还没有轮到玩家 {0} 行动")]
    NotPlayersTurn(PlayerId),

    #[error("需要跟注 {to_call}，不能过牌")]
    CannotCheck { to_call: u32 },

    #[error("加注金额必须大于 0")]
    ZeroRaise,

    #[error("加注 {amount} 超过了剩余筹码 {chips}")]
    RaiseExceedsStack { amount: u32, chips: u32 },

    #[error("加注后的总下注 {total} 没有超过当前最高下注 {current_bet}")]
    RaiseNotAboveBet { total: u32, current_bet: u32 },

    #[error("加注幅度 {increase} 小于最小加注 {min_raise}")]
    RaiseTooSmall { increase: u32, min_raise: u32 },
}

/// 拒绝的分类，决定上层如何处理：
/// 非法输入与违反规则的操作对人类玩家直接拒绝，越权操作静默忽略。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    InvalidInput,
    OutOfTurn,
    PolicyViolation,
}

impl EngineError {
    pub fn kind(&self) -> Rejection {
        match self {
            EngineError::NoActiveHand | EngineError::HandFinished | EngineError::NotPlayersTurn(_) => {
                Rejection::OutOfTurn
            }
            EngineError::CannotCheck { .. } | EngineError::RaiseTooSmall { .. } => Rejection::PolicyViolation,
            _ => Rejection::InvalidInput,
        }
    }
}

/// 机器人策略内部故障。永远不会传播到牌局之外。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BotError {
    #[error("机器人没有底牌")]
    MissingHoleCards,

    #[error("机器人决策失败: {0}")]
    Internal(String),
}

impl From<EngineError> for BotError {
    fn from(err: EngineError) -> Self {
        BotError::Internal(err.to_string())
    }
}

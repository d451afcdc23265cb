//! 机器人决策
//!
//! 房间为每个机器人座位持有一个 `DecisionPolicy`。策略只读一份 `DecisionContext`，
//! 不接触 `GameState`，返回的动作仍要经过状态机的正常校验 (非法加注会被降级为跟注)。

use crate::card::Card;
use crate::error::BotError;
use crate::eval::evaluate_hand;
use crate::logic::min_raise;
use crate::state::{GamePhase, GameState, PlayerAction, PlayerId};
use std::panic::{AssertUnwindSafe, catch_unwind};
use tracing::warn;

/// 机器人做决定时能看到的信息
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionContext {
    pub hole: Vec<Card>,
    pub community: Vec<Card>,
    pub phase: GamePhase,
    pub pot: u32,
    pub current_bet: u32,
    pub player_bet: u32,
    pub to_call: u32,
    pub chips: u32,
    pub min_raise: u32,
    pub big_blind: u32,
}

impl DecisionContext {
    pub fn from_state(state: &GameState, player_id: PlayerId) -> Result<Self, BotError> {
        let hand = state
            .hand
            .as_ref()
            .ok_or_else(|| BotError::Internal("没有进行中的牌局".to_string()))?;
        let player = state
            .players
            .get(&player_id)
            .ok_or_else(|| BotError::Internal(format!("未知玩家 {}", player_id)))?;

        Ok(DecisionContext {
            hole: player.hand.clone(),
            community: hand.community_cards.clone(),
            phase: hand.phase,
            pot: hand.pot,
            current_bet: hand.current_bet,
            player_bet: player.current_bet,
            to_call: hand.current_bet.saturating_sub(player.current_bet),
            chips: player.chips,
            min_raise: min_raise(&state.config, hand.phase),
            big_blind: state.config.big_blind,
        })
    }

    pub fn can_check(&self) -> bool {
        self.to_call == 0
    }

    /// 跟注需要付出的比例：to_call / (pot + to_call)
    pub fn pot_odds(&self) -> f64 {
        if self.to_call == 0 {
            return 0.0;
        }
        self.to_call as f64 / (self.pot + self.to_call) as f64
    }

    /// 过牌或弃牌，任何情况下都合法的默认动作
    pub fn passive_action(&self) -> PlayerAction {
        if self.can_check() { PlayerAction::Check } else { PlayerAction::Fold }
    }
}

/// 机器人决策策略
pub trait DecisionPolicy: Send + Sync {
    fn decide(&self, ctx: &DecisionContext) -> Result<PlayerAction, BotError>;
}

/// 调用策略，出错或 panic 时退回到过牌/弃牌，保证牌局不会卡住
pub fn decide_or_fallback(policy: &dyn DecisionPolicy, ctx: &DecisionContext) -> PlayerAction {
    match catch_unwind(AssertUnwindSafe(|| policy.decide(ctx))) {
        Ok(Ok(action)) => action,
        Ok(Err(err)) => {
            warn!(%err, "机器人决策失败，改为过牌/弃牌");
            ctx.passive_action()
        }
        Err(_) => {
            warn!("机器人决策 panic，改为过牌/弃牌");
            ctx.passive_action()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StrengthBand {
    VeryWeak,
    Weak,
    Medium,
    Strong,
    VeryStrong,
}

impl StrengthBand {
    fn from_strength(strength: f64) -> Self {
        match strength {
            s if s >= 0.75 => StrengthBand::VeryStrong,
            s if s >= 0.5 => StrengthBand::Strong,
            s if s >= 0.3 => StrengthBand::Medium,
            s if s >= 0.15 => StrengthBand::Weak,
            _ => StrengthBand::VeryWeak,
        }
    }
}

/// 基于牌力、底池赔率和性格的启发式机器人。相同输入总是给出相同动作。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeuristicBot {
    /// 0.0 保守 ~ 1.0 激进
    pub personality: f64,
}

// 筹码少于这么多个大盲时开始被迫激进
const SHORT_STACK_BB: f64 = 20.0;

impl HeuristicBot {
    pub fn new(personality: f64) -> Self {
        HeuristicBot { personality: personality.clamp(0.0, 1.0) }
    }

    /// 当前牌力，范围 [0, 1]
    pub fn hand_strength(&self, ctx: &DecisionContext) -> Result<f64, BotError> {
        if ctx.hole.len() != 2 {
            return Err(BotError::MissingHoleCards);
        }
        if ctx.community.is_empty() {
            return Ok(preflop_strength(ctx.hole[0], ctx.hole[1]));
        }
        let mut cards = ctx.community.clone();
        cards.extend(ctx.hole.iter().copied());
        let evaluated = evaluate_hand(&cards)?;
        // strength() 在 [0.1, 1.0) 之间，每个牌型占 0.1。这里拉伸到：
        // 高牌 < 0.25，一对 < 0.5，两对 < 0.75，三条及以上封顶 1.0
        Ok(((evaluated.strength() * 10.0 - 1.0) / 4.0).clamp(0.0, 1.0))
    }

    /// 性格与短码压力的混合
    pub fn aggression(&self, ctx: &DecisionContext) -> f64 {
        let stack_bb = ctx.chips as f64 / ctx.big_blind.max(1) as f64;
        let pressure = ((SHORT_STACK_BB - stack_bb) / SHORT_STACK_BB).clamp(0.0, 1.0);
        (self.personality * 0.7 + pressure * 0.3).clamp(0.0, 1.0)
    }

    /// 在跟注额之上再加 `extra`，不足最小加注时补足；筹码不够则全下
    fn raise_by(&self, ctx: &DecisionContext, extra: u32) -> PlayerAction {
        if ctx.chips <= ctx.to_call {
            return PlayerAction::Call;
        }
        if ctx.to_call + ctx.min_raise > ctx.chips {
            return PlayerAction::Raise(ctx.chips);
        }
        let amount = ctx.to_call + extra.max(ctx.min_raise);
        PlayerAction::Raise(amount.min(ctx.chips))
    }

    fn call_or_check(&self, ctx: &DecisionContext) -> PlayerAction {
        if ctx.can_check() { PlayerAction::Check } else { PlayerAction::Call }
    }

    fn pot_fraction(ctx: &DecisionContext, fraction: f64) -> u32 {
        ((ctx.pot + ctx.to_call) as f64 * fraction).round() as u32
    }
}

impl Default for HeuristicBot {
    fn default() -> Self {
        HeuristicBot::new(0.5)
    }
}

impl DecisionPolicy for HeuristicBot {
    fn decide(&self, ctx: &DecisionContext) -> Result<PlayerAction, BotError> {
        let strength = self.hand_strength(ctx)?;
        let aggression = self.aggression(ctx);
        let pot_odds = ctx.pot_odds();

        let action = match StrengthBand::from_strength(strength) {
            StrengthBand::VeryStrong => {
                self.raise_by(ctx, Self::pot_fraction(ctx, 0.75 + 0.5 * aggression))
            }
            StrengthBand::Strong => {
                if ctx.can_check() {
                    if aggression > 0.3 {
                        self.raise_by(ctx, Self::pot_fraction(ctx, 0.5))
                    } else {
                        PlayerAction::Check
                    }
                } else if aggression > 0.7 && pot_odds < 0.3 {
                    self.raise_by(ctx, Self::pot_fraction(ctx, 0.6))
                } else if pot_odds < 0.5 {
                    PlayerAction::Call
                } else {
                    PlayerAction::Fold
                }
            }
            StrengthBand::Medium => {
                if ctx.can_check() {
                    if aggression > 0.6 {
                        self.raise_by(ctx, Self::pot_fraction(ctx, 0.33))
                    } else {
                        PlayerAction::Check
                    }
                } else if pot_odds <= strength * 0.6 + aggression * 0.1 {
                    PlayerAction::Call
                } else {
                    PlayerAction::Fold
                }
            }
            StrengthBand::Weak => {
                if ctx.can_check() || pot_odds < 0.1 + aggression * 0.1 {
                    self.call_or_check(ctx)
                } else {
                    PlayerAction::Fold
                }
            }
            StrengthBand::VeryWeak => ctx.passive_action(),
        };
        Ok(action)
    }
}

/// 翻牌前牌力：对子、同花、连张和高牌
fn preflop_strength(a: Card, b: Card) -> f64 {
    let high = a.rank.value().max(b.rank.value()) as f64;
    let low = a.rank.value().min(b.rank.value()) as f64;
    let gap = high - low;

    let mut score = if gap == 0.0 {
        // 22 = 0.5，AA = 1.0
        0.5 + (high - 2.0) / 24.0
    } else {
        (high + low - 4.0) / 48.0
    };
    if gap > 0.0 {
        if a.suit == b.suit {
            score += 0.06;
        }
        if gap == 1.0 {
            score += 0.05;
        } else if gap == 2.0 {
            score += 0.02;
        }
        if high == 14.0 {
            score += 0.08;
        }
    }
    score.clamp(0.0, 1.0)
}

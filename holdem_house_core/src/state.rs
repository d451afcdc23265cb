use crate::card::{Card, Deck};
use crate::config::TableConfig;
use crate::error::EngineError;
use crate::eval::EvaluatedHand;
use crate::message::{PlayerView, TableSnapshot};
use crate::pot::PotManager;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

pub type RoomId = Uuid;
pub type PlayerId = Uuid;

/// 房间内唯一的可变状态单元：玩家、座位顺序以及当前这一局。
/// 同一时刻只能有一个操作修改它 (由上层的房间 actor 保证串行)。
#[derive(Debug, Clone)]
pub struct GameState {
    pub room_id: RoomId,
    pub config: TableConfig,
    pub players: HashMap<PlayerId, Player>,  // 可以根据player id查找player
    // 轮换的、包含所有就座玩家的列表。每局开始时轮换，轮换后第一个有筹码的玩家是庄家。
    pub seated_players: VecDeque<PlayerId>,
    pub hand: Option<HandState>,
    pub hands_played: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub chips: u32,  // 剩余筹码
    pub hand: Vec<Card>,  // 底牌，一局中恰好 2 张
    pub current_bet: u32,  // 本轮已下注，每条街清零
    pub has_folded: bool,
    pub is_all_in: bool,
    pub has_acted: bool,  // 本轮是否已行动
    pub kind: SeatKind,
}

/// 座位由人类还是机器人控制。机器人的决策能力由房间另外持有 (见 `DecisionPolicy`)。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum SeatKind {
    Human,
    Bot { personality: f64 },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum GamePhase {
    WaitingForPlayers,
    PreFlop,
    Flop,
    Turn,
    River,
    Showdown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PlayerAction {
    Fold,      // 弃牌
    Check,     // 过牌
    Call,      // 跟注
    Raise(u32), // 加注，金额是在自己当前下注之上再投入的筹码
}

/// 动作的来源。机器人的非法加注会被降级为跟注，人类的非法操作直接拒绝。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOrigin {
    Human,
    Automated,
}

/// 单局状态，每局开始时新建，摊牌结算后保留到下一局开始供展示。
#[derive(Debug, Clone)]
pub struct HandState {
    pub hand_number: u64,
    pub phase: GamePhase,
    pub community_cards: Vec<Card>,
    pub pot: u32,  // 展示用的总额，结算以 pots 为准
    pub current_bet: u32,  // 本轮需要跟到的最高下注
    // 本局发牌的玩家 (开局时有筹码)，按座位顺序，庄家在第 0 位
    pub order: Vec<PlayerId>,
    pub dealer_id: PlayerId,
    pub small_blind_id: PlayerId,
    pub big_blind_id: PlayerId,
    pub current_player: Option<PlayerId>,
    pub winners: Vec<Winner>,
    /// 每成功执行一个动作加一。延迟任务用它判断自己是否已经过期。
    pub action_seq: u64,
    /// 开局时桌上所有筹码，用于守恒检查
    pub starting_chips: u64,
    pub deck: Deck,
    pub pots: PotManager,
    pub settled: bool,
    pub revealed: bool,  // 是否真正摊牌 (无人跟注获胜时不亮牌)
}

/// 摊牌结果中的一个赢家，金额为其在所有底池中赢得的总和
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Winner {
    pub player_id: PlayerId,
    pub name: String,
    pub hand: Option<EvaluatedHand>,
    pub amount: u32,
}

/// 一个动作被接受后的结果
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    pub player_id: PlayerId,
    /// 实际执行的动作 (机器人的非法加注可能已被降级)
    pub action: PlayerAction,
    pub phase: GamePhase,
    pub street_changed: bool,
    pub hand_over: bool,
    pub next_player: Option<PlayerId>,
}

/// "活跃子集" (未弃牌且有筹码的玩家) 的派生视图。
/// 庄家、盲注和行动者都以稳定的玩家 id 保存，需要索引时从这里换算。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveView {
    pub seats: Vec<PlayerId>,
}

impl ActiveView {
    pub fn index_of(&self, player_id: &PlayerId) -> Option<usize> {
        self.seats.iter().position(|id| id == player_id)
    }
}

// --- Player 的实现方法 ---

impl Player {
    pub fn new(name: impl Into<String>, chips: u32, kind: SeatKind) -> Self {
        Player {
            id: Uuid::new_v4(),
            name: name.into(),
            chips,
            hand: Vec::new(),
            current_bet: 0,
            has_folded: false,
            is_all_in: false,
            has_acted: false,
            kind,
        }
    }

    pub fn is_bot(&self) -> bool {
        matches!(self.kind, SeatKind::Bot { .. })
    }

    /// 还能继续下注：未弃牌且有筹码
    pub fn can_bet(&self) -> bool {
        !self.has_folded && self.chips > 0
    }

    pub(crate) fn reset_for_hand(&mut self) {
        self.hand.clear();
        self.current_bet = 0;
        self.has_folded = false;
        self.is_all_in = false;
        self.has_acted = false;
    }

    /// 从筹码中投入最多 `amount`，返回实际投入的数量
    pub(crate) fn commit(&mut self, amount: u32) -> u32 {
        let paid = amount.min(self.chips);
        self.chips -= paid;
        self.current_bet += paid;
        if self.chips == 0 {
            self.is_all_in = true;
        }
        paid
    }
}

// --- GameState 的实现方法 ---

impl GameState {
    pub fn new(room_id: RoomId, config: TableConfig) -> Self {
        GameState {
            room_id,
            config,
            players: HashMap::new(),
            seated_players: VecDeque::new(),
            hand: None,
            hands_played: 0,
        }
    }

    /// 以配置的初始筹码入座
    pub fn seat_player(&mut self, name: impl Into<String>, kind: SeatKind) -> Result<PlayerId, EngineError> {
        let player = Player::new(name, self.config.starting_stack, kind);
        self.seat(player)
    }

    pub fn seat(&mut self, player: Player) -> Result<PlayerId, EngineError> {
        if self.seated_players.len() >= self.config.max_seats {
            return Err(EngineError::TableFull);
        }
        let id = player.id;
        self.players.insert(id, player);
        self.seated_players.push_back(id);
        Ok(id)
    }

    /// 离座。进行中的牌局里发了牌的玩家 (即使已弃牌，下注可能还没收进底池) 要等本局结束。
    pub fn remove_player(&mut self, player_id: &PlayerId) -> Result<Player, EngineError> {
        if !self.players.contains_key(player_id) {
            return Err(EngineError::UnknownPlayer(*player_id));
        }
        let dealt_in = self.is_hand_in_progress() && self.hand.as_ref().is_some_and(|h| h.order.contains(player_id));
        if dealt_in {
            return Err(EngineError::HandInProgress);
        }
        self.seated_players.retain(|id| id != player_id);
        self.players.remove(player_id).ok_or(EngineError::UnknownPlayer(*player_id))
    }

    /// 获取当前行动的玩家ID (如果存在)
    pub fn current_player_id(&self) -> Option<PlayerId> {
        self.hand.as_ref().and_then(|h| h.current_player)
    }

    pub fn phase(&self) -> GamePhase {
        self.hand.as_ref().map_or(GamePhase::WaitingForPlayers, |h| h.phase)
    }

    pub fn is_hand_in_progress(&self) -> bool {
        self.hand.as_ref().is_some_and(|h| h.phase != GamePhase::Showdown)
    }

    pub fn active_view(&self) -> ActiveView {
        let candidates: Vec<PlayerId> = match &self.hand {
            Some(h) => h.order.clone(),
            None => self.seated_players.iter().copied().collect(),
        };
        ActiveView {
            seats: candidates
                .into_iter()
                .filter(|id| self.players.get(id).is_some_and(|p| p.can_bet()))
                .collect(),
        }
    }

    /// 桌上筹码总量：玩家筹码 + 本轮下注 + 所有底池。一局之内应保持不变。
    pub fn chips_in_play(&self) -> u64 {
        let on_players: u64 = self
            .players
            .values()
            .map(|p| p.chips as u64 + p.current_bet as u64)
            .sum();
        let in_pots = self.hand.as_ref().map_or(0, |h| h.pots.total() as u64);
        on_players + in_pots
    }

    /// 给某个客户端看的快照：除了自己的底牌，只有真正摊牌时才公开未弃牌玩家的底牌。
    pub fn snapshot(&self, viewer: Option<PlayerId>) -> TableSnapshot {
        let hand = self.hand.as_ref();
        let revealed = hand.is_some_and(|h| h.revealed);
        let view = self.active_view();

        let players = self
            .seated_players
            .iter()
            .filter_map(|id| self.players.get(id))
            .map(|p| {
                let dealt_in = hand.is_some_and(|h| h.order.contains(&p.id));
                let show = Some(p.id) == viewer || (revealed && dealt_in && !p.has_folded);
                PlayerView {
                    id: p.id,
                    name: p.name.clone(),
                    chips: p.chips,
                    current_bet: p.current_bet,
                    folded: p.has_folded,
                    all_in: p.is_all_in,
                    acted: p.has_acted,
                    is_bot: p.is_bot(),
                    cards: if show && !p.hand.is_empty() { Some(p.hand.clone()) } else { None },
                }
            })
            .collect();

        TableSnapshot {
            room_id: self.room_id,
            hand_number: hand.map_or(0, |h| h.hand_number),
            phase: self.phase(),
            players,
            community_cards: hand.map(|h| h.community_cards.clone()).unwrap_or_default(),
            pot: hand.map_or(0, |h| h.pot),
            pots: hand.map(|h| h.pots.amounts()).unwrap_or_default(),
            current_bet: hand.map_or(0, |h| h.current_bet),
            current_player: hand.and_then(|h| h.current_player),
            dealer: hand.map(|h| h.dealer_id),
            small_blind: hand.map(|h| h.small_blind_id),
            big_blind: hand.map(|h| h.big_blind_id),
            current_player_index: hand.and_then(|h| h.current_player).and_then(|id| view.index_of(&id)),
            dealer_index: hand.and_then(|h| view.index_of(&h.dealer_id)),
            small_blind_index: hand.and_then(|h| view.index_of(&h.small_blind_id)),
            big_blind_index: hand.and_then(|h| view.index_of(&h.big_blind_id)),
            winners: hand.map(|h| h.winners.clone()).unwrap_or_default(),
        }
    }
}

use crate::card::Card;
use crate::state::{GamePhase, PlayerAction, PlayerId, RoomId, Winner};
use serde::{Deserialize, Serialize};

// --- 客户端 -> 服务器 的消息 ---
// 这些是客户端可以发送给服务器的指令或动作。

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ClientMessage {
    // --- 房间管理消息 ---
    /// 客户端请求创建一个新房间，创建者成为房主
    CreateRoom { nickname: String },
    /// 客户端请求加入一个已存在的房间
    JoinRoom { room_id: RoomId, nickname: String },
    /// 房主添加一个机器人座位，personality 越大越激进 (0.0 ~ 1.0)
    AddBot { name: String, personality: f64 },
    /// 离开房间。牌局进行中会先弃牌，本局结束后离座
    LeaveRoom,

    // --- 游戏内消息 ---
    /// 房主请求开始新的一局游戏
    StartHand,
    /// 玩家在轮到自己时执行的游戏动作
    PerformAction(PlayerAction),
    /// 请求一份当前牌桌快照
    GetSnapshot,
}

// --- 服务器 -> 客户端 的消息 ---
// 这些是服务器在游戏状态改变后，发送给客户端的事件通知。

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ServerMessage {
    // --- 房间管理消息 ---
    /// 成功加入或创建房间后，服务器私密地发给该玩家
    RoomJoined {
        your_id: PlayerId,
        host_id: PlayerId,
        snapshot: TableSnapshot, // 只包含自己底牌的快照
    },
    /// 一个新玩家 (或机器人) 入座
    PlayerJoined { player_id: PlayerId, name: String, is_bot: bool },
    /// 一个玩家离开了房间
    PlayerLeft { player_id: PlayerId },

    // --- 游戏状态更新消息 ---
    /// 牌桌快照，为每个接收者单独生成
    Snapshot(TableSnapshot),

    /// 玩家执行了一个动作
    PlayerActed {
        player_id: PlayerId,
        /// 实际执行的动作 (机器人的非法加注已降级为跟注)
        action: PlayerAction,
        /// 是否由超时自动执行
        timed_out: bool,
    },

    /// 轮到下一个玩家行动
    NextToAct {
        player_id: PlayerId,
        valid_actions: Vec<PlayerActionType>,
        /// 人类玩家的剩余思考时间
        timeout_ms: Option<u64>,
    },

    /// 本局结束，公布结果
    HandFinished { hand_number: u64, winners: Vec<Winner> },

    /// 服务器向特定客户端发送提示或错误信息
    Info { message: String },
    Error { message: String },
}

// 用于告知客户端当前合法的动作类型，简化客户端UI逻辑
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerActionType {
    Fold,
    Check,
    Call(u32),                      // 需要跟注的金额 (筹码不足时为剩余筹码)
    Raise { min: u32, max: u32 },  // 在自己当前下注之上再投入的范围
}

/// 展示层看到的一个座位
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PlayerView {
    pub id: PlayerId,
    pub name: String,
    pub chips: u32,
    pub current_bet: u32,
    pub folded: bool,
    pub all_in: bool,
    pub acted: bool,
    pub is_bot: bool,
    /// 只对本人或摊牌时未弃牌的玩家公开
    pub cards: Option<Vec<Card>>,
}

/// 牌桌的只读快照，由 `GameState::snapshot` 针对某个观看者生成
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TableSnapshot {
    pub room_id: RoomId,
    pub hand_number: u64,
    pub phase: GamePhase,
    pub players: Vec<PlayerView>,
    pub community_cards: Vec<Card>,
    pub pot: u32,
    /// 主池在前，之后是各个边池
    pub pots: Vec<u32>,
    pub current_bet: u32,
    pub current_player: Option<PlayerId>,
    pub dealer: Option<PlayerId>,
    pub small_blind: Option<PlayerId>,
    pub big_blind: Option<PlayerId>,
    // 在活跃子集 (未弃牌且有筹码的玩家) 中的下标
    pub current_player_index: Option<usize>,
    pub dealer_index: Option<usize>,
    pub small_blind_index: Option<usize>,
    pub big_blind_index: Option<usize>,
    pub winners: Vec<Winner>,
}

impl From<PlayerAction> for ClientMessage {
    fn from(action: PlayerAction) -> Self {
        ClientMessage::PerformAction(action)
    }
}

//! 房间 actor
//!
//! 每个房间是一个独立的 tokio 任务，独占自己的 `GameState`。
//! 客户端命令从 mpsc 收件箱进入，行动超时、机器人思考和下一局开始
//! 共用一个待执行任务 (`pending`)，所以同一时刻只有一个操作在修改房间。

use holdem_house_core::{
    ActionOrigin, DecisionContext, DecisionPolicy, EngineError, GameState, HeuristicBot, PlayerAction,
    PlayerId, Rejection, RoomId, SeatKind, ServerMessage, TableConfig, decide_or_fallback,
};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

const INBOX_CAPACITY: usize = 64;
/// 每个连接的发送队列长度，满了之后丢弃消息而不是阻塞房间
pub const OUTBOX_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    #[error("房间已关闭")]
    Closed,

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// 发给房间 actor 的命令
#[derive(Debug)]
pub enum RoomCommand {
    Join {
        nickname: String,
        outbox: mpsc::Sender<ServerMessage>,
        reply: oneshot::Sender<Result<PlayerId, EngineError>>,
    },
    AddBot { requester: PlayerId, name: String, personality: f64 },
    StartHand { requester: PlayerId },
    Action { player_id: PlayerId, action: PlayerAction },
    Snapshot { player_id: PlayerId },
    Leave { player_id: PlayerId },
    Close,
}

/// 房间的发送端，可以随意克隆
#[derive(Debug, Clone)]
pub struct RoomHandle {
    room_id: RoomId,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    pub async fn send(&self, command: RoomCommand) -> Result<(), RoomError> {
        self.sender.send(command).await.map_err(|_| RoomError::Closed)
    }

    /// 非阻塞发送，用在同步的清理路径上
    pub fn try_send(&self, command: RoomCommand) -> Result<(), RoomError> {
        self.sender.try_send(command).map_err(|_| RoomError::Closed)
    }

    /// 入座，成功后房间会通过 `outbox` 推送 `RoomJoined` 以及之后的所有事件
    pub async fn join(&self, nickname: String, outbox: mpsc::Sender<ServerMessage>) -> Result<PlayerId, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomCommand::Join { nickname, outbox, reply }).await?;
        Ok(rx.await.map_err(|_| RoomError::Closed)??)
    }
}

/// 延迟任务的有效性凭证：只有当牌局仍停在布置任务时的那一步才执行
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Token {
    hand_number: u64,
    action_seq: u64,
    player_id: Option<PlayerId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScheduledKind {
    TurnTimeout,
    BotMove,
    NextHand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Scheduled {
    kind: ScheduledKind,
    deadline: Instant,
    token: Token,
}

pub struct RoomActor {
    state: GameState,
    host: Option<PlayerId>,
    inbox: mpsc::Receiver<RoomCommand>,
    subscribers: HashMap<PlayerId, mpsc::Sender<ServerMessage>>,
    policies: HashMap<PlayerId, Box<dyn DecisionPolicy>>,
    pending: Option<Scheduled>,
    // 牌局中途离开的玩家，轮到他们时自动弃牌，本局结束后离座
    leaving: HashSet<PlayerId>,
    // 房主开过第一局之后自动连续发牌
    auto_deal: bool,
    announced_hand: u64,
    closed: bool,
}

impl RoomActor {
    pub fn new(room_id: RoomId, config: TableConfig) -> (RoomActor, RoomHandle) {
        let (sender, inbox) = mpsc::channel(INBOX_CAPACITY);
        let actor = RoomActor {
            state: GameState::new(room_id, config),
            host: None,
            inbox,
            subscribers: HashMap::new(),
            policies: HashMap::new(),
            pending: None,
            leaving: HashSet::new(),
            auto_deal: false,
            announced_hand: 0,
            closed: false,
        };
        (actor, RoomHandle { room_id, sender })
    }

    pub async fn run(mut self) {
        info!(room = %self.state.room_id, "房间开始运行");
        loop {
            let deadline = self.pending.map(|p| p.deadline);
            tokio::select! {
                command = self.inbox.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                _ = wait_until(deadline) => {
                    if let Some(scheduled) = self.pending.take() {
                        self.fire(scheduled);
                    }
                }
            }
            if self.closed {
                break;
            }
        }
        info!(room = %self.state.room_id, "房间已关闭");
    }

    fn handle_command(&mut self, command: RoomCommand) {
        match command {
            RoomCommand::Join { nickname, outbox, reply } => {
                let result = self.handle_join(nickname, outbox);
                let _ = reply.send(result);
            }
            RoomCommand::AddBot { requester, name, personality } => self.handle_add_bot(requester, name, personality),
            RoomCommand::StartHand { requester } => self.handle_start(requester),
            RoomCommand::Action { player_id, action } => {
                match self.apply(player_id, action, ActionOrigin::Human, false) {
                    Ok(()) => self.after_change(),
                    Err(err) => self.reject(player_id, err),
                }
            }
            RoomCommand::Snapshot { player_id } => {
                let snapshot = self.state.snapshot(Some(player_id));
                self.send_to(&player_id, ServerMessage::Snapshot(snapshot));
            }
            RoomCommand::Leave { player_id } => self.handle_leave(player_id),
            RoomCommand::Close => self.closed = true,
        }
    }

    fn handle_join(&mut self, nickname: String, outbox: mpsc::Sender<ServerMessage>) -> Result<PlayerId, EngineError> {
        let player_id = self.state.seat_player(nickname.clone(), SeatKind::Human)?;
        let host_id = *self.host.get_or_insert(player_id);
        info!(room = %self.state.room_id, player = %player_id, "玩家 {} 加入了房间", nickname);

        self.subscribers.insert(player_id, outbox);
        self.send_to(
            &player_id,
            ServerMessage::RoomJoined { your_id: player_id, host_id, snapshot: self.state.snapshot(Some(player_id)) },
        );
        self.broadcast(ServerMessage::PlayerJoined { player_id, name: nickname, is_bot: false });
        Ok(player_id)
    }

    fn handle_add_bot(&mut self, requester: PlayerId, name: String, personality: f64) {
        if self.host != Some(requester) {
            self.send_error(&requester, "只有房主可以添加机器人");
            return;
        }
        let bot = HeuristicBot::new(personality);
        match self.state.seat_player(name.clone(), SeatKind::Bot { personality: bot.personality }) {
            Ok(player_id) => {
                self.policies.insert(player_id, Box::new(bot));
                info!(room = %self.state.room_id, player = %player_id, "添加机器人 {}", name);
                self.broadcast(ServerMessage::PlayerJoined { player_id, name, is_bot: true });
                self.broadcast_snapshots();
            }
            Err(err) => self.send_error(&requester, &err.to_string()),
        }
    }

    fn handle_start(&mut self, requester: PlayerId) {
        if self.host != Some(requester) {
            self.send_error(&requester, "只有房主可以开始游戏");
            return;
        }
        match self.state.start_new_hand() {
            Ok(()) => {
                self.auto_deal = true;
                self.after_change();
            }
            Err(err) => self.send_error(&requester, &err.to_string()),
        }
    }

    /// 连接断开时订阅可能已经被 `send_to` 移除，是否在座以牌桌为准
    fn handle_leave(&mut self, player_id: PlayerId) {
        if !self.state.players.contains_key(&player_id) || self.leaving.contains(&player_id) {
            return;
        }
        self.subscribers.remove(&player_id);
        info!(room = %self.state.room_id, player = %player_id, "玩家离开房间");
        match self.state.remove_player(&player_id) {
            Ok(_) => self.broadcast(ServerMessage::PlayerLeft { player_id }),
            Err(_) => {
                self.leaving.insert(player_id);
            }
        }
        self.transfer_host(player_id);
        self.after_change();
    }

    fn transfer_host(&mut self, leaving: PlayerId) {
        if self.host != Some(leaving) {
            return;
        }
        self.host = self.subscribers.keys().next().copied();
        match self.host {
            Some(new_host) => {
                let name = self.state.players.get(&new_host).map_or("未知玩家", |p| p.name.as_str());
                let message = format!("房主已离开，新房主是 {}", name);
                info!(room = %self.state.room_id, host = %new_host, "房主已转移");
                self.broadcast(ServerMessage::Info { message });
            }
            None => {
                // 没有真人玩家了
                self.closed = true;
            }
        }
    }

    /// 执行一个动作并通知所有人，不做后续调度
    fn apply(&mut self, player_id: PlayerId, action: PlayerAction, origin: ActionOrigin, timed_out: bool) -> Result<(), EngineError> {
        let outcome = self.state.handle_player_action(player_id, action, origin)?;
        debug!(room = %self.state.room_id, player = %player_id, action = ?outcome.action, timed_out, "玩家行动");
        self.broadcast(ServerMessage::PlayerActed { player_id, action: outcome.action, timed_out });
        Ok(())
    }

    fn reject(&mut self, player_id: PlayerId, err: EngineError) {
        debug!(room = %self.state.room_id, player = %player_id, %err, "拒绝玩家动作");
        // 越权的提交静默忽略
        if err.kind() != Rejection::OutOfTurn {
            self.send_error(&player_id, &err.to_string());
        }
    }

    /// 每次状态变化之后：处理离开的玩家、通知结果、重新布置唯一的延迟任务
    fn after_change(&mut self) {
        while let Some(current) = self.state.current_player_id() {
            if !self.leaving.contains(&current) || self.apply(current, PlayerAction::Fold, ActionOrigin::Automated, false).is_err() {
                break;
            }
        }
        let previous = self.pending.take();
        self.broadcast_snapshots();

        if self.state.is_hand_in_progress() {
            self.schedule_turn(previous);
        } else if let Some(hand) = self.state.hand.as_ref() {
            let hand_number = hand.hand_number;
            if self.announced_hand != hand_number {
                self.announced_hand = hand_number;
                let winners = hand.winners.clone();
                info!(room = %self.state.room_id, hand = hand_number, winners = winners.len(), "本局结束");
                self.broadcast(ServerMessage::HandFinished { hand_number, winners });
                self.remove_leavers();
            }
            if self.auto_deal && !self.keep_if_unchanged(previous, ScheduledKind::NextHand, None) {
                self.schedule(ScheduledKind::NextHand, self.state.config.next_hand_delay(), None);
            }
        }
    }

    fn schedule_turn(&mut self, previous: Option<Scheduled>) {
        let Some(current) = self.state.current_player_id() else {
            return;
        };
        let is_bot = self.state.players.get(&current).is_some_and(|p| p.is_bot());
        let kind = if is_bot { ScheduledKind::BotMove } else { ScheduledKind::TurnTimeout };
        if self.keep_if_unchanged(previous, kind, Some(current)) {
            return;
        }
        let valid_actions = self.state.legal_actions(&current);
        if is_bot {
            self.broadcast(ServerMessage::NextToAct { player_id: current, valid_actions, timeout_ms: None });
            self.schedule(ScheduledKind::BotMove, self.state.config.bot_delay(), Some(current));
        } else {
            let timeout_ms = Some(self.state.config.turn_timeout_ms);
            self.broadcast(ServerMessage::NextToAct { player_id: current, valid_actions, timeout_ms });
            self.schedule(ScheduledKind::TurnTimeout, self.state.config.turn_timeout(), Some(current));
        }
    }

    /// 牌局还停在同一步时保留原来的任务，截止时间不重新计算
    fn keep_if_unchanged(&mut self, previous: Option<Scheduled>, kind: ScheduledKind, player_id: Option<PlayerId>) -> bool {
        let token = self.token(player_id);
        match previous {
            Some(scheduled) if scheduled.kind == kind && scheduled.token == token => {
                self.pending = Some(scheduled);
                true
            }
            _ => false,
        }
    }

    fn schedule(&mut self, kind: ScheduledKind, delay: std::time::Duration, player_id: Option<PlayerId>) {
        self.pending = Some(Scheduled { kind, deadline: Instant::now() + delay, token: self.token(player_id) });
    }

    fn token(&self, player_id: Option<PlayerId>) -> Token {
        let hand = self.state.hand.as_ref();
        Token {
            hand_number: hand.map_or(0, |h| h.hand_number),
            action_seq: hand.map_or(0, |h| h.action_seq),
            player_id,
        }
    }

    /// 到期的任务先核对凭证，牌局已经往前走了就丢弃
    fn fire(&mut self, scheduled: Scheduled) {
        let expected = match scheduled.kind {
            ScheduledKind::NextHand => self.token(None),
            _ => self.token(self.state.current_player_id()),
        };
        if scheduled.token != expected {
            debug!(room = %self.state.room_id, kind = ?scheduled.kind, "丢弃过期的延迟任务");
            return;
        }

        match scheduled.kind {
            ScheduledKind::TurnTimeout => {
                let Some(player_id) = scheduled.token.player_id else {
                    return;
                };
                let action = self.state.passive_action(&player_id);
                info!(room = %self.state.room_id, player = %player_id, ?action, "行动超时");
                if let Err(err) = self.apply(player_id, action, ActionOrigin::Automated, true) {
                    warn!(room = %self.state.room_id, %err, "超时动作执行失败");
                }
            }
            ScheduledKind::BotMove => {
                let Some(player_id) = scheduled.token.player_id else {
                    return;
                };
                let action = self.bot_action(player_id);
                if let Err(err) = self.apply(player_id, action, ActionOrigin::Automated, false) {
                    warn!(room = %self.state.room_id, %err, "机器人动作执行失败，改为过牌或弃牌");
                    let fallback = self.state.passive_action(&player_id);
                    if let Err(err) = self.apply(player_id, fallback, ActionOrigin::Automated, false) {
                        warn!(room = %self.state.room_id, player = %player_id, %err, "默认动作执行失败");
                    }
                }
            }
            ScheduledKind::NextHand => {
                if self.state.is_hand_in_progress() {
                    return;
                }
                if let Err(err) = self.state.start_new_hand() {
                    info!(room = %self.state.room_id, %err, "无法开始下一局，停止自动发牌");
                    self.auto_deal = false;
                    self.broadcast(ServerMessage::Info { message: err.to_string() });
                    return;
                }
            }
        }
        self.after_change();
    }

    fn bot_action(&self, player_id: PlayerId) -> PlayerAction {
        let ctx = match DecisionContext::from_state(&self.state, player_id) {
            Ok(ctx) => ctx,
            Err(err) => {
                warn!(room = %self.state.room_id, %err, "无法构造机器人决策上下文");
                return self.state.passive_action(&player_id);
            }
        };
        match self.policies.get(&player_id) {
            Some(policy) => decide_or_fallback(policy.as_ref(), &ctx),
            None => decide_or_fallback(&HeuristicBot::default(), &ctx),
        }
    }

    fn remove_leavers(&mut self) {
        for player_id in std::mem::take(&mut self.leaving) {
            if self.state.remove_player(&player_id).is_ok() {
                self.broadcast(ServerMessage::PlayerLeft { player_id });
            }
        }
        // 没有真人玩家时，机器人也一起离开
        if self.subscribers.is_empty() {
            self.closed = true;
        }
    }

    // --- 消息发送 ---

    fn send_to(&mut self, player_id: &PlayerId, message: ServerMessage) {
        let closed = match self.subscribers.get(player_id) {
            Some(outbox) => match outbox.try_send(message) {
                Ok(()) => false,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(player = %player_id, "发送队列已满，丢弃一条消息");
                    false
                }
                Err(mpsc::error::TrySendError::Closed(_)) => true,
            },
            None => false,
        };
        if closed {
            debug!(player = %player_id, "连接已断开");
            self.subscribers.remove(player_id);
            // 房主的连接断开后立即移交，不等 Leave
            self.transfer_host(*player_id);
        }
    }

    fn send_error(&mut self, player_id: &PlayerId, message: &str) {
        self.send_to(player_id, ServerMessage::Error { message: message.to_string() });
    }

    fn broadcast(&mut self, message: ServerMessage) {
        let ids: Vec<PlayerId> = self.subscribers.keys().copied().collect();
        for id in ids {
            self.send_to(&id, message.clone());
        }
    }

    /// 快照需要为每个玩家单独生成
    fn broadcast_snapshots(&mut self) {
        let ids: Vec<PlayerId> = self.subscribers.keys().copied().collect();
        for id in ids {
            let snapshot = self.state.snapshot(Some(id));
            self.send_to(&id, ServerMessage::Snapshot(snapshot));
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

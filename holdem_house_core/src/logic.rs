use crate::card::Deck;
use crate::config::TableConfig;
use crate::error::EngineError;
use crate::eval::evaluate_hand;
use crate::message::PlayerActionType;
use crate::pot::PotManager;
use crate::state::*;
use rand::Rng;
use std::collections::HashMap;
use tracing::debug;

/// 一局至少要发出的牌：每人 2 张底牌 + 5 张公共牌
fn cards_needed(players: usize) -> usize {
    players * 2 + 5
}

// --- 核心游戏流程函数 ---

impl GameState {
    /// 开始新的一局游戏，使用线程随机数洗牌
    pub fn start_new_hand(&mut self) -> Result<(), EngineError> {
        let mut rng = rand::rng();
        self.start_new_hand_with_rng(&mut rng)
    }

    pub fn start_new_hand_with_rng<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<(), EngineError> {
        self.start_new_hand_with_deck(Deck::shuffled(rng))
    }

    /// 用给定的牌堆开始新的一局
    ///
    /// - 轮换庄家，本局只包含有筹码的玩家。
    /// - 重置玩家的单局状态，发底牌。
    /// - 下大小盲注 (筹码不足时全下)。两人对局时庄家下小盲。
    /// - 设置 PreFlop 阶段，由大盲之后的玩家先行动。
    ///
    /// 有筹码的玩家少于 2 人时返回错误，状态不变。
    pub fn start_new_hand_with_deck(&mut self, mut deck: Deck) -> Result<(), EngineError> {
        if self.is_hand_in_progress() {
            return Err(EngineError::HandInProgress);
        }
        let funded = self
            .seated_players
            .iter()
            .filter(|id| self.players.get(*id).is_some_and(|p| p.chips > 0))
            .count();
        if funded < 2 {
            return Err(EngineError::NotEnoughPlayers);
        }
        if deck.len() < cards_needed(funded) {
            return Err(EngineError::DeckExhausted);
        }

        // 轮换庄家位置
        self.seated_players.rotate_left(1);
        let order: Vec<PlayerId> = self
            .seated_players
            .iter()
            .filter(|id| self.players.get(*id).is_some_and(|p| p.chips > 0))
            .copied()
            .collect();

        self.players.values_mut().for_each(Player::reset_for_hand);
        let starting_chips: u64 = self.players.values().map(|p| p.chips as u64).sum();

        for id in &order {
            let cards = deck.deal_cards(2)?;
            if let Some(player) = self.players.get_mut(id) {
                player.hand = cards;
            }
        }

        let n = order.len();
        let (sb_idx, bb_idx) = if n == 2 { (0, 1) } else { (1, 2 % n) };
        let (sb_id, bb_id) = (order[sb_idx], order[bb_idx]);

        let mut posted = 0;
        if let Some(p) = self.players.get_mut(&sb_id) {
            posted += p.commit(self.config.small_blind);
        }
        if let Some(p) = self.players.get_mut(&bb_id) {
            posted += p.commit(self.config.big_blind);
        }

        self.hands_played += 1;
        self.hand = Some(HandState {
            hand_number: self.hands_played,
            phase: GamePhase::PreFlop,
            community_cards: Vec::with_capacity(5),
            pot: posted,
            current_bet: self.config.big_blind,
            dealer_id: order[0],
            small_blind_id: sb_id,
            big_blind_id: bb_id,
            order,
            current_player: None,
            winners: Vec::new(),
            action_seq: 0,
            starting_chips,
            deck,
            pots: PotManager::new(),
            settled: false,
            revealed: false,
        });
        debug!(room = %self.room_id, hand = self.hands_played, players = n, "新的一局开始");

        let mut ctx = self.ctx()?;
        ctx.progress(bb_id)?;
        ctx.refresh_pot();
        Ok(())
    }

    /// 处理单个玩家的动作
    ///
    /// 验证合法性后更新状态，然后检查本轮下注是否结束：
    /// 结束则收池并推进到下一阶段，否则把行动权交给下一位玩家。
    /// 被拒绝的动作不会修改任何状态。
    pub fn handle_player_action(
        &mut self,
        player_id: PlayerId,
        action: PlayerAction,
        origin: ActionOrigin,
    ) -> Result<ActionOutcome, EngineError> {
        let mut ctx = self.ctx()?;
        if ctx.hand.phase == GamePhase::Showdown {
            return Err(EngineError::HandFinished);
        }
        if !ctx.players.contains_key(&player_id) {
            return Err(EngineError::UnknownPlayer(player_id));
        }
        if ctx.hand.current_player != Some(player_id) {
            return Err(EngineError::NotPlayersTurn(player_id));
        }

        let action = ctx.validate(player_id, action, origin)?;
        let phase_before = ctx.hand.phase;
        ctx.apply(player_id, action);
        ctx.hand.action_seq += 1;
        ctx.progress(player_id)?;
        ctx.refresh_pot();

        Ok(ActionOutcome {
            player_id,
            action,
            phase: ctx.hand.phase,
            street_changed: ctx.hand.phase != phase_before,
            hand_over: ctx.hand.phase == GamePhase::Showdown,
            next_player: ctx.hand.current_player,
        })
    }

    /// 摊牌结算的结果。已经结算过的牌局直接返回记录的赢家，不会重复派彩；
    /// 还在下注中的牌局不能提前结算。
    pub fn settle_showdown(&mut self) -> Result<Vec<Winner>, EngineError> {
        let mut ctx = self.ctx()?;
        if !ctx.hand.settled {
            return Err(EngineError::HandInProgress);
        }
        ctx.showdown()?;
        Ok(ctx.hand.winners.clone())
    }

    /// 超时或机器人出错时的默认动作：能过牌就过牌，否则弃牌
    pub fn passive_action(&self, player_id: &PlayerId) -> PlayerAction {
        if self.legal_actions(player_id).contains(&PlayerActionType::Check) {
            PlayerAction::Check
        } else {
            PlayerAction::Fold
        }
    }

    /// 当前行动者可以执行的动作，加注金额是在自己当前下注之上再投入的筹码
    pub fn legal_actions(&self, player_id: &PlayerId) -> Vec<PlayerActionType> {
        let Some(hand) = self.hand.as_ref() else {
            return Vec::new();
        };
        if hand.current_player != Some(*player_id) {
            return Vec::new();
        }
        let Some(player) = self.players.get(player_id) else {
            return Vec::new();
        };

        let to_call = hand.current_bet.saturating_sub(player.current_bet);
        let mut actions = vec![PlayerActionType::Fold];
        if to_call == 0 {
            actions.push(PlayerActionType::Check);
        } else {
            actions.push(PlayerActionType::Call(to_call.min(player.chips)));
        }
        if player.chips > to_call {
            let min = (to_call + min_raise(&self.config, hand.phase)).min(player.chips);
            actions.push(PlayerActionType::Raise { min, max: player.chips });
        }
        actions
    }

    fn ctx(&mut self) -> Result<HandCtx<'_>, EngineError> {
        let hand = self.hand.as_mut().ok_or(EngineError::NoActiveHand)?;
        Ok(HandCtx {
            hand,
            players: &mut self.players,
            config: &self.config,
        })
    }
}

pub(crate) fn min_raise(config: &TableConfig, phase: GamePhase) -> u32 {
    if phase == GamePhase::PreFlop {
        config.min_raise_preflop
    } else {
        config.min_raise_postflop
    }
}

/// 同时借用当前一局和玩家表
struct HandCtx<'a> {
    hand: &'a mut HandState,
    players: &'a mut HashMap<PlayerId, Player>,
    config: &'a TableConfig,
}

impl HandCtx<'_> {
    fn player(&self, id: &PlayerId) -> Option<&Player> {
        self.players.get(id)
    }

    fn is_live(&self, id: &PlayerId) -> bool {
        self.player(id).is_some_and(|p| !p.has_folded)
    }

    fn can_bet(&self, id: &PlayerId) -> bool {
        self.player(id).is_some_and(Player::can_bet)
    }

    fn live_players(&self) -> Vec<PlayerId> {
        self.hand.order.iter().filter(|id| self.is_live(id)).copied().collect()
    }

    /// 未弃牌的玩家，从庄家左手第一位开始的座位顺序
    fn live_from_dealer_left(&self) -> Vec<PlayerId> {
        let n = self.hand.order.len();
        (1..=n)
            .map(|step| self.hand.order[step % n])
            .filter(|id| self.is_live(id))
            .collect()
    }

    /// `after` 之后 (按座位顺序循环) 第一个还能下注的玩家
    fn next_bettor_after(&self, after: &PlayerId) -> Option<PlayerId> {
        let n = self.hand.order.len();
        let start = self.hand.order.iter().position(|id| id == after)?;
        (1..=n)
            .map(|step| self.hand.order[(start + step) % n])
            .find(|id| self.can_bet(id))
    }

    fn validate(&self, id: PlayerId, action: PlayerAction, origin: ActionOrigin) -> Result<PlayerAction, EngineError> {
        let player = self.player(&id).ok_or(EngineError::UnknownPlayer(id))?;
        let to_call = self.hand.current_bet.saturating_sub(player.current_bet);

        match action {
            PlayerAction::Fold | PlayerAction::Call => Ok(action),
            PlayerAction::Check if to_call == 0 => Ok(action),
            PlayerAction::Check => Err(EngineError::CannotCheck { to_call }),
            PlayerAction::Raise(amount) => match self.check_raise(player, amount, to_call) {
                Ok(()) => Ok(action),
                Err(err) if origin == ActionOrigin::Automated => {
                    debug!(player = %id, %err, "机器人加注不合法，改为跟注");
                    Ok(PlayerAction::Call)
                }
                Err(err) => Err(err),
            },
        }
    }

    fn check_raise(&self, player: &Player, amount: u32, to_call: u32) -> Result<(), EngineError> {
        if amount == 0 {
            return Err(EngineError::ZeroRaise);
        }
        if amount > player.chips {
            return Err(EngineError::RaiseExceedsStack { amount, chips: player.chips });
        }
        let total = player.current_bet + amount;
        if total <= self.hand.current_bet {
            return Err(EngineError::RaiseNotAboveBet { total, current_bet: self.hand.current_bet });
        }
        // 全下不受最小加注限制
        let increase = amount - to_call;
        let min_raise = min_raise(self.config, self.hand.phase);
        if increase < min_raise && amount != player.chips {
            return Err(EngineError::RaiseTooSmall { increase, min_raise });
        }
        Ok(())
    }

    fn apply(&mut self, id: PlayerId, action: PlayerAction) {
        let street_bet = self.hand.current_bet;
        let Some(player) = self.players.get_mut(&id) else {
            return;
        };
        player.has_acted = true;

        match action {
            PlayerAction::Fold => player.has_folded = true,
            PlayerAction::Check => {}
            PlayerAction::Call => {
                player.commit(street_bet.saturating_sub(player.current_bet));
            }
            PlayerAction::Raise(amount) => {
                player.commit(amount);
                self.hand.current_bet = player.current_bet;
                // 其他人需要回应新的下注
                for other in self.hand.order.iter().filter(|other| **other != id) {
                    if let Some(p) = self.players.get_mut(other) {
                        if p.can_bet() {
                            p.has_acted = false;
                        }
                    }
                }
            }
        }
    }

    /// 本轮下注是否结束：能下注的人都已行动且跟平了最高下注。
    /// 只剩一个人能下注时，他跟平即可结束 (没有人能再回应他)。
    fn round_complete(&self) -> bool {
        let bettors: Vec<&Player> = self
            .hand
            .order
            .iter()
            .filter_map(|id| self.player(id))
            .filter(|p| p.can_bet())
            .collect();
        match bettors.as_slice() {
            [] => true,
            [only] => only.current_bet >= self.hand.current_bet,
            _ => bettors
                .iter()
                .all(|p| p.has_acted && p.current_bet == self.hand.current_bet),
        }
    }

    /// 推进牌局直到需要某位玩家行动，或者这一局结束。
    /// `after` 是刚刚行动 (或下了大盲) 的玩家。
    fn progress(&mut self, after: PlayerId) -> Result<(), EngineError> {
        let mut after = after;
        loop {
            if self.live_players().len() <= 1 {
                self.finish_uncontested();
                return Ok(());
            }
            if !self.round_complete() {
                self.hand.current_player = self.next_bettor_after(&after);
                return Ok(());
            }
            self.collect_bets();
            if self.hand.phase == GamePhase::River {
                return self.showdown();
            }
            self.advance_to_next_phase()?;
            after = self.hand.dealer_id;
        }
    }

    fn collect_bets(&mut self) {
        let order = &self.hand.order;
        let players = self
            .players
            .iter_mut()
            .filter(|(id, _)| order.contains(*id))
            .map(|(_, p)| p);
        self.hand.pots.collect_bets(players);
    }

    /// 发出下一条街的公共牌并重置本轮下注状态
    fn advance_to_next_phase(&mut self) -> Result<(), EngineError> {
        let (next, count) = match self.hand.phase {
            GamePhase::PreFlop => (GamePhase::Flop, 3),
            GamePhase::Flop => (GamePhase::Turn, 1),
            GamePhase::Turn => (GamePhase::River, 1),
            _ => return Ok(()),
        };
        let cards = self.hand.deck.deal_cards(count)?;
        self.hand.community_cards.extend(cards);
        self.hand.phase = next;
        self.hand.current_bet = 0;
        self.hand.current_player = None;
        for id in &self.hand.order {
            if let Some(p) = self.players.get_mut(id) {
                p.current_bet = 0;
                p.has_acted = false;
            }
        }
        debug!(phase = ?next, board = self.hand.community_cards.len(), "进入下一条街");
        Ok(())
    }

    /// 只剩一人未弃牌：收下所有下注，整个底池归他
    fn finish_uncontested(&mut self) {
        if self.hand.settled {
            return;
        }
        self.collect_bets();
        let Some(winner_id) = self.live_players().first().copied() else {
            return;
        };
        let amount = self.hand.pots.award_all();
        if let Some(winner) = self.players.get_mut(&winner_id) {
            winner.chips += amount;
            self.hand.winners = vec![Winner {
                player_id: winner_id,
                name: winner.name.clone(),
                hand: None,
                amount,
            }];
        }
        debug!(winner = %winner_id, amount, "其他玩家全部弃牌");
        self.conclude();
    }

    /// 处理摊牌逻辑
    ///
    /// - 为每个未弃牌的玩家评估底牌 + 公共牌的最佳牌型。
    /// - 逐个底池比较有资格的玩家，分配奖池。
    fn showdown(&mut self) -> Result<(), EngineError> {
        if self.hand.settled {
            return Ok(());
        }
        self.collect_bets();
        // 提前全下导致没有发完的公共牌在这里补齐
        let missing = 5usize.saturating_sub(self.hand.community_cards.len());
        let cards = self.hand.deck.deal_cards(missing)?;
        self.hand.community_cards.extend(cards);

        let live = self.live_from_dealer_left();
        let mut hands = HashMap::new();
        for id in &live {
            if let Some(player) = self.player(id) {
                let mut all_cards = self.hand.community_cards.clone();
                all_cards.extend(player.hand.iter().copied());
                hands.insert(*id, evaluate_hand(&all_cards)?);
            }
        }
        let scores: HashMap<PlayerId, u32> = hands.iter().map(|(id, h)| (*id, h.score)).collect();

        let awards = self.hand.pots.settle(&live, &scores);
        let mut winners = Vec::with_capacity(awards.len());
        for (id, amount) in awards {
            if let Some(player) = self.players.get_mut(&id) {
                player.chips += amount;
                winners.push(Winner {
                    player_id: id,
                    name: player.name.clone(),
                    hand: hands.remove(&id),
                    amount,
                });
            }
        }
        debug!(winners = winners.len(), "摊牌结算完成");
        self.hand.winners = winners;
        self.hand.revealed = true;
        self.hand.phase = GamePhase::Showdown;
        self.conclude();
        Ok(())
    }

    fn conclude(&mut self) {
        self.hand.phase = GamePhase::Showdown;
        self.hand.current_player = None;
        self.hand.current_bet = 0;
        self.hand.settled = true;
        for id in &self.hand.order {
            if let Some(p) = self.players.get_mut(id) {
                p.has_acted = false;
            }
        }
        self.refresh_pot();
    }

    fn refresh_pot(&mut self) {
        let bets: u32 = self
            .hand
            .order
            .iter()
            .filter_map(|id| self.player(id))
            .map(|p| p.current_bet)
            .sum();
        self.hand.pot = self.hand.pots.total() + bets;
    }
}

// --- 单元测试 ---

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::{Card, Rank, Suit};
    use crate::eval::HandCategory;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    // 辅助函数：创建用于测试的GameState。座位会在开局时轮换一次，
    // 所以第一局的庄家是 ids[1]。
    fn setup_test_game(stacks: &[u32]) -> (GameState, Vec<PlayerId>) {
        let mut state = GameState::new(RoomId::new_v4(), TableConfig::default());
        let ids = stacks
            .iter()
            .enumerate()
            .map(|(i, &chips)| state.seat(Player::new(format!("Player_{}", i), chips, SeatKind::Human)).unwrap())
            .collect();
        (state, ids)
    }

    fn act(state: &mut GameState, action: PlayerAction) -> ActionOutcome {
        let current = state.current_player_id().expect("no one to act");
        let outcome = state.handle_player_action(current, action, ActionOrigin::Human).unwrap();
        assert_conserved(state);
        outcome
    }

    fn assert_conserved(state: &GameState) {
        let hand = state.hand.as_ref().unwrap();
        assert_eq!(state.chips_in_play(), hand.starting_chips);
    }

    fn chips(state: &GameState, id: &PlayerId) -> u32 {
        state.players[id].chips
    }

    fn c(rank: Rank, suit: Suit) -> Card {
        Card::new(rank, suit)
    }

    #[test]
    fn test_start_new_hand_posts_blinds() {
        let (mut state, _) = setup_test_game(&[1000, 1000, 1000, 1000]);
        state.start_new_hand().unwrap();
        assert_conserved(&state);

        let hand = state.hand.as_ref().unwrap();
        assert_eq!(hand.order.len(), 4);
        assert_eq!(hand.small_blind_id, hand.order[1]);
        assert_eq!(hand.big_blind_id, hand.order[2]);
        assert_eq!(chips(&state, &hand.order[1]), 990);
        assert_eq!(chips(&state, &hand.order[2]), 980);
        assert_eq!(hand.pot, 30);
        assert_eq!(hand.current_bet, 20);
        assert_eq!(hand.phase, GamePhase::PreFlop);
        // 大盲之后的玩家先行动
        assert_eq!(hand.current_player, Some(hand.order[3]));
        assert!(state.players.values().all(|p| p.hand.len() == 2));
        assert_eq!(hand.deck.len(), 52 - 8);
    }

    #[test]
    fn test_start_requires_two_funded_players() {
        let (mut state, _) = setup_test_game(&[1000, 0]);
        assert_eq!(state.start_new_hand(), Err(EngineError::NotEnoughPlayers));
        assert!(state.hand.is_none());
        assert_eq!(state.hands_played, 0);
    }

    #[test]
    fn test_busted_seat_is_not_dealt_in() {
        let (mut state, ids) = setup_test_game(&[1000, 0, 1000, 1000]);
        state.start_new_hand().unwrap();
        let hand = state.hand.as_ref().unwrap();
        assert_eq!(hand.order.len(), 3);
        assert!(!hand.order.contains(&ids[1]));
        assert!(state.players[&ids[1]].hand.is_empty());
    }

    #[test]
    fn test_dealer_rotation() {
        let (mut state, _) = setup_test_game(&[1000, 1000, 1000]);
        state.start_new_hand().unwrap();
        let first_dealer = state.hand.as_ref().unwrap().dealer_id;
        act(&mut state, PlayerAction::Fold);
        act(&mut state, PlayerAction::Fold);
        assert!(!state.is_hand_in_progress());

        state.start_new_hand().unwrap();
        let second_dealer = state.hand.as_ref().unwrap().dealer_id;
        assert_ne!(first_dealer, second_dealer);
        assert_eq!(state.seated_players.back(), Some(&first_dealer));
    }

    #[test]
    fn test_heads_up_dealer_posts_small_blind_and_acts_first() {
        let (mut state, _) = setup_test_game(&[1000, 1000]);
        state.start_new_hand().unwrap();
        let hand = state.hand.as_ref().unwrap();
        assert_eq!(hand.small_blind_id, hand.dealer_id);
        assert_eq!(hand.current_player, Some(hand.dealer_id));

        act(&mut state, PlayerAction::Call);
        act(&mut state, PlayerAction::Check);
        let hand = state.hand.as_ref().unwrap();
        assert_eq!(hand.phase, GamePhase::Flop);
        // 翻牌后庄家之后的玩家 (大盲) 先行动
        assert_eq!(hand.current_player, Some(hand.big_blind_id));
    }

    #[test]
    fn test_fold_around_gives_pot_to_big_blind() {
        let (mut state, _) = setup_test_game(&[1000, 1000, 1000]);
        state.start_new_hand().unwrap();
        let bb = state.hand.as_ref().unwrap().big_blind_id;

        act(&mut state, PlayerAction::Fold);
        let outcome = act(&mut state, PlayerAction::Fold);

        assert!(outcome.hand_over);
        let hand = state.hand.as_ref().unwrap();
        assert_eq!(hand.phase, GamePhase::Showdown);
        assert_eq!(hand.community_cards.len(), 0);
        assert_eq!(chips(&state, &bb), 1010);
        assert_eq!(hand.winners.len(), 1);
        assert_eq!(hand.winners[0].player_id, bb);
        assert_eq!(hand.winners[0].amount, 30);
        assert!(hand.winners[0].hand.is_none());
        assert_eq!(state.chips_in_play(), 3000);
    }

    #[test]
    fn test_betting_round_ends_and_advances_to_flop() {
        let (mut state, _) = setup_test_game(&[1000, 1000, 1000]);
        state.start_new_hand().unwrap();
        let (dealer, sb) = {
            let hand = state.hand.as_ref().unwrap();
            (hand.dealer_id, hand.small_blind_id)
        };
        assert_eq!(state.current_player_id(), Some(dealer));

        act(&mut state, PlayerAction::Call);
        act(&mut state, PlayerAction::Call);
        let outcome = act(&mut state, PlayerAction::Check);

        assert!(outcome.street_changed);
        let hand = state.hand.as_ref().unwrap();
        assert_eq!(hand.phase, GamePhase::Flop);
        assert_eq!(hand.pot, 60);
        assert_eq!(hand.pots.amounts(), vec![60]);
        assert_eq!(hand.community_cards.len(), 3);
        assert_eq!(hand.current_bet, 0);
        assert!(state.players.values().all(|p| p.current_bet == 0 && !p.has_acted));
        assert_eq!(state.current_player_id(), Some(sb));
    }

    #[test]
    fn test_big_blind_gets_option_preflop() {
        let (mut state, _) = setup_test_game(&[1000, 1000, 1000]);
        state.start_new_hand().unwrap();
        let bb = state.hand.as_ref().unwrap().big_blind_id;
        act(&mut state, PlayerAction::Call);
        act(&mut state, PlayerAction::Call);
        assert_eq!(state.current_player_id(), Some(bb));
        assert_eq!(state.phase(), GamePhase::PreFlop);
    }

    #[test]
    fn test_check_facing_bet_is_rejected_without_change() {
        let (mut state, _) = setup_test_game(&[1000, 1000, 1000]);
        state.start_new_hand().unwrap();
        let before = state.snapshot(None);
        let current = state.current_player_id().unwrap();

        let err = state.handle_player_action(current, PlayerAction::Check, ActionOrigin::Human).unwrap_err();
        assert_eq!(err, EngineError::CannotCheck { to_call: 20 });
        assert_eq!(state.snapshot(None), before);
    }

    #[test]
    fn test_out_of_turn_action_is_ignored() {
        let (mut state, _) = setup_test_game(&[1000, 1000, 1000]);
        state.start_new_hand().unwrap();
        let bb = state.hand.as_ref().unwrap().big_blind_id;
        let before = state.snapshot(None);

        let err = state.handle_player_action(bb, PlayerAction::Fold, ActionOrigin::Human).unwrap_err();
        assert_eq!(err, EngineError::NotPlayersTurn(bb));
        assert_eq!(err.kind(), crate::error::Rejection::OutOfTurn);
        assert_eq!(state.snapshot(None), before);
        assert_eq!(state.hand.as_ref().unwrap().action_seq, 0);

        let stranger = PlayerId::new_v4();
        assert_eq!(
            state.handle_player_action(stranger, PlayerAction::Fold, ActionOrigin::Human),
            Err(EngineError::UnknownPlayer(stranger))
        );
    }

    #[test]
    fn test_raise_validation_for_humans() {
        let (mut state, _) = setup_test_game(&[1000, 1000, 1000]);
        state.start_new_hand().unwrap();
        let current = state.current_player_id().unwrap();
        let mut try_raise = |amount| state.handle_player_action(current, PlayerAction::Raise(amount), ActionOrigin::Human);

        assert_eq!(try_raise(0), Err(EngineError::ZeroRaise));
        assert_eq!(try_raise(1001), Err(EngineError::RaiseExceedsStack { amount: 1001, chips: 1000 }));
        assert_eq!(try_raise(20), Err(EngineError::RaiseNotAboveBet { total: 20, current_bet: 20 }));
        // 跟注 20 之后只多加 10，翻牌前最小加注是 20
        let err = try_raise(30).unwrap_err();
        assert_eq!(err, EngineError::RaiseTooSmall { increase: 10, min_raise: 20 });
        assert_eq!(err.kind(), crate::error::Rejection::PolicyViolation);

        let outcome = try_raise(40).unwrap();
        assert_eq!(outcome.action, PlayerAction::Raise(40));
        assert_eq!(state.hand.as_ref().unwrap().current_bet, 40);
    }

    #[test]
    fn test_bot_illegal_raise_is_downgraded_to_call() {
        let (mut state, _) = setup_test_game(&[1000, 1000, 1000]);
        state.start_new_hand().unwrap();
        let current = state.current_player_id().unwrap();

        let outcome = state
            .handle_player_action(current, PlayerAction::Raise(25), ActionOrigin::Automated)
            .unwrap();
        assert_eq!(outcome.action, PlayerAction::Call);
        assert_eq!(state.players[&current].current_bet, 20);
        assert_eq!(state.players[&current].chips, 980);
        assert_conserved(&state);
    }

    #[test]
    fn test_short_all_in_raise_is_allowed() {
        let (mut state, ids) = setup_test_game(&[1000, 1000, 25]);
        state.start_new_hand().unwrap();
        // 轮换后: ids[1] 庄, ids[2] 小盲 (25), ids[0] 大盲
        assert_eq!(state.current_player_id(), Some(ids[1]));
        act(&mut state, PlayerAction::Call);
        act(&mut state, PlayerAction::Call);
        act(&mut state, PlayerAction::Check);
        assert_eq!(state.phase(), GamePhase::Flop);
        // 翻牌后小盲先行动，只剩 5，低于最小加注的全下也允许
        assert_eq!(state.current_player_id(), Some(ids[2]));
        let outcome = act(&mut state, PlayerAction::Raise(5));
        assert_eq!(outcome.action, PlayerAction::Raise(5));
        assert_eq!(state.hand.as_ref().unwrap().current_bet, 5);
        assert!(state.players[&ids[2]].is_all_in);
    }

    #[test]
    fn test_raise_resets_other_players_acted_flags() {
        let (mut state, _) = setup_test_game(&[1000, 1000, 1000, 1000]);
        state.start_new_hand().unwrap();
        act(&mut state, PlayerAction::Call);
        act(&mut state, PlayerAction::Call);
        let raiser = state.current_player_id().unwrap();
        act(&mut state, PlayerAction::Raise(60));

        let hand = state.hand.as_ref().unwrap();
        for id in &hand.order {
            let p = &state.players[id];
            if *id == raiser {
                assert!(p.has_acted);
            } else {
                assert!(!p.has_acted, "{} should need to respond", p.name);
            }
        }
        assert_eq!(hand.current_bet, 70);
    }

    #[test]
    fn test_turn_order_skips_folded_and_all_in_players() {
        let (mut state, ids) = setup_test_game(&[1000, 1000, 1000, 1000]);
        state.start_new_hand().unwrap();
        // 座位轮换后顺序为 ids[1] (庄), ids[2] (小盲), ids[3] (大盲), ids[0]
        assert_eq!(state.current_player_id(), Some(ids[0]));
        act(&mut state, PlayerAction::Raise(1000)); // ids[0] 全下
        act(&mut state, PlayerAction::Fold); // 庄家弃牌
        assert_eq!(state.current_player_id(), Some(ids[2]));
        act(&mut state, PlayerAction::Call);
        assert_eq!(state.current_player_id(), Some(ids[3]));
        act(&mut state, PlayerAction::Call);

        // 三人全下，直接发完公共牌摊牌
        let hand = state.hand.as_ref().unwrap();
        assert_eq!(hand.phase, GamePhase::Showdown);
        assert_eq!(hand.community_cards.len(), 5);
        assert_eq!(state.chips_in_play(), 4000);
    }

    #[test]
    fn test_all_in_run_out_with_side_pot_and_rigged_deck() {
        let (mut state, ids) = setup_test_game(&[1000, 100, 1000]);
        // 轮换后顺序: ids[1] 庄 (100), ids[2] 小盲, ids[0] 大盲
        let deck = Deck::stacked(vec![
            c(Rank::Ace, Suit::Spade), c(Rank::Ace, Suit::Heart), // ids[1]: AA
            c(Rank::King, Suit::Spade), c(Rank::King, Suit::Heart), // ids[2]: KK
            c(Rank::Two, Suit::Club), c(Rank::Seven, Suit::Diamond), // ids[0]: 72
            c(Rank::King, Suit::Club), c(Rank::Nine, Suit::Diamond), c(Rank::Four, Suit::Heart),
            c(Rank::Three, Suit::Spade), c(Rank::Jack, Suit::Club),
        ]);
        state.start_new_hand_with_deck(deck).unwrap();
        assert_eq!(state.current_player_id(), Some(ids[1]));

        act(&mut state, PlayerAction::Raise(100)); // 短码全下
        act(&mut state, PlayerAction::Raise(990)); // 小盲全下
        act(&mut state, PlayerAction::Call); // 大盲跟注全下

        let hand = state.hand.as_ref().unwrap();
        assert_eq!(hand.phase, GamePhase::Showdown);
        // 三条 K 大过 AA，主池和边池都归 ids[2]
        assert_eq!(chips(&state, &ids[2]), 2100);
        assert_eq!(chips(&state, &ids[1]), 0);
        assert_eq!(chips(&state, &ids[0]), 0);
        let winner = &hand.winners[0];
        assert_eq!(winner.player_id, ids[2]);
        assert_eq!(winner.hand.as_ref().unwrap().category, HandCategory::ThreeOfAKind);
        assert_eq!(state.chips_in_play(), 2100);
    }

    #[test]
    fn test_short_stack_wins_only_main_pot() {
        let (mut state, ids) = setup_test_game(&[1000, 100, 1000]);
        let deck = Deck::stacked(vec![
            c(Rank::Ace, Suit::Spade), c(Rank::Ace, Suit::Heart), // ids[1]: AA (短码)
            c(Rank::King, Suit::Spade), c(Rank::King, Suit::Heart), // ids[2]: KK
            c(Rank::Two, Suit::Club), c(Rank::Seven, Suit::Diamond), // ids[0]: 72
            c(Rank::Queen, Suit::Club), c(Rank::Nine, Suit::Diamond), c(Rank::Four, Suit::Heart),
            c(Rank::Three, Suit::Spade), c(Rank::Jack, Suit::Club),
        ]);
        state.start_new_hand_with_deck(deck).unwrap();

        act(&mut state, PlayerAction::Raise(100));
        act(&mut state, PlayerAction::Raise(990));
        act(&mut state, PlayerAction::Call);

        assert_eq!(chips(&state, &ids[1]), 300);
        assert_eq!(chips(&state, &ids[2]), 1800);
        assert_eq!(chips(&state, &ids[0]), 0);
        let winners = &state.hand.as_ref().unwrap().winners;
        assert_eq!(winners.len(), 2);
    }

    #[test]
    fn test_showdown_settlement_is_idempotent() {
        let (mut state, ids) = setup_test_game(&[1000, 1000]);
        state.start_new_hand().unwrap();
        act(&mut state, PlayerAction::Raise(990));
        act(&mut state, PlayerAction::Call);
        assert_eq!(state.phase(), GamePhase::Showdown);

        let stacks: Vec<u32> = ids.iter().map(|id| chips(&state, id)).collect();
        let first = state.hand.as_ref().unwrap().winners.clone();
        let again = state.settle_showdown().unwrap();
        assert_eq!(first, again);
        let after: Vec<u32> = ids.iter().map(|id| chips(&state, id)).collect();
        assert_eq!(stacks, after);
        assert_eq!(state.chips_in_play(), 2000);
    }

    #[test]
    fn test_settle_showdown_mid_hand_is_rejected() {
        let (mut state, ids) = setup_test_game(&[1000, 1000, 1000]);
        state.start_new_hand().unwrap();
        let before = state.snapshot(None);

        assert_eq!(state.settle_showdown(), Err(EngineError::HandInProgress));
        assert_eq!(state.snapshot(None), before);
        assert_eq!(state.phase(), GamePhase::PreFlop);
        assert!(state.hand.as_ref().unwrap().community_cards.is_empty());

        // 翻牌后也一样
        act(&mut state, PlayerAction::Call);
        act(&mut state, PlayerAction::Call);
        act(&mut state, PlayerAction::Check);
        assert_eq!(state.phase(), GamePhase::Flop);
        assert_eq!(state.settle_showdown(), Err(EngineError::HandInProgress));
        assert_eq!(state.phase(), GamePhase::Flop);
        assert_eq!(ids.iter().map(|id| chips(&state, id)).sum::<u32>(), 2940);
    }

    #[test]
    fn test_actions_after_showdown_are_rejected() {
        let (mut state, ids) = setup_test_game(&[1000, 1000]);
        state.start_new_hand().unwrap();
        act(&mut state, PlayerAction::Fold);
        assert_eq!(
            state.handle_player_action(ids[0], PlayerAction::Check, ActionOrigin::Human),
            Err(EngineError::HandFinished)
        );
    }

    #[test]
    fn test_short_big_blind_is_all_in_and_still_sets_street_bet() {
        let (mut state, ids) = setup_test_game(&[15, 1000, 1000]);
        // 轮换后: ids[1] 庄, ids[2] 小盲, ids[0] 大盲 (15)
        state.start_new_hand().unwrap();
        let hand = state.hand.as_ref().unwrap();
        assert_eq!(hand.big_blind_id, ids[0]);
        assert!(state.players[&ids[0]].is_all_in);
        assert_eq!(hand.current_bet, 20);
        assert_eq!(hand.pot, 25);
    }

    #[test]
    fn test_legal_actions() {
        let (mut state, ids) = setup_test_game(&[1000, 1000, 1000]);
        state.start_new_hand().unwrap();
        let current = state.current_player_id().unwrap();
        assert_eq!(
            state.legal_actions(&current),
            vec![
                PlayerActionType::Fold,
                PlayerActionType::Call(20),
                PlayerActionType::Raise { min: 40, max: 1000 },
            ]
        );
        let waiting = ids.iter().find(|id| **id != current).unwrap();
        assert!(state.legal_actions(waiting).is_empty());
    }

    #[test]
    fn test_passive_action_checks_only_when_free() {
        let (mut state, _) = setup_test_game(&[1000, 1000, 1000]);
        state.start_new_hand().unwrap();
        let facing_blind = state.current_player_id().unwrap();
        assert_eq!(state.passive_action(&facing_blind), PlayerAction::Fold);

        act(&mut state, PlayerAction::Call);
        act(&mut state, PlayerAction::Call);
        // 大盲已经跟平，可以过牌
        let big_blind = state.current_player_id().unwrap();
        assert_eq!(big_blind, state.hand.as_ref().unwrap().big_blind_id);
        assert_eq!(state.passive_action(&big_blind), PlayerAction::Check);
    }

    #[test]
    fn test_chip_conservation_under_random_play() {
        let mut rng = StdRng::seed_from_u64(2024);
        let (mut state, _) = setup_test_game(&[1000, 250, 600, 1000, 80]);

        for _ in 0..40 {
            if state.start_new_hand_with_rng(&mut rng).is_err() {
                break;
            }
            let total = state.hand.as_ref().unwrap().starting_chips;
            while let Some(current) = state.current_player_id() {
                let legal = state.legal_actions(&current);
                let action = match legal[rng.random_range(0..legal.len())] {
                    PlayerActionType::Fold => PlayerAction::Fold,
                    PlayerActionType::Check => PlayerAction::Check,
                    PlayerActionType::Call(_) => PlayerAction::Call,
                    PlayerActionType::Raise { min, max } => PlayerAction::Raise(rng.random_range(min..=max)),
                };
                state.handle_player_action(current, action, ActionOrigin::Human).unwrap();
                assert_eq!(state.chips_in_play(), total);
            }
            assert_eq!(state.phase(), GamePhase::Showdown);
            assert_eq!(state.hand.as_ref().unwrap().pots.total(), 0);
            assert_eq!(state.players.values().map(|p| p.chips as u64).sum::<u64>(), total);
        }
        assert!(state.hands_played > 1);
    }
}

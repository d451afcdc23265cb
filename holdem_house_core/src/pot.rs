use crate::state::{Player, PlayerId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 一个底池。`contributors` 是向其中投入过筹码的玩家 (按投入顺序)，
/// 其中未弃牌的人才有资格赢得它。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pot {
    pub amount: u32,
    pub contributors: Vec<PlayerId>,
}

impl Pot {
    fn add(&mut self, player_id: PlayerId, chips: u32) {
        self.amount += chips;
        if !self.contributors.contains(&player_id) {
            self.contributors.push(player_id);
        }
    }
}

/// 主池 + 边池。第 0 个是主池，之后按全下封顶的门槛从低到高排列。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PotManager {
    pots: Vec<Pot>,
}

impl Default for PotManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PotManager {
    pub fn new() -> Self {
        PotManager { pots: vec![Pot::default()] }
    }

    pub fn pots(&self) -> &[Pot] {
        &self.pots
    }

    pub fn amounts(&self) -> Vec<u32> {
        self.pots.iter().map(|p| p.amount).collect()
    }

    pub fn total(&self) -> u32 {
        self.pots.iter().map(|p| p.amount).sum()
    }

    /// 把每个玩家本轮的下注收进底池，并把 `current_bet` 清零。
    ///
    /// 每一趟取最小的非零下注额，从所有还有下注的玩家身上各收这么多。
    /// 当前池里只要有一个已全下且已收完的玩家，这个池就封顶了，后续筹码进入新的边池。
    pub fn collect_bets<'a, I>(&mut self, players: I)
    where
        I: IntoIterator<Item = &'a mut Player>,
    {
        let mut players: Vec<&mut Player> = players.into_iter().collect();

        while let Some(level) = players.iter().map(|p| p.current_bet).filter(|&b| b > 0).min() {
            if self.current_is_capped(&players) {
                self.pots.push(Pot::default());
            }
            let pot = self.current_mut();
            for player in players.iter_mut().filter(|p| p.current_bet > 0) {
                let chips = player.current_bet.min(level);
                player.current_bet -= chips;
                pot.add(player.id, chips);
            }
        }
    }

    fn current_mut(&mut self) -> &mut Pot {
        if self.pots.is_empty() {
            self.pots.push(Pot::default());
        }
        let last = self.pots.len() - 1;
        &mut self.pots[last]
    }

    fn current_is_capped(&self, players: &[&mut Player]) -> bool {
        let Some(pot) = self.pots.last() else {
            return false;
        };
        pot.amount > 0
            && pot.contributors.iter().any(|id| {
                players
                    .iter()
                    .any(|p| p.id == *id && p.is_all_in && p.current_bet == 0)
            })
    }

    /// 摊牌结算。`live` 是未弃牌的玩家，按座位顺序从庄家左手第一位开始；
    /// `scores` 是他们的牌力分。
    ///
    /// 每个池由有资格的玩家中分数最高者平分，整除剩下的零头按 `live` 的顺序逐个分给平局赢家。
    /// 结算后池子清空，所以重复调用不会重复派彩。返回每个赢家赢得的总额 (按首次获胜的顺序)。
    pub fn settle(&mut self, live: &[PlayerId], scores: &HashMap<PlayerId, u32>) -> Vec<(PlayerId, u32)> {
        let mut awards: Vec<(PlayerId, u32)> = Vec::new();

        for pot in self.pots.iter_mut().filter(|p| p.amount > 0) {
            let mut eligible: Vec<PlayerId> = live
                .iter()
                .filter(|id| pot.contributors.contains(id))
                .copied()
                .collect();
            if eligible.is_empty() {
                // 投入这个池的人都弃牌了
                eligible = live.to_vec();
            }

            let Some(best) = eligible.iter().filter_map(|id| scores.get(id)).max().copied() else {
                continue;
            };
            let winners: Vec<PlayerId> = eligible
                .into_iter()
                .filter(|id| scores.get(id) == Some(&best))
                .collect();

            let share = pot.amount / winners.len() as u32;
            let mut odd_chips = pot.amount % winners.len() as u32;
            for winner in winners {
                let mut won = share;
                if odd_chips > 0 {
                    won += 1;
                    odd_chips -= 1;
                }
                add_award(&mut awards, winner, won);
            }
            pot.amount = 0;
        }

        awards
    }

    /// 只剩一人未弃牌：不比牌，所有池都归他
    pub fn award_all(&mut self) -> u32 {
        let total = self.total();
        self.pots.iter_mut().for_each(|p| p.amount = 0);
        total
    }
}

fn add_award(awards: &mut Vec<(PlayerId, u32)>, player_id: PlayerId, amount: u32) {
    match awards.iter_mut().find(|(id, _)| *id == player_id) {
        Some((_, total)) => *total += amount,
        None => awards.push((player_id, amount)),
    }
}

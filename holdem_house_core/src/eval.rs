use crate::card::{Card, Rank};
use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 相邻两个牌型之间的分数间隔
pub const CATEGORY_SPACING: u32 = 1_000_000;

/// 踢脚牌按位加权时使用的进制。14^… 的和永远小于 15^5 < CATEGORY_SPACING，
/// 因此同一牌型的加权分不会越界到下一个牌型。
const KICKER_BASE: u32 = 15;

/// 牌型 (从小到大排列，判别值即牌型序号 1..=9)
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Serialize, Deserialize)]
pub enum HandCategory {
    HighCard = 1,
    OnePair,
    TwoPair,
    ThreeOfAKind,
    Straight,
    Flush,
    FullHouse,
    FourOfAKind,
    StraightFlush,
}

impl HandCategory {
    pub fn base_score(self) -> u32 {
        self as u32 * CATEGORY_SPACING
    }
}

/// 一手牌的评估结果。`score` 可以直接比较大小，平局即分数相同。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluatedHand {
    pub category: HandCategory,
    pub score: u32,
    /// 组成最佳牌型的 5 张牌，按比较时的重要性排序
    pub best_five: Vec<Card>,
}

impl EvaluatedHand {
    /// 皇家同花顺即最高牌为 A 的同花顺
    pub fn is_royal(&self) -> bool {
        self.category == HandCategory::StraightFlush
            && self.best_five.first().map(|c| c.rank) == Some(Rank::Ace)
    }

    /// 归一化到 [0, 1) 的牌力，供机器人使用
    pub fn strength(&self) -> f64 {
        self.score as f64 / (10 * CATEGORY_SPACING) as f64
    }
}

impl fmt::Display for HandCategory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", match self {
            HandCategory::HighCard => "高牌",
            HandCategory::OnePair => "一对",
            HandCategory::TwoPair => "两对",
            HandCategory::ThreeOfAKind => "三条",
            HandCategory::Straight => "顺子",
            HandCategory::Flush => "同花",
            HandCategory::FullHouse => "葫芦",
            HandCategory::FourOfAKind => "四条",
            HandCategory::StraightFlush => "同花顺",
        })
    }
}

impl fmt::Display for EvaluatedHand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_royal() {
            return write!(f, "皇家同花顺");
        }
        let cards: Vec<String> = self.best_five.iter().map(|c| c.to_string()).collect();
        write!(f, "{} [{}]", self.category, cards.join(" "))
    }
}

// --- 牌型评估逻辑 ---

/// 从 5 到 7 张牌中找出最优的 5 张牌组合
///
/// 超过 5 张时枚举所有 5 张组合 (7 张即 21 种) 取最高分，
/// 平局完全由分数决定，不再另外比较。
pub fn evaluate_hand(all_cards: &[Card]) -> Result<EvaluatedHand, EngineError> {
    match all_cards.len() {
        n if n < 5 => Err(EngineError::TooFewCards(n)),
        n if n > 7 => Err(EngineError::TooManyCards(n)),
        5 => Ok(evaluate_5_card_hand(all_cards)),
        _ => get_combinations(all_cards, 5)
            .into_iter()
            .map(|hand| evaluate_5_card_hand(&hand))
            .max_by_key(|hand| hand.score)
            .ok_or(EngineError::TooFewCards(all_cards.len())),
    }
}

/// 评估恰好 5 张牌
fn evaluate_5_card_hand(hand: &[Card]) -> EvaluatedHand {
    let mut cards = hand.to_vec();
    // 从大到小排序，方便处理
    cards.sort_by(|a, b| b.rank.cmp(&a.rank).then(a.suit.cmp(&b.suit)));
    let ranks: Vec<Rank> = cards.iter().map(|c| c.rank).collect();

    let is_flush = cards.windows(2).all(|w| w[0].suit == w[1].suit);
    let is_wheel = ranks == [Rank::Ace, Rank::Five, Rank::Four, Rank::Three, Rank::Two];
    let is_straight = is_wheel || ranks.windows(2).all(|w| w[0].value() == w[1].value() + 1);

    if is_straight {
        if is_wheel {
            // A 在 wheel 中当作最小牌
            cards.rotate_left(1);
        }
        let high = cards[0].rank;
        let category = if is_flush { HandCategory::StraightFlush } else { HandCategory::Straight };
        return scored(category, &[high], cards);
    }

    // (出现次数, 点数)，按次数、再按点数从大到小
    let mut groups: Vec<(usize, Rank)> = Vec::new();
    for rank in &ranks {
        match groups.iter_mut().find(|(_, r)| r == rank) {
            Some((count, _)) => *count += 1,
            None => groups.push((1, *rank)),
        }
    }
    groups.sort_by(|a, b| b.cmp(a));

    // 按重要性重排 5 张牌：先成组的牌，再踢脚
    cards.sort_by(|a, b| {
        let count_of = |r: Rank| groups.iter().find(|(_, g)| *g == r).map_or(0, |(c, _)| *c);
        count_of(b.rank).cmp(&count_of(a.rank)).then(b.rank.cmp(&a.rank))
    });
    let significant: Vec<Rank> = groups.iter().map(|(_, r)| *r).collect();

    let category = match (groups[0].0, groups.get(1).map_or(0, |g| g.0)) {
        (4, _) => HandCategory::FourOfAKind,
        (3, 2) => HandCategory::FullHouse,
        _ if is_flush => HandCategory::Flush,
        (3, _) => HandCategory::ThreeOfAKind,
        (2, 2) => HandCategory::TwoPair,
        (2, _) => HandCategory::OnePair,
        _ => HandCategory::HighCard,
    };
    scored(category, &significant, cards)
}

fn scored(category: HandCategory, significant: &[Rank], best_five: Vec<Card>) -> EvaluatedHand {
    let tie_break = significant.iter().fold(0, |acc, r| acc * KICKER_BASE + r.value());
    EvaluatedHand {
        category,
        score: category.base_score() + tie_break,
        best_five,
    }
}

/// 辅助函数：从一个切片中生成所有大小为 k 的组合
fn get_combinations<T: Clone>(data: &[T], k: usize) -> Vec<Vec<T>> {
    if k == 0 {
        return vec![vec![]];
    }
    if data.len() < k {
        return vec![];
    }

    let mut result = vec![];
    let (first, rest) = data.split_at(1);

    // 包含第一个元素的组合
    let mut combinations_with_first = get_combinations(rest, k - 1);
    for combo in &mut combinations_with_first {
        combo.insert(0, first[0].clone());
    }
    result.append(&mut combinations_with_first);

    // 不包含第一个元素的组合
    if data.len() > k {
        let mut combinations_without_first = get_combinations(rest, k);
        result.append(&mut combinations_without_first);
    }

    result
}

// --- 单元测试 ---

use holdem_house_core::TableConfig;
use std::env;
use std::net::SocketAddr;
use thiserror::Error;

/// 默认监听地址
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:25917";

// 52 张牌最多能给 23 个人各发 2 张并留下 5 张公共牌
const MAX_SEATS_LIMIT: usize = 23;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("环境变量 {var} 的值 '{value}' 不是合法的数字")]
    InvalidNumber { var: &'static str, value: String },

    #[error("监听地址 '{0}' 不合法")]
    InvalidAddr(String),

    #[error("配置不合法: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub table: TableConfig,
}

impl ServerConfig {
    /// 从 `HOLDEM_*` 环境变量读取配置，未设置的项使用默认值
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let addr = lookup("HOLDEM_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = addr.parse().map_err(|_| ConfigError::InvalidAddr(addr))?;

        let defaults = TableConfig::default();
        let table = TableConfig {
            small_blind: number(&lookup, "HOLDEM_SMALL_BLIND", defaults.small_blind)?,
            big_blind: number(&lookup, "HOLDEM_BIG_BLIND", defaults.big_blind)?,
            min_raise_preflop: number(&lookup, "HOLDEM_MIN_RAISE_PREFLOP", defaults.min_raise_preflop)?,
            min_raise_postflop: number(&lookup, "HOLDEM_MIN_RAISE_POSTFLOP", defaults.min_raise_postflop)?,
            starting_stack: number(&lookup, "HOLDEM_STARTING_STACK", defaults.starting_stack)?,
            max_seats: number(&lookup, "HOLDEM_MAX_SEATS", defaults.max_seats)?,
            turn_timeout_ms: number(&lookup, "HOLDEM_TURN_TIMEOUT_MS", defaults.turn_timeout_ms)?,
            bot_delay_ms: number(&lookup, "HOLDEM_BOT_DELAY_MS", defaults.bot_delay_ms)?,
            next_hand_delay_ms: number(&lookup, "HOLDEM_NEXT_HAND_DELAY_MS", defaults.next_hand_delay_ms)?,
        };

        let config = ServerConfig { bind_addr, table };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.table;
        if t.small_blind == 0 || t.big_blind < t.small_blind {
            return Err(ConfigError::Invalid(format!(
                "盲注必须满足 0 < 小盲 ({}) <= 大盲 ({})",
                t.small_blind, t.big_blind
            )));
        }
        if t.min_raise_preflop == 0 || t.min_raise_postflop == 0 {
            return Err(ConfigError::Invalid("最小加注必须大于 0".to_string()));
        }
        if t.starting_stack < t.big_blind {
            return Err(ConfigError::Invalid(format!(
                "初始筹码 {} 少于一个大盲 {}",
                t.starting_stack, t.big_blind
            )));
        }
        if !(2..=MAX_SEATS_LIMIT).contains(&t.max_seats) {
            return Err(ConfigError::Invalid(format!(
                "座位数必须在 2 到 {} 之间，实际 {}",
                MAX_SEATS_LIMIT, t.max_seats
            )));
        }
        if t.turn_timeout_ms == 0 {
            return Err(ConfigError::Invalid("行动超时必须大于 0".to_string()));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 25917)),
            table: TableConfig::default(),
        }
    }
}

fn number<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { var, value }),
    }
}

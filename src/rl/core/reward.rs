//! Reward Functions
//!
//! Reward shaping is configuration, not fixed semantics: the scheme, the
//! per-trade penalty and the delay horizon are all tunable.

use serde::{Deserialize, Serialize};

/// How the per-step reward is derived from the account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardScheme {
    /// Change in net worth over the step
    #[default]
    NetWorthDelta,
    /// Cash balance scaled by how far into the series the agent is,
    /// rewarding patience: `balance * step / delay_horizon`
    DelayedBalance,
}

/// Reward function configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    /// Reward scheme
    pub scheme: RewardScheme,
    /// Penalty subtracted for every executed trade (buy or sell)
    pub trade_penalty: f64,
    /// Step count at which `DelayedBalance` reaches full weight
    pub delay_horizon: usize,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            scheme: RewardScheme::NetWorthDelta,
            trade_penalty: 0.0,
            delay_horizon: 20_000,
        }
    }
}

/// Information needed to compute a reward
#[derive(Debug, Clone, Copy)]
pub struct RewardTransition {
    /// Net worth before the action
    pub prev_net_worth: f64,
    /// Net worth after the action
    pub net_worth: f64,
    /// Cash balance after the action
    pub balance: f64,
    /// Index of the current bar in the price series
    pub current_step: usize,
    /// Trades executed this step (0 or 1)
    pub trades: usize,
}

/// Trait for computing rewards
pub trait RewardFunction: Send + Sync {
    /// Compute reward from a state transition
    fn compute(&self, transition: &RewardTransition) -> f64;
}

impl RewardFunction for RewardConfig {
    fn compute(&self, t: &RewardTransition) -> f64 {
        let base = match self.scheme {
            RewardScheme::NetWorthDelta => t.net_worth - t.prev_net_worth,
            RewardScheme::DelayedBalance => {
                let horizon = self.delay_horizon.max(1) as f64;
                t.balance * (t.current_step as f64 / horizon)
            }
        };
        base - self.trade_penalty * t.trades as f64
    }
}

//! Simulated Trading Environment for RL Training
//!
//! This module provides a gym-like environment contract and a stock trading
//! implementation over historical or synthetic OHLCV data.

mod account;
mod market;
mod registry;
mod trading;

use serde::{Deserialize, Serialize};

use crate::error::EnvError;
use crate::rl::core::BoxSpace;

pub use account::{Account, Fill};
pub use market::{PriceBar, PriceSeries, SeriesSummary, SyntheticConfig};
pub use registry::{EnvContext, EnvFactory, EnvRegistry, DEFAULT_ENV_NAME};
pub use trading::{
    EpisodeStart, ExecutionPrice, SeriesEnd, StockTradingEnvironment, TradingEnvConfig,
    ACCOUNT_FEATURES, PRICE_FEATURES,
};

/// Result alias for environment contract calls
pub type EnvResult<T> = std::result::Result<T, EnvError>;

/// Diagnostic information returned with every step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    /// Bar index after the step
    pub current_step: usize,
    /// Price the action executed at
    pub price: f64,
    pub balance: f64,
    pub shares_held: f64,
    pub net_worth: f64,
    /// Net worth minus initial balance
    pub profit: f64,
    pub num_trades: usize,
}

/// Result of a step in the environment
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    /// Observation after the step
    pub observation: Vec<f32>,
    /// Reward received
    pub reward: f32,
    /// Whether the episode has ended
    pub done: bool,
    /// Whether the episode ended on a time or data limit rather than a
    /// terminal state
    pub truncated: bool,
    pub info: StepInfo,
}

/// Gym-style environment contract
///
/// `reset` must be called before the first `step` and after any step that
/// returned `done`.
pub trait Environment: Send {
    /// Start a new episode and return the initial observation
    fn reset(&mut self) -> Vec<f32>;

    /// Apply an action and advance one step
    fn step(&mut self, action: &[f32]) -> EnvResult<StepResult>;

    fn observation_space(&self) -> &BoxSpace;

    fn action_space(&self) -> &BoxSpace;

    /// Reseed the environment's random source
    fn seed(&mut self, _seed: u64) {}

    /// Log the current state
    fn render(&self) {}
}

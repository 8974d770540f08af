//! Stock Trading Environment
//!
//! Gym-like single-asset environment: the agent observes a window of
//! OHLCV bars plus its account statistics and chooses to buy, sell or hold a
//! fraction of its balance or holdings.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::account::Account;
use super::market::PriceSeries;
use super::{EnvResult, Environment, StepInfo, StepResult};
use crate::error::EnvError;
use crate::rl::core::{
    action_space, BoxSpace, RewardConfig, RewardFunction, RewardTransition, TradeAction,
};

/// Number of price features per bar (open, high, low, close, volume)
pub const PRICE_FEATURES: usize = 5;

/// Number of account features appended to the price window
pub const ACCOUNT_FEATURES: usize = 6;

/// Price at which an action is filled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPrice {
    /// Close of the current bar
    #[default]
    Close,
    /// Uniformly random between the bar's open and close
    RandomInBar,
}

/// Where an episode starts in the series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeStart {
    /// First bar with a full observation window
    Beginning,
    /// Random admissible bar, for more varied experience
    #[default]
    Random,
}

/// What happens when the pointer runs off the end of the series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesEnd {
    /// End the episode on reaching the last bar, with the account marked at
    /// that bar's close
    #[default]
    Terminate,
    /// Continue from the first bar with a full window
    Wrap,
}

/// Trading environment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingEnvConfig {
    /// Cash at the start of every episode
    pub initial_balance: f64,
    /// Scale for balance and net worth features
    pub max_account_balance: f64,
    /// Scale for share counts and volume
    pub max_num_shares: f64,
    /// Scale for prices
    pub max_share_price: f64,
    /// Bars in the observation window
    pub window_size: usize,
    /// Episode horizon in steps
    pub max_episode_steps: usize,
    /// Proportional transaction cost on traded notional
    pub transaction_cost: f64,
    /// Episode terminates once net worth is at or below this
    pub bankruptcy_floor: f64,
    pub execution_price: ExecutionPrice,
    pub episode_start: EpisodeStart,
    pub series_end: SeriesEnd,
    pub reward: RewardConfig,
    /// Log the account after every step
    pub log_steps: bool,
    /// RNG seed; `None` seeds from entropy
    pub seed: Option<u64>,
}

impl Default for TradingEnvConfig {
    fn default() -> Self {
        Self {
            initial_balance: 10_000.0,
            max_account_balance: 2_147_483_647.0,
            max_num_shares: 2_147_483_647.0,
            max_share_price: 5_000.0,
            window_size: 6,
            max_episode_steps: 20_000,
            transaction_cost: 0.0,
            bankruptcy_floor: 0.0,
            execution_price: ExecutionPrice::Close,
            episode_start: EpisodeStart::Random,
            series_end: SeriesEnd::Terminate,
            reward: RewardConfig::default(),
            log_steps: false,
            seed: None,
        }
    }
}

impl TradingEnvConfig {
    /// Length of the flat observation vector
    pub fn observation_dim(&self) -> usize {
        PRICE_FEATURES * self.window_size + ACCOUNT_FEATURES
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.initial_balance <= 0.0 {
            errors.push("initial_balance must be positive".to_string());
        }
        if self.max_account_balance <= 0.0
            || self.max_num_shares <= 0.0
            || self.max_share_price <= 0.0
        {
            errors.push("observation scales must be positive".to_string());
        }
        if self.window_size == 0 {
            errors.push("window_size must be at least 1".to_string());
        }
        if self.max_episode_steps == 0 {
            errors.push("max_episode_steps must be at least 1".to_string());
        }
        if !(0.0..1.0).contains(&self.transaction_cost) {
            errors.push("transaction_cost must be in [0, 1)".to_string());
        }
        if self.bankruptcy_floor >= self.initial_balance {
            errors.push("bankruptcy_floor must be below initial_balance".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EpisodeStatus {
    NotStarted,
    Running,
    Done,
}

/// Single-asset trading environment
#[derive(Debug, Clone)]
pub struct StockTradingEnvironment {
    config: TradingEnvConfig,
    series: Arc<PriceSeries>,
    account: Account,
    observation_space: BoxSpace,
    action_space: BoxSpace,
    rng: StdRng,
    /// Index of the bar the next action executes at
    current_step: usize,
    steps_in_episode: usize,
    status: EpisodeStatus,
}

impl StockTradingEnvironment {
    /// Create a new trading environment over `series`
    pub fn new(series: Arc<PriceSeries>, config: TradingEnvConfig) -> EnvResult<Self> {
        config
            .validate()
            .map_err(|errors| EnvError::InvalidConfig(errors.join("; ")))?;

        let required = config.window_size + 1;
        if series.len() < required {
            return Err(EnvError::SeriesTooShort {
                len: series.len(),
                required,
            });
        }

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            account: Account::new(config.initial_balance),
            observation_space: BoxSpace::uniform(config.observation_dim(), 0.0, 1.0),
            action_space: action_space(),
            current_step: config.window_size - 1,
            steps_in_episode: 0,
            status: EpisodeStatus::NotStarted,
            rng,
            series,
            config,
        })
    }

    pub fn config(&self) -> &TradingEnvConfig {
        &self.config
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn steps_in_episode(&self) -> usize {
        self.steps_in_episode
    }

    pub fn is_done(&self) -> bool {
        self.status == EpisodeStatus::Done
    }

    fn first_step(&self) -> usize {
        self.config.window_size - 1
    }

    fn last_step(&self) -> usize {
        self.series.len() - 1
    }

    fn start_step(&mut self) -> usize {
        match self.config.episode_start {
            EpisodeStart::Beginning => self.first_step(),
            // Leave room for at least one step before the end of the series
            EpisodeStart::Random => self.rng.gen_range(self.first_step()..self.last_step()),
        }
    }

    fn execution_price(&mut self) -> f64 {
        let bar = self.series.bar(self.current_step);
        match self.config.execution_price {
            ExecutionPrice::Close => bar.close,
            ExecutionPrice::RandomInBar => {
                let (lo, hi) = (bar.open.min(bar.close), bar.open.max(bar.close));
                if hi > lo {
                    self.rng.gen_range(lo..=hi)
                } else {
                    lo
                }
            }
        }
    }

    /// Compile the price window and account features, scaled into [0, 1]
    fn observation(&self) -> Vec<f32> {
        let cfg = &self.config;
        let window = self.series.window(self.current_step, cfg.window_size);
        let mut obs = Vec::with_capacity(cfg.observation_dim());

        obs.extend(window.iter().map(|b| b.open / cfg.max_share_price));
        obs.extend(window.iter().map(|b| b.high / cfg.max_share_price));
        obs.extend(window.iter().map(|b| b.low / cfg.max_share_price));
        obs.extend(window.iter().map(|b| b.close / cfg.max_share_price));
        obs.extend(window.iter().map(|b| b.volume / cfg.max_num_shares));

        let account = &self.account;
        obs.push(account.balance() / cfg.max_account_balance);
        obs.push(account.max_net_worth() / cfg.max_account_balance);
        obs.push(account.shares_held() / cfg.max_num_shares);
        obs.push(account.cost_basis() / cfg.max_share_price);
        obs.push(account.total_shares_sold() / cfg.max_num_shares);
        obs.push(account.total_sales_value() / (cfg.max_num_shares * cfg.max_share_price));

        obs.into_iter()
            .map(|v| (v as f32).clamp(0.0, 1.0))
            .collect()
    }

    fn info(&self) -> StepInfo {
        StepInfo {
            current_step: self.current_step,
            price: self.account.last_price(),
            balance: self.account.balance(),
            shares_held: self.account.shares_held(),
            net_worth: self.account.net_worth(),
            profit: self.account.profit(),
            num_trades: self.account.num_trades(),
        }
    }

    fn check_can_step(&self) -> EnvResult<()> {
        match self.status {
            EpisodeStatus::Running => Ok(()),
            EpisodeStatus::NotStarted => Err(EnvError::NotReset),
            EpisodeStatus::Done => Err(EnvError::EpisodeDone),
        }
    }
}

impl Environment for StockTradingEnvironment {
    fn reset(&mut self) -> Vec<f32> {
        self.account.reset();
        self.current_step = self.start_step();
        self.steps_in_episode = 0;
        self.status = EpisodeStatus::Running;

        let opening = self.series.bar(self.current_step).close;
        self.account.mark(opening);

        self.observation()
    }

    fn step(&mut self, action: &[f32]) -> EnvResult<StepResult> {
        self.check_can_step()?;
        if let Some(reason) = self.action_space.violation(action) {
            return Err(EnvError::InvalidAction {
                action: action.to_vec(),
                reason,
            });
        }

        let action = TradeAction::from_slice(action);
        let prev_net_worth = self.account.net_worth();
        let price = self.execution_price();
        let fill = self
            .account
            .execute(action, price, self.config.transaction_cost);

        self.steps_in_episode += 1;
        self.current_step += 1;

        let mut end_of_series = false;
        match self.config.series_end {
            SeriesEnd::Terminate => {
                if self.current_step >= self.last_step() {
                    end_of_series = true;
                    let last_close = self.series.bar(self.current_step).close;
                    self.account.mark(last_close);
                }
            }
            SeriesEnd::Wrap => {
                if self.current_step > self.last_step() {
                    self.current_step = self.first_step();
                }
            }
        }

        let reward = self.config.reward.compute(&RewardTransition {
            prev_net_worth,
            net_worth: self.account.net_worth(),
            balance: self.account.balance(),
            current_step: self.current_step,
            trades: usize::from(!fill.is_empty()),
        });

        let bankrupt = self.account.net_worth() <= self.config.bankruptcy_floor;
        let horizon = self.steps_in_episode >= self.config.max_episode_steps;
        let done = bankrupt || horizon || end_of_series;
        if done {
            self.status = EpisodeStatus::Done;
        }

        if self.config.log_steps {
            self.render();
        }

        Ok(StepResult {
            observation: self.observation(),
            reward: reward as f32,
            done,
            truncated: done && !bankrupt,
            info: self.info(),
        })
    }

    fn observation_space(&self) -> &BoxSpace {
        &self.observation_space
    }

    fn action_space(&self) -> &BoxSpace {
        &self.action_space
    }

    fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    fn render(&self) {
        let a = &self.account;
        info!(
            step = self.current_step,
            balance = a.balance(),
            shares_held = a.shares_held(),
            total_sold = a.total_shares_sold(),
            cost_basis = a.cost_basis(),
            total_sales_value = a.total_sales_value(),
            net_worth = a.net_worth(),
            max_net_worth = a.max_net_worth(),
            profit = a.profit(),
            "Account state"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::environment::market::{PriceBar, SyntheticConfig};

    fn flat_series(len: usize, price: f64) -> Arc<PriceSeries> {
        let bars = (0..len)
            .map(|_| PriceBar {
                date: None,
                open: price,
                high: price,
                low: price,
                close: price,
                volume: 1000.0,
            })
            .collect();
        Arc::new(PriceSeries::from_bars(bars).unwrap())
    }

    fn ramp_series(len: usize) -> Arc<PriceSeries> {
        let bars = (0..len)
            .map(|i| {
                let p = 10.0 + i as f64;
                PriceBar {
                    date: None,
                    open: p - 0.5,
                    high: p + 1.0,
                    low: p - 1.0,
                    close: p,
                    volume: 500.0,
                }
            })
            .collect();
        Arc::new(PriceSeries::from_bars(bars).unwrap())
    }

    fn synthetic(len: usize) -> Arc<PriceSeries> {
        Arc::new(
            PriceSeries::synthetic(&SyntheticConfig {
                len,
                ..Default::default()
            })
            .unwrap(),
        )
    }

    fn config() -> TradingEnvConfig {
        TradingEnvConfig {
            initial_balance: 1000.0,
            episode_start: EpisodeStart::Beginning,
            seed: Some(42),
            ..Default::default()
        }
    }

    #[test]
    fn test_env_creation() {
        let env = StockTradingEnvironment::new(ramp_series(50), config()).unwrap();
        assert_eq!(env.observation_space().dim(), 36);
        assert_eq!(env.action_space().dim(), 2);
    }

    #[test]
    fn test_rejects_series_shorter_than_window() {
        let err = StockTradingEnvironment::new(ramp_series(6), config()).unwrap_err();
        assert_eq!(err, EnvError::SeriesTooShort { len: 6, required: 7 });
    }

    #[test]
    fn test_rejects_invalid_config() {
        let err = StockTradingEnvironment::new(
            ramp_series(50),
            TradingEnvConfig {
                window_size: 0,
                ..config()
            },
        )
        .unwrap_err();
        assert!(matches!(err, EnvError::InvalidConfig(msg) if msg.contains("window_size")));
    }

    #[test]
    fn test_env_reset() {
        let mut env = StockTradingEnvironment::new(ramp_series(50), config()).unwrap();
        let obs = env.reset();

        assert_eq!(obs.len(), env.observation_space().dim());
        assert!(env.observation_space().contains(&obs));
        assert!(!env.is_done());
        assert_eq!(env.steps_in_episode(), 0);
        assert_eq!(env.current_step(), 5);
    }

    #[test]
    fn test_step_before_reset_fails() {
        let mut env = StockTradingEnvironment::new(ramp_series(50), config()).unwrap();
        let err = env.step(&TradeAction::hold().to_vec()).unwrap_err();
        assert_eq!(err, EnvError::NotReset);
    }

    #[test]
    fn test_invalid_action_leaves_account_untouched() {
        let mut env = StockTradingEnvironment::new(ramp_series(50), config()).unwrap();
        env.reset();
        let before = env.account().clone();

        for bad in [vec![0.5, 1.5], vec![-0.1, 0.5], vec![0.5], vec![f32::NAN, 0.5]] {
            let err = env.step(&bad).unwrap_err();
            assert!(matches!(err, EnvError::InvalidAction { .. }));
        }
        assert_eq!(env.account(), &before);
        assert_eq!(env.steps_in_episode(), 0);
    }

    #[test]
    fn test_net_worth_invariant_holds_every_step() {
        let mut env = StockTradingEnvironment::new(
            synthetic(300),
            TradingEnvConfig {
                execution_price: ExecutionPrice::RandomInBar,
                transaction_cost: 0.001,
                ..config()
            },
        )
        .unwrap();
        env.reset();

        let actions = [
            TradeAction::buy(0.7),
            TradeAction::hold(),
            TradeAction::sell(0.3),
            TradeAction::buy(1.0),
            TradeAction::sell(1.0),
        ];
        for i in 0..200 {
            let result = env.step(&actions[i % actions.len()].to_vec()).unwrap();
            let a = env.account();
            assert!(a.is_consistent(1e-9));
            assert!(a.balance() >= 0.0);
            assert!(a.shares_held() >= 0.0);
            assert!((result.info.net_worth - (a.balance() + a.shares_held() * a.last_price())).abs() < 1e-6);
            if result.done {
                break;
            }
        }
    }

    #[test]
    fn test_episode_ends_after_exactly_max_steps() {
        let mut env = StockTradingEnvironment::new(
            flat_series(100, 10.0),
            TradingEnvConfig {
                max_episode_steps: 25,
                ..config()
            },
        )
        .unwrap();
        env.reset();

        for i in 1..=25 {
            let result = env.step(&TradeAction::hold().to_vec()).unwrap();
            assert_eq!(result.done, i == 25, "step {i}");
            if result.done {
                assert!(result.truncated);
            }
        }
        assert_eq!(env.step(&TradeAction::hold().to_vec()).unwrap_err(), EnvError::EpisodeDone);
    }

    #[test]
    fn test_episode_ends_at_series_end() {
        let mut env = StockTradingEnvironment::new(ramp_series(20), config()).unwrap();
        env.reset();

        let mut steps = 0;
        loop {
            steps += 1;
            if env.step(&TradeAction::hold().to_vec()).unwrap().done {
                break;
            }
        }
        // From bar 5 to the last bar (19)
        assert_eq!(steps, 14);
        assert_eq!(env.current_step(), 19);
    }

    #[test]
    fn test_final_net_worth_uses_last_bar() {
        let mut env = StockTradingEnvironment::new(ramp_series(20), config()).unwrap();
        env.reset();

        // All-in at bar 5 (close 15), then hold to bar 19 (close 29)
        let mut result = env.step(&TradeAction::buy(1.0).to_vec()).unwrap();
        while !result.done {
            result = env.step(&TradeAction::hold().to_vec()).unwrap();
        }

        let shares = 1000.0 / 15.0;
        assert!((result.info.price - 29.0).abs() < 1e-9);
        assert!((result.info.net_worth - shares * 29.0).abs() < 1e-6);
        assert!(env.account().is_consistent(1e-9));
    }

    #[test]
    fn test_wrap_continues_past_series_end() {
        let mut env = StockTradingEnvironment::new(
            ramp_series(10),
            TradingEnvConfig {
                series_end: SeriesEnd::Wrap,
                max_episode_steps: 30,
                ..config()
            },
        )
        .unwrap();
        env.reset();

        for _ in 0..5 {
            env.step(&TradeAction::hold().to_vec()).unwrap();
        }
        assert_eq!(env.current_step(), 5);
        for _ in 0..24 {
            assert!(!env.step(&TradeAction::hold().to_vec()).unwrap().done);
        }
        assert!(env.step(&TradeAction::hold().to_vec()).unwrap().done);
    }

    #[test]
    fn test_bankruptcy_terminates() {
        let bars = vec![100.0, 100.0, 1.0, 1.0, 1.0, 1.0]
            .into_iter()
            .map(|p| PriceBar {
                date: None,
                open: p,
                high: p,
                low: p,
                close: p,
                volume: 1.0,
            })
            .collect();
        let series = Arc::new(PriceSeries::from_bars(bars).unwrap());
        let mut env = StockTradingEnvironment::new(
            series,
            TradingEnvConfig {
                window_size: 1,
                bankruptcy_floor: 500.0,
                ..config()
            },
        )
        .unwrap();
        env.reset();

        assert!(!env.step(&TradeAction::buy(1.0).to_vec()).unwrap().done);
        assert!(!env.step(&TradeAction::hold().to_vec()).unwrap().done);
        let result = env.step(&TradeAction::hold().to_vec()).unwrap();
        assert!(result.done);
        assert!(!result.truncated);
        assert!(result.info.net_worth <= 500.0);
    }

    #[test]
    fn test_net_worth_delta_reward() {
        let mut env = StockTradingEnvironment::new(ramp_series(50), config()).unwrap();
        env.reset();
        // Buy everything at 15, then the hold is valued at 16
        let r1 = env.step(&TradeAction::buy(1.0).to_vec()).unwrap();
        assert!(r1.reward.abs() < 1e-3);
        let r2 = env.step(&TradeAction::hold().to_vec()).unwrap();
        let expected = 1000.0 / 15.0;
        assert!((r2.reward - expected as f32).abs() < 1e-2);
    }

    #[test]
    fn test_same_seed_same_trajectory() {
        let cfg = TradingEnvConfig {
            episode_start: EpisodeStart::Random,
            execution_price: ExecutionPrice::RandomInBar,
            ..config()
        };
        let series = synthetic(400);
        let actions: Vec<Vec<f32>> = (0..100)
            .map(|i| vec![(i % 3) as f32 + 0.5, ((i * 7) % 10) as f32 / 10.0])
            .collect();

        let run = || {
            let mut env = StockTradingEnvironment::new(series.clone(), cfg.clone()).unwrap();
            let mut trajectory = vec![env.reset()];
            let mut rewards = Vec::new();
            for a in &actions {
                let result = env.step(a).unwrap();
                trajectory.push(result.observation);
                rewards.push(result.reward);
                if result.done {
                    break;
                }
            }
            (trajectory, rewards)
        };

        assert_eq!(run(), run());
    }

    #[test]
    fn test_config_validation() {
        assert!(TradingEnvConfig::default().validate().is_ok());
        let errors = TradingEnvConfig {
            window_size: 0,
            transaction_cost: 1.5,
            ..Default::default()
        }
        .validate()
        .unwrap_err();
        assert_eq!(errors.len(), 2);
    }
}

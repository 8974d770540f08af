//! Reinforcement Learning Module
//!
//! A stock trading environment and a PPO trainer that learns to trade it.
//!
//! # Features
//!
//! - **Environment**: Gym-style single-asset trading over OHLCV bars
//! - **Action Space**: Continuous `[action_type, amount]` box
//! - **Algorithms**: PPO (Proximal Policy Optimization) with GAE
//! - **Training**: Parallel rollout workers, checkpointing and restore

pub mod algorithms;
pub mod config;
pub mod core;
pub mod environment;
pub mod memory;
pub mod networks;
pub mod training;

// Config exports
pub use config::{PPOConfig, RLConfig, TrainingConfig};

// Core exports
pub use core::{
    action_space, ActionKind, BoxSpace, RewardConfig, RewardFunction, RewardScheme,
    RewardTransition, TradeAction, ACTION_DIM,
};

// Environment exports
pub use environment::{
    Environment, EnvRegistry, PriceSeries, StepInfo, StepResult, StockTradingEnvironment,
    TradingEnvConfig, DEFAULT_ENV_NAME,
};

// Training exports
pub use training::{Experiment, ExperimentSummary, Trainer, TrainingResult};

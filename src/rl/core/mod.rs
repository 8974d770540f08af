//! Core RL abstractions
//!
//! Fundamental types for spaces, actions, and rewards.

pub mod action;
pub mod reward;
pub mod space;

pub use action::{action_space, ActionKind, TradeAction, ACTION_DIM};
pub use reward::{RewardConfig, RewardFunction, RewardScheme, RewardTransition};
pub use space::BoxSpace;

//! RL Algorithms
//!
//! Implementations of reinforcement learning algorithms.

pub mod ppo;

pub use ppo::{create_optimizer, OptimizerRecord, PPOOutput, PPOTrainer, PolicyOptimizer};

//! Actor Network (Policy)
//!
//! Diagonal Gaussian policy head: two tanh hidden layers produce the action
//! mean, and a learned state-independent vector holds the log standard
//! deviation.

use burn::module::Param;
use burn::nn::{Initializer, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::tanh;

use crate::rl::core::BoxSpace;

pub const LOG_STD_MIN: f32 = -5.0;
pub const LOG_STD_MAX: f32 = 2.0;

/// Gain of the mean head initializer; keeps the initial mean near its bias
const MEAN_HEAD_GAIN: f64 = 0.01;

/// Actor network configuration
#[derive(Config, Debug)]
pub struct ActorConfig {
    /// Observation features
    pub obs_dim: usize,
    /// Hidden layer width
    #[config(default = "64")]
    pub hidden_dim: usize,
}

/// Gaussian actor for continuous action spaces (PPO)
#[derive(Module, Debug)]
pub struct Actor<B: Backend> {
    fc1: Linear<B>,
    fc2: Linear<B>,
    mean_head: Linear<B>,
    log_std: Param<Tensor<B, 1>>,
}

impl ActorConfig {
    /// Initialize an actor whose mean starts at the center of
    /// `action_space` with a standard deviation of a quarter of its width
    pub fn init<B: Backend>(&self, action_space: &BoxSpace, device: &B::Device) -> Actor<B> {
        let action_dim = action_space.dim();
        let bounds = action_space.low().iter().zip(action_space.high());

        let center: Vec<f32> = bounds.clone().map(|(lo, hi)| 0.5 * (lo + hi)).collect();
        let log_std: Vec<f32> = bounds
            .map(|(lo, hi)| (0.25 * (hi - lo)).max(1e-3).ln().clamp(LOG_STD_MIN, LOG_STD_MAX))
            .collect();

        let mut mean_head = LinearConfig::new(self.hidden_dim, action_dim)
            .with_initializer(Initializer::XavierUniform {
                gain: MEAN_HEAD_GAIN,
            })
            .init(device);
        mean_head.bias = Some(Param::from_tensor(Tensor::from_floats(
            center.as_slice(),
            device,
        )));

        Actor {
            fc1: LinearConfig::new(self.obs_dim, self.hidden_dim).init(device),
            fc2: LinearConfig::new(self.hidden_dim, self.hidden_dim).init(device),
            mean_head,
            log_std: Param::from_tensor(Tensor::from_floats(log_std.as_slice(), device)),
        }
    }
}

impl<B: Backend> Actor<B> {
    /// Action means, `[batch, action_dim]`
    pub fn forward(&self, obs: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = tanh(self.fc1.forward(obs));
        let x = tanh(self.fc2.forward(x));
        self.mean_head.forward(x)
    }

    /// Log standard deviation, clamped for numerical stability
    pub fn log_std(&self) -> Tensor<B, 1> {
        self.log_std.val().clamp(LOG_STD_MIN, LOG_STD_MAX)
    }
}

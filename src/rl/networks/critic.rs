//! Critic Network (Value Function)

use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::tanh;

/// Critic network configuration
#[derive(Config, Debug)]
pub struct CriticConfig {
    /// Observation features
    pub obs_dim: usize,
    /// Hidden layer width
    #[config(default = "64")]
    pub hidden_dim: usize,
}

/// Value Critic (V-function)
///
/// Estimates the expected return from a state.
#[derive(Module, Debug)]
pub struct Critic<B: Backend> {
    fc1: Linear<B>,
    fc2: Linear<B>,
    value_head: Linear<B>,
}

impl CriticConfig {
    /// Initialize critic network
    pub fn init<B: Backend>(&self, device: &B::Device) -> Critic<B> {
        Critic {
            fc1: LinearConfig::new(self.obs_dim, self.hidden_dim).init(device),
            fc2: LinearConfig::new(self.hidden_dim, self.hidden_dim).init(device),
            value_head: LinearConfig::new(self.hidden_dim, 1).init(device),
        }
    }
}

impl<B: Backend> Critic<B> {
    /// Forward pass returning `[batch, 1]` state values
    pub fn forward(&self, obs: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = tanh(self.fc1.forward(obs));
        let x = tanh(self.fc2.forward(x));
        self.value_head.forward(x)
    }

    /// Get value as scalar per batch element
    pub fn value(&self, obs: Tensor<B, 2>) -> Tensor<B, 1> {
        self.forward(obs).squeeze(1)
    }
}

//! Neural Network Architectures
//!
//! Actor and Critic networks for the PPO policy.

pub mod actor;
pub mod critic;
pub mod policy;

pub use actor::{Actor, ActorConfig, LOG_STD_MAX, LOG_STD_MIN};
pub use critic::{Critic, CriticConfig};
pub use policy::{
    gaussian_entropy, gaussian_log_prob, ActorCritic, ActorCriticConfig, InferenceBackend,
    LearnerBackend, PolicySnapshot, PolicyStep,
};

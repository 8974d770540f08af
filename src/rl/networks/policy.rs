//! Actor-Critic Policy
//!
//! Diagonal Gaussian policy over a box action space with a separate value
//! network. The learner trains an [`ActorCritic`] on the autodiff backend;
//! rollout workers act with a [`PolicySnapshot`], an autodiff-free copy of
//! the weights.

use burn::backend::Autodiff;
use burn::prelude::*;
use burn_ndarray::{NdArray, NdArrayDevice};
use rand::Rng;
use rand_distr::StandardNormal;

use super::actor::{Actor, ActorConfig};
use super::critic::{Critic, CriticConfig};
use crate::rl::core::BoxSpace;

/// Backend rollout workers and evaluation run on
pub type InferenceBackend = NdArray<f32>;
/// Backend the PPO learner differentiates through
pub type LearnerBackend = Autodiff<InferenceBackend>;

const HALF_LN_2PI: f32 = 0.918_938_5;

/// Actor-critic configuration, saved next to every checkpoint
#[derive(Config, Debug)]
pub struct ActorCriticConfig {
    /// Observation features
    pub obs_dim: usize,
    /// Bounds the policy acts in
    pub action_space: BoxSpace,
    /// Width of the two hidden layers in both networks
    #[config(default = "64")]
    pub hidden_dim: usize,
}

impl ActorCriticConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ActorCritic<B> {
        ActorCritic {
            actor: ActorConfig::new(self.obs_dim)
                .with_hidden_dim(self.hidden_dim)
                .init(&self.action_space, device),
            critic: CriticConfig::new(self.obs_dim)
                .with_hidden_dim(self.hidden_dim)
                .init(device),
        }
    }

    /// Check a policy built from this config fits an environment's spaces
    pub fn check_compatible(&self, obs_dim: usize, action_space: &BoxSpace) -> Result<(), String> {
        if self.obs_dim != obs_dim {
            return Err(format!(
                "policy expects {} observation features, environment provides {obs_dim}",
                self.obs_dim
            ));
        }
        if &self.action_space != action_space {
            return Err("policy action space differs from environment".to_string());
        }
        Ok(())
    }
}

/// Gaussian actor plus value critic
#[derive(Module, Debug)]
pub struct ActorCritic<B: Backend> {
    pub actor: Actor<B>,
    pub critic: Critic<B>,
}

/// Log density of each row of `actions` under a diagonal Gaussian
pub fn gaussian_log_prob<B: Backend>(
    mean: Tensor<B, 2>,
    log_std: Tensor<B, 1>,
    actions: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let log_std = log_std.unsqueeze::<2>();
    let z = (actions - mean) / log_std.clone().exp();
    let per_dim = z.powf_scalar(2.0).mul_scalar(-0.5) - log_std;
    per_dim.sub_scalar(HALF_LN_2PI).sum_dim(1).squeeze(1)
}

/// Entropy of a diagonal Gaussian, as a one-element tensor
pub fn gaussian_entropy<B: Backend>(log_std: Tensor<B, 1>) -> Tensor<B, 1> {
    log_std.add_scalar(0.5 + HALF_LN_2PI).sum()
}

/// Output of [`PolicySnapshot::act`]
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyStep {
    /// Raw Gaussian sample, the value the log probability refers to
    pub action: Vec<f32>,
    /// `action` clipped into the action space, what the environment receives
    pub env_action: Vec<f32>,
    pub log_prob: f32,
    /// Critic estimate for the observation
    pub value: f32,
}

/// Read-only policy for acting one observation at a time
#[derive(Debug, Clone)]
pub struct PolicySnapshot {
    model: ActorCritic<InferenceBackend>,
    action_space: BoxSpace,
    log_std: Vec<f32>,
    device: NdArrayDevice,
}

impl PolicySnapshot {
    pub fn new(model: ActorCritic<InferenceBackend>, action_space: BoxSpace) -> Self {
        let log_std = to_vec(model.actor.log_std());
        Self {
            model,
            action_space,
            log_std,
            device: NdArrayDevice::Cpu,
        }
    }

    pub fn action_space(&self) -> &BoxSpace {
        &self.action_space
    }

    pub fn log_std(&self) -> &[f32] {
        &self.log_std
    }

    fn row(&self, values: &[f32]) -> Tensor<InferenceBackend, 2> {
        Tensor::<InferenceBackend, 1>::from_floats(values, &self.device).unsqueeze()
    }

    pub fn mean(&self, obs: &[f32]) -> Vec<f32> {
        to_vec(self.model.actor.forward(self.row(obs)))
    }

    pub fn value(&self, obs: &[f32]) -> f32 {
        self.model.critic.value(self.row(obs)).into_scalar()
    }

    /// Sample an action for `obs`
    pub fn act<R: Rng + ?Sized>(&self, obs: &[f32], rng: &mut R) -> PolicyStep {
        let x = self.row(obs);
        let mean = self.model.actor.forward(x.clone());
        let action: Vec<f32> = to_vec(mean.clone())
            .iter()
            .zip(&self.log_std)
            .map(|(m, ls)| {
                let z: f32 = rng.sample(StandardNormal);
                m + ls.exp() * z
            })
            .collect();

        let log_prob =
            gaussian_log_prob(mean, self.model.actor.log_std(), self.row(&action)).into_scalar();

        PolicyStep {
            env_action: self.action_space.clip(&action),
            log_prob,
            value: self.model.critic.value(x).into_scalar(),
            action,
        }
    }

    /// Mean action clipped into the action space
    pub fn deterministic_action(&self, obs: &[f32]) -> Vec<f32> {
        self.action_space.clip(&self.mean(obs))
    }
}

fn to_vec<const D: usize>(tensor: Tensor<InferenceBackend, D>) -> Vec<f32> {
    tensor.into_data().iter::<f32>().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::core::action_space;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn snapshot() -> PolicySnapshot {
        let config = ActorCriticConfig::new(8, action_space()).with_hidden_dim(16);
        PolicySnapshot::new(config.init::<InferenceBackend>(&NdArrayDevice::Cpu), action_space())
    }

    #[test]
    fn test_initial_policy_is_centered() {
        let p = snapshot();
        let mean = p.mean(&[0.5; 8]);
        assert!((mean[0] - 1.5).abs() < 0.1);
        assert!((mean[1] - 0.5).abs() < 0.1);
    }

    #[test]
    fn test_env_action_is_always_in_space() {
        let p = snapshot();
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..200 {
            let step = p.act(&[0.2; 8], &mut rng);
            assert!(p.action_space().contains(&step.env_action));
            assert!(step.log_prob.is_finite());
            assert!(step.value.is_finite());
        }
    }

    #[test]
    fn test_log_prob_of_standard_normal() {
        let device = NdArrayDevice::Cpu;
        let mean = Tensor::<InferenceBackend, 2>::from_floats([[0.0], [1.0]], &device);
        let actions = Tensor::<InferenceBackend, 2>::from_floats([[0.0], [2.0]], &device);
        let log_std = Tensor::<InferenceBackend, 1>::from_floats([0.0], &device);

        let lp = to_vec(gaussian_log_prob(mean, log_std, actions));
        assert!((lp[0] + HALF_LN_2PI).abs() < 1e-6);
        assert!((lp[1] + 0.5 + HALF_LN_2PI).abs() < 1e-6);
    }

    #[test]
    fn test_sampled_log_prob_matches_density() {
        let p = snapshot();
        let mut rng = StdRng::seed_from_u64(3);
        let obs = [0.1; 8];
        let step = p.act(&obs, &mut rng);

        let expected: f32 = p
            .mean(&obs)
            .iter()
            .zip(p.log_std())
            .zip(&step.action)
            .map(|((m, ls), a)| {
                let z = (a - m) / ls.exp();
                -0.5 * z * z - ls - HALF_LN_2PI
            })
            .sum();
        assert!((step.log_prob - expected).abs() < 1e-4);
    }

    #[test]
    fn test_compatibility_check() {
        let config = ActorCriticConfig::new(8, action_space());
        assert!(config.check_compatible(8, &action_space()).is_ok());
        assert!(config.check_compatible(9, &action_space()).is_err());
        assert!(config
            .check_compatible(8, &BoxSpace::uniform(2, 0.0, 1.0))
            .is_err());
    }
}

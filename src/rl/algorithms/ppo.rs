//! Proximal Policy Optimization (PPO)
//!
//! Clipped-surrogate PPO learner over an [`ActorCritic`] policy, with an
//! entropy bonus, value loss, gradient-norm clipping and KL-based early
//! stopping of the update epochs.

use burn::grad_clipping::GradientClippingConfig;
use burn::module::AutodiffModule;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use crate::rl::config::PPOConfig;
use crate::rl::core::BoxSpace;
use crate::rl::memory::SampleBatch;
use crate::rl::networks::{
    gaussian_entropy, gaussian_log_prob, ActorCritic, ActorCriticConfig, InferenceBackend,
    LearnerBackend, PolicySnapshot,
};

/// Adam over the whole actor-critic
pub type PolicyOptimizer =
    OptimizerAdaptor<Adam<InferenceBackend>, ActorCritic<LearnerBackend>, LearnerBackend>;

/// Saved Adam moments, keyed by parameter id
pub type OptimizerRecord =
    <PolicyOptimizer as Optimizer<ActorCritic<LearnerBackend>, LearnerBackend>>::Record;

/// PPO Training output
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PPOOutput {
    /// Policy loss
    pub policy_loss: f32,
    /// Value loss
    pub value_loss: f32,
    /// Entropy of the policy after the update
    pub entropy: f32,
    /// KL divergence between the behaviour and updated policy
    pub approx_kl: f32,
    /// Clip fraction (diagnostic)
    pub clip_fraction: f32,
    /// Epochs completed before early stopping
    pub epochs: usize,
    /// Samples trained on
    pub num_samples: usize,
}

#[derive(Debug, Default)]
struct MinibatchStats {
    policy_loss: f32,
    value_loss: f32,
    kl: f32,
    clipped: usize,
    samples: usize,
}

impl MinibatchStats {
    fn add(&mut self, other: &MinibatchStats) {
        self.policy_loss += other.policy_loss;
        self.value_loss += other.value_loss;
        self.kl += other.kl;
        self.clipped += other.clipped;
        self.samples += other.samples;
    }
}

/// Create the learner's Adam optimizer with gradient-norm clipping
pub fn create_optimizer(config: &PPOConfig) -> PolicyOptimizer {
    AdamConfig::new()
        .with_epsilon(1e-5)
        .with_grad_clipping(Some(GradientClippingConfig::Norm(config.max_grad_norm)))
        .init()
}

/// PPO learner
///
/// Owns the policy and its optimizer state. Rollout workers receive
/// read-only copies through [`PPOTrainer::policy_snapshot`].
pub struct PPOTrainer {
    /// Configuration
    config: PPOConfig,
    policy_config: ActorCriticConfig,
    policy: ActorCritic<LearnerBackend>,
    optimizer: PolicyOptimizer,
    device: <LearnerBackend as Backend>::Device,
    /// Minibatch shuffling
    rng: StdRng,
    /// Training step counter
    step_count: usize,
}

impl PPOTrainer {
    /// Create a new PPO trainer with a freshly initialized policy
    pub fn new(config: PPOConfig, obs_dim: usize, action_space: &BoxSpace, seed: u64) -> Self {
        let device = Default::default();
        LearnerBackend::seed(seed);
        let policy_config =
            ActorCriticConfig::new(obs_dim, action_space.clone()).with_hidden_dim(config.hidden_dim);
        let policy = policy_config.init(&device);
        let optimizer = create_optimizer(&config);
        Self {
            config,
            policy_config,
            policy,
            optimizer,
            device,
            rng: StdRng::seed_from_u64(seed),
            step_count: 0,
        }
    }

    /// Resume from a saved policy and optimizer state
    pub fn from_parts(
        config: PPOConfig,
        policy_config: ActorCriticConfig,
        policy: ActorCritic<LearnerBackend>,
        optimizer: OptimizerRecord,
        step_count: usize,
        seed: u64,
    ) -> Self {
        let optimizer = create_optimizer(&config).load_record(optimizer);
        Self {
            config,
            policy_config,
            policy,
            optimizer,
            device: Default::default(),
            rng: StdRng::seed_from_u64(seed.wrapping_add(step_count as u64)),
            step_count,
        }
    }

    pub fn policy(&self) -> &ActorCritic<LearnerBackend> {
        &self.policy
    }

    pub fn policy_config(&self) -> &ActorCriticConfig {
        &self.policy_config
    }

    /// Autodiff-free copy of the current weights for acting
    pub fn policy_snapshot(&self) -> PolicySnapshot {
        PolicySnapshot::new(self.policy.valid(), self.policy_config.action_space.clone())
    }

    pub fn optimizer_record(&self) -> OptimizerRecord {
        self.optimizer.to_record()
    }

    /// Train on a batch of experiences
    pub fn train_step(&mut self, batch: &mut SampleBatch) -> PPOOutput {
        self.step_count += 1;
        if batch.is_empty() {
            return PPOOutput::default();
        }
        batch.normalize_advantages();

        let lr = f64::from(self.config.lr);
        let mut policy = self.policy.clone();
        let mut totals = MinibatchStats::default();
        let mut epochs = 0;

        for epoch in 0..self.config.n_epochs {
            let mut epoch_stats = MinibatchStats::default();

            for indices in batch.minibatch_indices(self.config.batch_size, &mut self.rng) {
                let (loss, stats) = self.minibatch_loss(&policy, batch, &indices);
                let grads = GradientsParams::from_grads(loss.backward(), &policy);
                policy = self.optimizer.step(lr, policy, grads);
                epoch_stats.add(&stats);
            }
            epochs += 1;

            let epoch_kl = epoch_stats.kl / epoch_stats.samples.max(1) as f32;
            totals.add(&epoch_stats);

            if let Some(target) = self.config.target_kl {
                if epoch_kl > 1.5 * target {
                    debug!(epoch, kl = epoch_kl, target, "Early stopping PPO epochs");
                    break;
                }
            }
        }
        self.policy = policy;

        let entropy = gaussian_entropy(self.policy.actor.log_std())
            .into_scalar()
            .elem::<f32>();
        let n = totals.samples.max(1) as f32;
        PPOOutput {
            policy_loss: totals.policy_loss / n,
            value_loss: totals.value_loss / n,
            entropy,
            approx_kl: totals.kl / n,
            clip_fraction: totals.clipped as f32 / n,
            epochs,
            num_samples: batch.len(),
        }
    }

    /// Mean PPO loss over one minibatch, with per-sample diagnostics summed
    fn minibatch_loss(
        &self,
        policy: &ActorCritic<LearnerBackend>,
        batch: &SampleBatch,
        indices: &[usize],
    ) -> (Tensor<LearnerBackend, 1>, MinibatchStats) {
        let cfg = &self.config;
        let m = indices.len();

        let obs = self.rows(&batch.observations, indices);
        let actions = self.rows(&batch.actions, indices);
        let old_log_probs = self.column(&batch.log_probs, indices);
        let advantages = self.column(&batch.advantages, indices);
        let returns = self.column(&batch.returns, indices);

        // Policy
        let log_std = policy.actor.log_std();
        let log_prob = gaussian_log_prob(policy.actor.forward(obs.clone()), log_std.clone(), actions);
        let log_ratio = log_prob - old_log_probs;
        let ratio = log_ratio.clone().exp();
        let surrogate = ratio.clone() * advantages.clone();
        let clipped_surrogate =
            ratio.clone().clamp(1.0 - cfg.clip_range, 1.0 + cfg.clip_range) * advantages;
        let policy_loss = surrogate.min_pair(clipped_surrogate).neg().mean();

        // Value
        let sq_err = (policy.critic.value(obs) - returns).powf_scalar(2.0);
        let sq_err = match cfg.vf_clip_param {
            Some(clip) => sq_err.clamp_max(clip),
            None => sq_err,
        };
        let value_loss = sq_err.mean().mul_scalar(0.5);

        let loss = policy_loss.clone() + value_loss.clone().mul_scalar(cfg.vf_coef)
            - gaussian_entropy(log_std).mul_scalar(cfg.ent_coef);

        let ratio = host_vec(ratio);
        let log_ratio = host_vec(log_ratio);
        let clipped = ratio
            .iter()
            .zip(indices)
            .filter(|&(&r, &i)| {
                let adv = batch.advantages[i];
                (adv > 0.0 && r > 1.0 + cfg.clip_range) || (adv < 0.0 && r < 1.0 - cfg.clip_range)
            })
            .count();
        let stats = MinibatchStats {
            policy_loss: policy_loss.into_scalar().elem::<f32>() * m as f32,
            value_loss: value_loss.into_scalar().elem::<f32>() * m as f32,
            kl: ratio
                .iter()
                .zip(&log_ratio)
                .map(|(r, lr)| (r - 1.0) - lr)
                .sum(),
            clipped,
            samples: m,
        };

        (loss, stats)
    }

    /// Stack the selected rows into a `[indices.len(), width]` tensor
    fn rows(&self, source: &[Vec<f32>], indices: &[usize]) -> Tensor<LearnerBackend, 2> {
        let width = indices.first().map_or(0, |&i| source[i].len());
        let flat: Vec<f32> = indices
            .iter()
            .flat_map(|&i| source[i].iter().copied())
            .collect();
        Tensor::<LearnerBackend, 1>::from_floats(flat.as_slice(), &self.device)
            .reshape([indices.len(), width])
    }

    fn column(&self, source: &[f32], indices: &[usize]) -> Tensor<LearnerBackend, 1> {
        let values: Vec<f32> = indices.iter().map(|&i| source[i]).collect();
        Tensor::from_floats(values.as_slice(), &self.device)
    }

    /// Get training step count
    pub fn step_count(&self) -> usize {
        self.step_count
    }

    /// Get configuration
    pub fn config(&self) -> &PPOConfig {
        &self.config
    }
}

fn host_vec(tensor: Tensor<LearnerBackend, 1>) -> Vec<f32> {
    tensor.into_data().iter::<f32>().collect()
}

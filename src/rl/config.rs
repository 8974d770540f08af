//! RL Configuration
//!
//! Configuration structs for the PPO learner and the training loop.

use serde::{Deserialize, Serialize};

use super::environment::DEFAULT_ENV_NAME;

/// Main RL configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RLConfig {
    /// PPO algorithm configuration
    pub ppo: PPOConfig,
    /// Training configuration
    pub training: TrainingConfig,
}

impl RLConfig {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if let Err(e) = self.ppo.validate() {
            errors.extend(e);
        }
        if let Err(e) = self.training.validate() {
            errors.extend(e);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// PPO algorithm hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PPOConfig {
    /// Learning rate
    pub lr: f32,
    /// Discount factor (gamma)
    pub gamma: f32,
    /// GAE lambda
    pub gae_lambda: f32,
    /// PPO clip range
    pub clip_range: f32,
    /// Value function coefficient
    pub vf_coef: f32,
    /// Squared value error above which the value loss stops contributing
    /// gradient; `None` disables the clip
    pub vf_clip_param: Option<f32>,
    /// Entropy bonus coefficient
    pub ent_coef: f32,
    /// Number of PPO epochs per update
    pub n_epochs: usize,
    /// Mini-batch size
    pub batch_size: usize,
    /// Target KL divergence for early stopping
    pub target_kl: Option<f32>,
    /// Maximum gradient norm for clipping
    pub max_grad_norm: f32,
    /// Width of the two hidden layers in the policy and value networks
    pub hidden_dim: usize,
}

impl Default for PPOConfig {
    fn default() -> Self {
        Self {
            lr: 3e-4,
            gamma: 0.99,
            gae_lambda: 0.95,
            clip_range: 0.2,
            vf_coef: 0.5,
            vf_clip_param: None,
            ent_coef: 0.01,
            n_epochs: 10,
            batch_size: 64,
            target_kl: Some(0.015),
            max_grad_norm: 0.5,
            hidden_dim: 64,
        }
    }
}

impl PPOConfig {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.lr.is_nan() || self.lr <= 0.0 {
            errors.push("ppo.lr must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            errors.push("ppo.gamma must be in [0, 1]".to_string());
        }
        if !(0.0..=1.0).contains(&self.gae_lambda) {
            errors.push("ppo.gae_lambda must be in [0, 1]".to_string());
        }
        if self.clip_range <= 0.0 {
            errors.push("ppo.clip_range must be positive".to_string());
        }
        if self.n_epochs == 0 {
            errors.push("ppo.n_epochs must be at least 1".to_string());
        }
        if self.batch_size == 0 {
            errors.push("ppo.batch_size must be at least 1".to_string());
        }
        if self.hidden_dim == 0 {
            errors.push("ppo.hidden_dim must be at least 1".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Training loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Registered environment to train on
    pub env_name: String,
    /// Experiment name, used as the checkpoint subdirectory
    pub experiment_name: String,
    /// Parallel rollout workers; 0 samples on the driver
    pub num_workers: usize,
    /// Accelerators requested for the learner
    pub num_gpus: usize,
    /// Environment steps collected per iteration across all workers
    pub train_batch_size: usize,
    /// Stop after this many training iterations
    pub iterations: usize,
    /// Checkpoint every N iterations (0 disables periodic checkpoints)
    pub checkpoint_freq: usize,
    /// Always checkpoint after the last iteration
    pub checkpoint_at_end: bool,
    /// Retain only the best N checkpoints by mean episode reward
    pub keep_checkpoints_num: usize,
    /// Path for saving checkpoints
    pub checkpoint_dir: String,
    /// Recreate failed workers instead of aborting the run
    pub ignore_worker_failures: bool,
    /// Base seed; worker `i` seeds its environment and sampler from `seed + i`
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            env_name: DEFAULT_ENV_NAME.to_string(),
            experiment_name: DEFAULT_ENV_NAME.to_string(),
            num_workers: 1,
            num_gpus: 0,
            train_batch_size: 4000,
            iterations: 10_000,
            checkpoint_freq: 3,
            checkpoint_at_end: true,
            keep_checkpoints_num: 50,
            checkpoint_dir: "./checkpoints".to_string(),
            ignore_worker_failures: true,
            seed: 0,
        }
    }
}

impl TrainingConfig {
    /// Steps each worker collects per iteration
    pub fn rollout_fragment_length(&self) -> usize {
        self.train_batch_size.div_ceil(self.num_workers.max(1))
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.env_name.is_empty() {
            errors.push("training.env_name must not be empty".to_string());
        }
        if self.experiment_name.is_empty() {
            errors.push("training.experiment_name must not be empty".to_string());
        }
        if self.train_batch_size == 0 {
            errors.push("training.train_batch_size must be at least 1".to_string());
        }
        if self.keep_checkpoints_num == 0 {
            errors.push("training.keep_checkpoints_num must be at least 1".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(RLConfig::default().validate().is_ok());
    }

    #[test]
    fn test_fragment_length_splits_batch() {
        let cfg = TrainingConfig {
            num_workers: 3,
            train_batch_size: 4000,
            ..Default::default()
        };
        assert_eq!(cfg.rollout_fragment_length(), 1334);

        let inline = TrainingConfig {
            num_workers: 0,
            ..Default::default()
        };
        assert_eq!(inline.rollout_fragment_length(), 4000);
    }

    #[test]
    fn test_validation_collects_errors() {
        let cfg = RLConfig {
            ppo: PPOConfig {
                lr: 0.0,
                batch_size: 0,
                ..Default::default()
            },
            training: TrainingConfig {
                train_batch_size: 0,
                ..Default::default()
            },
        };
        assert_eq!(cfg.validate().unwrap_err().len(), 3);
    }
}

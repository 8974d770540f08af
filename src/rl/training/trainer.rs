//! Training Loop
//!
//! Orchestrates the RL training process: one iteration samples
//! `train_batch_size` steps from the rollout workers in parallel, then runs a
//! PPO update on the driver.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::checkpointing::TrainerState;
use super::resources::{allocate, Allocation, AvailableResources};
use super::worker::{EpisodeResult, RolloutWorker, WorkerOutput};
use crate::error::{Result, TrainError, TraderError};
use crate::rl::algorithms::{PPOOutput, PPOTrainer};
use crate::rl::config::RLConfig;
use crate::rl::core::BoxSpace;
use crate::rl::environment::EnvRegistry;
use crate::rl::memory::SampleBatch;
use crate::rl::networks::PolicySnapshot;

/// Episodes averaged into the reported episode statistics
const METRICS_WINDOW: usize = 100;

/// Seed stride between successive incarnations of a worker
const RESTART_SEED_STRIDE: u64 = 1_000_003;

/// Statistics for one training iteration
#[derive(Debug, Clone, Serialize)]
pub struct TrainingResult {
    pub iteration: usize,
    pub timesteps_this_iter: usize,
    pub timesteps_total: u64,
    pub episodes_this_iter: usize,
    pub episodes_total: usize,
    /// Mean total reward over the last completed episodes, `None` before the
    /// first episode finishes
    pub episode_reward_mean: Option<f64>,
    pub episode_reward_min: Option<f64>,
    pub episode_reward_max: Option<f64>,
    pub episode_len_mean: Option<f64>,
    pub policy_loss: f32,
    pub value_loss: f32,
    pub entropy: f32,
    pub approx_kl: f32,
    pub clip_fraction: f32,
    pub num_healthy_workers: usize,
    pub num_worker_restarts: usize,
    #[serde(with = "duration_secs")]
    pub time_this_iter: Duration,
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}

/// Summary of a window of episodes
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EpisodeStats {
    pub reward_mean: Option<f64>,
    pub reward_min: Option<f64>,
    pub reward_max: Option<f64>,
    pub len_mean: Option<f64>,
}

/// Calculate summary statistics over completed episodes
pub fn summarize_episodes<'a>(episodes: impl IntoIterator<Item = &'a EpisodeResult>) -> EpisodeStats {
    let mut n = 0usize;
    let mut reward_sum = 0.0;
    let mut len_sum = 0.0;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;

    for ep in episodes {
        let r = f64::from(ep.total_reward);
        n += 1;
        reward_sum += r;
        len_sum += ep.length as f64;
        min = min.min(r);
        max = max.max(r);
    }

    if n == 0 {
        return EpisodeStats::default();
    }
    EpisodeStats {
        reward_mean: Some(reward_sum / n as f64),
        reward_min: Some(min),
        reward_max: Some(max),
        len_mean: Some(len_sum / n as f64),
    }
}

/// PPO trainer over parallel rollout workers
pub struct Trainer {
    config: RLConfig,
    registry: EnvRegistry,
    learner: PPOTrainer,
    /// Remote workers; a slot is empty only while its worker is sampling
    workers: Vec<Option<RolloutWorker>>,
    /// Driver-side worker used when `num_workers == 0`
    local_worker: Option<RolloutWorker>,
    observation_dim: usize,
    action_space: BoxSpace,
    allocation: Allocation,
    iteration: usize,
    timesteps_total: u64,
    episodes_total: usize,
    recent_episodes: VecDeque<EpisodeResult>,
    worker_restarts: usize,
}

impl std::fmt::Debug for Trainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trainer")
            .field("env", &self.config.training.env_name)
            .field("iteration", &self.iteration)
            .field("num_workers", &self.workers.len())
            .finish()
    }
}

impl Trainer {
    /// Build a trainer on the host's detected resources
    pub fn new(config: RLConfig, registry: EnvRegistry) -> Result<Self> {
        Self::with_resources(config, registry, AvailableResources::detect())
    }

    pub fn with_resources(
        config: RLConfig,
        registry: EnvRegistry,
        available: AvailableResources,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|errors| TraderError::InvalidConfig(errors.join("; ")))?;

        let training = &config.training;
        let allocation = allocate(training.num_workers, training.num_gpus, available)?;

        let mut workers = Vec::with_capacity(allocation.num_workers);
        for index in 0..allocation.num_workers {
            let seed = training.seed.wrapping_add(index as u64);
            workers.push(Some(RolloutWorker::new(
                index,
                &registry,
                &training.env_name,
                seed,
            )?));
        }
        let local_worker = if workers.is_empty() {
            Some(RolloutWorker::new(
                0,
                &registry,
                &training.env_name,
                training.seed,
            )?)
        } else {
            None
        };

        let probe = local_worker
            .as_ref()
            .or_else(|| workers.iter().flatten().next())
            .ok_or_else(|| TraderError::InvalidConfig("no rollout worker available".into()))?;
        let observation_dim = probe.env().observation_space().dim();
        let action_space = probe.env().action_space().clone();

        let learner = PPOTrainer::new(
            config.ppo.clone(),
            observation_dim,
            &action_space,
            training.seed,
        );

        info!(
            env = %training.env_name,
            num_workers = allocation.num_workers,
            observation_dim,
            train_batch_size = training.train_batch_size,
            "Trainer initialized"
        );

        Ok(Self {
            config,
            registry,
            learner,
            workers,
            local_worker,
            observation_dim,
            action_space,
            allocation,
            iteration: 0,
            timesteps_total: 0,
            episodes_total: 0,
            recent_episodes: VecDeque::with_capacity(METRICS_WINDOW),
            worker_restarts: 0,
        })
    }

    pub fn config(&self) -> &RLConfig {
        &self.config
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn timesteps_total(&self) -> u64 {
        self.timesteps_total
    }

    pub fn allocation(&self) -> Allocation {
        self.allocation
    }

    /// Autodiff-free copy of the learner's current policy
    pub fn policy_snapshot(&self) -> PolicySnapshot {
        self.learner.policy_snapshot()
    }

    pub fn observation_dim(&self) -> usize {
        self.observation_dim
    }

    pub fn action_space(&self) -> &BoxSpace {
        &self.action_space
    }

    /// Run one training iteration
    pub async fn train(&mut self) -> Result<TrainingResult> {
        let started = Instant::now();
        let policy = self.learner.policy_snapshot();

        let outputs = match self.local_worker.as_mut() {
            Some(worker) => {
                let fragment = self.config.training.train_batch_size;
                let (gamma, lambda) = (self.config.ppo.gamma, self.config.ppo.gae_lambda);
                vec![worker.sample(&policy, fragment, gamma, lambda)?]
            }
            None => self.sample_parallel(policy).await?,
        };

        let timesteps: usize = outputs.iter().map(|o| o.steps).sum();
        let mut episodes = Vec::new();
        let mut batches = Vec::with_capacity(outputs.len());
        for output in outputs {
            episodes.extend(output.episodes);
            batches.push(output.batch);
        }
        let mut batch = SampleBatch::concat(batches);

        let learner_out = self.learner.train_step(&mut batch);

        self.iteration += 1;
        self.timesteps_total += timesteps as u64;
        self.episodes_total += episodes.len();
        let episodes_this_iter = episodes.len();
        for ep in episodes {
            if self.recent_episodes.len() == METRICS_WINDOW {
                self.recent_episodes.pop_front();
            }
            self.recent_episodes.push_back(ep);
        }

        let result = self.build_result(timesteps, episodes_this_iter, &learner_out, started.elapsed());
        log_result(&result);
        Ok(result)
    }

    async fn sample_parallel(&mut self, policy: PolicySnapshot) -> Result<Vec<WorkerOutput>> {
        let fragment = self.config.training.rollout_fragment_length();
        let (gamma, lambda) = (self.config.ppo.gamma, self.config.ppo.gae_lambda);

        let mut tasks = Vec::with_capacity(self.workers.len());
        for slot in &mut self.workers {
            let Some(mut worker) = slot.take() else {
                continue;
            };
            let policy = policy.clone();
            tasks.push(tokio::task::spawn_blocking(move || {
                let index = worker.index();
                let out = worker.sample(&policy, fragment, gamma, lambda);
                (index, worker, out)
            }));
        }

        let mut outputs = Vec::with_capacity(tasks.len());
        let mut failures = Vec::new();
        for (slot_index, joined) in join_all(tasks).await.into_iter().enumerate() {
            match joined {
                Ok((index, worker, Ok(out))) => {
                    self.workers[index] = Some(worker);
                    outputs.push(out);
                }
                Ok((index, _, Err(e))) => failures.push((index, e.to_string())),
                // A panicking worker is lost together with its index
                Err(e) => failures.push((slot_index, e.to_string())),
            }
        }

        for (index, reason) in failures {
            if !self.config.training.ignore_worker_failures {
                return Err(TrainError::WorkerFailure { worker: index, reason }.into());
            }
            warn!(worker = index, %reason, "Rollout worker failed; dropping its samples and recreating it");
            self.restart_worker(index)?;
        }

        if outputs.is_empty() {
            return Err(TrainError::AllWorkersFailed(self.workers.len()).into());
        }
        Ok(outputs)
    }

    fn restart_worker(&mut self, index: usize) -> Result<()> {
        self.worker_restarts += 1;
        let seed = self
            .config
            .training
            .seed
            .wrapping_add(index as u64)
            .wrapping_add(RESTART_SEED_STRIDE.wrapping_mul(self.worker_restarts as u64));
        let worker = RolloutWorker::new(index, &self.registry, &self.config.training.env_name, seed)?;
        self.workers[index] = Some(worker);
        debug!(worker = index, restarts = self.worker_restarts, "Worker recreated");
        Ok(())
    }

    fn build_result(
        &self,
        timesteps: usize,
        episodes_this_iter: usize,
        learner: &PPOOutput,
        elapsed: Duration,
    ) -> TrainingResult {
        let stats = summarize_episodes(&self.recent_episodes);
        let num_healthy_workers = if self.local_worker.is_some() {
            1
        } else {
            self.workers.iter().flatten().count()
        };

        TrainingResult {
            iteration: self.iteration,
            timesteps_this_iter: timesteps,
            timesteps_total: self.timesteps_total,
            episodes_this_iter,
            episodes_total: self.episodes_total,
            episode_reward_mean: stats.reward_mean,
            episode_reward_min: stats.reward_min,
            episode_reward_max: stats.reward_max,
            episode_len_mean: stats.len_mean,
            policy_loss: learner.policy_loss,
            value_loss: learner.value_loss,
            entropy: learner.entropy,
            approx_kl: learner.approx_kl,
            clip_fraction: learner.clip_fraction,
            num_healthy_workers,
            num_worker_restarts: self.worker_restarts,
            time_this_iter: elapsed,
        }
    }

    /// Mean reward over the recent episode window
    pub fn episode_reward_mean(&self) -> Option<f64> {
        summarize_episodes(&self.recent_episodes).reward_mean
    }

    /// Snapshot of everything needed to resume
    pub fn state(&self) -> TrainerState {
        TrainerState {
            iteration: self.iteration,
            timesteps_total: self.timesteps_total,
            episodes_total: self.episodes_total,
            learner_steps: self.learner.step_count(),
            policy_config: self.learner.policy_config().clone(),
            policy: self.learner.policy().clone(),
            optimizer: self.learner.optimizer_record(),
        }
    }

    /// Resume from a saved state. The policy must match this trainer's
    /// environment spaces.
    pub fn restore(&mut self, state: TrainerState) -> Result<()> {
        state
            .policy_config
            .check_compatible(self.observation_dim, &self.action_space)
            .map_err(TrainError::IncompatibleCheckpoint)?;

        self.learner = PPOTrainer::from_parts(
            self.config.ppo.clone(),
            state.policy_config,
            state.policy,
            state.optimizer,
            state.learner_steps,
            self.config.training.seed,
        );
        self.iteration = state.iteration;
        self.timesteps_total = state.timesteps_total;
        self.episodes_total = state.episodes_total;
        self.recent_episodes.clear();

        info!(iteration = self.iteration, timesteps_total = self.timesteps_total, "Trainer restored");
        Ok(())
    }
}

fn log_result(result: &TrainingResult) {
    let fmt = |v: Option<f64>| v.map_or_else(|| "n/a".to_string(), |v| format!("{v:.2}"));
    info!(
        "Iteration {}: timesteps_total={}, episodes={}, reward_mean={}, reward_min={}, reward_max={}, len_mean={}, policy_loss={:.4}, value_loss={:.4}, kl={:.4}, entropy={:.3}, time={:.2}s",
        result.iteration,
        result.timesteps_total,
        result.episodes_this_iter,
        fmt(result.episode_reward_mean),
        fmt(result.episode_reward_min),
        fmt(result.episode_reward_max),
        fmt(result.episode_len_mean),
        result.policy_loss,
        result.value_loss,
        result.approx_kl,
        result.entropy,
        result.time_this_iter.as_secs_f64(),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::config::{PPOConfig, TrainingConfig};
    use std::sync::Arc;
    use crate::rl::environment::{
        EpisodeStart, PriceSeries, SyntheticConfig, TradingEnvConfig,
    };

    fn registry() -> EnvRegistry {
        let series = PriceSeries::synthetic(&SyntheticConfig {
            len: 300,
            ..Default::default()
        })
        .unwrap();
        EnvRegistry::with_stock_trading(
            Arc::new(series),
            TradingEnvConfig {
                max_episode_steps: 50,
                episode_start: EpisodeStart::Beginning,
                ..Default::default()
            },
        )
    }

    fn config(num_workers: usize) -> RLConfig {
        RLConfig {
            ppo: PPOConfig {
                n_epochs: 2,
                hidden_dim: 8,
                ..Default::default()
            },
            training: TrainingConfig {
                num_workers,
                train_batch_size: 200,
                seed: 3,
                ..Default::default()
            },
        }
    }

    fn cpus(n: usize) -> AvailableResources {
        AvailableResources { cpus: n, gpus: 0 }
    }

    #[tokio::test]
    async fn test_iteration_collects_train_batch_size() {
        let mut trainer = Trainer::with_resources(config(2), registry(), cpus(4)).unwrap();
        let result = trainer.train().await.unwrap();

        assert_eq!(result.iteration, 1);
        assert_eq!(result.timesteps_this_iter, 200);
        assert_eq!(result.episodes_this_iter, 4);
        assert_eq!(result.num_healthy_workers, 2);
        assert_eq!(result.episode_len_mean, Some(50.0));
    }

    #[tokio::test]
    async fn test_inline_sampling_without_workers() {
        let mut trainer = Trainer::with_resources(config(0), registry(), cpus(1)).unwrap();
        let result = trainer.train().await.unwrap();
        assert_eq!(result.timesteps_this_iter, 200);
        assert_eq!(result.num_healthy_workers, 1);
    }

    #[test]
    fn test_gpu_request_fails_before_training() {
        let mut cfg = config(1);
        cfg.training.num_gpus = 1;
        let err = Trainer::with_resources(cfg, registry(), cpus(4)).unwrap_err();
        assert!(matches!(
            err,
            TraderError::Train(TrainError::ResourceAllocation { .. })
        ));
    }

    #[test]
    fn test_unknown_env_fails() {
        let mut cfg = config(1);
        cfg.training.env_name = "Nope_env".to_string();
        let err = Trainer::with_resources(cfg, registry(), cpus(4)).unwrap_err();
        assert!(matches!(err, TraderError::Env(_)));
    }

    #[tokio::test]
    async fn test_restore_resumes_counters_and_policy() {
        let mut trainer = Trainer::with_resources(config(1), registry(), cpus(2)).unwrap();
        trainer.train().await.unwrap();
        let obs = vec![0.1; trainer.observation_dim()];
        let trained_mean = trainer.policy_snapshot().mean(&obs);

        let mut fresh = Trainer::with_resources(config(1), registry(), cpus(2)).unwrap();
        fresh.restore(trainer.state()).unwrap();
        assert_eq!(fresh.iteration(), 1);
        assert_eq!(fresh.policy_snapshot().mean(&obs), trained_mean);

        let next = fresh.train().await.unwrap();
        assert_eq!(next.iteration, 2);
        assert_eq!(next.timesteps_total, 400);
    }

    #[test]
    fn test_summarize_episodes() {
        let eps = [
            EpisodeResult {
                total_reward: 1.0,
                length: 10,
                final_net_worth: 0.0,
                profit: 0.0,
                num_trades: 0,
            },
            EpisodeResult {
                total_reward: 3.0,
                length: 20,
                final_net_worth: 0.0,
                profit: 0.0,
                num_trades: 0,
            },
        ];
        let stats = summarize_episodes(&eps);
        assert_eq!(stats.reward_mean, Some(2.0));
        assert_eq!(stats.reward_min, Some(1.0));
        assert_eq!(stats.reward_max, Some(3.0));
        assert_eq!(stats.len_mean, Some(15.0));
        assert_eq!(summarize_episodes(&[]), EpisodeStats::default());
    }
}

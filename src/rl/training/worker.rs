//! Rollout Workers
//!
//! Each worker owns one environment instance and its own sampling RNG and
//! collects fixed-length fragments of experience with a read-only policy
//! snapshot. Episodes continue across fragments.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use crate::rl::environment::{EnvContext, EnvRegistry, EnvResult, Environment, StepInfo};
use crate::rl::memory::{RolloutBuffer, SampleBatch, Transition};
use crate::rl::networks::PolicySnapshot;

/// Offset separating a worker's sampler seed from its environment seed
const SAMPLER_SEED_OFFSET: u64 = 0x9E37_79B9;

/// Summary of one completed episode
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpisodeResult {
    /// Total reward for episode
    pub total_reward: f32,
    /// Episode length in steps
    pub length: usize,
    pub final_net_worth: f64,
    /// Net worth minus initial balance
    pub profit: f64,
    /// Number of trades
    pub num_trades: usize,
}

impl EpisodeResult {
    fn from_info(total_reward: f32, length: usize, info: &StepInfo) -> Self {
        Self {
            total_reward,
            length,
            final_net_worth: info.net_worth,
            profit: info.profit,
            num_trades: info.num_trades,
        }
    }
}

/// Experience gathered by one worker in one sampling round
#[derive(Debug, Default)]
pub struct WorkerOutput {
    pub batch: SampleBatch,
    /// Episodes that finished during the round
    pub episodes: Vec<EpisodeResult>,
    pub steps: usize,
}

/// Rollout worker: environment instance plus sampler state
pub struct RolloutWorker {
    index: usize,
    env: Box<dyn Environment>,
    rng: StdRng,
    /// Observation to act on next; `None` means the env needs a reset
    obs: Option<Vec<f32>>,
    episode_reward: f32,
    episode_len: usize,
}

impl std::fmt::Debug for RolloutWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RolloutWorker")
            .field("index", &self.index)
            .field("episode_len", &self.episode_len)
            .finish()
    }
}

impl RolloutWorker {
    /// Build a worker with its own instance of the named environment
    pub fn new(index: usize, registry: &EnvRegistry, env_name: &str, seed: u64) -> EnvResult<Self> {
        let env = registry.make(
            env_name,
            EnvContext {
                worker_index: index,
                seed,
            },
        )?;
        Ok(Self {
            index,
            env,
            rng: StdRng::seed_from_u64(seed ^ SAMPLER_SEED_OFFSET),
            obs: None,
            episode_reward: 0.0,
            episode_len: 0,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn env(&self) -> &dyn Environment {
        self.env.as_ref()
    }

    /// Collect `steps` transitions and compute their advantages
    pub fn sample(
        &mut self,
        policy: &PolicySnapshot,
        steps: usize,
        gamma: f32,
        gae_lambda: f32,
    ) -> EnvResult<WorkerOutput> {
        let mut buffer = RolloutBuffer::with_capacity(steps);
        let mut episodes = Vec::new();

        for _ in 0..steps {
            let obs = match self.obs.take() {
                Some(obs) => obs,
                None => {
                    self.episode_reward = 0.0;
                    self.episode_len = 0;
                    self.env.reset()
                }
            };

            let step = policy.act(&obs, &mut self.rng);
            let result = self.env.step(&step.env_action)?;

            self.episode_reward += result.reward;
            self.episode_len += 1;

            let bootstrap_value = if result.done && result.truncated {
                policy.value(&result.observation)
            } else {
                0.0
            };

            buffer.push(Transition {
                observation: obs,
                action: step.action,
                reward: result.reward,
                done: result.done,
                truncated: result.truncated,
                log_prob: step.log_prob,
                value: step.value,
                bootstrap_value,
            });

            if result.done {
                episodes.push(EpisodeResult::from_info(
                    self.episode_reward,
                    self.episode_len,
                    &result.info,
                ));
            } else {
                self.obs = Some(result.observation);
            }
        }

        let last_value = self.obs.as_ref().map_or(0.0, |obs| policy.value(obs));
        buffer.compute_advantages(gamma, gae_lambda, last_value);

        Ok(WorkerOutput {
            steps: buffer.len(),
            batch: buffer.into_sample_batch(),
            episodes,
        })
    }
}

/// Run one full episode, acting with the policy mean when `deterministic`
pub fn run_episode(
    env: &mut dyn Environment,
    policy: &PolicySnapshot,
    deterministic: bool,
    seed: u64,
) -> EnvResult<EpisodeResult> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut obs = env.reset();
    let mut total_reward = 0.0;
    let mut length = 0;

    loop {
        let action = if deterministic {
            policy.deterministic_action(&obs)
        } else {
            policy.act(&obs, &mut rng).env_action
        };
        let result = env.step(&action)?;
        total_reward += result.reward;
        length += 1;

        if result.done {
            return Ok(EpisodeResult::from_info(total_reward, length, &result.info));
        }
        obs = result.observation;
    }
}

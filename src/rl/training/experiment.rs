//! Experiment Runner
//!
//! Drives a [`Trainer`] until its stop condition, checkpointing periodically
//! and at the end, keeping the best checkpoints by mean episode reward.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;

use super::checkpointing::Checkpointer;
use super::trainer::{Trainer, TrainingResult};
use crate::error::Result;
use crate::rl::config::RLConfig;
use crate::rl::environment::EnvRegistry;

/// Outcome of an experiment run
#[derive(Debug, Clone)]
pub struct ExperimentSummary {
    /// Iterations completed, including any restored ones
    pub iterations: usize,
    pub timesteps_total: u64,
    /// Result of the final iteration run in this session
    pub last_result: Option<TrainingResult>,
    pub best_reward_mean: Option<f64>,
    pub best_checkpoint: Option<PathBuf>,
    pub last_checkpoint: Option<PathBuf>,
    /// Stopped by request before reaching the iteration limit
    pub interrupted: bool,
}

/// A named training run with checkpointing
pub struct Experiment {
    trainer: Trainer,
    checkpointer: Checkpointer,
    stop: Arc<AtomicBool>,
}

impl Experiment {
    /// Create the trainer and the experiment's checkpoint directory
    /// (`<checkpoint_dir>/<experiment_name>`)
    pub fn new(config: RLConfig, registry: EnvRegistry) -> Result<Self> {
        let dir = Path::new(&config.training.checkpoint_dir).join(&config.training.experiment_name);
        let checkpointer = Checkpointer::new(dir, config.training.keep_checkpoints_num)?;
        let trainer = Trainer::new(config, registry)?;
        Ok(Self::from_parts(trainer, checkpointer))
    }

    pub fn from_parts(trainer: Trainer, checkpointer: Checkpointer) -> Self {
        Self {
            trainer,
            checkpointer,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Resume from a checkpoint directory or a file inside it
    pub fn restore<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let state = Checkpointer::load(path)?;
        self.trainer.restore(state)
    }

    /// Flag that stops the run after the current iteration
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn trainer(&self) -> &Trainer {
        &self.trainer
    }

    pub fn checkpointer(&self) -> &Checkpointer {
        &self.checkpointer
    }

    /// Train until `training.iterations` is reached or a stop is requested
    pub async fn run(&mut self) -> Result<ExperimentSummary> {
        let training = self.trainer.config().training.clone();
        let mut last_result = None;
        let mut last_checkpoint = None;
        let mut saved_at = None;
        let mut interrupted = false;

        info!(
            experiment = %training.experiment_name,
            start_iteration = self.trainer.iteration(),
            stop_iteration = training.iterations,
            "Starting experiment"
        );

        while self.trainer.iteration() < training.iterations {
            if self.stop.load(Ordering::SeqCst) {
                info!(iteration = self.trainer.iteration(), "Stop requested");
                interrupted = true;
                break;
            }

            let result = self.trainer.train().await?;
            let iteration = result.iteration;

            if training.checkpoint_freq > 0 && iteration % training.checkpoint_freq == 0 {
                last_checkpoint = Some(self.save(result.episode_reward_mean)?);
                saved_at = Some(iteration);
            }
            last_result = Some(result);
        }

        let at_end = self.trainer.iteration();
        if training.checkpoint_at_end && at_end > 0 && saved_at != Some(at_end) {
            let score = last_result.as_ref().and_then(|r| r.episode_reward_mean);
            last_checkpoint = Some(self.save(score)?);
        }

        let best = self.checkpointer.best_checkpoint();
        let summary = ExperimentSummary {
            iterations: at_end,
            timesteps_total: self.trainer.timesteps_total(),
            last_result,
            best_reward_mean: best.as_ref().and_then(|c| c.metadata.score),
            best_checkpoint: best.map(|c| c.path),
            last_checkpoint,
            interrupted,
        };

        info!(
            iterations = summary.iterations,
            timesteps_total = summary.timesteps_total,
            best_reward_mean = ?summary.best_reward_mean,
            best_checkpoint = ?summary.best_checkpoint,
            "Experiment finished"
        );
        Ok(summary)
    }

    fn save(&self, score: Option<f64>) -> Result<PathBuf> {
        self.checkpointer.save(self.trainer.state(), score)
    }
}

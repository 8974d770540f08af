//! Model Checkpointing
//!
//! Save and load trainer state, one directory per checkpoint. Weights and
//! Adam moments go through burn's named MessagePack recorder; the network
//! shape and progress counters are JSON:
//!
//! ```text
//! <checkpoint_dir>/<experiment>/checkpoint_000003/policy.mpk
//! <checkpoint_dir>/<experiment>/checkpoint_000003/optimizer.mpk
//! <checkpoint_dir>/<experiment>/checkpoint_000003/policy_config.json
//! <checkpoint_dir>/<experiment>/checkpoint_000003/metadata.json
//! ```

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use burn::module::AutodiffModule;
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, TrainError};
use crate::rl::algorithms::OptimizerRecord;
use crate::rl::networks::{ActorCritic, ActorCriticConfig, LearnerBackend, PolicySnapshot};

const POLICY_FILE: &str = "policy.mpk";
const OPTIMIZER_FILE: &str = "optimizer.mpk";
const POLICY_CONFIG_FILE: &str = "policy_config.json";
const METADATA_FILE: &str = "metadata.json";
const CHECKPOINT_PREFIX: &str = "checkpoint_";

type CheckpointRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

/// Everything needed to resume training
pub struct TrainerState {
    pub iteration: usize,
    pub timesteps_total: u64,
    pub episodes_total: usize,
    /// PPO updates performed by the learner
    pub learner_steps: usize,
    pub policy_config: ActorCriticConfig,
    pub policy: ActorCritic<LearnerBackend>,
    pub optimizer: OptimizerRecord,
}

impl std::fmt::Debug for TrainerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainerState")
            .field("iteration", &self.iteration)
            .field("timesteps_total", &self.timesteps_total)
            .field("episodes_total", &self.episodes_total)
            .field("learner_steps", &self.learner_steps)
            .field("policy_config", &self.policy_config)
            .finish_non_exhaustive()
    }
}

impl TrainerState {
    /// Autodiff-free copy of the saved policy for acting
    pub fn policy_snapshot(&self) -> PolicySnapshot {
        PolicySnapshot::new(self.policy.valid(), self.policy_config.action_space.clone())
    }
}

/// Sidecar describing a checkpoint without loading its weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub iteration: usize,
    pub timesteps_total: u64,
    pub episodes_total: usize,
    pub learner_steps: usize,
    /// Mean episode reward at save time, used to rank checkpoints
    pub score: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl CheckpointMetadata {
    fn rank(&self) -> f64 {
        self.score.filter(|s| s.is_finite()).unwrap_or(f64::NEG_INFINITY)
    }
}

/// A checkpoint found on disk
#[derive(Debug, Clone, PartialEq)]
pub struct SavedCheckpoint {
    pub path: PathBuf,
    pub metadata: CheckpointMetadata,
}

/// Checkpointer for saving and loading trainer state
#[derive(Debug, Clone)]
pub struct Checkpointer {
    /// Directory for this experiment's checkpoints
    checkpoint_dir: PathBuf,
    /// Maximum checkpoints to keep
    max_checkpoints: usize,
}

impl Checkpointer {
    /// Create a new checkpointer, creating the directory if needed
    pub fn new<P: AsRef<Path>>(checkpoint_dir: P, max_checkpoints: usize) -> Result<Self> {
        let checkpoint_dir = checkpoint_dir.as_ref().to_path_buf();
        fs::create_dir_all(&checkpoint_dir)?;
        Ok(Self {
            checkpoint_dir,
            max_checkpoints: max_checkpoints.max(1),
        })
    }

    pub fn checkpoint_dir(&self) -> &Path {
        &self.checkpoint_dir
    }

    /// Get checkpoint path for a given iteration
    pub fn checkpoint_path(&self, iteration: usize) -> PathBuf {
        self.checkpoint_dir
            .join(format!("{CHECKPOINT_PREFIX}{iteration:06}"))
    }

    /// Save trainer state, then prune down to the best checkpoints
    pub fn save(&self, state: TrainerState, score: Option<f64>) -> Result<PathBuf> {
        let path = self.checkpoint_path(state.iteration);
        fs::create_dir_all(&path)?;

        let metadata = CheckpointMetadata {
            iteration: state.iteration,
            timesteps_total: state.timesteps_total,
            episodes_total: state.episodes_total,
            learner_steps: state.learner_steps,
            score,
            created_at: Utc::now(),
        };

        let recorder = CheckpointRecorder::new();
        state
            .policy
            .save_file(path.join(POLICY_FILE), &recorder)
            .map_err(|e| TrainError::Checkpoint(format!("failed to save policy: {e}")))?;
        Recorder::<LearnerBackend>::record(&recorder, state.optimizer, path.join(OPTIMIZER_FILE))
            .map_err(|e| TrainError::Checkpoint(format!("failed to save optimizer: {e}")))?;
        state.policy_config.save(path.join(POLICY_CONFIG_FILE))?;

        let writer = BufWriter::new(File::create(path.join(METADATA_FILE))?);
        serde_json::to_writer_pretty(writer, &metadata)?;

        info!(path = %path.display(), iteration = metadata.iteration, ?score, "Saved checkpoint");

        self.prune()?;
        Ok(path)
    }

    /// Load trainer state from a checkpoint directory or any file inside it
    pub fn load<P: AsRef<Path>>(path: P) -> Result<TrainerState> {
        let path = path.as_ref();
        let dir = if path.is_dir() {
            path
        } else {
            path.parent().unwrap_or(path)
        };
        if !dir.join(METADATA_FILE).is_file() {
            return Err(TrainError::CheckpointNotFound(path.display().to_string()).into());
        }

        let metadata = read_metadata(dir)?;
        let policy_config = ActorCriticConfig::load(dir.join(POLICY_CONFIG_FILE))
            .map_err(|e| TrainError::Checkpoint(format!("failed to read policy config: {e}")))?;

        let device = Default::default();
        let recorder = CheckpointRecorder::new();
        let policy = policy_config
            .init::<LearnerBackend>(&device)
            .load_file(dir.join(POLICY_FILE), &recorder, &device)
            .map_err(|e| TrainError::Checkpoint(format!("failed to load policy: {e}")))?;
        let optimizer: OptimizerRecord =
            Recorder::<LearnerBackend>::load(&recorder, dir.join(OPTIMIZER_FILE), &device)
                .map_err(|e| TrainError::Checkpoint(format!("failed to load optimizer: {e}")))?;

        info!(path = %dir.display(), iteration = metadata.iteration, "Loaded checkpoint");
        Ok(TrainerState {
            iteration: metadata.iteration,
            timesteps_total: metadata.timesteps_total,
            episodes_total: metadata.episodes_total,
            learner_steps: metadata.learner_steps,
            policy_config,
            policy,
            optimizer,
        })
    }

    /// List available checkpoints, oldest first
    pub fn list_checkpoints(&self) -> Vec<SavedCheckpoint> {
        let mut checkpoints = Vec::new();

        if let Ok(entries) = fs::read_dir(&self.checkpoint_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                let is_checkpoint = entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| name.starts_with(CHECKPOINT_PREFIX));
                if !is_checkpoint || !path.is_dir() {
                    continue;
                }
                match read_metadata(&path) {
                    Ok(metadata) => checkpoints.push(SavedCheckpoint { path, metadata }),
                    Err(e) => debug!(path = %path.display(), error = %e, "Skipping checkpoint"),
                }
            }
        }

        checkpoints.sort_by_key(|c| c.metadata.iteration);
        checkpoints
    }

    /// Get latest checkpoint
    pub fn latest_checkpoint(&self) -> Option<SavedCheckpoint> {
        self.list_checkpoints().into_iter().last()
    }

    /// Highest-scoring checkpoint; later iterations win ties
    pub fn best_checkpoint(&self) -> Option<SavedCheckpoint> {
        self.list_checkpoints().into_iter().max_by(|a, b| {
            a.metadata
                .rank()
                .total_cmp(&b.metadata.rank())
                .then(a.metadata.iteration.cmp(&b.metadata.iteration))
        })
    }

    /// Remove the lowest-scoring checkpoints beyond `max_checkpoints`. The
    /// most recent checkpoint is always kept.
    fn prune(&self) -> Result<()> {
        let mut checkpoints = self.list_checkpoints();
        if checkpoints.len() <= self.max_checkpoints {
            return Ok(());
        }

        let Some(latest) = checkpoints.pop() else {
            return Ok(());
        };
        // Worst first
        checkpoints.sort_by(|a, b| {
            a.metadata
                .rank()
                .total_cmp(&b.metadata.rank())
                .then(a.metadata.iteration.cmp(&b.metadata.iteration))
        });

        let to_remove = checkpoints.len() + 1 - self.max_checkpoints;
        for checkpoint in checkpoints.into_iter().take(to_remove) {
            match fs::remove_dir_all(&checkpoint.path) {
                Ok(()) => info!(path = %checkpoint.path.display(), "Removed checkpoint"),
                Err(e) => warn!(path = %checkpoint.path.display(), error = %e, "Failed to remove checkpoint"),
            }
        }
        debug!(latest = %latest.path.display(), "Checkpoint pruning done");
        Ok(())
    }
}

fn read_metadata(dir: &Path) -> Result<CheckpointMetadata> {
    let reader = BufReader::new(File::open(dir.join(METADATA_FILE))?);
    Ok(serde_json::from_reader(reader)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::algorithms::PPOTrainer;
    use crate::rl::config::PPOConfig;
    use crate::rl::core::action_space;
    use crate::rl::memory::SampleBatch;

    fn trainer(seed: u64) -> PPOTrainer {
        let config = PPOConfig {
            hidden_dim: 8,
            batch_size: 4,
            n_epochs: 1,
            ..Default::default()
        };
        PPOTrainer::new(config, 4, &action_space(), seed)
    }

    fn state(iteration: usize) -> TrainerState {
        state_of(&trainer(iteration as u64), iteration)
    }

    fn state_of(learner: &PPOTrainer, iteration: usize) -> TrainerState {
        TrainerState {
            iteration,
            timesteps_total: iteration as u64 * 100,
            episodes_total: iteration,
            learner_steps: learner.step_count(),
            policy_config: learner.policy_config().clone(),
            policy: learner.policy().clone(),
            optimizer: learner.optimizer_record(),
        }
    }

    #[test]
    fn test_checkpoint_path() {
        let dir = tempfile::tempdir().unwrap();
        let checkpointer = Checkpointer::new(dir.path(), 5).unwrap();
        let path = checkpointer.checkpoint_path(3);
        assert!(path.ends_with("checkpoint_000003"));
    }

    #[test]
    fn test_save_then_load_round_trips_state() {
        let dir = tempfile::tempdir().unwrap();
        let checkpointer = Checkpointer::new(dir.path(), 5).unwrap();

        let mut learner = trainer(3);
        let mut batch = SampleBatch {
            observations: vec![vec![0.1, 0.2, 0.3, 0.4]; 4],
            actions: vec![vec![1.0, 0.5], vec![2.0, 0.2], vec![0.5, 0.9], vec![1.5, 0.1]],
            log_probs: vec![-1.0; 4],
            values: vec![0.0; 4],
            advantages: vec![1.0, -1.0, 0.5, -0.5],
            returns: vec![1.0, 0.0, 0.5, 0.2],
        };
        learner.train_step(&mut batch);
        let obs = [0.3, -0.1, 0.7, 0.2];
        let expected_mean = learner.policy_snapshot().mean(&obs);
        let expected_moments = learner.optimizer_record().len();
        assert!(expected_moments > 0);

        let path = checkpointer.save(state_of(&learner, 3), Some(12.5)).unwrap();
        for target in [path.clone(), path.join(POLICY_FILE)] {
            let loaded = Checkpointer::load(&target).unwrap();
            assert_eq!(loaded.iteration, 3);
            assert_eq!(loaded.timesteps_total, 300);
            assert_eq!(loaded.learner_steps, 1);
            assert_eq!(loaded.policy_config.obs_dim, 4);
            assert_eq!(loaded.optimizer.len(), expected_moments);

            let restored = PPOTrainer::from_parts(
                learner.config().clone(),
                loaded.policy_config,
                loaded.policy,
                loaded.optimizer,
                loaded.learner_steps,
                0,
            );
            let mean = restored.policy_snapshot().mean(&obs);
            for (a, b) in mean.iter().zip(&expected_mean) {
                assert!((a - b).abs() < 1e-6);
            }
        }

        let latest = checkpointer.latest_checkpoint().unwrap();
        assert_eq!(latest.metadata.iteration, 3);
        assert_eq!(latest.metadata.score, Some(12.5));
    }

    #[test]
    fn test_missing_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let err = Checkpointer::load(dir.path().join("checkpoint_000099")).unwrap_err();
        assert!(matches!(
            err,
            crate::error::TraderError::Train(TrainError::CheckpointNotFound(_))
        ));
    }

    #[test]
    fn test_keeps_best_by_score_and_latest() {
        let dir = tempfile::tempdir().unwrap();
        let checkpointer = Checkpointer::new(dir.path(), 2).unwrap();

        checkpointer.save(state(3), Some(5.0)).unwrap();
        checkpointer.save(state(6), Some(50.0)).unwrap();
        checkpointer.save(state(9), Some(1.0)).unwrap();
        checkpointer.save(state(12), None).unwrap();

        let kept: Vec<usize> = checkpointer
            .list_checkpoints()
            .iter()
            .map(|c| c.metadata.iteration)
            .collect();
        assert_eq!(kept, vec![6, 12]);
        assert_eq!(checkpointer.best_checkpoint().unwrap().metadata.iteration, 6);
    }
}

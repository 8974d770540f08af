//! Training Infrastructure
//!
//! Rollout workers, the PPO training loop, resource checks, checkpointing
//! and the experiment runner.

pub mod checkpointing;
pub mod experiment;
pub mod resources;
pub mod trainer;
pub mod worker;

pub use checkpointing::{CheckpointMetadata, Checkpointer, SavedCheckpoint, TrainerState};
pub use experiment::{Experiment, ExperimentSummary};
pub use resources::{allocate, Allocation, AvailableResources};
pub use trainer::{summarize_episodes, EpisodeStats, Trainer, TrainingResult};
pub use worker::{run_episode, EpisodeResult, RolloutWorker, WorkerOutput};

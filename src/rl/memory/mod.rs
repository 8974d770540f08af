//! Experience Memory
//!
//! On-policy rollout storage and training batches.

pub mod rollout;

pub use rollout::{RolloutBuffer, SampleBatch, Transition};

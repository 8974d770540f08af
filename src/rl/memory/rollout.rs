//! Rollout Buffer
//!
//! On-policy storage for PPO: transitions collected by one worker, GAE
//! advantage estimation, and the flattened sample batch the learner trains on.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// A single transition in the environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// Observation the action was chosen from
    pub observation: Vec<f32>,
    /// Action as sampled from the policy, before clipping to the action space
    pub action: Vec<f32>,
    /// Reward received
    pub reward: f32,
    /// Whether the episode ended on this step
    pub done: bool,
    /// Whether the end was a time or data limit rather than a terminal state
    pub truncated: bool,
    /// Log probability of `action` under the behaviour policy
    pub log_prob: f32,
    /// Value estimate of `observation`
    pub value: f32,
    /// Value estimate of the next observation, used when `truncated`
    pub bootstrap_value: f32,
}

/// Rollout buffer for on-policy algorithms (PPO)
///
/// Holds a contiguous fragment of one worker's experience, possibly spanning
/// several episodes.
#[derive(Debug, Default)]
pub struct RolloutBuffer {
    transitions: Vec<Transition>,
    advantages: Vec<f32>,
    returns: Vec<f32>,
}

impl RolloutBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            transitions: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    pub fn push(&mut self, transition: Transition) {
        self.transitions.push(transition);
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn advantages(&self) -> &[f32] {
        &self.advantages
    }

    pub fn returns(&self) -> &[f32] {
        &self.returns
    }

    /// Compute advantages and returns using GAE
    ///
    /// `last_value` is the value of the observation following the final
    /// transition; it is ignored when that transition ended an episode.
    pub fn compute_advantages(&mut self, gamma: f32, gae_lambda: f32, last_value: f32) {
        let n = self.transitions.len();
        self.advantages = vec![0.0; n];
        self.returns = vec![0.0; n];

        let mut gae = 0.0;
        let mut next_value = last_value;

        for t in (0..n).rev() {
            let tr = &self.transitions[t];
            // An episode boundary cuts the GAE chain
            let (next_v, carry) = if tr.done {
                let v = if tr.truncated { tr.bootstrap_value } else { 0.0 };
                (v, 0.0)
            } else {
                (next_value, gae)
            };

            let delta = tr.reward + gamma * next_v - tr.value;
            gae = delta + gamma * gae_lambda * carry;

            self.advantages[t] = gae;
            self.returns[t] = gae + tr.value;
            next_value = tr.value;
        }
    }

    /// Consume the buffer into a sample batch. Call
    /// [`compute_advantages`](Self::compute_advantages) first.
    pub fn into_sample_batch(self) -> SampleBatch {
        let n = self.transitions.len();
        let mut batch = SampleBatch::with_capacity(n);

        for (t, (adv, ret)) in self
            .transitions
            .into_iter()
            .zip(self.advantages.into_iter().zip(self.returns))
        {
            batch.observations.push(t.observation);
            batch.actions.push(t.action);
            batch.log_probs.push(t.log_prob);
            batch.values.push(t.value);
            batch.advantages.push(adv);
            batch.returns.push(ret);
        }
        batch
    }

    pub fn clear(&mut self) {
        self.transitions.clear();
        self.advantages.clear();
        self.returns.clear();
    }
}

/// Flattened training batch gathered from one or more workers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleBatch {
    pub observations: Vec<Vec<f32>>,
    pub actions: Vec<Vec<f32>>,
    pub log_probs: Vec<f32>,
    pub values: Vec<f32>,
    pub advantages: Vec<f32>,
    pub returns: Vec<f32>,
}

impl SampleBatch {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            observations: Vec::with_capacity(capacity),
            actions: Vec::with_capacity(capacity),
            log_probs: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
            advantages: Vec::with_capacity(capacity),
            returns: Vec::with_capacity(capacity),
        }
    }

    /// Concatenate worker batches in order
    pub fn concat(batches: Vec<SampleBatch>) -> Self {
        let total = batches.iter().map(SampleBatch::len).sum();
        let mut out = Self::with_capacity(total);
        for b in batches {
            out.observations.extend(b.observations);
            out.actions.extend(b.actions);
            out.log_probs.extend(b.log_probs);
            out.values.extend(b.values);
            out.advantages.extend(b.advantages);
            out.returns.extend(b.returns);
        }
        out
    }

    pub fn len(&self) -> usize {
        self.log_probs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log_probs.is_empty()
    }

    /// Standardize advantages to zero mean and unit variance
    pub fn normalize_advantages(&mut self) {
        let n = self.advantages.len();
        if n < 2 {
            return;
        }
        let mean = self.advantages.iter().sum::<f32>() / n as f32;
        let var = self
            .advantages
            .iter()
            .map(|a| (a - mean).powi(2))
            .sum::<f32>()
            / n as f32;
        let std = var.sqrt().max(1e-8);

        for adv in &mut self.advantages {
            *adv = (*adv - mean) / std;
        }
    }

    /// Shuffled index chunks of at most `batch_size`
    pub fn minibatch_indices<R: Rng + ?Sized>(
        &self,
        batch_size: usize,
        rng: &mut R,
    ) -> Vec<Vec<usize>> {
        let mut indices: Vec<usize> = (0..self.len()).collect();
        indices.shuffle(rng);
        indices
            .chunks(batch_size.max(1))
            .map(<[usize]>::to_vec)
            .collect()
    }
}

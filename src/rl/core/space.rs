//! Box spaces
//!
//! Continuous, axis-aligned spaces used to declare the shape and bounds of
//! observations and actions.

use serde::{Deserialize, Serialize};

/// An n-dimensional box `[low_i, high_i]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxSpace {
    low: Vec<f32>,
    high: Vec<f32>,
}

impl BoxSpace {
    /// Create a box from per-dimension bounds
    ///
    /// # Panics
    /// Panics if the bound vectors differ in length or `low > high` anywhere.
    pub fn new(low: Vec<f32>, high: Vec<f32>) -> Self {
        assert_eq!(low.len(), high.len(), "bound vectors must have equal length");
        assert!(
            low.iter().zip(&high).all(|(l, h)| l <= h),
            "low must not exceed high"
        );
        Self { low, high }
    }

    /// Box with the same bounds in every dimension
    pub fn uniform(dim: usize, low: f32, high: f32) -> Self {
        Self::new(vec![low; dim], vec![high; dim])
    }

    pub fn dim(&self) -> usize {
        self.low.len()
    }

    pub fn low(&self) -> &[f32] {
        &self.low
    }

    pub fn high(&self) -> &[f32] {
        &self.high
    }

    /// Whether `values` has the right length, is finite and lies within bounds
    pub fn contains(&self, values: &[f32]) -> bool {
        self.violation(values).is_none()
    }

    /// Describe why `values` is outside the space, if it is
    pub fn violation(&self, values: &[f32]) -> Option<String> {
        if values.len() != self.dim() {
            return Some(format!("expected {} values, got {}", self.dim(), values.len()));
        }
        for (i, v) in values.iter().enumerate() {
            if !v.is_finite() {
                return Some(format!("component {i} is not finite"));
            }
            if *v < self.low[i] || *v > self.high[i] {
                return Some(format!(
                    "component {i} = {v} outside [{}, {}]",
                    self.low[i], self.high[i]
                ));
            }
        }
        None
    }

    /// Clip every component into bounds. Non-finite values map to `low`.
    pub fn clip(&self, values: &[f32]) -> Vec<f32> {
        values
            .iter()
            .zip(self.low.iter().zip(&self.high))
            .map(|(v, (l, h))| if v.is_finite() { v.clamp(*l, *h) } else { *l })
            .collect()
    }
}

//! Action Space
//!
//! A trade decision is a continuous 2-vector `[action_type, amount]`.
//! The integer part of `action_type` selects buy / sell / hold and `amount`
//! is the fraction of balance (buy) or holdings (sell) to trade.

use serde::{Deserialize, Serialize};

use super::space::BoxSpace;

/// Dimension of the continuous action vector
pub const ACTION_DIM: usize = 2;

/// Upper bound of the `action_type` component (exclusive in spirit, inclusive in the box)
pub const ACTION_TYPE_HIGH: f32 = 3.0;

/// Kind of trade selected by the `action_type` component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    /// Buy `amount` of the cash balance worth of shares
    Buy,
    /// Sell `amount` of the shares held
    Sell,
    /// Do nothing
    Hold,
}

impl ActionKind {
    /// Decode from the raw `action_type` value
    pub fn from_action_type(action_type: f32) -> Self {
        if action_type < 1.0 {
            Self::Buy
        } else if action_type < 2.0 {
            Self::Sell
        } else {
            Self::Hold
        }
    }

    /// Representative `action_type` value for this kind
    pub fn action_type(self) -> f32 {
        match self {
            Self::Buy => 0.5,
            Self::Sell => 1.5,
            Self::Hold => 2.5,
        }
    }
}

/// A decoded trade action
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeAction {
    /// What to do
    pub kind: ActionKind,
    /// Fraction of balance (buy) or holdings (sell), in [0, 1]
    pub amount: f32,
}

impl TradeAction {
    pub fn buy(amount: f32) -> Self {
        Self {
            kind: ActionKind::Buy,
            amount,
        }
    }

    pub fn sell(amount: f32) -> Self {
        Self {
            kind: ActionKind::Sell,
            amount,
        }
    }

    pub fn hold() -> Self {
        Self {
            kind: ActionKind::Hold,
            amount: 0.0,
        }
    }

    /// Decode a raw action vector. The caller is responsible for checking
    /// that `values` lies in the action space.
    pub fn from_slice(values: &[f32]) -> Self {
        Self {
            kind: ActionKind::from_action_type(values[0]),
            amount: values[1],
        }
    }

    /// Raw vector representation accepted by `Environment::step`
    pub fn to_vec(self) -> Vec<f32> {
        vec![self.kind.action_type(), self.amount]
    }
}

impl Default for TradeAction {
    fn default() -> Self {
        Self::hold()
    }
}

/// The declared action space: `[0, 3] x [0, 1]`
pub fn action_space() -> BoxSpace {
    BoxSpace::new(vec![0.0, 0.0], vec![ACTION_TYPE_HIGH, 1.0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_kind_thresholds() {
        assert_eq!(ActionKind::from_action_type(0.0), ActionKind::Buy);
        assert_eq!(ActionKind::from_action_type(0.99), ActionKind::Buy);
        assert_eq!(ActionKind::from_action_type(1.0), ActionKind::Sell);
        assert_eq!(ActionKind::from_action_type(1.99), ActionKind::Sell);
        assert_eq!(ActionKind::from_action_type(2.0), ActionKind::Hold);
        assert_eq!(ActionKind::from_action_type(3.0), ActionKind::Hold);
    }

    #[test]
    fn test_representative_values_decode_to_same_kind() {
        for kind in [ActionKind::Buy, ActionKind::Sell, ActionKind::Hold] {
            assert_eq!(ActionKind::from_action_type(kind.action_type()), kind);
        }
    }

    #[test]
    fn test_representative_actions_fit_space() {
        let space = action_space();
        assert!(space.contains(&TradeAction::buy(1.0).to_vec()));
        assert!(space.contains(&TradeAction::sell(0.25).to_vec()));
        assert!(space.contains(&TradeAction::hold().to_vec()));
    }
}

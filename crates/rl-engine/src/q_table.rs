//! Dense `[state × action]` action-value table.

use campaign_core::{CampaignError, CampaignResult, DIMENSIONS};
use ndarray::Array2;

/// One action per categorical dimension.
pub const ACTIONS: usize = DIMENSIONS;

#[derive(Debug, Clone, PartialEq)]
pub struct QTable {
    values: Array2<f64>,
}

impl QTable {
    pub fn zeros(states: usize) -> Self {
        Self {
            values: Array2::zeros((states, ACTIONS)),
        }
    }

    /// Build from rows in state-index order.
    pub fn from_rows(rows: Vec<[f64; ACTIONS]>) -> CampaignResult<Self> {
        let states = rows.len();
        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        let values = Array2::from_shape_vec((states, ACTIONS), flat)
            .map_err(|e| CampaignError::PolicyArtifact(format!("bad Q-table shape: {e}")))?;
        Ok(Self { values })
    }

    pub fn states(&self) -> usize {
        self.values.nrows()
    }

    pub fn row(&self, state: usize) -> [f64; ACTIONS] {
        std::array::from_fn(|a| self.values[[state, a]])
    }

    pub fn get(&self, state: usize, action: usize) -> f64 {
        self.values[[state, action]]
    }

    pub fn set(&mut self, state: usize, action: usize, value: f64) {
        self.values[[state, action]] = value;
    }

    /// Greedy action for `state`; ties resolve to the lowest action id.
    pub fn best_action(&self, state: usize) -> usize {
        argmax(&self.row(state))
    }

    pub fn max_value(&self, state: usize) -> f64 {
        self.row(state).into_iter().fold(f64::MIN, f64::max)
    }

    /// Standard one-step Q-learning update.
    pub fn update(
        &mut self,
        state: usize,
        action: usize,
        reward: f64,
        next_state: usize,
        alpha: f64,
        gamma: f64,
    ) {
        let next_max = self.max_value(next_state);
        let current = self.get(state, action);
        self.set(state, action, bellman(current, reward, next_max, alpha, gamma));
    }

    /// Number of `(state, action)` entries that are non-zero.
    pub fn populated(&self) -> usize {
        self.values.iter().filter(|v| **v != 0.0).count()
    }
}

/// Index of the first maximum.
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate().skip(1) {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

/// `(1 - alpha) * current + alpha * (reward + gamma * next_max)`
pub fn bellman(current: f64, reward: f64, next_max: f64, alpha: f64, gamma: f64) -> f64 {
    (1.0 - alpha) * current + alpha * (reward + gamma * next_max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argmax_ties_take_first() {
        assert_eq!(argmax(&[0.0; ACTIONS]), 0);
        assert_eq!(argmax(&[1.0, 3.0, 3.0, -2.0]), 1);
        assert_eq!(argmax(&[-5.0, -1.0, -3.0]), 1);
    }

    #[test]
    fn test_bellman_formula() {
        // 0.9 * 2 + 0.1 * (10 + 0.6 * 5) = 1.8 + 1.3
        let value = bellman(2.0, 10.0, 5.0, 0.1, 0.6);
        assert!((value - 3.1).abs() < 1e-12);
    }

    #[test]
    fn test_update_uses_next_state_maximum() {
        let mut table = QTable::zeros(3);
        table.set(2, 4, 5.0);
        table.set(2, 1, -7.0);
        table.update(0, 3, 1.0, 2, 0.5, 0.5);
        assert!((table.get(0, 3) - 1.75).abs() < 1e-12);
        assert_eq!(table.best_action(0), 3);
        assert_eq!(table.populated(), 3);
    }

    #[test]
    fn test_from_rows_preserves_order() {
        let table = QTable::from_rows(vec![[0.0; ACTIONS], [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]])
            .unwrap();
        assert_eq!(table.states(), 2);
        assert_eq!(table.get(1, 6), 7.0);
        assert_eq!(table.best_action(1), 6);
        assert_eq!(table.max_value(1), 7.0);
    }
}

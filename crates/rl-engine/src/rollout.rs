//! Greedy rollouts over a frozen Q-table.
//!
//! A rollout follows `argmax_a Q[s][a]` from a start state until the reward
//! policy terminates, recording every landed state. Optional Bellman
//! refinement writes to a per-rollout overlay; the shared table is never
//! mutated.

use crate::environment::CampaignEnvironment;
use crate::outcome::OutcomeTable;
use crate::q_table::{argmax, bellman, QTable, ACTIONS};
use crate::reward::reward_policy;
use crate::state_space::StateSpace;
use campaign_core::config::{RewardConfig, RolloutConfig};
use campaign_core::types::CampaignState;
use campaign_core::{CampaignError, CampaignResult};
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct RolloutLimits {
    pub max_steps: usize,
    pub deadline: Option<Instant>,
}

impl RolloutLimits {
    /// Limits for a rollout starting now.
    pub fn from_config(config: &RolloutConfig) -> Self {
        Self {
            max_steps: config.max_steps,
            deadline: config
                .deadline_ms
                .map(|ms| Instant::now() + Duration::from_millis(ms)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Refinement {
    pub alpha: f64,
    pub gamma: f64,
}

impl Refinement {
    pub fn from_config(config: &RolloutConfig) -> Option<Self> {
        config.refine.then_some(Self {
            alpha: config.alpha,
            gamma: config.gamma,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RolloutOutcome {
    pub steps: usize,
    /// Distinct landed state indices, ascending.
    pub candidates: Vec<usize>,
}

/// Copy-on-write view over the shared Q-table.
struct ScratchQ<'a> {
    base: &'a QTable,
    overlay: HashMap<usize, [f64; ACTIONS]>,
}

impl<'a> ScratchQ<'a> {
    fn new(base: &'a QTable) -> Self {
        Self {
            base,
            overlay: HashMap::new(),
        }
    }

    fn row(&self, state: usize) -> [f64; ACTIONS] {
        self.overlay
            .get(&state)
            .copied()
            .unwrap_or_else(|| self.base.row(state))
    }

    fn update(&mut self, state: usize, action: usize, reward: f64, next: usize, r: Refinement) {
        let next_max = self.row(next).into_iter().fold(f64::MIN, f64::max);
        let mut row = self.row(state);
        row[action] = bellman(row[action], reward, next_max, r.alpha, r.gamma);
        self.overlay.insert(state, row);
    }
}

pub struct PolicyRollout<'a> {
    space: &'a StateSpace,
    outcomes: &'a OutcomeTable,
    q_table: &'a QTable,
    reward: &'a RewardConfig,
    refinement: Option<Refinement>,
}

impl<'a> PolicyRollout<'a> {
    pub fn new(
        space: &'a StateSpace,
        outcomes: &'a OutcomeTable,
        q_table: &'a QTable,
        reward: &'a RewardConfig,
        refinement: Option<Refinement>,
    ) -> Self {
        Self {
            space,
            outcomes,
            q_table,
            reward,
            refinement,
        }
    }

    fn environment(&self, start: CampaignState) -> CampaignResult<CampaignEnvironment<'a>> {
        CampaignEnvironment::new(
            self.space,
            self.outcomes,
            self.reward.action_layout,
            reward_policy(self.reward),
            start,
        )
    }

    /// Walk the greedy policy from `start` and collect candidate states.
    pub fn candidates(
        &self,
        start: CampaignState,
        limits: RolloutLimits,
    ) -> CampaignResult<RolloutOutcome> {
        let mut env = self.environment(start)?;
        let mut scratch = ScratchQ::new(self.q_table);
        let mut visited = Vec::new();
        let mut steps = 0usize;

        loop {
            if steps >= limits.max_steps {
                metrics::counter!("rollout.diverged").increment(1);
                return Err(CampaignError::PolicyDiverged { steps });
            }
            if limits.deadline.is_some_and(|d| Instant::now() >= d) {
                metrics::counter!("rollout.deadline_exceeded").increment(1);
                return Err(CampaignError::DeadlineExceeded { steps });
            }

            let state = env.state_index();
            let action = argmax(&scratch.row(state));
            let step = env.step(action)?;
            if let Some(refinement) = self.refinement {
                scratch.update(state, action, step.reward, env.state_index(), refinement);
            }

            visited.push(env.state_index());
            steps += 1;
            if step.terminated {
                break;
            }
        }

        visited.sort_unstable();
        visited.dedup();
        metrics::histogram!("rollout.steps").record(steps as f64);
        debug!(
            start = %start,
            steps,
            candidates = visited.len(),
            refined_states = scratch.overlay.len(),
            "Rollout finished"
        );

        Ok(RolloutOutcome {
            steps,
            candidates: visited,
        })
    }

    /// Apply `action` to `state` once and return the greedy action from the
    /// landed state. Invalid action ids leave the state unchanged.
    pub fn next_action(&self, state: CampaignState, action: usize) -> CampaignResult<usize> {
        let mut env = self.environment(state)?;
        env.step(action)?;
        Ok(self.q_table.best_action(env.state_index()))
    }
}

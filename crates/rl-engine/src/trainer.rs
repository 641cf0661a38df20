//! Epsilon-greedy tabular Q-learning over the campaign environment.

use crate::artifact::PolicyMetadata;
use crate::environment::CampaignEnvironment;
use crate::outcome::OutcomeTable;
use crate::q_table::{QTable, ACTIONS};
use crate::reward::reward_policy;
use crate::state_space::StateSpace;
use campaign_core::config::{RewardConfig, TrainingConfig};
use campaign_core::CampaignResult;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Summary of a finished training run.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub episodes: usize,
    pub terminated_episodes: usize,
    pub truncated_episodes: usize,
    pub total_steps: u64,
    pub mean_episode_reward: f64,
    pub mean_steps: f64,
    pub populated_entries: usize,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone)]
pub struct TrainedPolicy {
    pub q_table: QTable,
    pub metadata: PolicyMetadata,
    pub report: TrainingReport,
}

pub struct QLearningTrainer {
    training: TrainingConfig,
    reward: RewardConfig,
}

impl QLearningTrainer {
    pub fn new(training: TrainingConfig, reward: RewardConfig) -> Self {
        Self { training, reward }
    }

    pub fn train(&self, space: &StateSpace, outcomes: &OutcomeTable) -> CampaignResult<TrainedPolicy> {
        let cfg = &self.training;
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = Instant::now();

        let mut rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut q_table = QTable::zeros(space.total_states());
        let mut env = CampaignEnvironment::new(
            space,
            outcomes,
            self.reward.action_layout,
            reward_policy(&self.reward),
            cfg.start_state(),
        )?;

        info!(
            %run_id,
            states = space.total_states(),
            iterations = cfg.iterations,
            epsilon = cfg.epsilon,
            alpha = cfg.alpha,
            gamma = cfg.gamma,
            reward = ?self.reward.kind,
            layout = ?self.reward.action_layout,
            "Starting Q-learning run"
        );

        let progress_every = (cfg.iterations / 10).max(1);
        let mut terminated_episodes = 0usize;
        let mut truncated_episodes = 0usize;
        let mut total_steps = 0u64;
        let mut reward_sum = 0.0;

        for episode in 0..cfg.iterations {
            if episode > 0 {
                env.reset(space.sample(&mut rng))?;
            }

            let mut steps = 0usize;
            let mut episode_reward = 0.0;
            let mut terminated = false;

            while steps < cfg.max_steps_per_episode {
                let state = env.state_index();
                let action = if rng.gen::<f64>() < cfg.epsilon {
                    rng.gen_range(0..ACTIONS)
                } else {
                    q_table.best_action(state)
                };

                let step = env.step(action)?;
                q_table.update(
                    state,
                    action,
                    step.reward,
                    env.state_index(),
                    cfg.alpha,
                    cfg.gamma,
                );

                steps += 1;
                episode_reward += step.reward;
                if step.terminated {
                    terminated = true;
                    break;
                }
            }

            total_steps += steps as u64;
            reward_sum += episode_reward;
            if terminated {
                terminated_episodes += 1;
            } else {
                truncated_episodes += 1;
                metrics::counter!("training.truncated_episodes").increment(1);
                debug!(episode, steps, "Episode truncated at step cap");
            }
            metrics::counter!("training.episodes").increment(1);
            metrics::counter!("training.steps").increment(steps as u64);

            if (episode + 1) % progress_every == 0 {
                info!(
                    episode = episode + 1,
                    of = cfg.iterations,
                    terminated_episodes,
                    truncated_episodes,
                    "Training progress"
                );
            }
        }

        if truncated_episodes > 0 {
            warn!(
                truncated_episodes,
                cap = cfg.max_steps_per_episode,
                "Some episodes hit the step cap"
            );
        }

        let episodes = cfg.iterations;
        let report = TrainingReport {
            run_id,
            started_at,
            episodes,
            terminated_episodes,
            truncated_episodes,
            total_steps,
            mean_episode_reward: reward_sum / episodes.max(1) as f64,
            mean_steps: total_steps as f64 / episodes.max(1) as f64,
            populated_entries: q_table.populated(),
            elapsed_ms: clock.elapsed().as_millis() as u64,
        };
        info!(
            %run_id,
            total_steps,
            terminated_episodes,
            truncated_episodes,
            elapsed_ms = report.elapsed_ms,
            "Training complete"
        );

        let metadata = PolicyMetadata::new(
            run_id,
            *space.cardinalities(),
            self.reward.action_layout,
            self.reward.kind,
            episodes,
        );

        Ok(TrainedPolicy {
            q_table,
            metadata,
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::Outcome;
    use campaign_core::types::Cardinalities;

    /// Two states that differ only in send day; day 1 always converts.
    fn two_state_fixture() -> (StateSpace, OutcomeTable) {
        let space = StateSpace::new(Cardinalities::new([1, 2, 1, 1, 1, 1, 1]).unwrap());
        let outcomes = OutcomeTable::from_entries(vec![Outcome::new(0, 1), Outcome::new(1, 1)]);
        (space, outcomes)
    }

    fn training(iterations: usize, max_steps: usize) -> TrainingConfig {
        TrainingConfig {
            iterations,
            epsilon: 0.2,
            max_steps_per_episode: max_steps,
            seed: Some(11),
            ..TrainingConfig::default()
        }
    }

    #[test]
    fn test_learns_to_move_toward_converting_state() {
        let (space, outcomes) = two_state_fixture();
        let trainer = QLearningTrainer::new(training(200, 20), RewardConfig::default());
        let trained = trainer.train(&space, &outcomes).unwrap();

        // Action 0 flips the day under the subject-last layout.
        assert_eq!(trained.q_table.best_action(0), 0);
        assert_ne!(trained.q_table.best_action(1), 0);
        assert_eq!(trained.report.episodes, 200);
        assert_eq!(
            trained.report.terminated_episodes + trained.report.truncated_episodes,
            200
        );
    }

    #[test]
    fn test_same_seed_is_reproducible() {
        let (space, outcomes) = two_state_fixture();
        let trainer = QLearningTrainer::new(training(50, 20), RewardConfig::default());
        let a = trainer.train(&space, &outcomes).unwrap();
        let b = trainer.train(&space, &outcomes).unwrap();
        assert_eq!(a.q_table, b.q_table);
        assert_eq!(a.report.total_steps, b.report.total_steps);
        assert_ne!(a.report.run_id, b.report.run_id);
    }

    #[test]
    fn test_step_cap_truncates_without_failing() {
        let space = StateSpace::new(Cardinalities::new([1, 2, 1, 1, 1, 1, 1]).unwrap());
        let outcomes = OutcomeTable::from_entries(vec![Outcome::default(); 2]);
        let trainer = QLearningTrainer::new(training(3, 5), RewardConfig::default());
        let trained = trainer.train(&space, &outcomes).unwrap();
        assert_eq!(trained.report.truncated_episodes, 3);
        assert_eq!(trained.report.total_steps, 15);
        assert!((trained.report.mean_episode_reward + 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_metadata_records_layout_and_cardinalities() {
        let (space, outcomes) = two_state_fixture();
        let trainer = QLearningTrainer::new(training(5, 20), RewardConfig::default());
        let trained = trainer.train(&space, &outcomes).unwrap();
        assert_eq!(trained.metadata.cardinalities, *space.cardinalities());
        assert_eq!(trained.metadata.run_id, trained.report.run_id);
        assert_eq!(trained.metadata.iterations, 5);
    }

    #[test]
    fn test_invalid_start_state_rejected() {
        let (space, outcomes) = two_state_fixture();
        let mut cfg = training(5, 20);
        cfg.start_state = [2, 0, 0, 0, 0, 0, 0];
        let trainer = QLearningTrainer::new(cfg, RewardConfig::default());
        assert!(trainer.train(&space, &outcomes).is_err());
    }
}

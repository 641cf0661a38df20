//! Reward and termination policies for the campaign environment.
//!
//! Two policies are supported, selected by [`RewardPolicyKind`]:
//! - [`TieredReward`] tracks per-subject running totals and terminates once a
//!   subject clears both the conversion target and a minimum send volume.
//! - [`ProportionalReward`] pays out in proportion to the responses of the
//!   landed state and terminates on a global running conversion rate.

use crate::outcome::Outcome;
use campaign_core::config::{CounterScope, RewardConfig, RewardPolicyKind};
use campaign_core::types::CampaignState;
use std::collections::HashMap;

/// Reward for an action id outside the action set.
pub const INVALID_ACTION_PENALTY: f64 = -100.0;

/// Reward tiers of the tiered policy.
const TIERED_GOAL_MULTIPLIER: f64 = 10.0;
const TIERED_RESPONSE_REWARD: f64 = 10.0;
const TIERED_MISS_REWARD: f64 = -1.0;

/// Result of evaluating one transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Feedback {
    pub reward: f64,
    pub terminated: bool,
}

pub trait RewardPolicy: Send {
    fn kind(&self) -> RewardPolicyKind;

    /// Called when a new episode starts.
    fn begin_episode(&mut self);

    /// Score landing in `state`, whose historical outcome is `outcome`.
    fn evaluate(&mut self, state: &CampaignState, outcome: Outcome) -> Feedback;
}

/// Build the configured policy.
pub fn reward_policy(config: &RewardConfig) -> Box<dyn RewardPolicy> {
    match config.kind {
        RewardPolicyKind::Tiered => Box::new(TieredReward::new(
            config.target_conversion_rate,
            config.min_volume_threshold,
            config.reward_factor,
            config.counter_scope,
        )),
        RewardPolicyKind::Proportional => Box::new(ProportionalReward::new(
            config.target_conversion_rate,
            config.reward_factor,
        )),
    }
}

#[derive(Debug, Clone)]
pub struct TieredReward {
    target_conversion_rate: f64,
    min_volume: u64,
    reward_factor: f64,
    scope: CounterScope,
    by_subject: HashMap<u32, Outcome>,
}

impl TieredReward {
    pub fn new(
        target_conversion_rate: f64,
        min_volume: u64,
        reward_factor: f64,
        scope: CounterScope,
    ) -> Self {
        Self {
            target_conversion_rate,
            min_volume,
            reward_factor,
            scope,
            by_subject: HashMap::new(),
        }
    }

    /// Running totals for a subject.
    pub fn subject_totals(&self, subject_id: u32) -> Outcome {
        self.by_subject.get(&subject_id).copied().unwrap_or_default()
    }
}

impl RewardPolicy for TieredReward {
    fn kind(&self) -> RewardPolicyKind {
        RewardPolicyKind::Tiered
    }

    fn begin_episode(&mut self) {
        if self.scope == CounterScope::Episode {
            self.by_subject.clear();
        }
    }

    fn evaluate(&mut self, state: &CampaignState, outcome: Outcome) -> Feedback {
        let totals = self.by_subject.entry(state.subject_id).or_default();
        totals.responses += outcome.responses;
        totals.sent += outcome.sent;

        let goal_met = totals.conversion_rate() > self.target_conversion_rate
            && totals.sent > self.min_volume;

        let reward = if goal_met {
            self.reward_factor * TIERED_GOAL_MULTIPLIER
        } else if outcome.responses > 0 {
            TIERED_RESPONSE_REWARD
        } else {
            TIERED_MISS_REWARD
        };

        Feedback {
            reward,
            terminated: goal_met,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProportionalReward {
    target_conversion_rate: f64,
    reward_factor: f64,
    emails_sent: u64,
    conversions: u64,
}

impl ProportionalReward {
    pub fn new(target_conversion_rate: f64, reward_factor: f64) -> Self {
        Self {
            target_conversion_rate,
            reward_factor,
            emails_sent: 0,
            conversions: 0,
        }
    }

    /// Running episode conversion rate, 0.0 before the first step.
    pub fn conversion_rate(&self) -> f64 {
        Outcome::new(self.conversions, self.emails_sent).conversion_rate()
    }
}

impl RewardPolicy for ProportionalReward {
    fn kind(&self) -> RewardPolicyKind {
        RewardPolicyKind::Proportional
    }

    fn begin_episode(&mut self) {
        self.emails_sent = 0;
        self.conversions = 0;
    }

    fn evaluate(&mut self, _state: &CampaignState, outcome: Outcome) -> Feedback {
        // Each step sends one email into the landed segment.
        self.emails_sent += 1;
        if outcome.responses > 0 {
            self.conversions += 1;
        }

        Feedback {
            reward: self.reward_factor * outcome.responses as f64,
            terminated: self.conversion_rate() > self.target_conversion_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(subject: u32) -> CampaignState {
        CampaignState::for_subject(subject)
    }

    #[test]
    fn test_tiered_tiers() {
        let mut policy = TieredReward::new(0.3, 10, 3.0, CounterScope::Episode);

        let miss = policy.evaluate(&state(1), Outcome::new(0, 4));
        assert_eq!(miss, Feedback { reward: -1.0, terminated: false });

        let hit = policy.evaluate(&state(1), Outcome::new(1, 4));
        assert_eq!(hit, Feedback { reward: 10.0, terminated: false });
        assert_eq!(policy.subject_totals(1), Outcome::new(1, 8));

        // 1 + 4 = 5 responses over 8 + 4 = 12 sent: rate 0.41 > 0.3, volume 12 > 10.
        let goal = policy.evaluate(&state(1), Outcome::new(4, 4));
        assert_eq!(goal, Feedback { reward: 30.0, terminated: true });
    }

    #[test]
    fn test_tiered_requires_minimum_volume() {
        let mut policy = TieredReward::new(0.3, 10, 3.0, CounterScope::Episode);
        let feedback = policy.evaluate(&state(2), Outcome::new(5, 5));
        assert!(!feedback.terminated);
        assert_eq!(feedback.reward, 10.0);
    }

    #[test]
    fn test_tiered_counters_are_per_subject() {
        let mut policy = TieredReward::new(0.3, 10, 3.0, CounterScope::Episode);
        policy.evaluate(&state(1), Outcome::new(6, 6));
        let other = policy.evaluate(&state(2), Outcome::new(6, 6));
        assert!(!other.terminated);
        assert_eq!(policy.subject_totals(1), Outcome::new(6, 6));
        assert_eq!(policy.subject_totals(2), Outcome::new(6, 6));
    }

    #[test]
    fn test_episode_scope_resets_counters() {
        let mut policy = TieredReward::new(0.3, 10, 3.0, CounterScope::Episode);
        policy.evaluate(&state(1), Outcome::new(6, 6));
        policy.begin_episode();
        assert_eq!(policy.subject_totals(1), Outcome::default());
        assert!(!policy.evaluate(&state(1), Outcome::new(6, 6)).terminated);
    }

    #[test]
    fn test_run_scope_carries_counters_across_episodes() {
        let mut policy = TieredReward::new(0.3, 10, 3.0, CounterScope::Run);
        policy.evaluate(&state(1), Outcome::new(6, 6));
        policy.begin_episode();
        assert_eq!(policy.subject_totals(1), Outcome::new(6, 6));
        assert!(policy.evaluate(&state(1), Outcome::new(6, 6)).terminated);
    }

    #[test]
    fn test_proportional_reward_scales_with_responses() {
        let mut policy = ProportionalReward::new(0.9, 2.0);
        let feedback = policy.evaluate(&state(1), Outcome::new(0, 3));
        assert_eq!(feedback, Feedback { reward: 0.0, terminated: false });
        let feedback = policy.evaluate(&state(1), Outcome::new(4, 9));
        assert_eq!(feedback.reward, 8.0);
        assert!(feedback.reward >= 0.0);
    }

    #[test]
    fn test_proportional_rate_rises_only_on_response() {
        let mut policy = ProportionalReward::new(0.99, 1.0);
        let outcomes = [
            Outcome::new(1, 2),
            Outcome::new(0, 5),
            Outcome::new(0, 1),
            Outcome::new(3, 3),
            Outcome::new(0, 0),
            Outcome::new(2, 7),
        ];
        let mut previous = policy.conversion_rate();
        for (step, outcome) in outcomes.into_iter().enumerate() {
            policy.evaluate(&state(1), outcome);
            let rate = policy.conversion_rate();
            if rate > previous {
                assert!(outcome.responses > 0, "rate rose without a response at step {step}");
            }
            previous = rate;
        }
    }

    #[test]
    fn test_proportional_terminates_above_target() {
        let mut policy = ProportionalReward::new(0.4, 1.0);
        assert!(!policy.evaluate(&state(1), Outcome::new(0, 1)).terminated);
        assert!(!policy.evaluate(&state(1), Outcome::new(0, 1)).terminated);
        // 1 / 3 = 0.33
        assert!(!policy.evaluate(&state(1), Outcome::new(1, 1)).terminated);
        // 2 / 4 = 0.5
        assert!(policy.evaluate(&state(1), Outcome::new(1, 1)).terminated);
        policy.begin_episode();
        assert_eq!(policy.conversion_rate(), 0.0);
    }

    #[test]
    fn test_factory_selects_kind() {
        let mut config = RewardConfig::default();
        assert_eq!(reward_policy(&config).kind(), RewardPolicyKind::Tiered);
        config.kind = RewardPolicyKind::Proportional;
        assert_eq!(reward_policy(&config).kind(), RewardPolicyKind::Proportional);
    }
}

//! Campaign environment: one episode's current state plus the reward policy
//! that scores each transition against the outcome table.

use crate::outcome::OutcomeTable;
use crate::reward::{RewardPolicy, INVALID_ACTION_PENALTY};
use crate::state_space::StateSpace;
use campaign_core::config::ActionLayout;
use campaign_core::types::CampaignState;
use campaign_core::CampaignResult;

/// Result of a single environment step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Step {
    pub reward: f64,
    pub terminated: bool,
}

pub struct CampaignEnvironment<'a> {
    space: &'a StateSpace,
    outcomes: &'a OutcomeTable,
    layout: ActionLayout,
    reward: Box<dyn RewardPolicy + 'a>,
    state: CampaignState,
    index: usize,
}

impl<'a> CampaignEnvironment<'a> {
    /// Create an environment positioned at `start`. Fails if `start` is out of range.
    pub fn new(
        space: &'a StateSpace,
        outcomes: &'a OutcomeTable,
        layout: ActionLayout,
        reward: Box<dyn RewardPolicy + 'a>,
        start: CampaignState,
    ) -> CampaignResult<Self> {
        let index = space.encode(&start)?;
        let mut env = Self {
            space,
            outcomes,
            layout,
            reward,
            state: start,
            index,
        };
        env.reward.begin_episode();
        Ok(env)
    }

    /// Start a new episode at `start`.
    pub fn reset(&mut self, start: CampaignState) -> CampaignResult<()> {
        self.index = self.space.encode(&start)?;
        self.state = start;
        self.reward.begin_episode();
        Ok(())
    }

    /// Apply `action`. Ids outside the action set are penalised and leave
    /// the state untouched.
    pub fn step(&mut self, action: usize) -> CampaignResult<Step> {
        let Some(dim) = self.layout.dimension(action) else {
            return Ok(Step {
                reward: INVALID_ACTION_PENALTY,
                terminated: false,
            });
        };

        let next = self.space.advance(&self.state, dim);
        let next_index = self.space.encode(&next)?;
        let outcome = self.outcomes.get(next_index);
        let feedback = self.reward.evaluate(&next, outcome);

        self.state = next;
        self.index = next_index;

        Ok(Step {
            reward: feedback.reward,
            terminated: feedback.terminated,
        })
    }

    pub fn state(&self) -> CampaignState {
        self.state
    }

    pub fn state_index(&self) -> usize {
        self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::Outcome;
    use crate::reward::{ProportionalReward, TieredReward};
    use campaign_core::config::CounterScope;
    use campaign_core::types::{Cardinalities, Dimension};

    fn fixtures() -> (StateSpace, OutcomeTable) {
        let space = StateSpace::new(Cardinalities::default());
        let outcomes = OutcomeTable::from_entries(vec![Outcome::default(); space.total_states()]);
        (space, outcomes)
    }

    fn tiered() -> Box<dyn RewardPolicy> {
        Box::new(TieredReward::new(0.3, 10, 3.0, CounterScope::Episode))
    }

    #[test]
    fn test_invalid_action_is_penalised_without_moving() {
        let (space, outcomes) = fixtures();
        let start = CampaignState::new([2, 3, 1, 0, 0, 1, 0]);
        let mut env =
            CampaignEnvironment::new(&space, &outcomes, ActionLayout::SubjectLast, tiered(), start)
                .unwrap();
        for action in [7, 8, 100, usize::MAX] {
            let step = env.step(action).unwrap();
            assert_eq!(step.reward, -100.0);
            assert!(!step.terminated);
            assert_eq!(env.state(), start);
        }
    }

    #[test]
    fn test_subject_first_action_five_flips_gender() {
        let (space, outcomes) = fixtures();
        let start = CampaignState::new([1, 0, 0, 0, 0, 1, 0]);
        let mut env =
            CampaignEnvironment::new(&space, &outcomes, ActionLayout::SubjectFirst, tiered(), start)
                .unwrap();
        let step = env.step(5).unwrap();
        assert_eq!(env.state(), CampaignState::new([1, 0, 0, 0, 0, 0, 0]));
        assert_eq!(env.state_index(), 0);
        assert_eq!(step.reward, -1.0);
    }

    #[test]
    fn test_subject_last_action_six_advances_subject() {
        let (space, outcomes) = fixtures();
        let mut env = CampaignEnvironment::new(
            &space,
            &outcomes,
            ActionLayout::SubjectLast,
            tiered(),
            CampaignState::for_subject(3),
        )
        .unwrap();
        env.step(6).unwrap();
        assert_eq!(env.state().subject_id, 1);
        env.step(0).unwrap();
        assert_eq!(env.state().get(Dimension::DayOfWeek), 1);
    }

    #[test]
    fn test_reward_reads_landed_state_outcome() {
        let space = StateSpace::new(Cardinalities::default());
        let landed = CampaignState::new([1, 1, 0, 0, 0, 0, 0]);
        let mut entries = vec![Outcome::default(); space.total_states()];
        entries[space.encode(&landed).unwrap()] = Outcome::new(3, 5);
        let outcomes = OutcomeTable::from_entries(entries);

        let reward = Box::new(ProportionalReward::new(0.5, 2.0));
        let mut env = CampaignEnvironment::new(
            &space,
            &outcomes,
            ActionLayout::SubjectLast,
            reward,
            CampaignState::for_subject(1),
        )
        .unwrap();
        let step = env.step(0).unwrap();
        assert_eq!(env.state(), landed);
        assert_eq!(step.reward, 6.0);
        // One email with a response: running rate 1.0 > 0.5.
        assert!(step.terminated);
    }

    #[test]
    fn test_out_of_range_start_rejected() {
        let (space, outcomes) = fixtures();
        let bad = CampaignState::new([1, 0, 0, 0, 0, 0, 5]);
        assert!(
            CampaignEnvironment::new(&space, &outcomes, ActionLayout::SubjectLast, tiered(), bad)
                .is_err()
        );
    }
}

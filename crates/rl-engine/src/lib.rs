//! Tabular reinforcement-learning engine for campaign targeting: state
//! encoding, outcome tables, the campaign environment, Q-learning, greedy
//! rollouts and policy persistence.

pub mod artifact;
pub mod environment;
pub mod outcome;
pub mod policy;
pub mod q_table;
pub mod reward;
pub mod rollout;
pub mod state_space;
pub mod trainer;

pub use artifact::{LoadedPolicy, PolicyMetadata};
pub use environment::{CampaignEnvironment, Step};
pub use outcome::{Outcome, OutcomeTable};
pub use policy::{PolicyEngine, PolicySnapshot};
pub use q_table::{QTable, ACTIONS};
pub use reward::{reward_policy, RewardPolicy, INVALID_ACTION_PENALTY};
pub use rollout::{PolicyRollout, Refinement, RolloutLimits, RolloutOutcome};
pub use state_space::StateSpace;
pub use trainer::{QLearningTrainer, TrainedPolicy, TrainingReport};

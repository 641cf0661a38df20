//! Serving-side policy: an immutable snapshot of everything a query needs,
//! held behind an `Arc` so a reload never blocks in-flight requests.

use crate::artifact::{self, LoadedPolicy, PolicyMetadata};
use crate::outcome::OutcomeTable;
use crate::q_table::QTable;
use crate::rollout::{PolicyRollout, Refinement, RolloutLimits, RolloutOutcome};
use crate::state_space::StateSpace;
use campaign_core::config::{RewardConfig, RolloutConfig, SentCounting};
use campaign_core::types::CampaignState;
use campaign_core::{AppConfig, CampaignError, CampaignResult, TrainingTable};
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub struct PolicySnapshot {
    space: StateSpace,
    /// Reward-side outcomes, counted as configured.
    outcomes: OutcomeTable,
    /// Observed `(Σ responses, Σ Sent_Emails)` per state for reporting.
    conversions: OutcomeTable,
    q_table: QTable,
    reward: RewardConfig,
    rollout: RolloutConfig,
    metadata: Option<PolicyMetadata>,
}

impl PolicySnapshot {
    pub fn new(
        space: StateSpace,
        outcomes: OutcomeTable,
        conversions: OutcomeTable,
        q_table: QTable,
        reward: RewardConfig,
        rollout: RolloutConfig,
    ) -> CampaignResult<Self> {
        if q_table.states() != space.total_states() {
            return Err(CampaignError::DimensionMismatch {
                dimension: "policy states".to_string(),
                expected: space.total_states(),
                actual: q_table.states(),
            });
        }
        Ok(Self {
            space,
            outcomes,
            conversions,
            q_table,
            reward,
            rollout,
            metadata: None,
        })
    }

    /// Build from an already-loaded training table and policy artifact.
    pub fn from_parts(
        config: &AppConfig,
        table: &TrainingTable,
        policy: LoadedPolicy,
    ) -> CampaignResult<Self> {
        let space = StateSpace::new(table.cardinalities()?);
        let outcomes = OutcomeTable::build(table, &space, config.data.sent_counting)?;
        let conversions = OutcomeTable::build(table, &space, SentCounting::SentEmailsColumn)?;
        let mut snapshot = Self::new(
            space,
            outcomes,
            conversions,
            policy.q_table,
            config.reward.clone(),
            config.rollout.clone(),
        )?;
        snapshot.metadata = policy.metadata;
        Ok(snapshot)
    }

    /// Load the training table and policy artifact named in `config`.
    pub fn load(config: &AppConfig) -> CampaignResult<Self> {
        let table = TrainingTable::load(&config.data.training_table)?;
        let cardinalities = table.cardinalities()?;
        let policy = artifact::load(
            Path::new(&config.data.policy_artifact),
            config.reward.action_layout,
            &cardinalities,
        )?;
        Self::from_parts(config, &table, policy)
    }

    pub fn space(&self) -> &StateSpace {
        &self.space
    }

    pub fn outcomes(&self) -> &OutcomeTable {
        &self.outcomes
    }

    pub fn conversions(&self) -> &OutcomeTable {
        &self.conversions
    }

    pub fn q_table(&self) -> &QTable {
        &self.q_table
    }

    pub fn metadata(&self) -> Option<&PolicyMetadata> {
        self.metadata.as_ref()
    }

    pub fn rollout(&self) -> PolicyRollout<'_> {
        PolicyRollout::new(
            &self.space,
            &self.outcomes,
            &self.q_table,
            &self.reward,
            Refinement::from_config(&self.rollout),
        )
    }

    /// Candidate states reachable from `start` under the configured limits.
    pub fn candidates(&self, start: CampaignState) -> CampaignResult<RolloutOutcome> {
        self.rollout()
            .candidates(start, RolloutLimits::from_config(&self.rollout))
    }

    pub fn next_action(&self, state: CampaignState, action: usize) -> CampaignResult<usize> {
        self.rollout().next_action(state, action)
    }
}

/// Thread-safe holder of the current policy snapshot.
pub struct PolicyEngine {
    snapshot: RwLock<Arc<PolicySnapshot>>,
}

impl PolicyEngine {
    pub fn new(snapshot: PolicySnapshot) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(snapshot)),
        }
    }

    pub fn load(config: &AppConfig) -> CampaignResult<Self> {
        let snapshot = PolicySnapshot::load(config)?;
        info!(
            states = snapshot.space().total_states(),
            run_id = ?snapshot.metadata().map(|m| m.run_id),
            "Policy engine initialized"
        );
        Ok(Self::new(snapshot))
    }

    /// The snapshot to use for one request.
    pub fn current(&self) -> Arc<PolicySnapshot> {
        self.snapshot.read().clone()
    }

    pub fn swap(&self, snapshot: PolicySnapshot) {
        *self.snapshot.write() = Arc::new(snapshot);
    }

    /// Hot-reload from disk. On failure the current snapshot stays in place.
    pub fn reload(&self, config: &AppConfig) -> CampaignResult<()> {
        info!(path = %config.data.policy_artifact, "Hot-reloading policy");
        let snapshot = PolicySnapshot::load(config)?;
        self.swap(snapshot);
        info!("Policy hot-reload complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::Outcome;
    use campaign_core::types::Cardinalities;

    fn snapshot(best_action: usize) -> PolicySnapshot {
        let space = StateSpace::new(Cardinalities::new([1, 2, 1, 1, 1, 1, 1]).unwrap());
        let outcomes = OutcomeTable::from_entries(vec![Outcome::new(0, 1), Outcome::new(1, 1)]);
        let mut q = QTable::zeros(2);
        q.set(0, best_action, 1.0);
        q.set(1, best_action, 1.0);
        PolicySnapshot::new(
            space,
            outcomes.clone(),
            outcomes,
            q,
            RewardConfig::default(),
            RolloutConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_mismatched_q_table_rejected() {
        let space = StateSpace::new(Cardinalities::default());
        let outcomes = OutcomeTable::from_entries(vec![]);
        let result = PolicySnapshot::new(
            space,
            outcomes.clone(),
            outcomes,
            QTable::zeros(3),
            RewardConfig::default(),
            RolloutConfig::default(),
        );
        assert!(matches!(result, Err(CampaignError::DimensionMismatch { actual: 3, .. })));
    }

    #[test]
    fn test_swap_keeps_in_flight_snapshot() {
        let engine = PolicyEngine::new(snapshot(2));
        let held = engine.current();
        engine.swap(snapshot(4));

        let state = CampaignState::for_subject(1);
        assert_eq!(held.next_action(state, 0).unwrap(), 2);
        assert_eq!(engine.current().next_action(state, 0).unwrap(), 4);
    }

    #[test]
    fn test_failed_reload_keeps_current_snapshot() {
        let engine = PolicyEngine::new(snapshot(3));
        let mut config = AppConfig::default();
        config.data.training_table = "/nonexistent/campaign.csv".to_string();
        assert!(engine.reload(&config).is_err());
        let state = CampaignState::for_subject(1);
        assert_eq!(engine.current().next_action(state, 0).unwrap(), 3);
    }
}

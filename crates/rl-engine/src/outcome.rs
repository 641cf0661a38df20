//! Per-state historical outcome statistics, built once from the training table.

use crate::state_space::StateSpace;
use campaign_core::config::SentCounting;
use campaign_core::{CampaignResult, TrainingTable};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Responses received and emails sent for one state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub responses: u64,
    pub sent: u64,
}

impl Outcome {
    pub fn new(responses: u64, sent: u64) -> Self {
        Self { responses, sent }
    }

    /// `responses / sent`, or 0.0 when nothing was sent.
    pub fn conversion_rate(&self) -> f64 {
        if self.sent > 0 {
            self.responses as f64 / self.sent as f64
        } else {
            0.0
        }
    }
}

/// Dense outcome table indexed by state index. Unvisited states are `(0, 0)`.
#[derive(Debug, Clone)]
pub struct OutcomeTable {
    entries: Vec<Outcome>,
}

impl OutcomeTable {
    pub fn build(
        table: &TrainingTable,
        space: &StateSpace,
        counting: SentCounting,
    ) -> CampaignResult<Self> {
        let mut entries = vec![Outcome::default(); space.total_states()];
        for row in table.rows() {
            let index = space.encode(&row.state())?;
            let entry = &mut entries[index];
            entry.responses += row.response_received;
            entry.sent += match counting {
                SentCounting::Rows => 1,
                SentCounting::SentEmailsColumn => row.sent_emails,
            };
        }

        let visited = entries.iter().filter(|e| e.sent > 0).count();
        info!(
            states = entries.len(),
            visited,
            rows = table.len(),
            "Built outcome table"
        );
        Ok(Self { entries })
    }

    pub fn from_entries(entries: Vec<Outcome>) -> Self {
        Self { entries }
    }

    /// Outcome at `index`; out-of-range indices read as unvisited.
    pub fn get(&self, index: usize) -> Outcome {
        self.entries.get(index).copied().unwrap_or_default()
    }

    pub fn total(&self) -> Outcome {
        self.entries.iter().fold(Outcome::default(), |acc, e| Outcome {
            responses: acc.responses + e.responses,
            sent: acc.sent + e.sent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campaign_core::types::{Cardinalities, CampaignState};
    use campaign_core::{CampaignError, TrainingRow};

    fn row(state: [u32; 7], responses: u64, sent: u64) -> TrainingRow {
        TrainingRow {
            subject_id: state[0],
            sent_day: state[1],
            tenure_group: state[2],
            email_domain: state[3],
            age_group: state[4],
            gender: state[5],
            customer_type: state[6],
            response_received: responses,
            sent_emails: sent,
        }
    }

    fn space() -> StateSpace {
        StateSpace::new(Cardinalities::default())
    }

    #[test]
    fn test_two_rows_on_same_state_accumulate() {
        let space = space();
        let state = space.decode(42).unwrap();
        let table = TrainingTable::from_rows(vec![
            row(state.fields(), 1, 1),
            row(state.fields(), 0, 1),
        ]);
        let outcomes = OutcomeTable::build(&table, &space, SentCounting::Rows).unwrap();
        assert_eq!(outcomes.get(42), Outcome::new(1, 2));
        assert_eq!(outcomes.get(41), Outcome::default());
    }

    #[test]
    fn test_row_counting_sums_to_row_count() {
        let space = space();
        let rows: Vec<_> = (0..50)
            .map(|i| {
                let state = space.decode((i * 353) % space.total_states()).unwrap();
                row(state.fields(), (i % 2) as u64, 7)
            })
            .collect();
        let table = TrainingTable::from_rows(rows);
        let outcomes = OutcomeTable::build(&table, &space, SentCounting::Rows).unwrap();
        assert_eq!(outcomes.total().sent, 50);
        assert_eq!(outcomes.total().responses, 25);
    }

    #[test]
    fn test_sent_emails_column_counting() {
        let space = space();
        let table = TrainingTable::from_rows(vec![
            row([1, 0, 0, 0, 0, 0, 0], 2, 10),
            row([1, 0, 0, 0, 0, 0, 0], 1, 5),
        ]);
        let outcomes = OutcomeTable::build(&table, &space, SentCounting::SentEmailsColumn).unwrap();
        assert_eq!(outcomes.get(0), Outcome::new(3, 15));
        assert!((outcomes.get(0).conversion_rate() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_out_of_range_row_rejected() {
        let space = space();
        let table = TrainingTable::from_rows(vec![row([1, 9, 0, 0, 0, 0, 0], 1, 1)]);
        let err = OutcomeTable::build(&table, &space, SentCounting::Rows).unwrap_err();
        assert!(matches!(err, CampaignError::Validation(_)));
    }

    #[test]
    fn test_zero_sent_rate_is_zero() {
        assert_eq!(Outcome::default().conversion_rate(), 0.0);
        let state = CampaignState::for_subject(1);
        assert_eq!(space().encode(&state).unwrap(), 0);
    }
}

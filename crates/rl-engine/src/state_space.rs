//! Mixed-radix encoding of campaign states into dense indices.

use campaign_core::types::{Cardinalities, CampaignState, Dimension, DIMENSIONS};
use campaign_core::{CampaignError, CampaignResult};
use rand::Rng;

/// The full Cartesian product of dimension values, indexed densely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateSpace {
    cardinalities: Cardinalities,
    place_values: [usize; DIMENSIONS],
    total_states: usize,
}

impl StateSpace {
    pub fn new(cardinalities: Cardinalities) -> Self {
        let cards = cardinalities.as_array();
        let mut place_values = [1usize; DIMENSIONS];
        for i in (0..DIMENSIONS - 1).rev() {
            place_values[i] = place_values[i + 1] * cards[i + 1];
        }
        Self {
            cardinalities,
            place_values,
            total_states: cardinalities.total_states(),
        }
    }

    pub fn cardinalities(&self) -> &Cardinalities {
        &self.cardinalities
    }

    pub fn total_states(&self) -> usize {
        self.total_states
    }

    /// Check every field against its dimension's range.
    pub fn validate(&self, state: &CampaignState) -> CampaignResult<()> {
        for dim in Dimension::ALL {
            let value = state.get(dim);
            let (min, max) = (dim.min_value(), self.cardinalities.max_value(dim));
            if value < min || value > max {
                return Err(CampaignError::validation(format!(
                    "{dim} value {value} outside [{min}, {max}]"
                )));
            }
        }
        Ok(())
    }

    pub fn contains(&self, state: &CampaignState) -> bool {
        self.validate(state).is_ok()
    }

    pub fn encode(&self, state: &CampaignState) -> CampaignResult<usize> {
        self.validate(state)?;
        Ok(Dimension::ALL
            .iter()
            .map(|dim| {
                let digit = (state.get(*dim) - dim.min_value()) as usize;
                digit * self.place_values[dim.position()]
            })
            .sum())
    }

    pub fn decode(&self, index: usize) -> CampaignResult<CampaignState> {
        if index >= self.total_states {
            return Err(CampaignError::validation(format!(
                "state index {index} outside [0, {})",
                self.total_states
            )));
        }
        let mut fields = [0u32; DIMENSIONS];
        let mut rem = index;
        for dim in Dimension::ALL {
            let place = self.place_values[dim.position()];
            fields[dim.position()] = (rem / place) as u32 + dim.min_value();
            rem %= place;
        }
        Ok(CampaignState::new(fields))
    }

    /// Advance one field cyclically within its range. For the binary
    /// dimensions this is a 0/1 flip.
    pub fn advance(&self, state: &CampaignState, dim: Dimension) -> CampaignState {
        let card = self.cardinalities.get(dim) as u32;
        let min = dim.min_value();
        let offset = state.get(dim).saturating_sub(min);
        state.with(dim, min + (offset + 1) % card)
    }

    /// Uniformly random valid state.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> CampaignState {
        let fields = std::array::from_fn(|i| {
            let dim = Dimension::ALL[i];
            rng.gen_range(dim.min_value()..=self.cardinalities.max_value(dim))
        });
        CampaignState::new(fields)
    }
}

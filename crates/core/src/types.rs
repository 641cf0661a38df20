use crate::error::{CampaignError, CampaignResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of categorical dimensions (and therefore actions) in a campaign state.
pub const DIMENSIONS: usize = 7;

/// A named categorical axis of the campaign state space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Subject,
    DayOfWeek,
    TenureGroup,
    EmailDomain,
    AgeGroup,
    Gender,
    CustomerType,
}

impl Dimension {
    /// All dimensions, most significant digit first.
    pub const ALL: [Dimension; DIMENSIONS] = [
        Dimension::Subject,
        Dimension::DayOfWeek,
        Dimension::TenureGroup,
        Dimension::EmailDomain,
        Dimension::AgeGroup,
        Dimension::Gender,
        Dimension::CustomerType,
    ];

    pub fn position(self) -> usize {
        match self {
            Dimension::Subject => 0,
            Dimension::DayOfWeek => 1,
            Dimension::TenureGroup => 2,
            Dimension::EmailDomain => 3,
            Dimension::AgeGroup => 4,
            Dimension::Gender => 5,
            Dimension::CustomerType => 6,
        }
    }

    /// Column header used for this dimension's action in the policy artifact.
    pub fn column_name(self) -> &'static str {
        match self {
            Dimension::Subject => "Subject Id",
            Dimension::DayOfWeek => "Day of Week",
            Dimension::TenureGroup => "Tenure Group",
            Dimension::EmailDomain => "Email Domain",
            Dimension::AgeGroup => "Age Group",
            Dimension::Gender => "Gender",
            Dimension::CustomerType => "Type",
        }
    }

    /// Smallest legal value. Subject ids are 1-based.
    pub fn min_value(self) -> u32 {
        match self {
            Dimension::Subject => 1,
            _ => 0,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column_name())
    }
}

/// One audience segment and send context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CampaignState {
    pub subject_id: u32,
    pub day_of_week: u32,
    pub tenure_group: u32,
    pub email_domain: u32,
    pub age_group: u32,
    pub gender: u32,
    pub customer_type: u32,
}

impl CampaignState {
    pub fn new(fields: [u32; DIMENSIONS]) -> Self {
        Self {
            subject_id: fields[0],
            day_of_week: fields[1],
            tenure_group: fields[2],
            email_domain: fields[3],
            age_group: fields[4],
            gender: fields[5],
            customer_type: fields[6],
        }
    }

    /// Build a state from signed wire values, rejecting negatives.
    pub fn from_wire(fields: &[i64]) -> CampaignResult<Self> {
        if fields.len() != DIMENSIONS {
            return Err(CampaignError::DimensionMismatch {
                dimension: "state".to_string(),
                expected: DIMENSIONS,
                actual: fields.len(),
            });
        }
        let mut out = [0u32; DIMENSIONS];
        for (slot, (&value, dim)) in out.iter_mut().zip(fields.iter().zip(Dimension::ALL)) {
            *slot = u32::try_from(value).map_err(|_| {
                CampaignError::validation(format!("{dim} value {value} is out of range"))
            })?;
        }
        Ok(Self::new(out))
    }

    /// The opening state for a subject: every other field at its first value.
    pub fn for_subject(subject_id: u32) -> Self {
        Self::new([subject_id, 0, 0, 0, 0, 0, 0])
    }

    pub fn fields(&self) -> [u32; DIMENSIONS] {
        [
            self.subject_id,
            self.day_of_week,
            self.tenure_group,
            self.email_domain,
            self.age_group,
            self.gender,
            self.customer_type,
        ]
    }

    pub fn get(&self, dim: Dimension) -> u32 {
        self.fields()[dim.position()]
    }

    pub fn with(&self, dim: Dimension, value: u32) -> Self {
        let mut fields = self.fields();
        fields[dim.position()] = value;
        Self::new(fields)
    }
}

impl Default for CampaignState {
    fn default() -> Self {
        Self::for_subject(1)
    }
}

impl fmt::Display for CampaignState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [s, d, t, e, a, g, c] = self.fields();
        write!(f, "({s},{d},{t},{e},{a},{g},{c})")
    }
}

/// Per-dimension cardinalities. Fixed for the lifetime of a trained policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cardinalities {
    pub subject: usize,
    pub day_of_week: usize,
    pub tenure_group: usize,
    pub email_domain: usize,
    pub age_group: usize,
    pub gender: usize,
    pub customer_type: usize,
}

impl Cardinalities {
    pub fn new(values: [usize; DIMENSIONS]) -> CampaignResult<Self> {
        if let Some(dim) = Dimension::ALL
            .into_iter()
            .find(|d| values[d.position()] == 0)
        {
            return Err(CampaignError::validation(format!(
                "{dim} must have at least one value"
            )));
        }
        Ok(Self {
            subject: values[0],
            day_of_week: values[1],
            tenure_group: values[2],
            email_domain: values[3],
            age_group: values[4],
            gender: values[5],
            customer_type: values[6],
        })
    }

    pub fn as_array(&self) -> [usize; DIMENSIONS] {
        [
            self.subject,
            self.day_of_week,
            self.tenure_group,
            self.email_domain,
            self.age_group,
            self.gender,
            self.customer_type,
        ]
    }

    pub fn get(&self, dim: Dimension) -> usize {
        self.as_array()[dim.position()]
    }

    pub fn total_states(&self) -> usize {
        self.as_array().iter().product()
    }

    /// Inclusive upper bound for a dimension's values.
    pub fn max_value(&self, dim: Dimension) -> u32 {
        dim.min_value() + self.get(dim) as u32 - 1
    }

    /// Returns the first dimension whose cardinality differs from `other`.
    pub fn first_mismatch(&self, other: &Cardinalities) -> Option<(Dimension, usize, usize)> {
        Dimension::ALL
            .into_iter()
            .find(|d| self.get(*d) != other.get(*d))
            .map(|d| (d, self.get(d), other.get(d)))
    }
}

impl Default for Cardinalities {
    /// The layout of the reference campaign dataset.
    fn default() -> Self {
        Self {
            subject: 3,
            day_of_week: 7,
            tenure_group: 7,
            email_domain: 6,
            age_group: 5,
            gender: 2,
            customer_type: 2,
        }
    }
}

//! Aggregated campaign training table: one row per historical send (or
//! pre-aggregated send group) with already-encoded categorical columns.

use crate::error::{CampaignError, CampaignResult};
use crate::types::{Cardinalities, CampaignState, DIMENSIONS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingRow {
    #[serde(rename = "SubjectLine_ID")]
    pub subject_id: u32,
    #[serde(rename = "Sent_Day")]
    pub sent_day: u32,
    #[serde(rename = "Tenure_Group")]
    pub tenure_group: u32,
    #[serde(rename = "Email_Domain")]
    pub email_domain: u32,
    #[serde(rename = "Age_Group")]
    pub age_group: u32,
    #[serde(rename = "Gender")]
    pub gender: u32,
    #[serde(rename = "Type")]
    pub customer_type: u32,
    #[serde(rename = "Response_Received")]
    pub response_received: u64,
    #[serde(rename = "Sent_Emails", default = "default_sent_emails")]
    pub sent_emails: u64,
}

fn default_sent_emails() -> u64 {
    1
}

impl TrainingRow {
    pub fn state(&self) -> CampaignState {
        CampaignState::new([
            self.subject_id,
            self.sent_day,
            self.tenure_group,
            self.email_domain,
            self.age_group,
            self.gender,
            self.customer_type,
        ])
    }
}

/// In-memory aggregated training table.
#[derive(Debug, Clone, Default)]
pub struct TrainingTable {
    rows: Vec<TrainingRow>,
}

impl TrainingTable {
    pub fn from_rows(rows: Vec<TrainingRow>) -> Self {
        Self { rows }
    }

    /// Load the table from a CSV file with a header row.
    pub fn load(path: impl AsRef<Path>) -> CampaignResult<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| {
            CampaignError::Dataset(format!("cannot open {}: {e}", path.display()))
        })?;
        let table = Self::from_reader(file)?;
        info!(
            path = %path.display(),
            rows = table.len(),
            "Loaded campaign training table"
        );
        Ok(table)
    }

    pub fn from_reader<R: Read>(reader: R) -> CampaignResult<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let rows = csv_reader
            .deserialize::<TrainingRow>()
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[TrainingRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cardinality of each dimension = number of distinct values observed.
    pub fn cardinalities(&self) -> CampaignResult<Cardinalities> {
        if self.rows.is_empty() {
            return Err(CampaignError::Dataset(
                "cannot derive cardinalities from an empty training table".to_string(),
            ));
        }
        let mut distinct: [BTreeSet<u32>; DIMENSIONS] = Default::default();
        for row in &self.rows {
            for (set, value) in distinct.iter_mut().zip(row.state().fields()) {
                set.insert(value);
            }
        }
        let counts = std::array::from_fn(|i| distinct[i].len());
        Cardinalities::new(counts)
    }
}

//! Policy artifact persistence: the Q-table as CSV (one column per action,
//! named for the dimension it advances) plus a `<artifact>.meta.json` sidecar.

use crate::q_table::{QTable, ACTIONS};
use campaign_core::config::{ActionLayout, RewardPolicyKind};
use campaign_core::types::{Cardinalities, Dimension};
use campaign_core::{CampaignError, CampaignResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

/// Value placed in a missing legacy column so the action is never greedy.
const MISSING_ACTION_VALUE: f64 = f64::MIN;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyMetadata {
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub cardinalities: Cardinalities,
    pub action_layout: ActionLayout,
    pub reward_kind: RewardPolicyKind,
    pub iterations: usize,
}

impl PolicyMetadata {
    pub fn new(
        run_id: Uuid,
        cardinalities: Cardinalities,
        action_layout: ActionLayout,
        reward_kind: RewardPolicyKind,
        iterations: usize,
    ) -> Self {
        Self {
            run_id,
            created_at: Utc::now(),
            cardinalities,
            action_layout,
            reward_kind,
            iterations,
        }
    }
}

/// A Q-table as loaded from disk together with its sidecar, if any.
#[derive(Debug, Clone)]
pub struct LoadedPolicy {
    pub q_table: QTable,
    pub metadata: Option<PolicyMetadata>,
    /// False when the artifact lacked the subject column.
    pub complete: bool,
}

pub fn metadata_path(artifact: &Path) -> PathBuf {
    let mut name = artifact.as_os_str().to_owned();
    name.push(".meta.json");
    PathBuf::from(name)
}

/// Write the Q-table with columns in `layout` order and the metadata sidecar.
pub fn save(path: &Path, q_table: &QTable, metadata: &PolicyMetadata) -> CampaignResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(
        metadata
            .action_layout
            .dimensions()
            .iter()
            .map(|d| d.column_name()),
    )?;
    for state in 0..q_table.states() {
        writer.write_record(q_table.row(state).iter().map(|v| v.to_string()))?;
    }
    writer.flush()?;

    let sidecar = std::fs::File::create(metadata_path(path))?;
    serde_json::to_writer_pretty(sidecar, metadata)?;

    info!(
        path = %path.display(),
        states = q_table.states(),
        run_id = %metadata.run_id,
        "Saved policy artifact"
    );
    Ok(())
}

/// Load a Q-table, mapping columns by name onto `layout`. Unknown columns
/// (such as a leading index column) are ignored.
pub fn load(
    path: &Path,
    layout: ActionLayout,
    cardinalities: &Cardinalities,
) -> CampaignResult<LoadedPolicy> {
    let metadata = read_metadata(path)?;
    if let Some(meta) = &metadata {
        if let Some((dim, trained, current)) = meta.cardinalities.first_mismatch(cardinalities) {
            return Err(CampaignError::PolicyArtifact(format!(
                "{dim} cardinality is {trained} in the artifact but {current} in the dataset"
            )));
        }
    }

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| {
            CampaignError::PolicyArtifact(format!("cannot open {}: {e}", path.display()))
        })?;

    let headers = reader.headers()?.clone();
    let mut columns: [Option<usize>; ACTIONS] = [None; ACTIONS];
    for (action, dim) in layout.dimensions().into_iter().enumerate() {
        columns[action] = headers.iter().position(|h| h == dim.column_name());
        if columns[action].is_none() && dim != Dimension::Subject {
            return Err(CampaignError::PolicyArtifact(format!(
                "missing column '{}'",
                dim.column_name()
            )));
        }
    }
    let complete = columns.iter().all(Option::is_some);
    if !complete {
        warn!(path = %path.display(), "Policy artifact has no subject column; subject action disabled");
    }

    let mut rows = Vec::with_capacity(cardinalities.total_states());
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let mut row = [MISSING_ACTION_VALUE; ACTIONS];
        for (slot, column) in row.iter_mut().zip(columns) {
            let Some(column) = column else { continue };
            let raw = record.get(column).unwrap_or_default();
            *slot = raw.parse::<f64>().map_err(|_| {
                CampaignError::PolicyArtifact(format!("row {line}: '{raw}' is not a number"))
            })?;
        }
        rows.push(row);
    }

    let expected = cardinalities.total_states();
    if rows.len() != expected {
        return Err(CampaignError::DimensionMismatch {
            dimension: "policy states".to_string(),
            expected,
            actual: rows.len(),
        });
    }

    let q_table = QTable::from_rows(rows)?;
    info!(
        path = %path.display(),
        states = q_table.states(),
        complete,
        "Loaded policy artifact"
    );
    Ok(LoadedPolicy {
        q_table,
        metadata,
        complete,
    })
}

fn read_metadata(artifact: &Path) -> CampaignResult<Option<PolicyMetadata>> {
    let path = metadata_path(artifact);
    if !path.exists() {
        warn!(path = %path.display(), "Policy metadata sidecar not found; skipping consistency check");
        return Ok(None);
    }
    let file = std::fs::File::open(&path)?;
    let metadata = serde_json::from_reader(file).map_err(|e| {
        CampaignError::PolicyArtifact(format!("invalid metadata {}: {e}", path.display()))
    })?;
    Ok(Some(metadata))
}

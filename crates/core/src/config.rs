use crate::error::{CampaignError, CampaignResult};
use crate::types::{CampaignState, Dimension, DIMENSIONS};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root application configuration. Loaded from an optional TOML file and
/// environment variables with the prefix `CAMPAIGN_OPTIMIZER__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub reward: RewardConfig,
    #[serde(default)]
    pub rollout: RolloutConfig,
    #[serde(default)]
    pub labels: LabelConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_training_table")]
    pub training_table: String,
    #[serde(default = "default_policy_artifact")]
    pub policy_artifact: String,
    #[serde(default)]
    pub sent_counting: SentCounting,
}

/// How the outcome table counts emails sent for a training row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentCounting {
    /// Every row is one email sent.
    #[default]
    Rows,
    /// Use the row's `Sent_Emails` column.
    SentEmailsColumn,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrainingConfig {
    #[serde(default = "default_iterations")]
    pub iterations: usize,
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    #[serde(default = "default_gamma")]
    pub gamma: f64,
    #[serde(default = "default_max_steps_per_episode")]
    pub max_steps_per_episode: usize,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_start_state")]
    pub start_state: [u32; DIMENSIONS],
}

/// Which reward/termination policy drives the environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardPolicyKind {
    /// Per-subject conversion goal with a minimum volume; tiered rewards.
    #[default]
    Tiered,
    /// Reward proportional to responses; global running conversion goal.
    Proportional,
}

/// Lifetime of the tiered policy's per-subject counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterScope {
    /// Counters reset at the start of every episode.
    #[default]
    Episode,
    /// Counters accumulate across every episode of a run.
    Run,
}

/// Mapping from action id to the dimension it advances.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionLayout {
    /// 0 = subject, 1 = day, ..., 6 = customer type.
    SubjectFirst,
    /// 0 = day, ..., 5 = customer type, 6 = subject.
    #[default]
    SubjectLast,
}

impl ActionLayout {
    /// Dimensions in action-id order.
    pub fn dimensions(self) -> [Dimension; DIMENSIONS] {
        match self {
            ActionLayout::SubjectFirst => Dimension::ALL,
            ActionLayout::SubjectLast => [
                Dimension::DayOfWeek,
                Dimension::TenureGroup,
                Dimension::EmailDomain,
                Dimension::AgeGroup,
                Dimension::Gender,
                Dimension::CustomerType,
                Dimension::Subject,
            ],
        }
    }

    /// The dimension advanced by `action`, or `None` for an invalid id.
    pub fn dimension(self, action: usize) -> Option<Dimension> {
        self.dimensions().get(action).copied()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RewardConfig {
    #[serde(default)]
    pub kind: RewardPolicyKind,
    #[serde(default = "default_target_conversion_rate")]
    pub target_conversion_rate: f64,
    #[serde(default = "default_min_volume")]
    pub min_volume_threshold: u64,
    #[serde(default = "default_reward_factor")]
    pub reward_factor: f64,
    #[serde(default)]
    pub counter_scope: CounterScope,
    #[serde(default)]
    pub action_layout: ActionLayout,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RolloutConfig {
    #[serde(default = "default_rollout_max_steps")]
    pub max_steps: usize,
    #[serde(default = "default_rollout_deadline_ms")]
    pub deadline_ms: Option<u64>,
    #[serde(default = "default_refine")]
    pub refine: bool,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    #[serde(default = "default_gamma")]
    pub gamma: f64,
}

/// Human-readable label dictionaries, indexed by encoded value.
/// Subject labels are indexed by `subject_id - 1`.
#[derive(Debug, Clone, Deserialize)]
pub struct LabelConfig {
    #[serde(default = "default_subject_labels")]
    pub subjects: Vec<String>,
    #[serde(default = "default_day_labels")]
    pub days: Vec<String>,
    #[serde(default = "default_tenure_labels")]
    pub tenure_groups: Vec<String>,
    #[serde(default = "default_domain_labels")]
    pub email_domains: Vec<String>,
    #[serde(default = "default_age_labels")]
    pub age_groups: Vec<String>,
    #[serde(default = "default_gender_labels")]
    pub genders: Vec<String>,
    #[serde(default = "default_customer_type_labels")]
    pub customer_types: Vec<String>,
}

impl LabelConfig {
    /// Label for a dimension value; falls back to the numeric code.
    pub fn label(&self, dim: Dimension, value: u32) -> String {
        let (table, offset) = match dim {
            Dimension::Subject => (&self.subjects, 1),
            Dimension::DayOfWeek => (&self.days, 0),
            Dimension::TenureGroup => (&self.tenure_groups, 0),
            Dimension::EmailDomain => (&self.email_domains, 0),
            Dimension::AgeGroup => (&self.age_groups, 0),
            Dimension::Gender => (&self.genders, 0),
            Dimension::CustomerType => (&self.customer_types, 0),
        };
        value
            .checked_sub(offset)
            .and_then(|i| table.get(i as usize))
            .cloned()
            .unwrap_or_else(|| value.to_string())
    }
}

// Default functions
fn default_node_id() -> String {
    "node-01".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8786
}
fn default_metrics_enabled() -> bool {
    true
}
fn default_metrics_port() -> u16 {
    9091
}
fn default_training_table() -> String {
    "data/email_campaign_data.csv".to_string()
}
fn default_policy_artifact() -> String {
    "data/q_table.csv".to_string()
}
fn default_iterations() -> usize {
    20_000
}
fn default_epsilon() -> f64 {
    0.1
}
fn default_alpha() -> f64 {
    0.1
}
fn default_gamma() -> f64 {
    0.6
}
fn default_max_steps_per_episode() -> usize {
    10_000
}
fn default_start_state() -> [u32; DIMENSIONS] {
    CampaignState::default().fields()
}
fn default_target_conversion_rate() -> f64 {
    0.3
}
fn default_min_volume() -> u64 {
    10
}
fn default_reward_factor() -> f64 {
    3.0
}
fn default_rollout_max_steps() -> usize {
    10_000
}
fn default_rollout_deadline_ms() -> Option<u64> {
    Some(2_000)
}
fn default_refine() -> bool {
    true
}

fn labels(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}
fn default_subject_labels() -> Vec<String> {
    labels(&["Email Subject 1", "Email Subject 2", "Email Subject 3"])
}
fn default_day_labels() -> Vec<String> {
    labels(&[
        "Sunday",
        "Monday",
        "Tuesday",
        "Wednesday",
        "Thursday",
        "Friday",
        "Saturday",
    ])
}
fn default_tenure_labels() -> Vec<String> {
    labels(&["< 5", "5 - 10", "10 - 15", "15 - 20", "20 - 25", "25 - 30", "> 30"])
}
fn default_domain_labels() -> Vec<String> {
    labels(&[
        "aol.com",
        "comcast.net",
        "gmail.com",
        "hotmail.com",
        "msn.com",
        "yahoo.com",
    ])
}
fn default_age_labels() -> Vec<String> {
    labels(&["< 20", "20 - 25", "25 - 35", "35 - 45", "> 45"])
}
fn default_gender_labels() -> Vec<String> {
    labels(&["Female", "Male"])
}
fn default_customer_type_labels() -> Vec<String> {
    labels(&["Business", "Consumer"])
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            port: default_metrics_port(),
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            training_table: default_training_table(),
            policy_artifact: default_policy_artifact(),
            sent_counting: SentCounting::default(),
        }
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            iterations: default_iterations(),
            epsilon: default_epsilon(),
            alpha: default_alpha(),
            gamma: default_gamma(),
            max_steps_per_episode: default_max_steps_per_episode(),
            seed: None,
            start_state: default_start_state(),
        }
    }
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            kind: RewardPolicyKind::default(),
            target_conversion_rate: default_target_conversion_rate(),
            min_volume_threshold: default_min_volume(),
            reward_factor: default_reward_factor(),
            counter_scope: CounterScope::default(),
            action_layout: ActionLayout::default(),
        }
    }
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            max_steps: default_rollout_max_steps(),
            deadline_ms: default_rollout_deadline_ms(),
            refine: default_refine(),
            alpha: default_alpha(),
            gamma: default_gamma(),
        }
    }
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            subjects: default_subject_labels(),
            days: default_day_labels(),
            tenure_groups: default_tenure_labels(),
            email_domains: default_domain_labels(),
            age_groups: default_age_labels(),
            genders: default_gender_labels(),
            customer_types: default_customer_type_labels(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            data: DataConfig::default(),
            training: TrainingConfig::default(),
            reward: RewardConfig::default(),
            rollout: RolloutConfig::default(),
            labels: LabelConfig::default(),
        }
    }
}

impl TrainingConfig {
    pub fn start_state(&self) -> CampaignState {
        CampaignState::new(self.start_state)
    }
}

impl AppConfig {
    /// Load configuration from an optional TOML file, then environment variables.
    pub fn load(file: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let builder = builder.add_source(
            config::Environment::with_prefix("CAMPAIGN_OPTIMIZER")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("training.start_state"),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Reject hyperparameters outside their meaningful ranges.
    pub fn validate(&self) -> CampaignResult<()> {
        let t = &self.training;
        if t.iterations == 0 {
            return Err(CampaignError::Config("training.iterations must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&t.epsilon) {
            return Err(CampaignError::Config("training.epsilon must be in [0, 1]".into()));
        }
        for (name, alpha) in [("training.alpha", t.alpha), ("rollout.alpha", self.rollout.alpha)] {
            if !(alpha > 0.0 && alpha <= 1.0) {
                return Err(CampaignError::Config(format!("{name} must be in (0, 1]")));
            }
        }
        for (name, gamma) in [("training.gamma", t.gamma), ("rollout.gamma", self.rollout.gamma)] {
            if !(0.0..=1.0).contains(&gamma) {
                return Err(CampaignError::Config(format!("{name} must be in [0, 1]")));
            }
        }
        if t.max_steps_per_episode == 0 || self.rollout.max_steps == 0 {
            return Err(CampaignError::Config("step caps must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.reward.target_conversion_rate) {
            return Err(CampaignError::Config(
                "reward.target_conversion_rate must be in [0, 1]".into(),
            ));
        }
        Ok(())
    }
}

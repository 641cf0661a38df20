pub mod config;
pub mod dataset;
pub mod error;
pub mod types;

pub use config::AppConfig;
pub use dataset::{TrainingRow, TrainingTable};
pub use error::{CampaignError, CampaignResult};
pub use types::{Cardinalities, CampaignState, Dimension, DIMENSIONS};

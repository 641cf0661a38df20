//! Campaign audience reporting and offline policy evaluation.

pub mod audience;
pub mod evaluation;

pub use audience::{AudienceReport, AudienceReportBuilder};
pub use evaluation::{ConversionSummary, EvaluationRun, PolicyEvaluator};

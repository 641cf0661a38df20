//! Audience report: decodes rollout candidates into labelled audience
//! profiles with their observed conversion rates.

use campaign_core::config::LabelConfig;
use campaign_core::types::{CampaignState, Dimension};
use campaign_core::CampaignResult;
use campaign_rl_engine::{OutcomeTable, PolicySnapshot, StateSpace};
use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AudienceProfile {
    #[serde(rename = "Day of Week")]
    pub day_of_week: String,
    #[serde(rename = "Tenure Group")]
    pub tenure_group: String,
    #[serde(rename = "Email Domain")]
    pub email_domain: String,
    #[serde(rename = "Age Group")]
    pub age_group: String,
    #[serde(rename = "Gender")]
    pub gender: String,
    #[serde(rename = "Customer Type")]
    pub customer_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AudiencePermutation {
    #[serde(rename = "audience-profile")]
    pub audience_profile: AudienceProfile,
    #[serde(rename = "expected-conversions")]
    pub expected_conversions: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CampaignAudience {
    #[serde(rename = "Email Subject")]
    pub email_subject: String,
    #[serde(rename = "Audience Permutations")]
    pub audience_permutations: Vec<AudiencePermutation>,
}

/// Response body of the audience query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AudienceReport {
    #[serde(rename = "campaign-audience")]
    pub campaign_audience: CampaignAudience,
}

pub struct AudienceReportBuilder {
    labels: LabelConfig,
}

impl AudienceReportBuilder {
    pub fn new(labels: LabelConfig) -> Self {
        Self { labels }
    }

    /// Roll out the policy from the subject's opening state and report on
    /// the candidates.
    pub fn for_subject(
        &self,
        snapshot: &PolicySnapshot,
        subject_id: u32,
    ) -> CampaignResult<AudienceReport> {
        self.build(snapshot, CampaignState::for_subject(subject_id))
    }

    pub fn build(
        &self,
        snapshot: &PolicySnapshot,
        start: CampaignState,
    ) -> CampaignResult<AudienceReport> {
        let rollout = snapshot.candidates(start)?;
        debug!(
            start = %start,
            steps = rollout.steps,
            candidates = rollout.candidates.len(),
            "Building audience report"
        );
        self.render(
            snapshot.space(),
            snapshot.conversions(),
            start,
            &rollout.candidates,
        )
    }

    /// Label `candidates` in the order given.
    pub fn render(
        &self,
        space: &StateSpace,
        conversions: &OutcomeTable,
        start: CampaignState,
        candidates: &[usize],
    ) -> CampaignResult<AudienceReport> {
        let audience_permutations = candidates
            .iter()
            .map(|&index| {
                let state = space.decode(index)?;
                Ok(AudiencePermutation {
                    audience_profile: self.profile(&state),
                    expected_conversions: conversions.get(index).conversion_rate(),
                })
            })
            .collect::<CampaignResult<Vec<_>>>()?;

        Ok(AudienceReport {
            campaign_audience: CampaignAudience {
                email_subject: self.labels.label(Dimension::Subject, start.subject_id),
                audience_permutations,
            },
        })
    }

    fn profile(&self, state: &CampaignState) -> AudienceProfile {
        let label = |dim: Dimension| self.labels.label(dim, state.get(dim));
        AudienceProfile {
            day_of_week: label(Dimension::DayOfWeek),
            tenure_group: label(Dimension::TenureGroup),
            email_domain: label(Dimension::EmailDomain),
            age_group: label(Dimension::AgeGroup),
            gender: label(Dimension::Gender),
            customer_type: label(Dimension::CustomerType),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campaign_core::types::Cardinalities;
    use campaign_rl_engine::Outcome;

    #[test]
    fn test_render_labels_and_rates() {
        let space = StateSpace::new(Cardinalities::default());
        let a = CampaignState::new([2, 1, 0, 2, 4, 1, 0]);
        let b = CampaignState::new([2, 6, 6, 5, 0, 0, 1]);
        let (ia, ib) = (space.encode(&a).unwrap(), space.encode(&b).unwrap());
        let mut entries = vec![Outcome::default(); space.total_states()];
        entries[ia] = Outcome::new(1, 4);
        let conversions = OutcomeTable::from_entries(entries);

        let builder = AudienceReportBuilder::new(LabelConfig::default());
        let report = builder
            .render(&space, &conversions, CampaignState::for_subject(2), &[ia, ib])
            .unwrap();

        let audience = &report.campaign_audience;
        assert_eq!(audience.email_subject, "Email Subject 2");
        assert_eq!(audience.audience_permutations.len(), 2);

        let first = &audience.audience_permutations[0];
        assert_eq!(first.audience_profile.day_of_week, "Monday");
        assert_eq!(first.audience_profile.email_domain, "gmail.com");
        assert_eq!(first.audience_profile.age_group, "> 45");
        assert_eq!(first.audience_profile.gender, "Male");
        assert_eq!(first.audience_profile.customer_type, "Business");
        assert_eq!(first.expected_conversions, 0.25);

        let second = &audience.audience_permutations[1];
        assert_eq!(second.audience_profile.day_of_week, "Saturday");
        assert_eq!(second.audience_profile.tenure_group, "> 30");
        assert_eq!(second.expected_conversions, 0.0);
    }

    #[test]
    fn test_wire_shape() {
        let space = StateSpace::new(Cardinalities::default());
        let conversions = OutcomeTable::from_entries(vec![Outcome::new(1, 2)]);
        let builder = AudienceReportBuilder::new(LabelConfig::default());
        let report = builder
            .render(&space, &conversions, CampaignState::for_subject(1), &[0])
            .unwrap();

        let json = serde_json::to_value(&report).unwrap();
        let audience = &json["campaign-audience"];
        assert_eq!(audience["Email Subject"], "Email Subject 1");
        let first = &audience["Audience Permutations"][0];
        assert_eq!(first["expected-conversions"], 0.5);
        assert_eq!(first["audience-profile"]["Day of Week"], "Sunday");
        assert_eq!(first["audience-profile"]["Customer Type"], "Business");
        assert_eq!(first["audience-profile"]["Tenure Group"], "< 5");
    }

    #[test]
    fn test_unknown_codes_fall_back_to_numbers() {
        let space = StateSpace::new(Cardinalities::new([1, 9, 1, 1, 1, 1, 1]).unwrap());
        let conversions = OutcomeTable::from_entries(vec![Outcome::default(); 9]);
        let builder = AudienceReportBuilder::new(LabelConfig::default());
        let report = builder
            .render(&space, &conversions, CampaignState::for_subject(1), &[8])
            .unwrap();
        let profile = &report.campaign_audience.audience_permutations[0].audience_profile;
        assert_eq!(profile.day_of_week, "8");
    }

    #[test]
    fn test_bad_candidate_index_is_error() {
        let space = StateSpace::new(Cardinalities::default());
        let conversions = OutcomeTable::from_entries(vec![]);
        let builder = AudienceReportBuilder::new(LabelConfig::default());
        assert!(builder
            .render(&space, &conversions, CampaignState::for_subject(1), &[17_640])
            .is_err());
    }
}

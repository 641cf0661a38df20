//! OpenAPI document for the policy service.

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Campaign Optimizer API",
        version = "0.1.0",
        description = "Query a trained email-campaign targeting policy: next-action recommendations and audience permutations per email subject.",
        license(name = "MIT"),
    ),
    tags(
        (name = "Policy", description = "Next-action and audience queries against the served Q-table"),
        (name = "Operations", description = "Health, readiness, and liveness probes"),
    ),
    paths(
        crate::rest::get_next_action,
        crate::rest::campaign_audience,
        crate::rest::health_check,
        crate::rest::readiness,
        crate::rest::liveness,
    ),
    components(schemas(
        crate::rest::NextActionRequest,
        crate::rest::NextActionResponse,
        crate::rest::ErrorResponse,
        crate::rest::HealthResponse,
        campaign_reporting::AudienceReport,
        campaign_reporting::audience::CampaignAudience,
        campaign_reporting::audience::AudiencePermutation,
        campaign_reporting::audience::AudienceProfile,
    ))
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_policy_routes() {
        let doc = ApiDoc::openapi();
        let paths: Vec<_> = doc.paths.paths.keys().cloned().collect();
        for route in ["/get-next-action", "/campaign-audience", "/health", "/ready", "/live"] {
            assert!(paths.iter().any(|p| p == route), "{route} missing");
        }
    }
}

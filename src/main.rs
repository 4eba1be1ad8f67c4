//! Splint Advisor: Binary Entrypoint
//! Boots the Axum HTTP server: config, tracing, metrics and the advisor routes.

use shuttle_axum::ShuttleAxum;
use splint_advisor::{api, config::AdvisorConfig, init_tracing, telemetry::Metrics};
use tracing::{info, warn};

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    init_tracing();

    let config = AdvisorConfig::from_env();
    info!(
        data_dir = %config.data_dir.display(),
        clinical_weight = config.fusion.clinical_weight,
        term_clinical_weight = config.fusion.term_clinical_weight,
        evidence_bonus = config.fusion.evidence_bonus,
        "advisor config ready"
    );

    let state = api::AppState::from_config(config)?;
    info!(
        clinical_provider = state.advisor.provider_name(),
        literature_backend = state.evidence.backend_name(),
        "collaborators wired"
    );

    let mut router = api::router(state);
    match Metrics::init() {
        Ok(metrics) => router = router.merge(metrics.router()),
        Err(e) => warn!(error = ?e, "metrics disabled"),
    }

    Ok(router.into())
}

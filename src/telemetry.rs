use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder and describe the service series.
    /// Call once per process.
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;

        describe_counter!("diagnose_requests_total", "Diagnoses served.");
        describe_counter!(
            "clinical_assessments_total",
            "Clinical assessments by origin (model or rules)."
        );
        describe_counter!(
            "clinical_rule_fallback_total",
            "Assessments answered by the keyword rules."
        );
        describe_counter!("case_log_errors_total", "Failed case-log appends.");
        describe_histogram!(
            "fused_confidence_numeric",
            "Fused confidence (0-100) of served diagnoses."
        );
        describe_histogram!("evidence_search_ms", "PubMed round trip in milliseconds.");

        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::{header::HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::{info, warn};

use crate::advice::{Article, EvidenceRecord, FusedRecord};
use crate::case_log::{CaseInput, CaseKind, CaseLog};
use crate::clinical::ai_adapter::{self, DynClinicalProvider};
use crate::clinical::{AssessmentOrigin, ClinicalAdvisor};
use crate::config::AdvisorConfig;
use crate::engine;
use crate::evidence::{orthopaedic_query, EvidenceSearcher, LiteratureSearch, PubMedClient};

pub const DISCLAIMER: &str =
    "This is an advisory tool only. Always confirm with a qualified clinician.";

const DEFAULT_CASE_LIMIT: usize = 50;
const SEARCH_RETMAX: usize = 10;
const MIN_QUERY_CHARS: usize = 2;

/// Keys written by the response envelope; carried-through extras never shadow them.
const RESPONSE_FIELDS: [&str; 3] = ["case_id", "disclaimer", "assessment_source"];

#[derive(Clone)]
pub struct AppState {
    pub advisor: Arc<ClinicalAdvisor>,
    pub evidence: Arc<EvidenceSearcher>,
    pub cases: Arc<CaseLog>,
    pub config: Arc<AdvisorConfig>,
}

impl AppState {
    /// Wire explicit collaborators (tests inject mock/fixture backends here).
    pub fn new(
        config: AdvisorConfig,
        provider: DynClinicalProvider,
        search: Arc<dyn LiteratureSearch>,
    ) -> anyhow::Result<Self> {
        let cases = CaseLog::open(&config.data_dir)?;
        Ok(Self {
            advisor: Arc::new(ClinicalAdvisor::new(provider)),
            evidence: Arc::new(EvidenceSearcher::new(search, config.evidence.retmax)),
            cases: Arc::new(cases),
            config: Arc::new(config),
        })
    }

    /// Production wiring: model provider and PubMed client from config.
    pub fn from_config(config: AdvisorConfig) -> anyhow::Result<Self> {
        let provider = ai_adapter::build_provider(&config.ai);
        let search: Arc<dyn LiteratureSearch> = Arc::new(
            PubMedClient::from_url(
                config.evidence.base_url.clone(),
                Duration::from_secs(config.evidence.timeout_secs),
            )
            .context("building literature search client")?,
        );
        Self::new(config, provider, search)
    }
}

pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);
    Router::new()
        .route("/health", get(health))
        .route("/diagnose", post(diagnose))
        .route("/literature-search", get(literature_search))
        .route("/nih-search", get(literature_search))
        .route("/manufacturing-url", get(manufacturing_url))
        .route("/cases", get(list_cases))
        .route("/cases/urgent-care", get(list_urgent_care_cases))
        .route("/export/fine-tune", get(export_fine_tune))
        .route("/export/urgent-care", get(export_urgent_care))
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::very_permissive();
    }
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(parsed))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

// ------------------------------------------------------------
// Errors
// ------------------------------------------------------------

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(e) => {
                warn!(error = ?e, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, format!("Internal error: {e}"))
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

// ------------------------------------------------------------
// Handlers
// ------------------------------------------------------------

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "ai_configured": ai_adapter::ai_configured(),
        "openai_configured": ai_adapter::ai_configured(),
        "clinical_provider": state.advisor.provider_name(),
        "literature_backend": state.evidence.backend_name(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct DiagnoseRequest {
    #[serde(default)]
    pub problem: String,
    #[serde(default)]
    pub optional_context: Option<String>,
}

/// Body of `POST /diagnose`.
#[derive(Debug, Serialize)]
pub struct DiagnosisResponse {
    pub case_id: String,
    pub disclaimer: &'static str,
    pub assessment_source: AssessmentOrigin,
    #[serde(flatten)]
    pub fused: FusedRecord,
}

async fn diagnose(
    State(state): State<AppState>,
    Json(body): Json<DiagnoseRequest>,
) -> Result<Json<DiagnosisResponse>, ApiError> {
    let problem = body.problem.trim();
    if problem.is_empty() {
        return Err(ApiError::BadRequest(
            "Please provide a problem description.".to_string(),
        ));
    }
    let context = body.optional_context.as_deref();
    let case_id = uuid::Uuid::new_v4().to_string();
    counter!("diagnose_requests_total").increment(1);

    let (clinical, origin) = state.advisor.assess(problem, context).await;

    let evidence = if state.config.evidence.enabled {
        state
            .evidence
            .suggest(problem, clinical.recommended_splint.splint_name())
            .await
    } else {
        EvidenceRecord::default()
    };

    let mut fused = engine::aggregate_with(&clinical, &evidence, &state.config.fusion);
    fused
        .extra
        .retain(|k, _| !RESPONSE_FIELDS.contains(&k.as_str()));
    histogram!("fused_confidence_numeric").record(f64::from(fused.fused_confidence_numeric));
    info!(
        %case_id,
        problem_id = %anon_hash(problem),
        origin = ?origin,
        confidence = %fused.confidence,
        confidence_pct = fused.fused_confidence_numeric,
        ranked = fused.alternatives_with_scores.len(),
        "diagnosis fused"
    );

    let response = DiagnosisResponse {
        case_id,
        disclaimer: DISCLAIMER,
        assessment_source: origin,
        fused,
    };
    log_case(&state.cases, problem, context, &response);
    Ok(Json(response))
}

/// Append to the case logs; failures are logged, never surfaced to the client.
fn log_case(cases: &CaseLog, problem: &str, context: Option<&str>, response: &DiagnosisResponse) {
    let input = CaseInput {
        problem: problem.to_string(),
        optional_context: context.map(str::to_string),
    };
    // Round-trip through text so logged floats match the served body
    // (f32 scores widen to f64 noise under `to_value`).
    let output: Value = match serde_json::to_string(response)
        .and_then(|text| serde_json::from_str(&text))
    {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "could not serialize case for logging");
            return;
        }
    };
    let result = cases
        .record_case(&response.case_id, &input, &output, "api")
        .and_then(|_| cases.record_urgent_care(&response.case_id, &input, &output));
    if let Err(e) = result {
        counter!("case_log_errors_total").increment(1);
        warn!(case_id = %response.case_id, error = ?e, "case log append failed");
    }
}

/// Short SHA-256 id so logs never carry raw patient text.
pub(crate) fn anon_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    digest.iter().take(6).map(|b| format!("{b:02x}")).collect()
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
}

#[derive(Debug, Serialize)]
struct SearchResponse {
    query: String,
    articles: Vec<Article>,
}

async fn literature_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let q = params.q.trim();
    if q.chars().count() < MIN_QUERY_CHARS {
        return Err(ApiError::BadRequest(format!(
            "Query must be at least {MIN_QUERY_CHARS} characters."
        )));
    }
    let query = orthopaedic_query(q);
    let articles = state.evidence.search(&query, SEARCH_RETMAX).await;
    Ok(Json(SearchResponse { query, articles }))
}

#[derive(Debug, Deserialize)]
struct ManufacturingParams {
    ip: Option<String>,
}

async fn manufacturing_url(
    State(state): State<AppState>,
    Query(params): Query<ManufacturingParams>,
) -> Json<Value> {
    let base = &state.config.manufacturing_url;
    match params.ip.as_deref().map(str::trim).filter(|ip| !ip.is_empty()) {
        Some(ip) => Json(json!({
            "url": format!("{base}?ip={ip}"),
            "message": "Open in new tab to locate printer / manufacturing by IP or location.",
        })),
        None => Json(json!({
            "url": base,
            "message": "Open in new tab to locate printer / manufacturing.",
        })),
    }
}

#[derive(Debug, Deserialize)]
struct LimitParams {
    limit: Option<usize>,
}

async fn list_cases(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> Result<Json<Value>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_CASE_LIMIT);
    let cases = state.cases.recent(CaseKind::General, limit)?;
    Ok(Json(json!({ "cases": cases })))
}

async fn list_urgent_care_cases(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> Result<Json<Value>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_CASE_LIMIT);
    let cases = state.cases.recent(CaseKind::UrgentCare, limit)?;
    Ok(Json(json!({ "cases": cases })))
}

async fn export_fine_tune(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    export_info(
        &state.cases,
        CaseKind::FineTune,
        "No cases yet.",
        "JSONL (OpenAI fine-tuning style)",
    )
}

async fn export_urgent_care(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    export_info(
        &state.cases,
        CaseKind::UrgentCare,
        "No urgent care cases yet.",
        "JSONL (urgent care / PA fine-tuning)",
    )
}

fn export_info(
    cases: &CaseLog,
    kind: CaseKind,
    empty_message: &str,
    format: &str,
) -> Result<Json<Value>, ApiError> {
    let path = cases.path(kind).display().to_string();
    Ok(Json(match cases.count(kind)? {
        Some(count) => json!({ "path": path, "count": count, "format": format }),
        None => json!({ "path": path, "count": 0, "message": empty_message }),
    }))
}

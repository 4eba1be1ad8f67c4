//! AI adapter: provider abstraction for the clinical assessment.
//!
//! A provider turns a problem description into a `ClinicalRecord`, or `None`
//! when it is unavailable or answers with something unusable. The advisor
//! then falls back to the keyword rules.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::advice::ClinicalRecord;
use crate::config::advisor::AiSection;

// ------------------------------------------------------------
// Public surface
// ------------------------------------------------------------

/// Boxed-future provider trait so it can be used as `Arc<dyn ClinicalProvider>`.
pub trait ClinicalProvider: Send + Sync {
    fn assess<'a>(
        &'a self,
        problem: &'a str,
        context: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Option<ClinicalRecord>> + Send + 'a>>;
    /// Provider name for diagnostics/logs.
    fn name(&self) -> &'static str;
}

pub type DynClinicalProvider = Arc<dyn ClinicalProvider>;

/// Factory: build a provider according to config and environment variables.
///
/// * `AI_TEST_MODE=mock` → deterministic mock provider.
/// * AI disabled in config, or no `OPENAI_API_KEY` → disabled provider.
/// * Otherwise the OpenAI provider.
pub fn build_provider(config: &AiSection) -> DynClinicalProvider {
    if std::env::var("AI_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        return Arc::new(MockProvider::default());
    }

    if !config.enabled {
        return Arc::new(DisabledProvider);
    }

    let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
    if api_key.trim().is_empty() {
        return Arc::new(DisabledProvider);
    }

    match OpenAiProvider::new(api_key, &config.model, Duration::from_secs(config.timeout_secs)) {
        Ok(p) => Arc::new(p),
        Err(e) => {
            warn!(error = ?e, "could not build OpenAI client, model assessment disabled");
            Arc::new(DisabledProvider)
        }
    }
}

/// True when a real model key is present in the environment.
pub fn ai_configured() -> bool {
    std::env::var("OPENAI_API_KEY")
        .map(|k| !k.trim().is_empty())
        .unwrap_or(false)
}

// ------------------------------------------------------------
// Concrete providers
// ------------------------------------------------------------

const SYSTEM_PROMPT: &str = r#"You assist a Physician Assistant working in urgent care with an orthopaedic focus. The user describes an upper extremity problem (wrist, hand, thumb, finger, forearm or elbow). Reply with:
1. diagnosis_summary: one or two sentences.
2. suggested_diagnosis: the likely problem or differential a PA would consider in urgent care.
3. recommended_splint: ONE primary splint (for example volar wrist splint, thumb spica, sugar-tong, mallet splint, resting hand splint, Muenster, long arm splint) with a short rationale, optional alternatives and precautions.
4. other_recommendations: actions needed beyond or in addition to the splint (X-ray, ortho referral, wound care, rule out fracture, compartment check); an empty list if none.
5. confidence: "high", "medium" or "low".

Answer with JSON only, no markdown, exactly in this shape:
{"diagnosis_summary": "...", "suggested_diagnosis": "...", "recommended_splint": {"splint_name": "...", "rationale": "...", "alternatives": ["..."], "precautions": "..."}, "other_recommendations": ["..."], "confidence": "high|medium|low"}"#;

/// OpenAI provider (Chat Completions API).
pub struct OpenAiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, model: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("splint-advisor/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            api_key,
            model: model.to_string(),
        })
    }
}

impl ClinicalProvider for OpenAiProvider {
    fn assess<'a>(
        &'a self,
        problem: &'a str,
        context: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Option<ClinicalRecord>> + Send + 'a>> {
        Box::pin(async move {
            #[derive(Serialize)]
            struct Msg<'a> {
                role: &'a str,
                content: &'a str,
            }
            #[derive(Serialize)]
            struct Req<'a> {
                model: &'a str,
                messages: Vec<Msg<'a>>,
                temperature: f32,
            }
            #[derive(Deserialize)]
            struct Resp {
                choices: Vec<Choice>,
            }
            #[derive(Deserialize)]
            struct Choice {
                message: ChoiceMsg,
            }
            #[derive(Deserialize)]
            struct ChoiceMsg {
                content: String,
            }

            let user = user_prompt(problem, context);
            let req = Req {
                model: &self.model,
                messages: vec![
                    Msg {
                        role: "system",
                        content: SYSTEM_PROMPT,
                    },
                    Msg {
                        role: "user",
                        content: &user,
                    },
                ],
                temperature: 0.2,
            };

            let resp = match self
                .http
                .post("https://api.openai.com/v1/chat/completions")
                .bearer_auth(&self.api_key)
                .json(&req)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    warn!(error = %e, "openai request failed");
                    return None;
                }
            };

            if !resp.status().is_success() {
                warn!(status = %resp.status(), "openai returned an error status");
                return None;
            }
            let body: Resp = resp.json().await.ok()?;
            let content = body.choices.first().map(|c| c.message.content.as_str())?;
            let parsed = parse_model_json(content);
            if parsed.is_none() {
                debug!("openai answer was not a usable clinical record");
            }
            parsed
        })
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Always returns `None`; used when the model is disabled or unconfigured.
pub struct DisabledProvider;

impl ClinicalProvider for DisabledProvider {
    fn assess<'a>(
        &'a self,
        _problem: &'a str,
        _context: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Option<ClinicalRecord>> + Send + 'a>> {
        Box::pin(async { None })
    }
    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// Fixed answer for tests/local runs.
#[derive(Clone)]
pub struct MockProvider {
    pub fixed: ClinicalRecord,
}

impl Default for MockProvider {
    fn default() -> Self {
        let fixed = parse_model_json(
            r#"{"diagnosis_summary": "Likely wrist sprain (mock).",
                "suggested_diagnosis": "Wrist sprain",
                "recommended_splint": {"splint_name": "Volar wrist splint", "rationale": "Neutral immobilization (mock).", "alternatives": ["Thumb spica splint"]},
                "other_recommendations": ["Order X-ray"],
                "confidence": "medium"}"#,
        )
        .unwrap_or_default();
        Self { fixed }
    }
}

impl ClinicalProvider for MockProvider {
    fn assess<'a>(
        &'a self,
        _problem: &'a str,
        _context: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Option<ClinicalRecord>> + Send + 'a>> {
        let out = self.fixed.clone();
        Box::pin(async move { Some(out) })
    }
    fn name(&self) -> &'static str {
        "mock"
    }
}

// ------------------------------------------------------------
// Prompt + answer helpers
// ------------------------------------------------------------

pub fn user_prompt(problem: &str, context: Option<&str>) -> String {
    match context.map(str::trim).filter(|c| !c.is_empty()) {
        Some(c) => format!("Patient/problem description: {problem} Context: {c}."),
        None => format!("Patient/problem description: {problem}"),
    }
}

/// Parse the model answer, tolerating a surrounding markdown code fence
/// (with or without a `json` tag). Non-object answers are rejected.
pub fn parse_model_json(raw: &str) -> Option<ClinicalRecord> {
    let mut body = raw.trim();
    if body.starts_with("```") {
        body = body.split("```").nth(1).unwrap_or_default();
        body = body.strip_prefix("json").unwrap_or(body);
    }
    let value: serde_json::Value = serde_json::from_str(body.trim()).ok()?;
    if !value.is_object() {
        return None;
    }
    serde_json::from_value(value).ok()
}

//! Clinical advisor: model assessment first, keyword rules as fallback.

pub mod ai_adapter;
pub mod rules;

use metrics::counter;
use serde::Serialize;
use tracing::info;

use crate::advice::{ClinicalRecord, PrimarySplint};
use crate::clinical::ai_adapter::DynClinicalProvider;
use crate::fuzzy::MEDIUM;

pub use crate::clinical::ai_adapter::{ClinicalProvider, DisabledProvider, MockProvider};
pub use crate::clinical::rules::rule_based_diagnosis;

/// Which path produced the clinical record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentOrigin {
    Model,
    Rules,
}

pub struct ClinicalAdvisor {
    provider: DynClinicalProvider,
}

impl ClinicalAdvisor {
    pub fn new(provider: DynClinicalProvider) -> Self {
        Self { provider }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Assess a problem; never fails. The returned record always carries a
    /// confidence label and a splint name. Only the rules path fills the
    /// suggested diagnosis from the summary; a model answer keeps what it sent.
    pub async fn assess(
        &self,
        problem: &str,
        context: Option<&str>,
    ) -> (ClinicalRecord, AssessmentOrigin) {
        let (record, origin) = match self.provider.assess(problem, context).await {
            Some(rec) => (rec, AssessmentOrigin::Model),
            None => {
                counter!("clinical_rule_fallback_total").increment(1);
                info!(provider = self.provider.name(), "model assessment unavailable, using rules");
                (rule_based_diagnosis(problem), AssessmentOrigin::Rules)
            }
        };
        counter!("clinical_assessments_total", "origin" => origin_label(origin)).increment(1);
        (normalize(record), origin)
    }
}

fn origin_label(origin: AssessmentOrigin) -> &'static str {
    match origin {
        AssessmentOrigin::Model => "model",
        AssessmentOrigin::Rules => "rules",
    }
}

/// Fill the fields the response always shows.
fn normalize(mut rec: ClinicalRecord) -> ClinicalRecord {
    if rec.confidence.as_deref().map_or(true, |c| c.trim().is_empty()) {
        rec.confidence = Some(MEDIUM.to_string());
    }
    let mut splint = rec.recommended_splint.to_recommendation();
    if splint.splint_name.trim().is_empty() {
        splint.splint_name = "Unknown".to_string();
    }
    rec.recommended_splint = PrimarySplint::Detailed(splint);
    rec
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn falls_back_to_rules_when_provider_is_silent() {
        let advisor = ClinicalAdvisor::new(Arc::new(DisabledProvider));
        let (rec, origin) = advisor.assess("mallet finger after ball injury", None).await;
        assert_eq!(origin, AssessmentOrigin::Rules);
        assert!(rec.recommended_splint.splint_name().starts_with("Finger splint"));
    }

    #[tokio::test]
    async fn model_records_are_normalized() {
        let mut fixed = ClinicalRecord::default();
        fixed.diagnosis_summary = "Possible scaphoid injury".into();
        fixed.recommended_splint = PrimarySplint::Named(String::new());
        let advisor = ClinicalAdvisor::new(Arc::new(MockProvider { fixed }));

        let (rec, origin) = advisor.assess("snuffbox tenderness", None).await;
        assert_eq!(origin, AssessmentOrigin::Model);
        assert_eq!(rec.confidence.as_deref(), Some("medium"));
        assert_eq!(rec.suggested_diagnosis, None);
        assert_eq!(rec.recommended_splint.splint_name(), "Unknown");
    }

    #[tokio::test]
    async fn model_answer_without_diagnosis_adds_no_clinical_term() {
        let fixed = crate::clinical::ai_adapter::parse_model_json(
            r#"{"diagnosis_summary": "Radial wrist pain", "recommended_splint": "Thumb spica splint", "confidence": "high"}"#,
        )
        .expect("model json");
        let advisor = ClinicalAdvisor::new(Arc::new(MockProvider { fixed }));
        let (rec, _) = advisor.assess("wrist pain", None).await;
        assert_eq!(rec.suggested_diagnosis, None);

        let evidence = crate::advice::EvidenceRecord::new(vec![], vec![], vec!["sprain".into()]);
        let fused = crate::engine::aggregate(&rec, &evidence, 0.7);
        assert!(fused
            .aggregated_diagnosis_terms
            .iter()
            .all(|t| t.source == crate::advice::Source::Evidence));
        assert_eq!(fused.aggregated_diagnosis_terms.len(), 1);
    }

    #[tokio::test]
    async fn rules_path_uses_summary_as_diagnosis() {
        let advisor = ClinicalAdvisor::new(Arc::new(DisabledProvider));
        let (rec, _) = advisor.assess("elbow swelling after a fall", None).await;
        assert_eq!(rec.suggested_diagnosis.as_deref(), Some(rec.diagnosis_summary.as_str()));
    }
}

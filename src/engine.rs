//! # Fusion Engine
//! Pure, testable logic that maps `(clinical record, evidence record)` → `FusedRecord`.
//! No I/O, no hidden state: identical inputs always give identical output.
//!
//! Four independent steps share only the weight conventions:
//! confidence fusion, splint ranking, diagnosis-term aggregation and
//! recommendation merge. Every weight, membership and priority is kept in [0,1].

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::advice::{
    AggregatedTerm, Article, ClinicalRecord, EvidenceRecord, FusedRecommendation, FusedRecord,
    RankedSplint, Source, SplintRecommendation, FUSED_FIELDS,
};
use crate::fuzzy::{
    clamp01, confidence_to_numeric, defuzzify_confidence, evidence_strength,
    membership_triangular, round2,
};

pub const DEFAULT_CLINICAL_WEIGHT: f32 = 0.7;
pub const DEFAULT_TERM_CLINICAL_WEIGHT: f32 = 0.6;
pub const DEFAULT_EVIDENCE_BONUS: f32 = 0.3;

/// Text of the synthetic evidence-sourced recommendation.
pub const LITERATURE_REVIEW: &str = "Consider literature review (PubMed results attached).";

/// Title-mention triangle for evidence splints: support peaks at a single
/// mention and is gone at four.
const MENTION_TRIANGLE: (f32, f32, f32) = (0.0, 1.0, 4.0);

/// Tunable fusion weights.
///
/// `term_clinical_weight` is independent of `clinical_weight`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionWeights {
    /// Weight of the clinical confidence against evidence strength.
    #[serde(default = "default_clinical_weight")]
    pub clinical_weight: f32,
    /// Weight of the clinical diagnosis in the aggregated term list.
    #[serde(default = "default_term_clinical_weight")]
    pub term_clinical_weight: f32,
    /// Priority of the literature-review recommendation.
    #[serde(default = "default_evidence_bonus")]
    pub evidence_bonus: f32,
}

fn default_clinical_weight() -> f32 {
    DEFAULT_CLINICAL_WEIGHT
}
fn default_term_clinical_weight() -> f32 {
    DEFAULT_TERM_CLINICAL_WEIGHT
}
fn default_evidence_bonus() -> f32 {
    DEFAULT_EVIDENCE_BONUS
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            clinical_weight: DEFAULT_CLINICAL_WEIGHT,
            term_clinical_weight: DEFAULT_TERM_CLINICAL_WEIGHT,
            evidence_bonus: DEFAULT_EVIDENCE_BONUS,
        }
    }
}

impl FusionWeights {
    pub fn with_clinical_weight(mut self, w: f32) -> Self {
        self.clinical_weight = w;
        self
    }

    /// Replace any weight outside [0,1] (or NaN) with its default.
    pub fn sanitized(self) -> Self {
        fn keep(x: f32, fallback: f32) -> f32 {
            if (0.0..=1.0).contains(&x) {
                x
            } else {
                fallback
            }
        }
        Self {
            clinical_weight: keep(self.clinical_weight, DEFAULT_CLINICAL_WEIGHT),
            term_clinical_weight: keep(self.term_clinical_weight, DEFAULT_TERM_CLINICAL_WEIGHT),
            evidence_bonus: keep(self.evidence_bonus, DEFAULT_EVIDENCE_BONUS),
        }
    }
}

// ------------------------------------------------------------
// 1) Confidence
// ------------------------------------------------------------

/// Fused confidence in [0,1]: clinical label against literature strength.
pub fn fuse_confidence_numeric(
    clinical_confidence: Option<&str>,
    n_articles: usize,
    n_terms: usize,
    n_splints: usize,
    w_clinical: f32,
) -> f32 {
    let w = clamp01(w_clinical);
    let clinical = confidence_to_numeric(clinical_confidence);
    let evidence = evidence_strength(n_articles, n_terms, n_splints);
    clamp01(w * clinical + (1.0 - w) * evidence)
}

/// Fused confidence as a label ("high" | "medium" | "low").
pub fn fuse_confidence(
    clinical_confidence: Option<&str>,
    n_articles: usize,
    n_terms: usize,
    n_splints: usize,
    w_clinical: f32,
) -> &'static str {
    defuzzify_confidence(fuse_confidence_numeric(
        clinical_confidence,
        n_articles,
        n_terms,
        n_splints,
        w_clinical,
    ))
}

// ------------------------------------------------------------
// 2) Splints
// ------------------------------------------------------------

/// Support for `splint_name` in the literature, from how many titles mention it.
pub fn splint_membership_from_literature(splint_name: &str, articles: &[Article]) -> f32 {
    if articles.is_empty() {
        return 0.0;
    }
    let key = splint_name.to_lowercase();
    let mentions = articles
        .iter()
        .filter(|a| a.title.to_lowercase().contains(&key))
        .count();
    let (a, b, c) = MENTION_TRIANGLE;
    membership_triangular(mentions as f32, a, b, c)
}

/// Merge the clinical alternatives with literature candidates into one ranked list.
///
/// Names are deduplicated case-insensitively against the primary splint and
/// each other (first occurrence wins). Returns the primary splint with the
/// ranking attached, plus the ranking itself.
pub fn fuse_splints(
    primary: &SplintRecommendation,
    evidence_candidates: &[String],
    articles: &[Article],
) -> (SplintRecommendation, Vec<RankedSplint>) {
    let mut seen: HashSet<String> = HashSet::new();
    seen.insert(primary.splint_name.to_lowercase());

    let mut ranked = Vec::with_capacity(primary.alternatives.len() + evidence_candidates.len());

    for alt in &primary.alternatives {
        let name = alt.display_name();
        if seen.insert(name.to_lowercase()) {
            ranked.push(RankedSplint {
                splint_name: name,
                source: Source::Clinical,
                membership: 1.0,
            });
        }
    }

    for cand in evidence_candidates {
        if !seen.insert(cand.to_lowercase()) {
            continue;
        }
        let mu = splint_membership_from_literature(cand, articles);
        ranked.push(RankedSplint {
            splint_name: cand.clone(),
            source: Source::Evidence,
            membership: round2(clamp01(mu)),
        });
    }

    // Stronger support first, then by name.
    ranked.sort_by(|a, b| {
        b.membership
            .total_cmp(&a.membership)
            .then_with(|| a.splint_name.cmp(&b.splint_name))
    });

    let mut fused_primary = primary.clone();
    fused_primary.alternatives_with_scores = Some(ranked.clone());
    (fused_primary, ranked)
}

// ------------------------------------------------------------
// 3) Diagnosis terms
// ------------------------------------------------------------

/// Combined term view: the clinical diagnosis first, then literature terms in
/// input order. The clinical text itself is returned untouched for display.
pub fn fuse_diagnosis_terms<'a>(
    suggested_diagnosis: Option<&'a str>,
    evidence_terms: &[String],
    w_clinical: f32,
) -> (Option<&'a str>, Vec<AggregatedTerm>) {
    let w = clamp01(w_clinical);
    let mut terms = Vec::with_capacity(evidence_terms.len() + 1);

    if let Some(d) = suggested_diagnosis.map(str::trim).filter(|d| !d.is_empty()) {
        terms.push(AggregatedTerm {
            term: d.to_string(),
            source: Source::Clinical,
            weight: round2(w),
        });
    }

    let evidence_weight = round2(1.0 - w);
    for t in evidence_terms.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
        terms.push(AggregatedTerm {
            term: t.to_string(),
            source: Source::Evidence,
            weight: evidence_weight,
        });
    }

    (suggested_diagnosis, terms)
}

// ------------------------------------------------------------
// 4) Recommendations
// ------------------------------------------------------------

/// Clinical actions at full priority plus, when literature was found, a single
/// literature-review entry at `evidence_bonus`.
pub fn fuse_recommendations(
    clinical_actions: &[String],
    articles: &[Article],
    evidence_bonus: f32,
) -> Vec<FusedRecommendation> {
    let mut out: Vec<FusedRecommendation> = clinical_actions
        .iter()
        .map(|r| r.trim())
        .filter(|r| !r.is_empty())
        .map(|r| FusedRecommendation {
            recommendation: r.to_string(),
            source: Source::Clinical,
            priority: 1.0,
        })
        .collect();

    if !articles.is_empty() {
        out.push(FusedRecommendation {
            recommendation: LITERATURE_REVIEW.to_string(),
            source: Source::Evidence,
            priority: round2(clamp01(evidence_bonus)),
        });
    }

    out.sort_by(|a, b| {
        b.priority
            .total_cmp(&a.priority)
            .then_with(|| a.recommendation.cmp(&b.recommendation))
    });
    out
}

// ------------------------------------------------------------
// Orchestration
// ------------------------------------------------------------

/// Fuse with the default term weight and evidence bonus.
pub fn aggregate(
    clinical: &ClinicalRecord,
    evidence: &EvidenceRecord,
    clinical_weight: f32,
) -> FusedRecord {
    let weights = FusionWeights::default().with_clinical_weight(clinical_weight);
    aggregate_with(clinical, evidence, &weights)
}

/// Fuse the clinical and evidence records into one ranked, scored result.
pub fn aggregate_with(
    clinical: &ClinicalRecord,
    evidence: &EvidenceRecord,
    weights: &FusionWeights,
) -> FusedRecord {
    let articles = evidence.articles();
    let candidate_splints = evidence.candidate_splints();
    let candidate_terms = evidence.candidate_terms();

    let numeric = fuse_confidence_numeric(
        clinical.confidence.as_deref(),
        articles.len(),
        candidate_terms.len(),
        candidate_splints.len(),
        weights.clinical_weight,
    );

    let primary = clinical.recommended_splint.to_recommendation();
    let (fused_primary, ranked) = fuse_splints(&primary, candidate_splints, articles);

    let (_, terms) = fuse_diagnosis_terms(
        clinical.suggested_diagnosis.as_deref(),
        candidate_terms,
        weights.term_clinical_weight,
    );

    let recommendations = fuse_recommendations(
        &clinical.other_recommendations,
        articles,
        weights.evidence_bonus,
    );

    let mut extra = clinical.extra.clone();
    extra.retain(|k, _| !FUSED_FIELDS.contains(&k.as_str()));

    FusedRecord {
        diagnosis_summary: clinical.diagnosis_summary.clone(),
        suggested_diagnosis: clinical.suggested_diagnosis.clone(),
        recommended_splint: fused_primary,
        other_recommendations: clinical.other_recommendations.clone(),
        confidence: defuzzify_confidence(numeric).to_string(),
        fused_confidence_numeric: (numeric * 100.0).round() as u8,
        alternatives_with_scores: ranked,
        aggregated_diagnosis_terms: terms,
        fused_recommendations: recommendations,
        nih_articles: articles.to_vec(),
        additional_splints_from_nih: candidate_splints.to_vec(),
        suggested_diagnosis_terms_from_nih: candidate_terms.to_vec(),
        extra,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::{Alternative, PrimarySplint};

    fn art(title: &str) -> Article {
        Article::new("1", title, "https://pubmed.ncbi.nlm.nih.gov/1/")
    }

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn clinical_weight_one_ignores_evidence() {
        for w in ["high", "medium", "low"] {
            assert_eq!(fuse_confidence(Some(w), 0, 0, 0, 1.0), w);
            assert_eq!(fuse_confidence(Some(w), 3, 4, 2, 1.0), w);
        }
    }

    #[test]
    fn missing_confidence_counts_as_medium() {
        assert_eq!(fuse_confidence(None, 0, 0, 0, 1.0), "medium");
        assert_eq!(fuse_confidence(Some("unsure"), 0, 0, 0, 1.0), "medium");
    }

    #[test]
    fn literature_membership_peaks_at_one_mention() {
        let one = vec![art("Thumb spica for skier's thumb"), art("Unrelated")];
        assert_eq!(splint_membership_from_literature("thumb spica", &one), 1.0);

        let three = vec![
            art("Thumb Spica A"),
            art("thumb spica B"),
            art("THUMB SPICA C"),
        ];
        let mu = splint_membership_from_literature("Thumb Spica", &three);
        assert!((mu - 1.0 / 3.0).abs() < 1e-6, "got {mu}");

        let four: Vec<Article> = (0..4).map(|_| art("thumb spica")).collect();
        assert_eq!(splint_membership_from_literature("thumb spica", &four), 0.0);
        assert_eq!(splint_membership_from_literature("thumb spica", &[]), 0.0);
    }

    #[test]
    fn splints_dedup_against_primary_and_clinical_alternatives() {
        let primary = SplintRecommendation::new("Volar wrist splint", "neutral")
            .with_alternatives(["Thumb spica", "thumb SPICA", "Sugar-tong"]);
        let candidates = strings(&["VOLAR WRIST SPLINT", "Thumb Spica", "Mallet", "mallet"]);
        let articles = vec![art("Mallet finger splinting")];

        let (fused, ranked) = fuse_splints(&primary, &candidates, &articles);
        let names: Vec<&str> = ranked.iter().map(|r| r.splint_name.as_str()).collect();
        assert_eq!(names, vec!["Mallet", "Sugar-tong", "Thumb spica"]);
        assert!(ranked.iter().all(|r| r.membership == 1.0));
        assert_eq!(ranked[0].source, Source::Evidence);
        assert_eq!(fused.alternatives_with_scores.as_deref(), Some(ranked.as_slice()));
        assert_eq!(fused.splint_name, "Volar wrist splint");
    }

    #[test]
    fn splints_sort_by_membership_then_name() {
        let primary = SplintRecommendation::new("Resting hand splint", "");
        let articles = vec![art("dorsal blocking"), art("dorsal"), art("ulnar gutter")];
        let candidates = strings(&["Dorsal", "Ulnar Gutter", "Cock-Up", "Buddy Tape"]);
        let (_, ranked) = fuse_splints(&primary, &candidates, &articles);

        let got: Vec<(&str, f32)> = ranked
            .iter()
            .map(|r| (r.splint_name.as_str(), r.membership))
            .collect();
        assert_eq!(
            got,
            vec![
                ("Ulnar Gutter", 1.0),
                ("Dorsal", 0.67),
                ("Buddy Tape", 0.0),
                ("Cock-Up", 0.0),
            ]
        );
    }

    #[test]
    fn detailed_alternatives_use_their_name() {
        let mut primary = SplintRecommendation::new("Finger splint", "");
        primary.alternatives = vec![
            Alternative::Detailed(
                serde_json::json!({"splint_name": "Stack splint", "rationale": "DIP"})
                    .as_object()
                    .cloned()
                    .unwrap_or_default(),
            ),
            Alternative::Named("Buddy taping".into()),
        ];
        let (_, ranked) = fuse_splints(&primary, &[], &[]);
        let names: Vec<&str> = ranked.iter().map(|r| r.splint_name.as_str()).collect();
        assert_eq!(names, vec!["Buddy taping", "Stack splint"]);
    }

    #[test]
    fn terms_keep_insertion_order_and_skip_blanks() {
        let ev = strings(&["  sprain ", "", "   ", "fracture"]);
        let (shown, terms) = fuse_diagnosis_terms(Some(" Scaphoid fracture "), &ev, 0.6);
        assert_eq!(shown, Some(" Scaphoid fracture "));

        let got: Vec<(&str, Source, f32)> = terms
            .iter()
            .map(|t| (t.term.as_str(), t.source, t.weight))
            .collect();
        assert_eq!(
            got,
            vec![
                ("Scaphoid fracture", Source::Clinical, 0.6),
                ("sprain", Source::Evidence, 0.4),
                ("fracture", Source::Evidence, 0.4),
            ]
        );

        let (_, none) = fuse_diagnosis_terms(Some("   "), &[], 0.6);
        assert!(none.is_empty());
    }

    #[test]
    fn at_most_one_literature_recommendation() {
        let actions = strings(&["Order X-ray", " ", "Ortho referral"]);
        for n in [1usize, 50] {
            let articles: Vec<Article> = (0..n).map(|_| art("x")).collect();
            let recs = fuse_recommendations(&actions, &articles, 0.3);
            let evidence = recs.iter().filter(|r| r.source == Source::Evidence).count();
            assert_eq!(evidence, 1);
            assert_eq!(recs.len(), 3);
            assert_eq!(recs[0].recommendation, "Order X-ray");
            assert_eq!(recs[1].recommendation, "Ortho referral");
            assert_eq!(recs[2].recommendation, LITERATURE_REVIEW);
            assert!((recs[2].priority - 0.3).abs() < 1e-6);
        }
        assert!(fuse_recommendations(&actions, &[], 0.3)
            .iter()
            .all(|r| r.source == Source::Clinical));
    }

    #[test]
    fn term_weight_is_independent_of_clinical_weight() {
        let clinical = ClinicalRecord {
            suggested_diagnosis: Some("De Quervain tenosynovitis".into()),
            ..ClinicalRecord::default()
        };
        let evidence = EvidenceRecord::new(vec![], vec![], strings(&["tendinitis"]));
        let fused = aggregate(&clinical, &evidence, 0.9);
        assert!((fused.aggregated_diagnosis_terms[0].weight - 0.6).abs() < 1e-6);
        assert!((fused.aggregated_diagnosis_terms[1].weight - 0.4).abs() < 1e-6);
    }

    #[test]
    fn extras_never_shadow_fused_fields() {
        let mut clinical = ClinicalRecord {
            recommended_splint: PrimarySplint::Named("Ulnar gutter splint".into()),
            ..ClinicalRecord::default()
        };
        clinical
            .extra
            .insert("fused_recommendations".into(), serde_json::json!("stale"));
        clinical
            .extra
            .insert("model".into(), serde_json::json!("gpt-4o-mini"));

        let fused = aggregate(&clinical, &EvidenceRecord::default(), DEFAULT_CLINICAL_WEIGHT);
        assert!(!fused.extra.contains_key("fused_recommendations"));
        assert_eq!(fused.extra.get("model"), Some(&serde_json::json!("gpt-4o-mini")));
        assert_eq!(fused.recommended_splint.splint_name, "Ulnar gutter splint");

        let v = serde_json::to_value(&fused).unwrap();
        assert!(v["fused_recommendations"].is_array());
    }

    #[test]
    fn weights_out_of_range_fall_back_to_defaults() {
        let w = FusionWeights {
            clinical_weight: 1.5,
            term_clinical_weight: f32::NAN,
            evidence_bonus: 0.25,
        }
        .sanitized();
        assert_eq!(w.clinical_weight, DEFAULT_CLINICAL_WEIGHT);
        assert_eq!(w.term_clinical_weight, DEFAULT_TERM_CLINICAL_WEIGHT);
        assert_eq!(w.evidence_bonus, 0.25);
    }
}

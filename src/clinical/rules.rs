//! Keyword rules used when no language model answers.
//!
//! Each rule maps complaint keywords to one splint type. Every matching rule
//! contributes a candidate; the first candidate is recommended.

use crate::advice::{ClinicalRecord, PrimarySplint, SplintRecommendation};
use crate::fuzzy::{LOW, MEDIUM};

/// One region/condition entry of the rule table.
#[derive(Debug, Clone, Copy)]
pub struct SplintRule {
    pub key: &'static str,
    pub keywords: &'static [&'static str],
    pub splint: &'static str,
    pub rationale: &'static str,
}

pub const SPLINT_RULES: &[SplintRule] = &[
    SplintRule {
        key: "wrist",
        keywords: &["wrist", "carpal tunnel", "carpal", "wrist pain", "sprain wrist", "distal radius", "colles"],
        splint: "Volar wrist splint (neutral position)",
        rationale: "Holds the wrist in neutral; first line for carpal tunnel, wrist sprain and distal radius fracture.",
    },
    SplintRule {
        key: "thumb",
        keywords: &["thumb", "cmc", "basal joint", "de quervain", "skier's thumb", "gamekeeper", "ulnar collateral"],
        splint: "Thumb spica splint",
        rationale: "Immobilizes the thumb and CMC joint; ligament injury, De Quervain's, thumb fracture.",
    },
    SplintRule {
        key: "finger",
        keywords: &["finger", "mallet", "pip", "dip", "boutonniere", "jersey finger", "trigger finger"],
        splint: "Finger splint (type depends on joint: mallet, PIP extension, etc.)",
        rationale: "Joint specific: mallet holds DIP extension, boutonniere holds PIP extension.",
    },
    SplintRule {
        key: "elbow",
        keywords: &["elbow", "olecranon", "radial head", "supracondylar"],
        splint: "Long arm splint or sugar-tong / Muenster-type",
        rationale: "Immobilizes elbow and forearm after fracture or dislocation.",
    },
    SplintRule {
        key: "forearm",
        keywords: &["forearm", "radius fracture", "ulna", "both bones", "galeazzi", "monteggia"],
        splint: "Sugar-tong or long arm splint",
        rationale: "Controls forearm rotation and supports forearm fractures.",
    },
    SplintRule {
        key: "resting_hand",
        keywords: &["arthritis", "rheumatoid", "resting", "intrinsic plus", "burn", "spasticity"],
        splint: "Resting hand splint (intrinsic plus position)",
        rationale: "Keeps a safe position for arthritis, burns or spasticity.",
    },
];

const MATCH_PRECAUTIONS: &str = "Confirm with imaging and clinical exam as needed.";
const FALLBACK_SPLINT: &str = "Volar wrist splint (initial assessment)";
const FALLBACK_RATIONALE: &str = "Nonspecific upper extremity complaint; a volar wrist splint is a common first-line option until a specific diagnosis is made.";
const FALLBACK_ALTERNATIVES: [&str; 2] = [
    "Thumb spica if thumb involved",
    "Sugar-tong if forearm/elbow involved",
];
const FALLBACK_PRECAUTIONS: &str = "Clinical and possibly radiographic evaluation recommended.";
const SUMMARY_MAX_CHARS: usize = 200;

/// Rules whose keywords occur in the (lowercased) problem text, in table order.
pub fn matching_rules(problem: &str) -> Vec<&'static SplintRule> {
    let text = problem.to_lowercase();
    SPLINT_RULES
        .iter()
        .filter(|r| r.keywords.iter().any(|k| text.contains(k)))
        .collect()
}

/// Keyword-based clinical record.
///
/// Confidence is "medium" when exactly one candidate exists (a single match,
/// or the generic fallback), "low" when several regions compete.
pub fn rule_based_diagnosis(problem: &str) -> ClinicalRecord {
    let mut candidates: Vec<SplintRecommendation> = matching_rules(problem)
        .into_iter()
        .map(|r| {
            SplintRecommendation::new(r.splint, r.rationale).with_precautions(MATCH_PRECAUTIONS)
        })
        .collect();

    if candidates.is_empty() {
        candidates.push(
            SplintRecommendation::new(FALLBACK_SPLINT, FALLBACK_RATIONALE)
                .with_alternatives(FALLBACK_ALTERNATIVES)
                .with_precautions(FALLBACK_PRECAUTIONS),
        );
    }

    let confidence = if candidates.len() == 1 { MEDIUM } else { LOW };
    let excerpt: String = problem.chars().take(SUMMARY_MAX_CHARS).collect();
    let summary = format!("Based on description: {excerpt}.");

    ClinicalRecord {
        suggested_diagnosis: Some(summary.clone()),
        diagnosis_summary: summary,
        recommended_splint: PrimarySplint::Detailed(candidates.swap_remove(0)),
        other_recommendations: Vec::new(),
        confidence: Some(confidence.to_string()),
        ..ClinicalRecord::default()
    }
}

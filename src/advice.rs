//! advice.rs: Records exchanged between the advisors and the fusion engine.
//!
//! Inputs arrive from loosely-typed producers (a language model, a rule table,
//! a literature search), so every field is optional-safe: defaults are applied
//! here at the boundary and the engine only ever sees well-formed values.
//! Unknown fields are kept in `extra` maps and carried through to the output.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Which advisor contributed an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Clinical,
    Evidence,
}

/// An alternative splint: a bare name or a structured record.
#[derive(Debug, Clone, PartialEq)]
pub enum Alternative {
    Named(String),
    Detailed(Map<String, Value>),
}

impl Alternative {
    /// Display name: `splint_name`, then `name`, then the record as JSON text.
    pub fn display_name(&self) -> String {
        match self {
            Alternative::Named(s) => s.clone(),
            Alternative::Detailed(m) => ["splint_name", "name"]
                .iter()
                .filter_map(|k| m.get(*k).and_then(Value::as_str))
                .find(|s| !s.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| Value::Object(m.clone()).to_string()),
        }
    }
}

impl From<&str> for Alternative {
    fn from(s: &str) -> Self {
        Alternative::Named(s.to_string())
    }
}

impl Serialize for Alternative {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Alternative::Named(s) => serializer.serialize_str(s),
            Alternative::Detailed(m) => m.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Alternative {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::Object(m) => Alternative::Detailed(m),
            other => Alternative::Named(lenient::value_to_string(other)),
        })
    }
}

/// A splint recommendation as produced by the clinical advisor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SplintRecommendation {
    #[serde(default, deserialize_with = "lenient::string")]
    pub splint_name: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub rationale: String,
    #[serde(default, deserialize_with = "lenient::alternatives")]
    pub alternatives: Vec<Alternative>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_string"
    )]
    pub precautions: Option<String>,
    /// Ranked alternatives attached by the fusion engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternatives_with_scores: Option<Vec<RankedSplint>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SplintRecommendation {
    pub fn new(splint_name: impl Into<String>, rationale: impl Into<String>) -> Self {
        Self {
            splint_name: splint_name.into(),
            rationale: rationale.into(),
            ..Self::default()
        }
    }

    pub fn with_alternatives<I, A>(mut self, alternatives: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Alternative>,
    {
        self.alternatives = alternatives.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_precautions(mut self, precautions: impl Into<String>) -> Self {
        self.precautions = Some(precautions.into());
        self
    }
}

/// Primary splint field of a clinical record: usually a record, sometimes a
/// bare value (older model outputs answer with just the splint name).
#[derive(Debug, Clone, PartialEq)]
pub enum PrimarySplint {
    Detailed(SplintRecommendation),
    Named(String),
}

impl Default for PrimarySplint {
    fn default() -> Self {
        PrimarySplint::Detailed(SplintRecommendation::default())
    }
}

impl PrimarySplint {
    /// Record view; a bare value becomes `{splint_name, rationale: "", alternatives: []}`.
    pub fn to_recommendation(&self) -> SplintRecommendation {
        match self {
            PrimarySplint::Detailed(rec) => rec.clone(),
            PrimarySplint::Named(name) => SplintRecommendation::new(name.clone(), ""),
        }
    }

    pub fn splint_name(&self) -> &str {
        match self {
            PrimarySplint::Detailed(rec) => &rec.splint_name,
            PrimarySplint::Named(name) => name,
        }
    }
}

impl Serialize for PrimarySplint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PrimarySplint::Detailed(rec) => rec.serialize(serializer),
            PrimarySplint::Named(name) => serializer.serialize_str(name),
        }
    }
}

impl<'de> Deserialize<'de> for PrimarySplint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Object(m) => serde_json::from_value(Value::Object(m))
                .map(PrimarySplint::Detailed)
                .map_err(serde::de::Error::custom),
            Value::Null => Ok(PrimarySplint::default()),
            Value::String(s) if s.is_empty() => Ok(PrimarySplint::default()),
            other => Ok(PrimarySplint::Named(lenient::value_to_string(other))),
        }
    }
}

/// Output of the clinical advisor (model or rule fallback).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClinicalRecord {
    #[serde(default, deserialize_with = "lenient::string")]
    pub diagnosis_summary: String,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub suggested_diagnosis: Option<String>,
    #[serde(default)]
    pub recommended_splint: PrimarySplint,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub other_recommendations: Vec<String>,
    /// "high" | "medium" | "low"; anything else counts as "medium".
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub confidence: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One literature hit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Article {
    #[serde(rename = "pmid", alias = "id", default, deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub url: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Article {
    pub fn new(id: impl Into<String>, title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            url: url.into(),
            extra: Map::new(),
        }
    }
}

/// Output of the literature search.
///
/// Candidate splints and diagnosis terms are accepted under two field names
/// each (current + legacy); the first non-empty one wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    #[serde(default, deserialize_with = "lenient::articles")]
    pub nih_articles: Vec<Article>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub additional_splints_from_nih: Vec<String>,
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "lenient::string_list"
    )]
    pub additional_splints: Vec<String>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub suggested_diagnosis_terms_from_nih: Vec<String>,
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "lenient::string_list"
    )]
    pub suggested_diagnosis_terms: Vec<String>,
}

impl EvidenceRecord {
    pub fn new(articles: Vec<Article>, splints: Vec<String>, terms: Vec<String>) -> Self {
        Self {
            nih_articles: articles,
            additional_splints_from_nih: splints,
            suggested_diagnosis_terms_from_nih: terms,
            ..Self::default()
        }
    }

    pub fn articles(&self) -> &[Article] {
        &self.nih_articles
    }

    pub fn candidate_splints(&self) -> &[String] {
        first_non_empty(&self.additional_splints_from_nih, &self.additional_splints)
    }

    pub fn candidate_terms(&self) -> &[String] {
        first_non_empty(
            &self.suggested_diagnosis_terms_from_nih,
            &self.suggested_diagnosis_terms,
        )
    }
}

fn first_non_empty<'a>(primary: &'a [String], legacy: &'a [String]) -> &'a [String] {
    if primary.is_empty() {
        legacy
    } else {
        primary
    }
}

/// Ranked view of an alternative splint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedSplint {
    pub splint_name: String,
    pub source: Source,
    /// Support in [0,1]; clinical alternatives always 1.0.
    pub membership: f32,
}

/// A diagnosis term with its source weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedTerm {
    pub term: String,
    pub source: Source,
    pub weight: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedRecommendation {
    pub recommendation: String,
    pub source: Source,
    pub priority: f32,
}

/// Fused result: the clinical fields (confidence and splint overwritten) plus
/// the ranked/aggregated views and the raw evidence outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedRecord {
    pub diagnosis_summary: String,
    pub suggested_diagnosis: Option<String>,
    pub recommended_splint: SplintRecommendation,
    pub other_recommendations: Vec<String>,
    pub confidence: String,
    /// Fused confidence scaled to 0–100 for the UI.
    pub fused_confidence_numeric: u8,
    pub alternatives_with_scores: Vec<RankedSplint>,
    pub aggregated_diagnosis_terms: Vec<AggregatedTerm>,
    pub fused_recommendations: Vec<FusedRecommendation>,
    pub nih_articles: Vec<Article>,
    pub additional_splints_from_nih: Vec<String>,
    pub suggested_diagnosis_terms_from_nih: Vec<String>,
    /// Clinical fields the engine does not know about.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Field names written by the engine; carried-through extras never shadow them.
pub(crate) const FUSED_FIELDS: [&str; 12] = [
    "diagnosis_summary",
    "suggested_diagnosis",
    "recommended_splint",
    "other_recommendations",
    "confidence",
    "fused_confidence_numeric",
    "alternatives_with_scores",
    "aggregated_diagnosis_terms",
    "fused_recommendations",
    "nih_articles",
    "additional_splints_from_nih",
    "suggested_diagnosis_terms_from_nih",
];

/// Default-tolerant deserializers: `null` and wrong scalar types never fail,
/// they collapse to the nearest valid shape.
pub(crate) mod lenient {
    use super::{Alternative, Article};
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn value_to_string(v: Value) -> String {
        match v {
            Value::String(s) => s,
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(value_to_string(Value::deserialize(d)?))
    }

    pub fn opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Null => None,
            other => Some(value_to_string(other)),
        })
    }

    /// Lists of strings: `null` → empty, `null` entries dropped, scalars
    /// coerced to text, a lone scalar becomes a one-element list.
    pub fn string_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Null => Vec::new(),
            Value::Array(items) => items
                .into_iter()
                .filter(|v| !v.is_null())
                .map(value_to_string)
                .collect(),
            other => vec![value_to_string(other)],
        })
    }

    pub fn alternatives<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Alternative>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Null => Vec::new(),
            Value::Array(items) => items
                .into_iter()
                .filter(|v| !v.is_null())
                .map(|v| match v {
                    Value::Object(m) => Alternative::Detailed(m),
                    other => Alternative::Named(value_to_string(other)),
                })
                .collect(),
            Value::Object(m) => vec![Alternative::Detailed(m)],
            other => vec![Alternative::Named(value_to_string(other))],
        })
    }

    /// Article lists: `null` entries dropped, records read leniently, a bare
    /// scalar becomes an article carrying only a title.
    pub fn articles<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Article>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Null => Vec::new(),
            Value::Array(items) => items.into_iter().filter_map(article).collect(),
            other => article(other).into_iter().collect(),
        })
    }

    fn article(v: Value) -> Option<Article> {
        match v {
            Value::Null => None,
            Value::Object(m) => serde_json::from_value(Value::Object(m)).ok(),
            other => Some(Article {
                title: value_to_string(other),
                ..Article::default()
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clinical_record_tolerates_missing_and_malformed_fields() {
        let rec: ClinicalRecord = serde_json::from_value(json!({
            "diagnosis_summary": null,
            "recommended_splint": {
                "splint_name": "Thumb spica splint",
                "alternatives": ["Volar wrist splint", 3, null, {"name": "Ulnar gutter"}]
            },
            "other_recommendations": ["Order X-ray", 42, null],
            "confidence": null,
            "triage_level": "routine"
        }))
        .unwrap();

        assert_eq!(rec.diagnosis_summary, "");
        assert_eq!(rec.confidence, None);
        assert_eq!(rec.other_recommendations, vec!["Order X-ray", "42"]);
        assert_eq!(rec.extra.get("triage_level"), Some(&json!("routine")));

        let primary = rec.recommended_splint.to_recommendation();
        let names: Vec<String> = primary.alternatives.iter().map(|a| a.display_name()).collect();
        assert_eq!(names, vec!["Volar wrist splint", "3", "Ulnar gutter"]);
    }

    #[test]
    fn bare_primary_splint_becomes_a_stub() {
        let rec: ClinicalRecord =
            serde_json::from_value(json!({ "recommended_splint": "Sugar-tong splint" })).unwrap();
        let stub = rec.recommended_splint.to_recommendation();
        assert_eq!(stub.splint_name, "Sugar-tong splint");
        assert_eq!(stub.rationale, "");
        assert!(stub.alternatives.is_empty());

        let missing: ClinicalRecord = serde_json::from_value(json!({})).unwrap();
        assert_eq!(missing.recommended_splint.splint_name(), "");
    }

    #[test]
    fn detailed_alternative_falls_back_to_json_text() {
        let alt = Alternative::Detailed(
            json!({"kind": "dorsal"}).as_object().cloned().unwrap_or_default(),
        );
        assert_eq!(alt.display_name(), r#"{"kind":"dorsal"}"#);

        let blank_name = Alternative::Detailed(
            json!({"splint_name": "", "name": "Mallet"})
                .as_object()
                .cloned()
                .unwrap_or_default(),
        );
        assert_eq!(blank_name.display_name(), "Mallet");
    }

    #[test]
    fn evidence_aliases_first_non_empty_wins() {
        let ev: EvidenceRecord = serde_json::from_value(json!({
            "nih_articles": null,
            "additional_splints_from_nih": [],
            "additional_splints": ["Thumb Spica"],
            "suggested_diagnosis_terms_from_nih": ["sprain"],
            "suggested_diagnosis_terms": ["fracture"]
        }))
        .unwrap();
        assert!(ev.articles().is_empty());
        assert_eq!(ev.candidate_splints(), ["Thumb Spica".to_string()]);
        assert_eq!(ev.candidate_terms(), ["sprain".to_string()]);
    }

    #[test]
    fn malformed_article_entries_are_coerced() {
        let ev: EvidenceRecord = serde_json::from_value(json!({
            "nih_articles": [
                "Thumb spica review",
                null,
                {"pmid": "7", "title": "Mallet finger orthosis", "url": "u7"},
                42
            ],
            "additional_splints_from_nih": ["Thumb Spica"]
        }))
        .unwrap();

        let titles: Vec<&str> = ev.articles().iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["Thumb spica review", "Mallet finger orthosis", "42"]);
        assert_eq!(ev.articles()[0].id, "");
        assert_eq!(ev.articles()[1].id, "7");
        assert_eq!(ev.candidate_splints(), ["Thumb Spica".to_string()]);

        let single: EvidenceRecord =
            serde_json::from_value(json!({"nih_articles": {"id": "3", "title": "Volar"}})).unwrap();
        assert_eq!(single.articles().len(), 1);
    }

    #[test]
    fn article_accepts_pmid_or_id() {
        let a: Article = serde_json::from_value(json!({"pmid": 123, "title": "T"})).unwrap();
        assert_eq!(a.id, "123");
        let b: Article = serde_json::from_value(json!({"id": "9", "url": "u"})).unwrap();
        assert_eq!(b.id, "9");
        assert_eq!(serde_json::to_value(&b).unwrap()["pmid"], json!("9"));
    }
}

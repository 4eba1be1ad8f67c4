// src/evidence/mod.rs
//! Literature search and title-based extraction of extra splints and
//! diagnosis terms.

pub mod pubmed;

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use tracing::{info, warn};

use crate::advice::{Article, EvidenceRecord};

pub use crate::evidence::pubmed::PubMedClient;

/// Search backend returning article hits for a query.
#[async_trait]
pub trait LiteratureSearch: Send + Sync {
    async fn search(&self, query: &str, retmax: usize) -> Result<Vec<Article>>;
    fn name(&self) -> &'static str;
}

/// Splint vocabulary looked for in titles (lowercase).
pub const SPLINT_TERMS: &[&str] = &[
    "volar", "thumb spica", "sugar-tong", "muenster", "mallet", "resting hand",
    "wrist splint", "finger splint", "elbow", "long arm", "cock-up", "dorsal",
    "extension", "thumb", "cmc", "pip", "dip", "orthosis",
];

/// Diagnosis vocabulary looked for in titles (lowercase).
pub const DIAGNOSIS_TERMS: &[&str] = &[
    "fracture", "sprain", "tendon", "ligament", "carpal", "arthritis", "tunnel",
    "tendinitis", "tenosynovitis",
];

const MAX_EXTRA_SPLINTS: usize = 5;
const MAX_DIAGNOSIS_TERMS: usize = 6;
const MAX_QUERY_CHARS: usize = 80;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("evidence_searches_total", "Literature searches issued.");
        describe_counter!(
            "evidence_search_errors_total",
            "Literature searches that failed and degraded to no evidence."
        );
        describe_histogram!("evidence_articles_found", "Articles returned per search.");
    });
}

/// Wrap free text in the orthopaedic splint filter used for every search.
pub fn orthopaedic_query(text: &str) -> String {
    format!(
        "({text}) AND (upper extremity OR hand OR wrist OR orthopaedic) AND (splint OR immobilization)"
    )
}

/// Problem text reduced to word characters, whitespace and dashes, capped.
pub fn sanitize_problem(problem: &str) -> String {
    static RE_UNSAFE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"[^\w\s-]").expect("sanitize regex"));
    RE_UNSAFE
        .replace_all(problem, "")
        .chars()
        .take(MAX_QUERY_CHARS)
        .collect()
}

/// Python-style title case: a letter is uppercased when it follows a
/// non-letter, lowercased otherwise ("sugar-tong" → "Sugar-Tong").
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_letter = false;
    for ch in s.chars() {
        if ch.is_alphabetic() {
            if prev_letter {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            prev_letter = true;
        } else {
            out.push(ch);
            prev_letter = false;
        }
    }
    out
}

/// Scan titles for splint and diagnosis vocabulary.
///
/// Splints come back title-cased in first-seen order, without the primary
/// splint, at most five. Diagnosis terms come back sorted, at most six.
pub fn extract_suggestions(articles: &[Article], primary_splint: &str) -> (Vec<String>, Vec<String>) {
    let primary = primary_splint.to_lowercase();
    let mut splints: Vec<String> = Vec::new();
    let mut terms: BTreeSet<&'static str> = BTreeSet::new();

    for art in articles {
        let title = art.title.to_lowercase();
        for s in SPLINT_TERMS {
            if title.contains(s) && !splints.iter().any(|x| x.to_lowercase() == *s) {
                splints.push(title_case(s));
            }
        }
        for d in DIAGNOSIS_TERMS {
            if title.contains(d) {
                terms.insert(d);
            }
        }
    }

    let splints = splints
        .into_iter()
        .filter(|s| s.to_lowercase() != primary)
        .take(MAX_EXTRA_SPLINTS)
        .collect();
    let terms = terms
        .into_iter()
        .take(MAX_DIAGNOSIS_TERMS)
        .map(str::to_string)
        .collect();
    (splints, terms)
}

/// Runs the search for a problem and turns the hits into an `EvidenceRecord`.
pub struct EvidenceSearcher {
    backend: Arc<dyn LiteratureSearch>,
    retmax: usize,
}

impl EvidenceSearcher {
    pub fn new(backend: Arc<dyn LiteratureSearch>, retmax: usize) -> Self {
        ensure_metrics_described();
        Self { backend, retmax }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Search by free query; failures degrade to an empty list.
    pub async fn search(&self, query: &str, retmax: usize) -> Vec<Article> {
        counter!("evidence_searches_total").increment(1);
        match self.backend.search(query, retmax).await {
            Ok(articles) => {
                histogram!("evidence_articles_found").record(articles.len() as f64);
                articles
            }
            Err(e) => {
                counter!("evidence_search_errors_total").increment(1);
                warn!(backend = self.backend.name(), error = ?e, "literature search failed");
                Vec::new()
            }
        }
    }

    /// Literature evidence for a problem and the splint already recommended.
    pub async fn suggest(&self, problem: &str, primary_splint: &str) -> EvidenceRecord {
        let query = orthopaedic_query(&sanitize_problem(problem));
        let articles = self.search(&query, self.retmax).await;
        let (splints, terms) = extract_suggestions(&articles, primary_splint);
        info!(
            articles = articles.len(),
            splints = splints.len(),
            terms = terms.len(),
            "evidence collected"
        );
        EvidenceRecord::new(articles, splints, terms)
    }
}

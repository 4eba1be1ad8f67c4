//! fuzzy.rs: Fuzzy-set primitives shared by the fusion engine.
//!
//! Linguistic confidence ↔ numeric mapping, triangular membership and the
//! evidence-strength signal. Pure functions only, no I/O.

/// Linguistic confidence labels.
pub const HIGH: &str = "high";
pub const MEDIUM: &str = "medium";
pub const LOW: &str = "low";

/// Linguistic → numeric table.
pub const CONFIDENCE_TO_NUMERIC: [(&str, f32); 3] = [(HIGH, 0.85), (MEDIUM, 0.50), (LOW, 0.20)];

/// Defuzzification thresholds, checked in this order (inclusive lower bound).
pub const NUMERIC_TO_CONFIDENCE: [(f32, &str); 3] = [(0.70, HIGH), (0.35, MEDIUM), (0.0, LOW)];

/// Value used when the clinical label is missing or unknown ("medium").
pub const DEFAULT_CONFIDENCE_NUMERIC: f32 = 0.50;

/// Article-count triangle: nothing below 0, full support at 3, gone at 6.
const ARTICLE_TRIANGLE: (f32, f32, f32) = (0.0, 3.0, 6.0);
/// Terms + splints needed for a full term signal.
const TERM_RAMP_FULL: f32 = 6.0;
const ARTICLE_SHARE: f32 = 0.6;
const TERM_SHARE: f32 = 0.4;

/// Map a linguistic confidence to its numeric value.
/// Lookup is case-insensitive; `None`, blank or unknown labels give "medium".
pub fn confidence_to_numeric(label: Option<&str>) -> f32 {
    let key = label.map(|s| s.trim().to_ascii_lowercase()).unwrap_or_default();
    CONFIDENCE_TO_NUMERIC
        .iter()
        .find(|(l, _)| *l == key)
        .map(|&(_, v)| v)
        .unwrap_or(DEFAULT_CONFIDENCE_NUMERIC)
}

/// Map a fused numeric value back to high/medium/low.
pub fn defuzzify_confidence(x: f32) -> &'static str {
    for &(threshold, label) in NUMERIC_TO_CONFIDENCE.iter() {
        if x >= threshold {
            return label;
        }
    }
    LOW
}

/// Triangular membership with lower bound `a`, peak `b` and upper bound `c`.
///
/// Zero at or outside `[a, c]`; rises linearly to 1.0 at `b`, then falls.
/// A degenerate side (`a == b` or `b == c`) never divides by zero: the
/// open-interval check already returns 0.0 at the collapsed bound.
pub fn membership_triangular(x: f32, a: f32, b: f32, c: f32) -> f32 {
    if x <= a || x >= c {
        return 0.0;
    }
    if x <= b {
        if a != b {
            (x - a) / (b - a)
        } else {
            1.0
        }
    } else if b != c {
        (c - x) / (c - b)
    } else {
        1.0
    }
}

/// Strength of the literature signal in [0,1].
///
/// More articles (up to three) and more extracted terms/splints increase
/// membership in "strong evidence".
pub fn evidence_strength(n_articles: usize, n_terms: usize, n_splints: usize) -> f32 {
    let (a, b, c) = ARTICLE_TRIANGLE;
    let article_mu = membership_triangular(n_articles as f32, a, b, c);
    let term_mu = ((n_terms + n_splints) as f32 / TERM_RAMP_FULL).min(1.0);
    clamp01(ARTICLE_SHARE * article_mu + TERM_SHARE * term_mu)
}

/// Round to two decimals (half away from zero).
pub fn round2(x: f32) -> f32 {
    (x * 100.0).round() / 100.0
}

pub(crate) fn clamp01(x: f32) -> f32 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}

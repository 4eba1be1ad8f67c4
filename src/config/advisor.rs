// src/config/advisor.rs
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use tracing::{info, warn};

use crate::engine::FusionWeights;

pub const DEFAULT_CONFIG_PATH: &str = "config/advisor.toml";
pub const ENV_CONFIG_PATH: &str = "ADVISOR_CONFIG_PATH";
pub const ENV_CORS_ORIGINS: &str = "CORS_ORIGINS";
pub const ENV_DATA_DIR: &str = "ADVISOR_DATA_DIR";
pub const ENV_MANUFACTURING_URL: &str = "MANUFACTURING_SITE_URL";

const DEFAULT_MANUFACTURING_URL: &str =
    "https://www.google.com/maps/search/3d+printing+service+near+me";

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:5173".to_string(),
        "http://127.0.0.1:5173".to_string(),
    ]
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_manufacturing_url() -> String {
    DEFAULT_MANUFACTURING_URL.to_string()
}
fn default_true() -> bool {
    true
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_ai_timeout_secs() -> u64 {
    20
}
fn default_eutils_base() -> String {
    "https://eutils.ncbi.nlm.nih.gov/entrez/eutils".to_string()
}
fn default_retmax() -> usize {
    5
}
fn default_search_timeout_secs() -> u64 {
    10
}

/// Language-model settings for the clinical advisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_ai_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AiSection {
    fn default() -> Self {
        Self {
            enabled: true,
            model: default_model(),
            timeout_secs: default_ai_timeout_secs(),
        }
    }
}

/// Literature search settings (NCBI E-utilities).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_eutils_base")]
    pub base_url: String,
    /// Articles fetched per diagnosis.
    #[serde(default = "default_retmax")]
    pub retmax: usize,
    #[serde(default = "default_search_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EvidenceSection {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_eutils_base(),
            retmax: default_retmax(),
            timeout_secs: default_search_timeout_secs(),
        }
    }
}

/// Service configuration, loaded from `config/advisor.toml`.
///
/// ```toml
/// data_dir = "data"
/// cors_origins = ["http://localhost:5173"]
///
/// [fusion]
/// clinical_weight = 0.7
/// term_clinical_weight = 0.6
/// evidence_bonus = 0.3
///
/// [ai]
/// model = "gpt-4o-mini"
///
/// [evidence]
/// retmax = 5
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisorConfig {
    #[serde(default)]
    pub fusion: FusionWeights,
    #[serde(default)]
    pub ai: AiSection,
    #[serde(default)]
    pub evidence: EvidenceSection,
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_manufacturing_url")]
    pub manufacturing_url: String,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            fusion: FusionWeights::default(),
            ai: AiSection::default(),
            evidence: EvidenceSection::default(),
            cors_origins: default_cors_origins(),
            data_dir: default_data_dir(),
            manufacturing_url: default_manufacturing_url(),
        }
    }
}

impl AdvisorConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading advisor config from {}", path.display()))?;
        Self::from_toml_str(&data)
            .with_context(|| format!("parsing advisor config {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: AdvisorConfig = toml::from_str(s)?;
        Ok(cfg.sanitized())
    }

    /// Config file ($ADVISOR_CONFIG_PATH or `config/advisor.toml`) with env
    /// overrides applied. A missing or broken file falls back to defaults.
    pub fn from_env() -> Self {
        let path = env::var(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        let base = if path.exists() {
            match Self::load_from_file(&path) {
                Ok(cfg) => {
                    info!(path = %path.display(), "advisor config loaded");
                    cfg
                }
                Err(e) => {
                    warn!(error = ?e, "advisor config unreadable, using defaults");
                    Self::default()
                }
            }
        } else {
            Self::default()
        };

        base.with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(raw) = env::var(ENV_CORS_ORIGINS) {
            let origins = parse_origins(&raw);
            if !origins.is_empty() {
                self.cors_origins = origins;
            }
        }
        if let Ok(dir) = env::var(ENV_DATA_DIR) {
            if !dir.trim().is_empty() {
                self.data_dir = PathBuf::from(dir.trim());
            }
        }
        if let Ok(url) = env::var(ENV_MANUFACTURING_URL) {
            if !url.trim().is_empty() {
                self.manufacturing_url = url.trim().to_string();
            }
        }
        self
    }

    fn sanitized(mut self) -> Self {
        let before = self.fusion;
        self.fusion = self.fusion.sanitized();
        if before != self.fusion {
            warn!(?before, after = ?self.fusion, "fusion weights outside [0,1] reset to defaults");
        }
        if self.evidence.retmax == 0 {
            self.evidence.retmax = default_retmax();
        }
        self
    }
}

/// Comma-separated origin list; blanks dropped.
pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let cfg = AdvisorConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.fusion, FusionWeights::default());
        assert_eq!(cfg.evidence.retmax, 5);
        assert_eq!(cfg.data_dir, PathBuf::from("data"));
        assert_eq!(cfg.cors_origins.len(), 2);
        assert!(cfg.ai.enabled);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = AdvisorConfig::from_toml_str(
            r#"
            data_dir = "/var/lib/advisor"
            [fusion]
            clinical_weight = 0.5
            [evidence]
            retmax = 0
            "#,
        )
        .unwrap();
        assert_eq!(cfg.fusion.clinical_weight, 0.5);
        assert_eq!(cfg.fusion.term_clinical_weight, 0.6);
        assert_eq!(cfg.fusion.evidence_bonus, 0.3);
        assert_eq!(cfg.evidence.retmax, 5);
        assert_eq!(cfg.data_dir, PathBuf::from("/var/lib/advisor"));
    }

    #[test]
    fn out_of_range_weights_are_reset() {
        let cfg = AdvisorConfig::from_toml_str("[fusion]\nclinical_weight = 2.0\nevidence_bonus = -1.0")
            .unwrap();
        assert_eq!(cfg.fusion, FusionWeights::default());
    }

    #[test]
    fn origins_are_trimmed() {
        assert_eq!(
            parse_origins(" https://a.app , ,http://b.local"),
            vec!["https://a.app".to_string(), "http://b.local".to_string()]
        );
    }
}

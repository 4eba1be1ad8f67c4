// src/evidence/pubmed.rs
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::histogram;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::advice::Article;
use crate::evidence::LiteratureSearch;

const TOOL_NAME: &str = "splint_advisor";
const TOOL_EMAIL: &str = "user@example.com";

pub fn article_url(pmid: &str) -> String {
    format!("https://pubmed.ncbi.nlm.nih.gov/{pmid}/")
}

#[derive(Debug, Deserialize)]
struct ESearch {
    esearchresult: ESearchResult,
}
#[derive(Debug, Deserialize)]
struct ESearchResult {
    #[serde(default)]
    idlist: Vec<String>,
}

/// PMIDs from an esearch JSON body.
pub fn parse_esearch_ids(body: &str) -> Result<Vec<String>> {
    let parsed: ESearch = serde_json::from_str(body).context("parsing esearch json")?;
    Ok(parsed.esearchresult.idlist)
}

/// Articles from an esummary JSON body, in `ids` order. Ids missing from the
/// summary still yield an article with an empty title.
pub fn parse_esummary(body: &str, ids: &[String]) -> Result<Vec<Article>> {
    let parsed: Value = serde_json::from_str(body).context("parsing esummary json")?;
    let result = parsed.get("result");
    Ok(ids
        .iter()
        .map(|pmid| {
            let title = result
                .and_then(|r| r.get(pmid))
                .and_then(|doc| doc.get("title"))
                .and_then(Value::as_str)
                .map(clean_title)
                .unwrap_or_default();
            Article::new(pmid.clone(), title, article_url(pmid))
        })
        .collect())
}

/// Decode HTML entities, drop inline markup (<i>, <sup>) and collapse whitespace.
pub fn clean_title(raw: &str) -> String {
    static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("ws regex"));
    let decoded = html_escape::decode_html_entities(raw);
    let stripped = RE_TAGS.replace_all(&decoded, "");
    RE_WS.replace_all(&stripped, " ").trim().to_string()
}

/// NCBI E-utilities client, or a fixed article list for tests.
pub struct PubMedClient {
    mode: Mode,
}

enum Mode {
    Fixture(Vec<Article>),
    Failing(String),
    Http {
        base_url: String,
        client: reqwest::Client,
    },
}

impl PubMedClient {
    pub fn from_url(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("SplintAdvisor/1.0")
            .timeout(timeout)
            .build()
            .context("building pubmed http client")?;
        Ok(Self {
            mode: Mode::Http {
                base_url: base_url.into().trim_end_matches('/').to_string(),
                client,
            },
        })
    }

    /// Serve `articles` for every query (truncated to `retmax`).
    pub fn from_fixture(articles: Vec<Article>) -> Self {
        Self {
            mode: Mode::Fixture(articles),
        }
    }

    /// Fail every search with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            mode: Mode::Failing(message.into()),
        }
    }

    async fn get_text(client: &reqwest::Client, url: &str, query: &[(&str, &str)]) -> Result<String> {
        let resp = client
            .get(url)
            .query(query)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?
            .error_for_status()
            .with_context(|| format!("GET {url} status"))?;
        resp.text().await.context("reading body")
    }

    async fn search_http(
        base_url: &str,
        client: &reqwest::Client,
        query: &str,
        retmax: usize,
    ) -> Result<Vec<Article>> {
        let t0 = Instant::now();
        let retmax = retmax.to_string();
        let search_body = Self::get_text(
            client,
            &format!("{base_url}/esearch.fcgi"),
            &[
                ("db", "pubmed"),
                ("term", query),
                ("retmax", retmax.as_str()),
                ("retmode", "json"),
                ("tool", TOOL_NAME),
                ("email", TOOL_EMAIL),
            ],
        )
        .await?;
        let ids = parse_esearch_ids(&search_body)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let joined = ids.join(",");
        let summary_body = Self::get_text(
            client,
            &format!("{base_url}/esummary.fcgi"),
            &[("db", "pubmed"), ("id", joined.as_str()), ("retmode", "json")],
        )
        .await?;
        let articles = parse_esummary(&summary_body, &ids)?;

        histogram!("evidence_search_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        Ok(articles)
    }
}

#[async_trait]
impl LiteratureSearch for PubMedClient {
    async fn search(&self, query: &str, retmax: usize) -> Result<Vec<Article>> {
        match &self.mode {
            Mode::Fixture(articles) => Ok(articles.iter().take(retmax).cloned().collect()),
            Mode::Failing(msg) => Err(anyhow::anyhow!("{msg}")),
            Mode::Http { base_url, client } => {
                Self::search_http(base_url, client, query, retmax).await
            }
        }
    }

    fn name(&self) -> &'static str {
        match self.mode {
            Mode::Fixture(_) | Mode::Failing(_) => "pubmed-fixture",
            Mode::Http { .. } => "pubmed",
        }
    }
}

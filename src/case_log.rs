//! case_log.rs: append-only JSONL logs of served cases.
//!
//! Three files under the data directory:
//! - `cases.jsonl`: every case (input + full output) for physician review,
//! - `fine_tune_dataset.jsonl`: user/assistant message pairs,
//! - `urgent_care_cases.jsonl`: the urgent-care subset of each output.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const CASES_FILE: &str = "cases.jsonl";
pub const FINE_TUNE_FILE: &str = "fine_tune_dataset.jsonl";
pub const URGENT_CARE_FILE: &str = "urgent_care_cases.jsonl";

/// Output fields kept in the urgent-care log.
const URGENT_CARE_FIELDS: [&str; 8] = [
    "diagnosis_summary",
    "suggested_diagnosis",
    "recommended_splint",
    "other_recommendations",
    "confidence",
    "nih_articles",
    "additional_splints_from_nih",
    "suggested_diagnosis_terms_from_nih",
];

/// Problem as submitted by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseInput {
    pub problem: String,
    pub optional_context: Option<String>,
}

/// Which log a read/export targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseKind {
    General,
    FineTune,
    UrgentCare,
}

impl CaseKind {
    pub fn file_name(self) -> &'static str {
        match self {
            CaseKind::General => CASES_FILE,
            CaseKind::FineTune => FINE_TUNE_FILE,
            CaseKind::UrgentCare => URGENT_CARE_FILE,
        }
    }
}

#[derive(Debug)]
pub struct CaseLog {
    dir: PathBuf,
    // serializes appends so lines never interleave
    write_lock: Mutex<()>,
}

impl CaseLog {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating data dir {}", dir.display()))?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self, kind: CaseKind) -> PathBuf {
        self.dir.join(kind.file_name())
    }

    /// Append a case to the general log and the fine-tune dataset.
    pub fn record_case(&self, case_id: &str, input: &CaseInput, output: &Value, source: &str) -> Result<()> {
        let record = json!({
            "case_id": case_id,
            "timestamp": timestamp(),
            "source": source,
            "input": input,
            "output": output,
        });
        let context = input
            .optional_context
            .as_deref()
            .filter(|c| !c.is_empty())
            .unwrap_or("None");
        let fine_tune = json!({
            "messages": [
                {"role": "user", "content": format!("Problem: {}. Context: {}.", input.problem, context)},
                {"role": "assistant", "content": output.to_string()},
            ]
        });

        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        append_line(&self.path(CaseKind::General), &record)?;
        append_line(&self.path(CaseKind::FineTune), &fine_tune)
    }

    /// Append the urgent-care subset of a case.
    pub fn record_urgent_care(&self, case_id: &str, input: &CaseInput, output: &Value) -> Result<()> {
        let subset: serde_json::Map<String, Value> = URGENT_CARE_FIELDS
            .iter()
            .map(|k| (k.to_string(), output.get(*k).cloned().unwrap_or(Value::Null)))
            .collect();
        let record = json!({
            "case_id": case_id,
            "timestamp": timestamp(),
            "source": "urgent_care",
            "input": input,
            "output": subset,
        });

        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        append_line(&self.path(CaseKind::UrgentCare), &record)
    }

    /// Up to `limit` most recent records, newest first. Missing file → empty.
    pub fn recent(&self, kind: CaseKind, limit: usize) -> Result<Vec<Value>> {
        let path = self.path(kind);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = fs::File::open(&path).with_context(|| format!("opening {}", path.display()))?;
        let mut rows = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.with_context(|| format!("reading {}", path.display()))?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let v: Value = serde_json::from_str(line)
                .with_context(|| format!("parsing a line of {}", path.display()))?;
            rows.push(v);
        }
        let start = rows.len().saturating_sub(limit);
        let mut out = rows.split_off(start);
        out.reverse();
        Ok(out)
    }

    /// Number of lines in a log; `None` when the file does not exist yet.
    pub fn count(&self, kind: CaseKind) -> Result<Option<usize>> {
        let path = self.path(kind);
        if !path.exists() {
            return Ok(None);
        }
        let file = fs::File::open(&path).with_context(|| format!("opening {}", path.display()))?;
        Ok(Some(BufReader::new(file).lines().count()))
    }
}

fn append_line(path: &Path, value: &Value) -> Result<()> {
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening {} for append", path.display()))?;
    writeln!(f, "{value}").with_context(|| format!("appending to {}", path.display()))
}

/// UTC ISO-8601 with microseconds and a `Z` suffix.
fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> CaseInput {
        CaseInput {
            problem: "thumb pain".into(),
            optional_context: None,
        }
    }

    #[test]
    fn urgent_care_keeps_only_its_fields() {
        let tmp = tempfile::tempdir().unwrap();
        let log = CaseLog::open(tmp.path()).unwrap();
        let output = json!({"confidence": "low", "disclaimer": "x", "case_id": "c1"});
        log.record_urgent_care("c1", &input(), &output).unwrap();

        let rows = log.recent(CaseKind::UrgentCare, 10).unwrap();
        assert_eq!(rows.len(), 1);
        let out = rows[0]["output"].as_object().unwrap();
        assert_eq!(out.len(), URGENT_CARE_FIELDS.len());
        assert_eq!(out["confidence"], json!("low"));
        assert!(out["nih_articles"].is_null());
        assert!(!out.contains_key("disclaimer"));
        assert_eq!(rows[0]["source"], json!("urgent_care"));
    }

    #[test]
    fn fine_tune_line_uses_none_for_missing_context() {
        let tmp = tempfile::tempdir().unwrap();
        let log = CaseLog::open(tmp.path()).unwrap();
        log.record_case("c1", &input(), &json!({"a": 1}), "api").unwrap();

        let rows = log.recent(CaseKind::FineTune, 1).unwrap();
        assert_eq!(
            rows[0]["messages"][0]["content"],
            json!("Problem: thumb pain. Context: None.")
        );
        assert_eq!(rows[0]["messages"][1]["content"], json!(r#"{"a":1}"#));
    }

    #[test]
    fn timestamps_are_utc_zulu() {
        let ts = timestamp();
        assert!(ts.ends_with('Z'));
        assert_eq!(ts.len(), "2025-01-01T00:00:00.000000Z".len());
    }
}

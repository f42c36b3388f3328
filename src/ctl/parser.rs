//! Annotation extraction from Rust source comments
//!
//! Three line formats are recognized:
//!
//! ```text
//! // @component: {"k":"C","id":"memory_lib","t":"Memory layer"}
//! // @ctl3: Ⱦ[vector_store:service] := {∇[80→100] ⊗[hnsw, simd]}
//! // @ctl4: vector_store:S:80:100:gpu,async
//! ```
//!
//! Every result is validated before it is returned. Failures are reported
//! per line and never abort the file.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use super::enhanced;
use super::model::{number_from_f64, Component, Dependency, Kind, Maturity};
use super::schema::{self, CtlError};
use crate::config::SyncSettings;

static V2_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"//\s*@component:\s*(\{.*\})").expect("valid regex"));
static V3_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"//\s*@ctl3:\s*(Ⱦ\[.*?\]\s*:=\s*\{[^}]*\})").expect("valid regex")
});
static V3_TENSOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Ⱦ\[([^:]+):([^\]]+)\]\s*:=\s*\{([^}]*)\}").expect("valid regex")
});
static V3_MATURITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"∇\[(\d+)→(\d+)\]").expect("valid regex"));
static V3_DEPS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"⊗\[([^\]]+)\]").expect("valid regex"));
static V4_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"//\s*@ctl4:\s*([^:\s]+):([A-Za-z]):(-?\d+(?:\.\d+)?):(-?\d+(?:\.\d+)?)(?::(\S+))?")
        .expect("valid regex")
});

/// Which parser variants are active
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Parsers {
    /// Use the extended tensor grammar (and migrate v2 lines to v3)
    pub enhanced: bool,
}

impl Parsers {
    pub fn from_settings(settings: &SyncSettings) -> Self {
        Self {
            enhanced: settings.parsing.ctl3.use_enhanced,
        }
    }
}

/// Components and per-line errors found in one file
#[derive(Debug, Default)]
pub struct Extraction {
    pub components: Vec<Component>,
    /// (1-based line, error)
    pub errors: Vec<(usize, CtlError)>,
}

/// Extract and validate every annotation in `content`
///
/// `rel_path` ends up in each component's `x_file` as `rel_path:line`.
pub fn extract_components(content: &str, rel_path: &str, parsers: &Parsers) -> Extraction {
    let mut out = Extraction::default();

    for (idx, line) in content.lines().enumerate() {
        let line_no = idx + 1;
        let location = format!("{}:{}", rel_path, line_no);

        let mut results = Vec::new();

        if let Some(caps) = V2_RE.captures(line) {
            let json = &caps[1];
            tracing::debug!(file = rel_path, line = line_no, "found v2 annotation");
            let result = if parsers.enhanced {
                enhanced::migrate_v2(json, &location)
            } else {
                parse_v2(json, &location)
            };
            results.push((result, false));
        }

        if parsers.enhanced {
            if let Some(result) = enhanced::parse_line(line, &location) {
                tracing::debug!(file = rel_path, line = line_no, "found v3 annotation");
                results.push((result, true));
            }
        } else if let Some(caps) = V3_RE.captures(line) {
            tracing::debug!(file = rel_path, line = line_no, "found v3 annotation");
            results.push((parse_v3(&caps[1], &location), false));
        }

        if let Some(caps) = V4_RE.captures(line) {
            tracing::debug!(file = rel_path, line = line_no, "found v4 annotation");
            results.push((parse_v4(&caps, &location), false));
        }

        for (result, lenient_id) in results {
            let checked = result.and_then(|c| {
                if lenient_id {
                    schema::validate_lenient_id(&c)
                } else {
                    schema::validate(&c)
                }
                .map(|_| c)
            });
            match checked {
                Ok(component) => out.components.push(component),
                Err(errors) => {
                    for error in errors {
                        tracing::warn!(file = rel_path, line = line_no, %error, "invalid annotation");
                        out.errors.push((line_no, error));
                    }
                }
            }
        }
    }

    out
}

/// Parse the JSON body of a `@component` line
pub fn parse_v2(json: &str, location: &str) -> Result<Component, Vec<CtlError>> {
    let mut component = schema::parse_component(json)?;
    component.set_extra("x_file", location);
    Ok(component)
}

/// Convert a `Ⱦ[id:type] := {ops}` tensor into a component
pub fn parse_v3(tensor: &str, location: &str) -> Result<Component, Vec<CtlError>> {
    let caps = V3_TENSOR_RE
        .captures(tensor)
        .ok_or_else(|| vec![CtlError::BadTensor(tensor.to_string())])?;

    let id = caps[1].trim();
    let type_name = caps[2].trim();
    let ops = caps[3].trim();

    let mut component = Component::new(
        infer_kind(type_name),
        id,
        format!("{} (CTL v3.0)", type_name),
    );
    component.set_extra("x_file", location);
    component.set_extra("ctl3_tensor", tensor);

    if let Some(m) = V3_MATURITY_RE.captures(ops) {
        if let (Ok(cur), Ok(tgt)) = (m[1].parse::<u64>(), m[2].parse::<u64>()) {
            component.m = Some(Maturity::new(cur, tgt, "%"));
        }
    }

    let flags = operator_flags(ops);
    if !flags.is_empty() {
        component.f = Some(flags);
    }

    if let Some(d) = V3_DEPS_RE.captures(ops) {
        component.d = Some(
            d[1].split(',')
                .map(|s| Dependency::Id(s.trim().to_string()))
                .collect(),
        );
    }

    Ok(component)
}

fn parse_v4(caps: &regex::Captures<'_>, location: &str) -> Result<Component, Vec<CtlError>> {
    let raw = caps[0].to_string();
    let bad = || vec![CtlError::BadCompact(raw.clone())];

    let kind = Kind::parse(&caps[2].to_ascii_uppercase()).ok_or_else(bad)?;
    let cur: f64 = caps[3].parse().map_err(|_| bad())?;
    let tgt: f64 = caps[4].parse().map_err(|_| bad())?;

    let id = &caps[1];
    let mut component = Component::new(kind, id, id);
    component.m = Some(Maturity::new(
        number_from_f64(cur),
        number_from_f64(tgt),
        "%",
    ));
    if let Some(flags) = caps.get(5) {
        let flags: Vec<String> = flags
            .as_str()
            .split(',')
            .filter(|f| !f.is_empty())
            .map(str::to_string)
            .collect();
        if !flags.is_empty() {
            component.f = Some(flags);
        }
    }
    component.set_extra("x_file", location);
    component.set_extra("v", Value::from(4));

    Ok(component)
}

fn infer_kind(type_name: &str) -> Kind {
    let lower = type_name.to_lowercase();
    const KEYWORDS: [(&str, Kind); 10] = [
        ("test", Kind::T),
        ("agent", Kind::A),
        ("batch", Kind::B),
        ("function", Kind::F),
        ("module", Kind::M),
        ("service", Kind::S),
        ("resource", Kind::R),
        ("process", Kind::P),
        ("data", Kind::D),
        ("error", Kind::E),
    ];
    KEYWORDS
        .iter()
        .find(|(kw, _)| lower.contains(kw))
        .map_or(Kind::C, |(_, kind)| *kind)
}

fn operator_flags(ops: &str) -> Vec<String> {
    let checks = [
        (ops.contains('⊗'), "tensor_composition"),
        (ops.contains('⊕'), "tensor_addition"),
        (ops.contains('∇'), "optimization"),
        (ops.contains('∂'), "partial_implementation"),
        (ops.contains('⟹'), "implication"),
        (ops.contains("gpu"), "gpu"),
        (ops.contains("ai") || ops.contains("ml"), "ai"),
        (ops.contains("async"), "async"),
    ];
    checks
        .into_iter()
        .filter(|(hit, _)| *hit)
        .map(|(_, flag)| flag.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const BASIC: Parsers = Parsers { enhanced: false };

    #[test]
    fn test_extract_v2() {
        let src = "fn a() {}\n// @component: {\"k\":\"C\",\"id\":\"memory_lib\",\"t\":\"Memory\"}\n";
        let out = extract_components(src, "memory/src/lib.rs", &BASIC);
        assert!(out.errors.is_empty());
        assert_eq!(
            out.components[0].to_compact_json(),
            r#"{"k":"C","id":"memory_lib","t":"Memory","x_file":"memory/src/lib.rs:2"}"#
        );
    }

    #[test]
    fn test_extract_v3() {
        let src = "// @ctl3: Ⱦ[vector_store:service] := {∇[80→100] ⊗[hnsw, simd] async}";
        let out = extract_components(src, "a.rs", &BASIC);
        assert!(out.errors.is_empty(), "{:?}", out.errors);
        let c = &out.components[0];
        assert_eq!(c.k, Kind::S);
        assert_eq!(c.t, "service (CTL v3.0)");
        assert_eq!(c.m, Some(Maturity::new(80, 100, "%")));
        assert_eq!(
            c.f.as_deref(),
            Some(
                &[
                    "tensor_composition".to_string(),
                    "optimization".to_string(),
                    "async".to_string()
                ][..]
            )
        );
        assert!(c.depends_on("hnsw") && c.depends_on("simd"));
        assert_eq!(c.location(), Some("a.rs:1"));
        assert_eq!(
            c.extra_str("ctl3_tensor"),
            Some("Ⱦ[vector_store:service] := {∇[80→100] ⊗[hnsw, simd] async}")
        );
    }

    #[test]
    fn test_extract_v4() {
        let src = "    // @ctl4: embed_cache:C:90:100:prod,gpu";
        let out = extract_components(src, "x.rs", &BASIC);
        let c = &out.components[0];
        assert_eq!(c.id, "embed_cache");
        assert_eq!(c.t, "embed_cache");
        assert!(c.has_flag("prod") && c.has_flag("gpu"));
        assert_eq!(
            c.to_compact_json(),
            r#"{"k":"C","id":"embed_cache","t":"embed_cache","m":{"cur":90,"tgt":100,"u":"%"},"f":["prod","gpu"],"x_file":"x.rs:1","v":4}"#
        );
    }

    #[test]
    fn test_invalid_annotations_are_reported_not_returned() {
        let src = concat!(
            "// @component: {\"k\":\"Q\",\"id\":\"ok\",\"t\":\"x\"}\n",
            "// @component: {broken}\n",
            "// @ctl4: x:Z:1:2\n",
            "// @component: {\"k\":\"T\",\"id\":\"fine\",\"t\":\"x\"}\n",
        );
        let out = extract_components(src, "a.rs", &BASIC);
        assert_eq!(out.components.len(), 1);
        assert_eq!(out.components[0].id, "fine");
        let lines: Vec<usize> = out.errors.iter().map(|(l, _)| *l).collect();
        assert_eq!(lines, vec![1, 2, 3]);
    }

    #[test]
    fn test_enhanced_keeps_long_ids_with_warning() {
        let enhanced = Parsers { enhanced: true };
        let long_id = "a".repeat(40);
        let src = format!("// @ctl3: Ⱦ[{}:module] := {{∇[1→2]}}\n", long_id);
        let out = extract_components(&src, "a.rs", &enhanced);
        assert!(out.errors.is_empty(), "{:?}", out.errors);
        assert_eq!(out.components[0].id, long_id);
        assert!(!out.components[0].extra.contains_key("validation_warnings"));

        let out = extract_components("// @ctl3: Ⱦ[Bad-Id:module] := {∇[1→2]}", "a.rs", &enhanced);
        assert!(out.errors.is_empty(), "{:?}", out.errors);
        assert!(out.components[0].extra.contains_key("validation_warnings"));

        let out = extract_components(&src, "a.rs", &BASIC);
        assert!(out.components.is_empty());
        assert!(matches!(out.errors[0].1, CtlError::InvalidId(_)));
    }

    #[test]
    fn test_infer_kind() {
        assert_eq!(infer_kind("UnitTest"), Kind::T);
        assert_eq!(infer_kind("data pipeline"), Kind::D);
        assert_eq!(infer_kind("widget"), Kind::C);
    }

    #[test]
    fn test_plain_comments_ignored() {
        let src = "// just a comment\n/// @component is documented here\nlet x = 1;";
        let out = extract_components(src, "a.rs", &BASIC);
        assert!(out.components.is_empty());
        assert!(out.errors.is_empty());
    }
}

//! Extended CTL v3.0 tensor grammar
//!
//! Accepts `@ctl3`, `@tensor` and `@component3` prefixes, the `Ⱦ`/`ⱦ`/`D`
//! symbols, `<key=value>` metadata and both spellings of every operator
//! (`⊗` or `compose`, `∇` or `grad`, ...). The result carries a `tensor`
//! expression tree, typed dependencies, semantic flags and derived
//! progress/status/category fields.
//!
//! ```text
//! // @ctl3: Ⱦ[hnsw_index:service] <lang=rust,gpu=true> := {grad[60->100, conf:0.8] compose[vector:sync, cache]}
//! ```

use regex::Regex;
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use std::sync::LazyLock;

use super::model::{number_from_f64, Component, Dependency, Kind, Maturity};
use super::schema::{self, CtlError};

static LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)//\s*@(?:ctl3|tensor|component3):\s*([DⱦȾ]\[.*?\]\s*:=\s*\{.*?\})")
        .expect("valid regex")
});
static COMPONENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)([DⱦȾ])\[([^:]+):([^\]]+)\](?:\s*<([^>]+)>)?\s*:=\s*\{(.*?)\}")
        .expect("valid regex")
});
static MATURITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:∇|grad)\[(\d+)(?:→|->)(\d+)(?:,\s*([^\]]+))?\]").expect("valid regex")
});
static COMPOSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:⊗|compose)\[([^\]]+)\]").expect("valid regex"));
static PARALLEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:⊕|parallel)\[([^\]]+)\]").expect("valid regex"));
static CONDITION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:∵|because)\s*([^∴]+)(?:∴|therefore)\s*(.+)").expect("valid regex")
});
static NESTED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([^{}]*(?:\{[^{}]*\}[^{}]*)*)\}").expect("valid regex")
});
static LOOSE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9_]{1,64}$").expect("valid regex"));

/// Tensor operators, in lookup order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorOp {
    Compose,
    Parallel,
    Elementwise,
    Convolve,
    Grad,
    Partial,
    Therefore,
    Because,
    Equiv,
    Implies,
    Bidir,
    Seq,
    Cross,
    Join,
    Intersect,
    Union,
    Approx,
}

impl TensorOp {
    pub const ALL: [TensorOp; 17] = [
        TensorOp::Compose,
        TensorOp::Parallel,
        TensorOp::Elementwise,
        TensorOp::Convolve,
        TensorOp::Grad,
        TensorOp::Partial,
        TensorOp::Therefore,
        TensorOp::Because,
        TensorOp::Equiv,
        TensorOp::Implies,
        TensorOp::Bidir,
        TensorOp::Seq,
        TensorOp::Cross,
        TensorOp::Join,
        TensorOp::Intersect,
        TensorOp::Union,
        TensorOp::Approx,
    ];

    pub fn symbol(&self) -> &'static str {
        match self {
            TensorOp::Compose => "⊗",
            TensorOp::Parallel => "⊕",
            TensorOp::Elementwise => "⊙",
            TensorOp::Convolve => "⊡",
            TensorOp::Grad => "∇",
            TensorOp::Partial => "∂",
            TensorOp::Therefore => "∴",
            TensorOp::Because => "∵",
            TensorOp::Equiv => "≡",
            TensorOp::Implies => "⟹",
            TensorOp::Bidir => "⟷",
            TensorOp::Seq => "◦",
            TensorOp::Cross => "⊠",
            TensorOp::Join => "⋈",
            TensorOp::Intersect => "∩",
            TensorOp::Union => "∪",
            TensorOp::Approx => "≈",
        }
    }

    /// ASCII spelling, also used as the flag name
    pub fn name(&self) -> &'static str {
        match self {
            TensorOp::Compose => "compose",
            TensorOp::Parallel => "parallel",
            TensorOp::Elementwise => "elementwise",
            TensorOp::Convolve => "convolve",
            TensorOp::Grad => "grad",
            TensorOp::Partial => "partial",
            TensorOp::Therefore => "therefore",
            TensorOp::Because => "because",
            TensorOp::Equiv => "equiv",
            TensorOp::Implies => "implies",
            TensorOp::Bidir => "bidir",
            TensorOp::Seq => "seq",
            TensorOp::Cross => "cross",
            TensorOp::Join => "join",
            TensorOp::Intersect => "intersect",
            TensorOp::Union => "union",
            TensorOp::Approx => "approx",
        }
    }

    fn appears_in(&self, text: &str) -> bool {
        text.contains(self.symbol()) || text.contains(self.name())
    }
}

/// Operand of a tensor expression
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Name(String),
    Nested(TensorExpr),
}

/// Parsed `{ops}` body: the leading operator and its bracketed operands
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TensorExpr {
    pub op: Option<TensorOp>,
    pub operands: Vec<Operand>,
    pub approximation: bool,
    pub conclusion: bool,
}

impl TensorExpr {
    /// Parse an operations string; `None` when no operator is found
    pub fn parse(text: &str) -> Option<Self> {
        let mut expr = TensorExpr::default();

        // Symbols take precedence over ASCII names
        let spellings = TensorOp::ALL
            .iter()
            .map(|op| (*op, op.symbol()))
            .chain(TensorOp::ALL.iter().map(|op| (*op, op.name())));

        for (op, spelling) in spellings {
            if text.contains(spelling) {
                expr.op = Some(op);
                if let Some(args) = bracket_args(text, spelling) {
                    expr.operands = parse_operands(args);
                }
                break;
            }
        }

        expr.approximation = TensorOp::Approx.appears_in(text);
        expr.conclusion = TensorOp::Therefore.appears_in(text);

        (expr.op.is_some() || !expr.operands.is_empty()).then_some(expr)
    }

    pub fn to_value(&self) -> Value {
        let mut out = Map::new();
        if let Some(op) = self.op {
            out.insert("op".into(), op.name().into());
        }
        if !self.operands.is_empty() {
            let operands = self
                .operands
                .iter()
                .map(|o| match o {
                    Operand::Name(name) => Value::from(name.as_str()),
                    Operand::Nested(expr) => expr.to_value(),
                })
                .collect();
            out.insert("operands".into(), Value::Array(operands));
        }
        if self.approximation {
            out.insert("approximation".into(), true.into());
        }
        if self.conclusion {
            out.insert("conclusion".into(), true.into());
        }
        Value::Object(out)
    }
}

/// First non-empty `spelling[...]` argument list in `text`
fn bracket_args<'a>(text: &'a str, spelling: &str) -> Option<&'a str> {
    let open = format!("{}[", spelling);
    text.match_indices(&open).find_map(|(start, _)| {
        let rest = &text[start + open.len()..];
        match rest.find(']') {
            Some(end) if end > 0 => Some(&rest[..end]),
            _ => None,
        }
    })
}

fn parse_operands(args: &str) -> Vec<Operand> {
    if args.contains('{') {
        return NESTED_RE
            .captures(args)
            .and_then(|caps| TensorExpr::parse(&caps[1]))
            .map(|expr| vec![Operand::Nested(expr)])
            .unwrap_or_default();
    }
    args.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| Operand::Name(s.to_string()))
        .collect()
}

/// Parse `<key=value,...>` metadata with bool/int/float/string typing
pub fn parse_metadata(text: &str) -> Map<String, Value> {
    let mut out = Map::new();
    for pair in text.split(',') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let (key, value) = (key.trim(), value.trim());
        let lower = value.to_lowercase();

        let typed = if lower == "true" || lower == "false" {
            Value::from(lower == "true")
        } else if let Some(n) = value
            .bytes()
            .all(|b| b.is_ascii_digit())
            .then(|| value.parse::<i64>().ok())
            .flatten()
        {
            Value::from(n)
        } else if let Some(f) = value
            .contains('.')
            .then(|| value.parse::<f64>().ok())
            .flatten()
        {
            json!(f)
        } else {
            Value::from(value)
        };
        out.insert(key.to_string(), typed);
    }
    out
}

/// Parse one source line with the extended grammar
///
/// Returns `None` when the line carries no tensor annotation.
pub fn parse_line(line: &str, location: &str) -> Option<Result<Component, Vec<CtlError>>> {
    let caps = LINE_RE.captures(line)?;
    Some(parse_tensor(&caps[1], location))
}

/// Build a component from `Ⱦ[id:type] <meta> := {ops}`
pub fn parse_tensor(tensor: &str, location: &str) -> Result<Component, Vec<CtlError>> {
    let caps = COMPONENT_RE
        .captures(tensor)
        .ok_or_else(|| vec![CtlError::BadTensor(tensor.to_string())])?;

    let id = caps[2].trim();
    let type_name = caps[3].trim();
    let ops = caps[5].trim();

    let mut component = Component::new(infer_kind(type_name), id, type_name);
    component.set_extra("ctl3_tensor", tensor);
    component.set_extra("v", 3);

    if let Some(meta) = caps.get(4) {
        component.set_extra("meta", Value::Object(parse_metadata(meta.as_str())));
    }
    if let Some(expr) = TensorExpr::parse(ops) {
        component.set_extra("tensor", expr.to_value());
    }

    if let Some(m) = MATURITY_RE.captures(ops) {
        if let (Ok(cur), Ok(tgt)) = (m[1].parse::<u64>(), m[2].parse::<u64>()) {
            let mut maturity = Maturity::new(cur, tgt, "%");
            if let Some(extra) = m.get(3).map(|x| x.as_str().trim()) {
                if let Some(conf) = extra.strip_prefix("conf:") {
                    if let Ok(conf) = conf.trim().parse::<f64>() {
                        maturity.extra.insert("confidence".into(), json!(conf));
                    }
                } else if extra.starts_with('P') {
                    maturity.extra.insert("priority".into(), extra.into());
                }
            }
            component.m = Some(maturity);
        }
    }

    if let Some(d) = COMPOSE_RE.captures(ops) {
        let deps = d[1]
            .split(',')
            .map(str::trim)
            .map(|dep| match dep.split_once(':') {
                Some((name, kind)) => Dependency::Typed {
                    name: name.trim().to_string(),
                    kind: kind.trim().to_string(),
                },
                None => Dependency::Id(dep.to_string()),
            })
            .collect();
        component.d = Some(deps);
    }

    if let Some(p) = PARALLEL_RE.captures(ops) {
        let parallel: Vec<Value> = p[1].split(',').map(|s| s.trim().into()).collect();
        component.set_extra("parallel", parallel);
    }

    let flags = semantic_flags(ops);
    if !flags.is_empty() {
        component.f = Some(flags);
    }

    if let Some(c) = CONDITION_RE.captures(ops) {
        component.set_extra(
            "conditions",
            json!({"cause": c[1].trim(), "effect": c[2].trim()}),
        );
    }

    component.set_extra("x_file", location);
    enrich(&mut component);
    Ok(component)
}

/// Migrate a v2 JSON annotation into a v3 component
pub fn migrate_v2(json: &str, location: &str) -> Result<Component, Vec<CtlError>> {
    let mut component = schema::parse_component(json)?;
    let tensor = v3_tensor_for(&component);
    component.set_extra("x_file", location);
    component.set_extra("migrated_from_v2", true);
    component.set_extra("ctl3_tensor", tensor);
    component.set_extra("v", 3);
    Ok(component)
}

/// ASCII tensor form of a v2 component
pub fn v3_tensor_for(component: &Component) -> String {
    let type_name: String = component.t.chars().take(20).collect();
    let mut parts = Vec::new();

    if let Some(m) = &component.m {
        parts.push(format!("grad[{}->{}]", m.cur, m.tgt));
    }
    if let Some(d) = &component.d {
        let ids: Vec<&str> = d.iter().map(Dependency::id).collect();
        parts.push(format!("compose[{}]", ids.join(",")));
    }
    if component.has_flag("async") {
        parts.push("parallel[async]".to_string());
    }
    if component.has_flag("gpu") {
        parts.push("partial[gpu]".to_string());
    }

    let ops = if parts.is_empty() {
        "grad[0->100]".to_string()
    } else {
        parts.join(" ")
    };
    format!("D[{}:{}] := {{{}}}", component.id, type_name, ops)
}

fn infer_kind(type_name: &str) -> Kind {
    let lower = type_name.to_lowercase();
    const KEYWORDS: [(&str, Kind); 18] = [
        ("test", Kind::T),
        ("agent", Kind::A),
        ("batch", Kind::B),
        ("function", Kind::F),
        ("func", Kind::F),
        ("module", Kind::M),
        ("mod", Kind::M),
        ("service", Kind::S),
        ("svc", Kind::S),
        ("resource", Kind::R),
        ("res", Kind::R),
        ("process", Kind::P),
        ("proc", Kind::P),
        ("data", Kind::D),
        ("error", Kind::E),
        ("err", Kind::E),
        ("component", Kind::C),
        ("comp", Kind::C),
    ];
    KEYWORDS
        .iter()
        .find(|(kw, _)| lower.contains(kw))
        .map_or(Kind::C, |(_, kind)| *kind)
}

fn semantic_flags(ops: &str) -> Vec<String> {
    let mut flags: BTreeSet<&str> = TensorOp::ALL
        .iter()
        .filter(|op| op.appears_in(ops))
        .map(TensorOp::name)
        .collect();

    let lower = ops.to_lowercase();
    let any = |words: &[&str]| words.iter().any(|w| lower.contains(w));

    let groups: [(bool, &str); 11] = [
        (any(&["gpu", "cuda", "opencl", "vulkan"]), "gpu"),
        (any(&["simd", "avx", "sse"]), "simd"),
        (any(&["ai", "ml", "neural", "embedding"]), "ai"),
        (any(&["async"]) || ops.contains('⊕'), "async"),
        (any(&["stream"]), "streaming"),
        (any(&["batch"]), "batch_processing"),
        (any(&["cache"]), "caching"),
        (any(&["pool"]), "pooling"),
        (any(&["real_time", "realtime"]), "real_time"),
        (any(&["production"]), "production"),
        (any(&["experimental"]), "experimental"),
    ];
    flags.extend(groups.iter().filter(|(hit, _)| *hit).map(|(_, f)| *f));

    flags.into_iter().map(str::to_string).collect()
}

fn status_for(progress: f64) -> &'static str {
    if progress >= 95.0 {
        "complete"
    } else if progress >= 75.0 {
        "good"
    } else if progress >= 50.0 {
        "in_progress"
    } else {
        "needs_work"
    }
}

/// Derived fields: progress/status, category and id warnings
fn enrich(component: &mut Component) {
    if let Some(m) = component.m.as_mut() {
        let progress = (m.progress() * 100.0).round() / 100.0;
        m.extra
            .insert("progress".into(), Value::Number(number_from_f64(progress)));
        m.extra.insert("status".into(), status_for(progress).into());
    }

    if component.f.is_some() {
        let category = if component.has_flag("gpu") || component.has_flag("simd") {
            "performance"
        } else if component.has_flag("ai") {
            "ai_ml"
        } else if component.has_flag("async") || component.has_flag("streaming") {
            "async_io"
        } else {
            "core"
        };
        component.set_extra("category", category);
    }

    if !LOOSE_ID_RE.is_match(&component.id) {
        let warning = format!("ID '{}' doesn't match pattern", component.id);
        component.set_extra("validation_warnings", vec![Value::from(warning)]);
    }
}

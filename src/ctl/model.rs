//! CTL component model
//!
//! A component is a compact JSON object with one-letter keys:
//! `k` kind, `id`, `t` title, `p` priority, `e` effort, `d` dependencies,
//! `r` result, `m` maturity metric and `f` flags. Any other key is kept
//! verbatim, in order, after the known ones (`x_file`, `ctl3_tensor`, ...).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::fmt;

/// Component kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    /// Task / test
    T,
    /// Agent
    A,
    /// Bug / batch
    B,
    /// Feature / function
    F,
    /// Metric / module
    M,
    /// Service
    S,
    /// Resource
    R,
    /// Process
    P,
    /// Data
    D,
    /// Component
    C,
    /// Epic / error
    E,
}

impl Kind {
    pub const ALL: [Kind; 11] = [
        Kind::T,
        Kind::A,
        Kind::B,
        Kind::F,
        Kind::M,
        Kind::S,
        Kind::R,
        Kind::P,
        Kind::D,
        Kind::C,
        Kind::E,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::T => "T",
            Kind::A => "A",
            Kind::B => "B",
            Kind::F => "F",
            Kind::M => "M",
            Kind::S => "S",
            Kind::R => "R",
            Kind::P => "P",
            Kind::D => "D",
            Kind::C => "C",
            Kind::E => "E",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A dependency: a plain id, or `name:type` from the enhanced tensor parser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Dependency {
    Id(String),
    Typed {
        name: String,
        #[serde(rename = "type")]
        kind: String,
    },
}

impl Dependency {
    /// The referenced component id
    pub fn id(&self) -> &str {
        match self {
            Dependency::Id(id) => id,
            Dependency::Typed { name, .. } => name,
        }
    }
}

/// Maturity metric: current value, target value and unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Maturity {
    pub cur: Number,
    pub tgt: Number,
    pub u: String,
    /// Derived or parser-specific keys (`progress`, `status`, `confidence`)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Maturity {
    pub fn new(cur: impl Into<Number>, tgt: impl Into<Number>, unit: &str) -> Self {
        Self {
            cur: cur.into(),
            tgt: tgt.into(),
            u: unit.to_string(),
            extra: Map::new(),
        }
    }

    pub fn current(&self) -> f64 {
        self.cur.as_f64().unwrap_or(0.0)
    }

    pub fn target(&self) -> f64 {
        self.tgt.as_f64().unwrap_or(0.0)
    }

    /// Progress toward target in percent (0 when the target is 0)
    pub fn progress(&self) -> f64 {
        let tgt = self.target();
        if tgt > 0.0 {
            self.current() / tgt * 100.0
        } else {
            0.0
        }
    }
}

/// Annotation format a component was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// `// @component: {json}`
    V2,
    /// `// @ctl3: Ⱦ[id:type] := {ops}` (or migrated from v2)
    V3,
    /// `// @ctl4: id:K:cur:tgt:flags`
    V4,
}

/// One CTL component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub k: Kind,
    pub id: String,
    pub t: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<Vec<Dependency>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub m: Option<Maturity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub f: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Component {
    pub fn new(k: Kind, id: impl Into<String>, t: impl Into<String>) -> Self {
        Self {
            k,
            id: id.into(),
            t: t.into(),
            p: None,
            e: None,
            d: None,
            r: None,
            m: None,
            f: None,
            extra: Map::new(),
        }
    }

    /// Set an extra key, keeping insertion order
    pub fn set_extra(&mut self, key: &str, value: impl Into<Value>) {
        self.extra.insert(key.to_string(), value.into());
    }

    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }

    /// Source location recorded as `x_file` (`path:line`)
    pub fn location(&self) -> Option<&str> {
        self.extra_str("x_file")
    }

    pub fn format(&self) -> Format {
        if self.extra.get("v").and_then(Value::as_u64) == Some(4) {
            Format::V4
        } else if self.extra.contains_key("ctl3_tensor") {
            Format::V3
        } else {
            Format::V2
        }
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.f.as_ref().is_some_and(|f| f.iter().any(|x| x == flag))
    }

    pub fn depends_on(&self, id: &str) -> bool {
        self.d
            .as_ref()
            .is_some_and(|d| d.iter().any(|dep| dep.id() == id))
    }

    /// Compact single-line JSON (no spaces, non-ASCII kept)
    pub fn to_compact_json(&self) -> String {
        // Serializing plain data into a String cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Sort components by kind letter, then id
pub fn sort_components(components: &mut [Component]) {
    components.sort_by(|a, b| {
        a.k.as_str()
            .cmp(b.k.as_str())
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Format a number without a trailing `.0` (90.0 -> "90", 90.5 -> "90.5")
pub fn format_number(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
        Some(f) => f.to_string(),
        None => n.to_string(),
    }
}

/// Convert an f64 into a JSON number, integral values as integers
pub fn number_from_f64(value: f64) -> Number {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        Number::from(value as i64)
    } else {
        Number::from_f64(value).unwrap_or_else(|| Number::from(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_kind_parse_roundtrip() {
        for kind in Kind::ALL {
            assert_eq!(Kind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(Kind::parse("X"), None);
    }

    #[test]
    fn test_component_key_order_and_compact_output() {
        let json = r#"{"x_file":"a.rs:1","f":["ai"],"t":"Тест","k":"C","id":"mem","m":{"cur":90,"tgt":100,"u":"%"}}"#;
        let component: Component = serde_json::from_str(json).unwrap();
        assert_eq!(
            component.to_compact_json(),
            r#"{"k":"C","id":"mem","t":"Тест","m":{"cur":90,"tgt":100,"u":"%"},"f":["ai"],"x_file":"a.rs:1"}"#
        );
    }

    #[test]
    fn test_typed_dependency() {
        let json = r#"{"k":"C","id":"a","t":"A","d":["b",{"name":"c","type":"async"}]}"#;
        let component: Component = serde_json::from_str(json).unwrap();
        assert!(component.depends_on("b"));
        assert!(component.depends_on("c"));
        assert!(!component.depends_on("d"));
        assert_eq!(component.to_compact_json(), json);
    }

    #[test]
    fn test_format_detection() {
        let mut c = Component::new(Kind::C, "a", "A");
        assert_eq!(c.format(), Format::V2);
        c.set_extra("ctl3_tensor", "Ⱦ[a:service] := {}");
        assert_eq!(c.format(), Format::V3);
        let mut c = Component::new(Kind::C, "a", "a");
        c.set_extra("v", 4);
        assert_eq!(c.format(), Format::V4);
    }

    #[test]
    fn test_sort_components() {
        let mut list = vec![
            Component::new(Kind::T, "b", "x"),
            Component::new(Kind::C, "z", "x"),
            Component::new(Kind::C, "a", "x"),
            Component::new(Kind::A, "q", "x"),
        ];
        sort_components(&mut list);
        let order: Vec<String> = list.iter().map(|c| format!("{}:{}", c.k, c.id)).collect();
        assert_eq!(order, vec!["A:q", "C:a", "C:z", "T:b"]);
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(&Number::from(90)), "90");
        assert_eq!(format_number(&number_from_f64(90.0)), "90");
        assert_eq!(format_number(&number_from_f64(90.5)), "90.5");
    }

    #[test]
    fn test_maturity_progress() {
        let m = Maturity::new(45, 90, "%");
        assert_eq!(m.progress(), 50.0);
        let zero = Maturity::new(5, 0, "%");
        assert_eq!(zero.progress(), 0.0);
    }
}
